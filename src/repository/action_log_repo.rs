// ==========================================
// Voltech 采集系统 - 审计日志仓储
// ==========================================
// 表: action_log
// 红线: 特权操作必须留痕
// ==========================================

mod core;
mod queries;


pub use core::ActionLogRepository;
