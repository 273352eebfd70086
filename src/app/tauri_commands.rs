// ==========================================
// Voltech 采集系统 - Tauri 命令（按域拆分）
// ==========================================
// 职责: Tauri 命令定义,连接前端与后端 API
// 返回: 成功为 JSON 字符串；失败为 ErrorResponse JSON 字符串
// ==========================================

#![cfg(feature = "tauri-app")]

mod common;
mod errors;
mod query;
mod settings;
mod watcher;

pub use errors::*;
pub use query::*;
pub use settings::*;
pub use watcher::*;
