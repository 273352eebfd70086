// ==========================================
// Voltech 采集系统 - API 层
// ==========================================
// 职责: 提供业务 API 接口,供 Tauri 命令调用
// ==========================================

pub mod error;
pub mod error_ledger_api;
pub mod guard;
pub mod query_api;
pub mod settings_api;
pub mod watcher_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use error_ledger_api::ErrorLedgerApi;
pub use guard::PrivilegeGuard;
pub use query_api::{QueryApi, TestPage};
pub use settings_api::SettingsApi;
pub use watcher_api::WatcherApi;
