// ==========================================
// Voltech 采集系统 - 配置层
// ==========================================
// 存储: settings 表
// ==========================================

pub mod permissions;
pub mod settings_manager;

// 重导出
pub use permissions::{current_user, PermissionChecker};
pub use settings_manager::{
    config_keys, validate_server_path, ConfigError, SettingEntry, SettingsManager,
    VoltechSettings, WatcherConfig,
};
