// ==========================================
// Voltech 采集系统 - 核心库
// ==========================================
// 技术栈: Tauri + Rust + SQLite
// 系统定位: 多客户端共享数据库，单 master 采集 Voltech 测试文件
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 主从仲裁 / 导入管道 / 监听
pub mod engine;

// 导入层 - 文件发现与解析
pub mod importer;

// 配置层 - 设置与权限
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// SQL 性能剖析
pub mod perf;

// API 层 - 业务接口
pub mod api;

// 应用层 - Tauri 集成
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ImportMode, WatcherCommand, WatcherPhase, WatcherRole};

// 领域实体
pub use domain::{
    BatchProgress, ImportOutcome, MaintenanceProgress, ParseError, TestResult, WatcherProgress,
    WatcherStatus,
};

// 引擎
pub use engine::{ImportPipeline, LeadershipCoordinator, WatcherService};

// API
pub use api::{ApiError, ApiResult, ErrorLedgerApi, QueryApi, SettingsApi, WatcherApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "Voltech 测试数据采集";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
