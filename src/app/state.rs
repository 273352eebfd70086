// ==========================================
// Voltech 采集系统 - 应用状态
// ==========================================
// 职责: 打开数据库连接、装配仓储/引擎/API
// 连接划分:
// - import_conn: 导入管道（写）
// - control_conn: 租约 / 设置 / 审计（短事务，不被导入阻塞）
// - query_conn: 前端查询与台账
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::{ErrorLedgerApi, PrivilegeGuard, QueryApi, SettingsApi, WatcherApi};
use crate::config::permissions::{current_user, PermissionChecker};
use crate::config::settings_manager::SettingsManager;
use crate::db::{open_and_migrate, open_sqlite_connection};
use crate::engine::events::{BroadcastEventPublisher, OptionalEventPublisher};
use crate::engine::leadership::{LeadershipCoordinator, LeaseConfig};
use crate::engine::pipeline::ImportPipeline;
use crate::engine::watcher::WatcherService;
use crate::importer::{FileScanner, VoltechParser};
use crate::repository::{
    ActionLogRepository, BatchRepository, LeaseRepository, ParseErrorRepository, PartRepository,
    SqliteImportRepository, StatsRepository, TestResultRepository,
};

/// 应用状态
///
/// 包含所有API实例和共享资源
/// 在Tauri应用中作为全局状态管理
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 当前操作员
    pub user_name: String,

    /// 监听控制API
    pub watcher_api: Arc<WatcherApi>,

    /// 设置API
    pub settings_api: Arc<SettingsApi>,

    /// 错误台账API
    pub error_ledger_api: Arc<ErrorLedgerApi>,

    /// 结果查询API
    pub query_api: Arc<QueryApi>,

    /// 监听服务（事件桥接、退出时停止）
    pub watcher: Arc<WatcherService>,

    /// 事件通道（进程内广播 + 最新快照）
    pub events: Arc<BroadcastEventPublisher>,
}

impl AppState {
    /// 以当前系统用户创建AppState
    pub fn new(db_path: String) -> Result<Self, String> {
        Self::with_user(db_path, current_user())
    }

    /// 创建新的AppState实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    /// - user_name: 操作员名（租约展示、权限检查、审计）
    ///
    /// # 返回
    /// - Ok(AppState): 应用状态实例
    /// - Err(String): 初始化错误
    pub fn with_user(db_path: String, user_name: String) -> Result<Self, String> {
        tracing::info!(db_path = %db_path, user = %user_name, "初始化AppState");

        // 建表只需执行一次；其余连接只应用 PRAGMA
        let import_conn = open_and_migrate(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        let control_conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开控制连接: {}", e))?;
        let query_conn = open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开查询连接: {}", e))?;

        let import_conn = shared(import_conn);
        let control_conn = shared(control_conn);
        let query_conn = shared(query_conn);

        // ==========================================
        // 配置 / 权限
        // ==========================================
        let settings = Arc::new(SettingsManager::new(control_conn.clone()));
        let permissions = Arc::new(PermissionChecker::new(settings.clone()));
        let watcher_config = settings
            .watcher_config()
            .map_err(|e| format!("无法读取监听配置: {}", e))?;

        // ==========================================
        // Repository层
        // ==========================================
        let lease_repo = Arc::new(LeaseRepository::new(control_conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(control_conn));
        let import_repo = Arc::new(SqliteImportRepository::new(import_conn));
        let error_repo = Arc::new(ParseErrorRepository::new(query_conn.clone()));
        let test_repo = Arc::new(TestResultRepository::new(query_conn.clone()));
        let batch_repo = Arc::new(BatchRepository::new(query_conn.clone()));
        let part_repo = Arc::new(PartRepository::new(query_conn.clone()));
        let stats_repo = Arc::new(StatsRepository::new(query_conn));

        // ==========================================
        // Engine层
        // ==========================================
        let scanner =
            Arc::new(FileScanner::new().map_err(|e| format!("无法创建文件扫描器: {}", e))?);
        let leadership = Arc::new(LeadershipCoordinator::new(
            lease_repo,
            action_log_repo.clone(),
            user_name.clone(),
            LeaseConfig::from(&watcher_config),
        ));
        let pipeline = Arc::new(ImportPipeline::new(
            import_repo,
            Arc::new(VoltechParser::new()),
            scanner,
            watcher_config.clone(),
        ));

        let events = Arc::new(BroadcastEventPublisher::new());
        let watcher = Arc::new(WatcherService::new(
            leadership,
            pipeline,
            settings.clone(),
            permissions.clone(),
            OptionalEventPublisher::with_publisher(events.clone()),
            watcher_config,
        ));

        // ==========================================
        // API层
        // ==========================================
        let guard = PrivilegeGuard::new(permissions, action_log_repo, user_name.clone());
        let watcher_api = Arc::new(WatcherApi::new(watcher.clone(), guard.clone()));
        let settings_api = Arc::new(SettingsApi::new(settings, guard.clone()));
        let error_ledger_api = Arc::new(ErrorLedgerApi::new(error_repo, guard));
        let query_api = Arc::new(QueryApi::new(test_repo, batch_repo, part_repo, stats_repo));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            user_name,
            watcher_api,
            settings_api,
            error_ledger_api,
            query_api,
            watcher,
            events,
        })
    }
}

fn shared(conn: Connection) -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(conn))
}

/// 获取默认数据库路径
///
/// 优先级: VOLTECH_DB_PATH 环境变量 > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("VOLTECH_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./voltech_data.db");

    if let Some(data_dir) = dirs::data_local_dir() {
        #[cfg(debug_assertions)]
        let dir = data_dir.join("voltech-acquisition-dev");

        #[cfg(not(debug_assertions))]
        let dir = data_dir.join("voltech-acquisition");

        match std::fs::create_dir_all(&dir) {
            Ok(()) => path = dir.join("voltech_data.db"),
            Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "无法创建数据目录，使用当前目录"),
        }
    }

    path.to_string_lossy().to_string()
}
