// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、Voltech 源文件、组件装配
// ==========================================

#![allow(dead_code)]

use rusqlite::Connection;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{NamedTempFile, TempDir};

use voltech_acquisition::config::settings_manager::{config_keys, SettingsManager, WatcherConfig};
use voltech_acquisition::config::PermissionChecker;
use voltech_acquisition::db::{open_and_migrate, open_sqlite_connection};
use voltech_acquisition::engine::{
    BroadcastEventPublisher, ImportPipeline, LeadershipCoordinator, LeaseConfig,
    OptionalEventPublisher, WatcherService,
};
use voltech_acquisition::importer::{FileScanner, VoltechParser};
use voltech_acquisition::repository::{
    ActionLogRepository, LeaseRepository, ParseErrorRepository, SqliteImportRepository,
    TestResultRepository,
};

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    voltech_acquisition::logging::init_test();
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    // 建表
    open_and_migrate(&db_path)?;

    Ok((temp_file, db_path))
}

/// 打开一个共享连接（WAL + busy_timeout）
pub fn shared_conn(db_path: &str) -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(open_sqlite_connection(db_path).unwrap()))
}

// ==========================================
// Voltech 源文件
// ==========================================

/// 5 条合法记录（其中 1 条不合格）
pub const FIVE_RECORDS: &str = "\
File Name: C1111925.atr
Part #,TX-100
Operator,alice
Batch #,B42
Result #,Serial #,Pass/Fail,Time,,1 LS,,,
,,,,,Minimum,Maximum,Reading,
1,SN001,Pass,08:00:01,,10.0,12.0,11.2,Pass
2,SN002,Pass,08:00:05,,10.0,12.0,11.4,Pass
3,SN003,Fail,08:00:09,,10.0,12.0,13.9,Fail
4,SN004,Pass,08:00:13,,10.0,12.0,11.0,Pass
5,,Pass,08:00:17,,10.0,12.0,11.8,Pass
";

/// 另一个零件、另一天（2 条记录 + 1 条坏行）
pub const SECOND_PART: &str = "\
File Name: C1112025.atr
Part #,TX-200
Operator,bob
Batch #,B43
Result #,Serial #,Pass/Fail,Time,,1 LS,,,
,,,,,Minimum,Maximum,Reading,
1,SN101,Pass,09:00:01,,10.0,12.0,11.2,Pass
2x,SN102,Pass,09:00:05,,10.0,12.0,11.4,Pass
3,SN103,Fail,09:00:09,,10.0,12.0,12.9,Fail
";

/// 创建源目录
pub fn source_dir() -> TempDir {
    tempfile::tempdir().unwrap()
}

/// 写入源文件，返回完整路径
pub fn write_source(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// 追加内容（模拟仪器继续写入）
pub fn append_source(path: &Path, content: &str) {
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
    f.write_all(content.as_bytes()).unwrap();
}

// ==========================================
// 组件装配
// ==========================================

/// 测试用的快速节奏
pub fn fast_config() -> WatcherConfig {
    WatcherConfig {
        poll_interval: Duration::from_millis(100),
        heartbeat_interval: Duration::from_millis(100),
        lease_ttl: Duration::from_secs(5),
        acquire_timeout: Duration::from_secs(5),
        max_store_retries: 2,
        store_retry_delays: vec![Duration::from_millis(20), Duration::from_millis(40)],
        maintenance_days: 30,
        maintenance_interval_days: 7,
    }
}

/// 一个客户端进程的全部组件（独立连接，共享数据库文件）
pub struct TestClient {
    pub settings: Arc<SettingsManager>,
    pub leadership: Arc<LeadershipCoordinator>,
    pub pipeline: Arc<ImportPipeline>,
    pub watcher: Arc<WatcherService>,
    pub events: Arc<BroadcastEventPublisher>,
    pub action_log_repo: Arc<ActionLogRepository>,
    pub error_repo: Arc<ParseErrorRepository>,
    pub test_repo: Arc<TestResultRepository>,
}

pub fn build_client(db_path: &str, user: &str, config: WatcherConfig) -> TestClient {
    let control = shared_conn(db_path);
    let import = shared_conn(db_path);
    let query = shared_conn(db_path);

    let settings = Arc::new(SettingsManager::new(control.clone()));
    let permissions = Arc::new(PermissionChecker::new(settings.clone()));
    let action_log_repo = Arc::new(ActionLogRepository::new(control.clone()));
    let leadership = Arc::new(LeadershipCoordinator::new(
        Arc::new(LeaseRepository::new(control)),
        action_log_repo.clone(),
        user,
        LeaseConfig::from(&config),
    ));
    let pipeline = Arc::new(ImportPipeline::new(
        Arc::new(SqliteImportRepository::new(import)),
        Arc::new(VoltechParser::new()),
        Arc::new(FileScanner::new().unwrap()),
        config.clone(),
    ));
    let events = Arc::new(BroadcastEventPublisher::new());
    let watcher = Arc::new(WatcherService::new(
        leadership.clone(),
        pipeline.clone(),
        settings.clone(),
        permissions,
        OptionalEventPublisher::with_publisher(events.clone()),
        config,
    ));

    TestClient {
        settings,
        leadership,
        pipeline,
        watcher,
        events,
        action_log_repo,
        error_repo: Arc::new(ParseErrorRepository::new(query.clone())),
        test_repo: Arc::new(TestResultRepository::new(query)),
    }
}

/// 配置数据源目录
pub fn set_server_path(client: &TestClient, dir: &Path) {
    client
        .settings
        .set(config_keys::SERVER_PATH, dir.to_str().unwrap())
        .unwrap();
}

/// 轮询等待条件成立
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

/// test_results 行数
pub fn count_results(db_path: &str) -> i64 {
    let conn = Connection::open(db_path).unwrap();
    conn.query_row("SELECT COUNT(*) FROM test_results", [], |row| row.get(0))
        .unwrap()
}

/// parse_errors 行数
pub fn count_errors(db_path: &str) -> i64 {
    let conn = Connection::open(db_path).unwrap();
    conn.query_row("SELECT COUNT(*) FROM parse_errors", [], |row| row.get(0))
        .unwrap()
}
