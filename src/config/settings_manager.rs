// ==========================================
// Voltech 采集系统 - 设置管理器
// ==========================================
// 存储: settings 表（key / value / updated_at）
// 职责: 键值读写 + 类型化视图（VoltechSettings / WatcherConfig）
// 红线: 设置只能通过显式 setter 修改
// ==========================================

use crate::domain::types::to_db_ts;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 数据源
    pub const SERVER_PATH: &str = "server_path";
    pub const DB_PATH: &str = "db_path";

    // 维护扫描
    pub const LAST_MONTHLY_SCAN: &str = "last_monthly_scan"; // unix 秒
    pub const MAINTENANCE_DAYS: &str = "maintenance_days";
    pub const MAINTENANCE_INTERVAL_DAYS: &str = "maintenance_interval_days";

    // 权限
    pub const ADMIN_USERS: &str = "admin_users"; // 逗号分隔

    // 监听节奏
    pub const POLL_INTERVAL_SECS: &str = "poll_interval_secs";
    pub const HEARTBEAT_INTERVAL_SECS: &str = "heartbeat_interval_secs";
    pub const LEASE_TTL_SECS: &str = "lease_ttl_secs";
    pub const ACQUIRE_TIMEOUT_SECS: &str = "acquire_timeout_secs";

    // 存储不可用时的退避
    pub const MAX_STORE_RETRIES: &str = "max_store_retries";
    pub const STORE_RETRY_DELAYS_SECS: &str = "store_retry_delays_secs"; // 逗号分隔
}

// ==========================================
// 配置错误
// ==========================================
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("未配置数据源目录 (server_path)")]
    MissingServerPath,

    #[error("数据源目录无效: {path} ({reason})")]
    InvalidServerPath { path: String, reason: String },

    #[error("配置值格式错误 (key: {key}, value: {value})")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

// ==========================================
// 类型化视图
// ==========================================

/// 数据源设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoltechSettings {
    pub server_path: Option<String>,
    pub db_path: Option<String>,
    pub last_monthly_scan: Option<DateTime<Utc>>,
}

/// 设置项（列表展示用）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingEntry {
    pub key: String,
    pub value: String,
    pub updated_at: String,
}

/// 监听节奏与退避参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    pub lease_ttl: Duration,
    pub acquire_timeout: Duration,
    pub max_store_retries: u32,
    pub store_retry_delays: Vec<Duration>,
    pub maintenance_days: i64,
    pub maintenance_interval_days: i64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            lease_ttl: Duration::from_secs(120),
            acquire_timeout: Duration::from_secs(10),
            max_store_retries: 6,
            store_retry_delays: [5, 15, 30, 300]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
            maintenance_days: 30,
            maintenance_interval_days: 7,
        }
    }
}

impl WatcherConfig {
    /// 第 attempt 次重试（1 起）前的等待；超出列表长度沿用最后一档
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let idx = attempt.saturating_sub(1) as usize;
        self.store_retry_delays
            .get(idx)
            .or_else(|| self.store_retry_delays.last())
            .copied()
            .unwrap_or(Duration::from_secs(300))
    }
}

// ==========================================
// SettingsManager
// ==========================================
pub struct SettingsManager {
    conn: Arc<Mutex<Connection>>,
}

impl SettingsManager {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ===== 键值读写 =====

    pub fn get(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, to_db_ts(Utc::now())],
        )?;
        Ok(())
    }

    /// 删除设置；返回是否存在
    pub fn delete(&self, key: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(changed > 0)
    }

    pub fn list_all(&self) -> RepositoryResult<Vec<SettingEntry>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT key, value, updated_at FROM settings ORDER BY key")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SettingEntry {
                    key: row.get(0)?,
                    value: row.get(1)?,
                    updated_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn get_parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> RepositoryResult<T> {
        match self.get(key)? {
            Some(raw) => match raw.trim().parse::<T>() {
                Ok(v) => Ok(v),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "配置值无法解析，使用默认值");
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    // ===== 类型化视图 =====

    pub fn voltech_settings(&self) -> RepositoryResult<VoltechSettings> {
        Ok(VoltechSettings {
            server_path: self.get(config_keys::SERVER_PATH)?,
            db_path: self.get(config_keys::DB_PATH)?,
            last_monthly_scan: self.last_monthly_scan()?,
        })
    }

    pub fn last_monthly_scan(&self) -> RepositoryResult<Option<DateTime<Utc>>> {
        let raw = self.get(config_keys::LAST_MONTHLY_SCAN)?;
        Ok(raw
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()))
    }

    pub fn set_last_monthly_scan(&self, ts: DateTime<Utc>) -> RepositoryResult<()> {
        self.set(config_keys::LAST_MONTHLY_SCAN, &ts.timestamp().to_string())
    }

    /// 监听参数（缺失项取默认值）
    pub fn watcher_config(&self) -> RepositoryResult<WatcherConfig> {
        let d = WatcherConfig::default();

        let delays = match self.get(config_keys::STORE_RETRY_DELAYS_SECS)? {
            Some(raw) => {
                let parsed: Vec<Duration> = raw
                    .split(',')
                    .filter_map(|s| s.trim().parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .collect();
                if parsed.is_empty() {
                    d.store_retry_delays.clone()
                } else {
                    parsed
                }
            }
            None => d.store_retry_delays.clone(),
        };

        // 间隔为 0 视为未配置
        let secs = |key: &str, default: Duration| -> RepositoryResult<Duration> {
            let v: u64 = self.get_parsed(key, default.as_secs())?;
            Ok(if v == 0 { default } else { Duration::from_secs(v) })
        };

        Ok(WatcherConfig {
            poll_interval: secs(config_keys::POLL_INTERVAL_SECS, d.poll_interval)?,
            heartbeat_interval: secs(config_keys::HEARTBEAT_INTERVAL_SECS, d.heartbeat_interval)?,
            lease_ttl: secs(config_keys::LEASE_TTL_SECS, d.lease_ttl)?,
            acquire_timeout: secs(config_keys::ACQUIRE_TIMEOUT_SECS, d.acquire_timeout)?,
            max_store_retries: self.get_parsed(config_keys::MAX_STORE_RETRIES, d.max_store_retries)?,
            store_retry_delays: delays,
            maintenance_days: self.get_parsed(config_keys::MAINTENANCE_DAYS, d.maintenance_days)?,
            maintenance_interval_days: self.get_parsed(
                config_keys::MAINTENANCE_INTERVAL_DAYS,
                d.maintenance_interval_days,
            )?,
        })
    }

    /// 读取并校验数据源目录（存在且为目录）
    pub fn validated_server_path(&self) -> Result<PathBuf, ConfigError> {
        let raw = self
            .get(config_keys::SERVER_PATH)?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingServerPath)?;
        validate_server_path(&raw)
    }
}

/// 校验目录路径
pub fn validate_server_path(raw: &str) -> Result<PathBuf, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::MissingServerPath);
    }
    let path = PathBuf::from(trimmed);
    match std::fs::metadata(&path) {
        Ok(meta) if meta.is_dir() => Ok(path),
        Ok(_) => Err(ConfigError::InvalidServerPath {
            path: trimmed.to_string(),
            reason: "不是目录".to_string(),
        }),
        Err(e) => Err(ConfigError::InvalidServerPath {
            path: trimmed.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> SettingsManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        SettingsManager::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_set_get_delete() {
        let sm = setup();
        assert_eq!(sm.get("server_path").unwrap(), None);

        sm.set("server_path", "/mnt/voltech").unwrap();
        sm.set("server_path", "/mnt/voltech2").unwrap();
        assert_eq!(sm.get("server_path").unwrap().as_deref(), Some("/mnt/voltech2"));
        assert_eq!(sm.list_all().unwrap().len(), 1);

        assert!(sm.delete("server_path").unwrap());
        assert!(!sm.delete("server_path").unwrap());
    }

    #[test]
    fn test_watcher_config_defaults_and_overrides() {
        let sm = setup();
        let cfg = sm.watcher_config().unwrap();
        assert_eq!(cfg, WatcherConfig::default());
        assert_eq!(cfg.retry_delay(1), Duration::from_secs(5));
        assert_eq!(cfg.retry_delay(3), Duration::from_secs(30));
        assert_eq!(cfg.retry_delay(9), Duration::from_secs(300));

        sm.set(config_keys::POLL_INTERVAL_SECS, "3").unwrap();
        sm.set(config_keys::STORE_RETRY_DELAYS_SECS, "1, 2").unwrap();
        sm.set(config_keys::MAX_STORE_RETRIES, "abc").unwrap();
        let cfg = sm.watcher_config().unwrap();
        assert_eq!(cfg.poll_interval, Duration::from_secs(3));
        assert_eq!(cfg.retry_delay(5), Duration::from_secs(2));
        assert_eq!(cfg.max_store_retries, WatcherConfig::default().max_store_retries);
    }

    #[test]
    fn test_server_path_validation() {
        let sm = setup();
        assert!(matches!(
            sm.validated_server_path(),
            Err(ConfigError::MissingServerPath)
        ));

        sm.set(config_keys::SERVER_PATH, "/definitely/not/here").unwrap();
        assert!(matches!(
            sm.validated_server_path(),
            Err(ConfigError::InvalidServerPath { .. })
        ));

        let dir = tempfile::tempdir().unwrap();
        sm.set(config_keys::SERVER_PATH, dir.path().to_str().unwrap())
            .unwrap();
        assert_eq!(sm.validated_server_path().unwrap(), dir.path());
    }

    #[test]
    fn test_last_monthly_scan_roundtrip() {
        let sm = setup();
        assert_eq!(sm.last_monthly_scan().unwrap(), None);
        let ts = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        sm.set_last_monthly_scan(ts).unwrap();
        assert_eq!(sm.voltech_settings().unwrap().last_monthly_scan, Some(ts));
    }
}
