// ==========================================
// Voltech 采集系统 - 领域类型定义
// ==========================================
// 职责: 角色 / 监听阶段 / 导入模式 等枚举，以及时间戳存储格式
// ==========================================

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 时间戳存储格式
// ==========================================
// 固定宽度 UTC 文本，字典序即时间序（租约 CAS 直接在 SQL 中比较）
pub const DB_TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// 时间戳 -> 数据库文本
pub fn to_db_ts(ts: DateTime<Utc>) -> String {
    ts.format(DB_TS_FORMAT).to_string()
}

/// 回溯天数上限（约 100 年），超出按无效输入处理
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

/// now 往前 days 天；超出 chrono 可表示范围时取最早时间
pub fn days_before(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    chrono::Duration::try_days(days)
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// 数据库文本 -> 时间戳（兼容 RFC3339 与 SQLite datetime('now') 格式）
pub fn from_db_ts(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, DB_TS_FORMAT) {
        return Some(ts.and_utc());
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|ts| ts.and_utc())
}

// ==========================================
// WatcherRole - 主从角色
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherRole {
    Master,   // 持有租约，唯一允许导入的进程
    Follower, // 另有存活的 master
    None,     // 无人持有
}

impl fmt::Display for WatcherRole {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WatcherRole::Master => write!(f, "master"),
            WatcherRole::Follower => write!(f, "follower"),
            WatcherRole::None => write!(f, "none"),
        }
    }
}

// ==========================================
// WatcherPhase - 监听状态机
// ==========================================
// Stopped → Starting → Running ⇄ Paused → Stopping → Stopped
// 任意活动状态 --ForceStop--> Stopped（租约被夺 / 存储重试耗尽）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherPhase {
    Stopped,
    Starting,
    Running,
    Paused,
    Stopping,
}

/// 状态机输入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatcherCommand {
    Start,
    LeaderGranted,
    LeaderDenied,
    Pause,
    Resume,
    Stop,
    Halted,
    ForceStop,
}

impl WatcherPhase {
    /// 纯状态转换函数；非法转换返回 None
    pub fn apply(self, cmd: WatcherCommand) -> Option<WatcherPhase> {
        use WatcherCommand as C;
        use WatcherPhase as P;

        match (self, cmd) {
            (P::Stopped, C::Start) => Some(P::Starting),
            (P::Starting, C::LeaderGranted) => Some(P::Running),
            (P::Starting, C::LeaderDenied) => Some(P::Stopped),
            (P::Running, C::Pause) => Some(P::Paused),
            (P::Paused, C::Resume) => Some(P::Running),
            // 幂等
            (P::Paused, C::Pause) => Some(P::Paused),
            (P::Running, C::Resume) => Some(P::Running),
            (P::Running | P::Paused | P::Starting, C::Stop) => Some(P::Stopping),
            (P::Stopping, C::Halted) => Some(P::Stopped),
            (P::Starting | P::Running | P::Paused | P::Stopping, C::ForceStop) => {
                Some(P::Stopped)
            }
            _ => None,
        }
    }

    /// 是否处于活动状态（后台任务存在）
    pub fn is_active(self) -> bool {
        !matches!(self, WatcherPhase::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WatcherPhase::Stopped => "stopped",
            WatcherPhase::Starting => "starting",
            WatcherPhase::Running => "running",
            WatcherPhase::Paused => "paused",
            WatcherPhase::Stopping => "stopping",
        }
    }
}

impl fmt::Display for WatcherPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// ImportMode - 导入模式
// ==========================================
// 三种进度视图共用一个累加器，按模式区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    Watch,       // 持续监听
    Range,       // 按日期区间手工导入
    Full,        // 全量历史导入
    Maintenance, // 维护重扫
}

impl ImportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportMode::Watch => "watch",
            ImportMode::Range => "range",
            ImportMode::Full => "full",
            ImportMode::Maintenance => "maintenance",
        }
    }
}

// ==========================================
// ProcessedStatus - 文件处理结果
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessedStatus {
    Ok,
    Error,
}

impl ProcessedStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessedStatus::Ok => "ok",
            ProcessedStatus::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("error") {
            ProcessedStatus::Error
        } else {
            ProcessedStatus::Ok
        }
    }
}
