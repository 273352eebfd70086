// ==========================================
// Voltech 采集系统 - 监听状态视图
// ==========================================

use crate::domain::progress::WatcherProgress;
use crate::domain::types::{WatcherPhase, WatcherRole};
use serde::{Deserialize, Serialize};

/// 主从仲裁结果（只含租约视角）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadershipStatus {
    pub role: WatcherRole,
    pub master_user: Option<String>,
    pub generation: Option<i64>,
    /// master 写入租约行的最新进度（跨进程可见）
    pub master_progress: Option<WatcherProgress>,
}

impl LeadershipStatus {
    pub fn none() -> Self {
        Self {
            role: WatcherRole::None,
            master_user: None,
            generation: None,
            master_progress: None,
        }
    }

    pub fn is_master(&self) -> bool {
        self.role == WatcherRole::Master
    }
}

/// 对前端暴露的监听状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherStatus {
    pub role: WatcherRole,
    pub master_user: Option<String>,
    pub is_active: bool,
    pub is_paused: bool,
    pub can_force_master: bool,
    pub retry_count: u32,
    pub phase: WatcherPhase,
    pub last_error: Option<String>,
    pub master_progress: Option<WatcherProgress>,
}

/// 需要 master 的操作的结果：follower 是正常结果，不是错误
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImportOutcome<T> {
    Completed { result: T },
    Follower { master_user: Option<String> },
}

impl<T> ImportOutcome<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            ImportOutcome::Completed { result } => Some(result),
            ImportOutcome::Follower { .. } => None,
        }
    }
}
