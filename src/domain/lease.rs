// ==========================================
// Voltech 采集系统 - 租约与文件处理记录
// ==========================================
// 对齐: watcher_lock（单行租约）/ processed_files（变更检测）
// ==========================================

use crate::domain::types::{from_db_ts, ProcessedStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// WatcherLease - 租约行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherLease {
    pub holder_id: String,   // 实例 ID（每个进程启动时生成）
    pub holder_name: String, // 操作员名（展示用）
    pub acquired_at: String,
    pub last_heartbeat: String,
    pub expires_at: String,
    pub is_active: bool,
    pub generation: i64, // 每次易主 +1，用于识别被夺权
    pub progress_json: Option<String>,
}

impl WatcherLease {
    /// 租约是否仍有效（激活且未过期）
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        match from_db_ts(&self.expires_at) {
            Some(exp) => exp > now,
            None => false,
        }
    }
}

// ==========================================
// ProcessedFile - 文件处理记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub file_path: String,
    pub file_size: i64,
    pub file_modified: i64, // unix 秒
    pub record_count: i64,
    pub status: ProcessedStatus,
    pub processed_at: String,
}

impl ProcessedFile {
    /// 大小或修改时间变化才需要重新处理
    pub fn is_unchanged(&self, file_size: i64, file_modified: i64) -> bool {
        self.file_size == file_size && self.file_modified == file_modified
    }
}
