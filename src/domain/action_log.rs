// ==========================================
// Voltech 采集系统 - 特权操作审计日志
// ==========================================
// 红线: 强制夺权 / 强制释放 / 设置变更 / 批量导入 / 清理台账 必须留痕
// 对齐: action_log 表
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,
    pub action_type: String,
    pub action_ts: NaiveDateTime,
    pub actor: String,
    pub payload_json: Option<JsonValue>,
    pub detail: Option<String>,
}

impl ActionLog {
    pub fn new(action_type: ActionType, actor: &str) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            action_type: action_type.as_str().to_string(),
            action_ts: chrono::Utc::now().naive_utc(),
            actor: actor.to_string(),
            payload_json: None,
            detail: None,
        }
    }

    pub fn with_payload(mut self, payload: JsonValue) -> Self {
        self.payload_json = Some(payload);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    ForceAcquire,
    ForceRelease,
    SettingChanged,
    SettingDeleted,
    RangeImport,
    FullImport,
    MaintenanceScan,
    ClearErrors,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::ForceAcquire => "FORCE_ACQUIRE",
            ActionType::ForceRelease => "FORCE_RELEASE",
            ActionType::SettingChanged => "SETTING_CHANGED",
            ActionType::SettingDeleted => "SETTING_DELETED",
            ActionType::RangeImport => "RANGE_IMPORT",
            ActionType::FullImport => "FULL_IMPORT",
            ActionType::MaintenanceScan => "MAINTENANCE_SCAN",
            ActionType::ClearErrors => "CLEAR_ERRORS",
        }
    }
}
