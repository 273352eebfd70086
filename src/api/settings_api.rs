// ==========================================
// Voltech 采集系统 - 设置 API
// ==========================================
// 职责: 设置读写（修改需管理员并留痕）
// 说明: 监听节奏参数在进程启动时读取，修改后重启生效
// ==========================================

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::guard::PrivilegeGuard;
use crate::config::settings_manager::{
    config_keys, validate_server_path, SettingEntry, SettingsManager, VoltechSettings,
};
use crate::domain::action_log::{ActionLog, ActionType};

/// 审计记录默认条数
const DEFAULT_ACTION_LOG_LIMIT: i64 = 100;

/// 设置API
pub struct SettingsApi {
    settings: Arc<SettingsManager>,
    guard: PrivilegeGuard,
}

impl SettingsApi {
    pub fn new(settings: Arc<SettingsManager>, guard: PrivilegeGuard) -> Self {
        Self { settings, guard }
    }

    /// 数据源设置（server_path / db_path / last_monthly_scan）
    pub fn get_settings(&self) -> ApiResult<VoltechSettings> {
        Ok(self.settings.voltech_settings()?)
    }

    /// 全部设置项（读取失败降级为空列表）
    pub fn list_settings(&self) -> Vec<SettingEntry> {
        self.settings.list_all().unwrap_or_else(|e| {
            warn!(error = %e, "读取设置列表失败，返回空列表");
            Vec::new()
        })
    }

    /// 写入设置
    ///
    /// # 参数
    /// - key: 设置键（不能为空）
    /// - value: 设置值；server_path 必须是存在的目录
    pub fn set_setting(&self, key: &str, value: &str) -> ApiResult<()> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ApiError::InvalidInput("设置键不能为空".to_string()));
        }
        if key == config_keys::SERVER_PATH {
            validate_server_path(value)?;
        }

        self.guard.require_admin("set_setting")?;
        let previous = self.settings.get(key)?;
        self.settings.set(key, value.trim())?;
        self.guard.audit(
            ActionType::SettingChanged,
            json!({ "key": key, "old_value": previous, "new_value": value.trim() }),
        )?;
        info!(user = %self.guard.user(), key, "设置已更新");
        Ok(())
    }

    /// 删除设置；返回该键是否存在
    pub fn delete_setting(&self, key: &str) -> ApiResult<bool> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ApiError::InvalidInput("设置键不能为空".to_string()));
        }

        self.guard.require_admin("delete_setting")?;
        let previous = self.settings.get(key)?;
        let existed = self.settings.delete(key)?;
        if existed {
            self.guard.audit(
                ActionType::SettingDeleted,
                json!({ "key": key, "old_value": previous }),
            )?;
            info!(user = %self.guard.user(), key, "设置已删除");
        }
        Ok(existed)
    }

    /// 特权操作审计记录（读取失败降级为空列表）
    pub fn action_log(&self, action_type: Option<&str>, limit: Option<i64>) -> Vec<ActionLog> {
        self.guard
            .recent_actions(action_type, limit.unwrap_or(DEFAULT_ACTION_LOG_LIMIT))
            .unwrap_or_else(|e| {
                warn!(error = %e, "读取审计记录失败，返回空列表");
                Vec::new()
            })
    }
}
