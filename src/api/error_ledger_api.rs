// ==========================================
// Voltech 采集系统 - 解析错误台账 API
// ==========================================
// 职责: 台账查询、确认、清理
// 约定: 查询失败降级为空列表；确认/清理失败返回 Err
// 红线: 只清理已确认记录
// ==========================================

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::guard::PrivilegeGuard;
use crate::domain::action_log::ActionType;
use crate::domain::parse_error::{ErrorCounts, ErrorFilter, ParseError};
use crate::domain::types::MAX_LOOKBACK_DAYS;
use crate::repository::parse_error_repo::ParseErrorRepository;

/// 错误台账API
pub struct ErrorLedgerApi {
    error_repo: Arc<ParseErrorRepository>,
    guard: PrivilegeGuard,
}

impl ErrorLedgerApi {
    pub fn new(error_repo: Arc<ParseErrorRepository>, guard: PrivilegeGuard) -> Self {
        Self { error_repo, guard }
    }

    /// 按条件查询台账（时间倒序）
    pub fn list_errors(&self, filter: &ErrorFilter) -> Vec<ParseError> {
        self.error_repo.list(filter).unwrap_or_else(|e| {
            warn!(error = %e, "查询解析错误失败，返回空列表");
            Vec::new()
        })
    }

    pub fn counts(&self) -> ErrorCounts {
        self.error_repo.counts().unwrap_or_else(|e| {
            warn!(error = %e, "统计解析错误失败，返回 0");
            ErrorCounts::default()
        })
    }

    /// 确认指定记录；重复确认不计数
    ///
    /// # 返回
    /// - Ok(n): 本次由未确认变为已确认的条数
    pub fn acknowledge(&self, ids: &[i64]) -> ApiResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let changed = self.error_repo.acknowledge(ids)?;
        info!(user = %self.guard.user(), requested = ids.len(), changed, "确认解析错误");
        Ok(changed)
    }

    /// 确认某文件的全部记录
    pub fn acknowledge_by_file(&self, file_path: &str) -> ApiResult<usize> {
        if file_path.trim().is_empty() {
            return Err(ApiError::InvalidInput("文件路径不能为空".to_string()));
        }
        let changed = self.error_repo.acknowledge_by_file(file_path)?;
        info!(user = %self.guard.user(), file = file_path, changed, "确认文件的解析错误");
        Ok(changed)
    }

    /// 清理已确认记录（需管理员）
    ///
    /// 先写审计再删除：审计写不进去时不删除任何记录
    ///
    /// # 参数
    /// - older_than_days: 只清理早于该天数的记录；None 表示全部已确认记录
    pub fn clear_acknowledged(&self, older_than_days: Option<i64>) -> ApiResult<usize> {
        if let Some(days) = older_than_days {
            if !(0..=MAX_LOOKBACK_DAYS).contains(&days) {
                return Err(ApiError::InvalidInput(format!(
                    "天数必须在 0..={} 之间: {}",
                    MAX_LOOKBACK_DAYS, days
                )));
            }
        }

        self.guard.require_admin("clear_acknowledged_errors")?;
        self.guard.audit(
            ActionType::ClearErrors,
            json!({ "older_than_days": older_than_days }),
        )?;
        let deleted = self.error_repo.clear_acknowledged(older_than_days)?;
        info!(user = %self.guard.user(), deleted, "已清理确认过的解析错误");
        Ok(deleted)
    }
}
