// ==========================================
// Voltech 采集系统 - 特权操作守卫
// ==========================================
// 职责: 管理员校验 + 审计留痕
// ==========================================

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::warn;

use crate::api::error::{ApiError, ApiResult};
use crate::config::permissions::PermissionChecker;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::error::RepositoryResult;

/// 特权操作守卫（各 API 共享）
#[derive(Clone)]
pub struct PrivilegeGuard {
    permissions: Arc<PermissionChecker>,
    action_log_repo: Arc<ActionLogRepository>,
    user: String,
}

impl PrivilegeGuard {
    pub fn new(
        permissions: Arc<PermissionChecker>,
        action_log_repo: Arc<ActionLogRepository>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            permissions,
            action_log_repo,
            user: user.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// 当前用户是否为管理员（读取失败按无权限处理）
    pub fn is_admin(&self) -> bool {
        self.permissions.is_admin(&self.user).unwrap_or_else(|e| {
            warn!(user = %self.user, error = %e, "权限检查失败，按无权限处理");
            false
        })
    }

    /// 要求管理员权限
    pub fn require_admin(&self, operation: &str) -> ApiResult<()> {
        if self.permissions.is_admin(&self.user)? {
            Ok(())
        } else {
            warn!(target: "audit", user = %self.user, operation, "拒绝非管理员的特权操作");
            Err(ApiError::PermissionDenied {
                user: self.user.clone(),
                operation: operation.to_string(),
            })
        }
    }

    /// 读取审计记录（按时间倒序）；action_type 为空时不过滤
    pub fn recent_actions(
        &self,
        action_type: Option<&str>,
        limit: i64,
    ) -> RepositoryResult<Vec<ActionLog>> {
        let limit = limit.max(1);
        match action_type.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => {
                let mut logs = self.action_log_repo.find_by_type(t)?;
                logs.truncate(limit as usize);
                Ok(logs)
            }
            None => self.action_log_repo.list_recent(limit),
        }
    }

    /// 写审计记录
    pub fn audit(&self, action_type: ActionType, payload: JsonValue) -> ApiResult<()> {
        let log = ActionLog::new(action_type, &self.user).with_payload(payload);
        self.action_log_repo.insert(&log)?;
        Ok(())
    }
}
