// ==========================================
// Voltech 采集系统 - 权限检查原语
// ==========================================
// 规则: admin_users（逗号分隔，大小写不敏感）
//       未配置时所有本地用户视为管理员
// 特权操作: 强制接管 / 强制释放 / 修改设置 / 批量导入 / 清理台账
// ==========================================

use crate::config::settings_manager::{config_keys, SettingsManager};
use crate::repository::error::RepositoryResult;
use std::sync::Arc;

/// 当前操作员名（USERNAME / USER）
pub fn current_user() -> String {
    std::env::var("USERNAME")
        .or_else(|_| std::env::var("USER"))
        .map(|u| u.trim().to_string())
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub struct PermissionChecker {
    settings: Arc<SettingsManager>,
}

impl PermissionChecker {
    pub fn new(settings: Arc<SettingsManager>) -> Self {
        Self { settings }
    }

    /// 用户是否为管理员
    pub fn is_admin(&self, user: &str) -> RepositoryResult<bool> {
        let raw = self.settings.get(config_keys::ADMIN_USERS)?;
        Ok(is_admin_in(raw.as_deref(), user))
    }
}

fn is_admin_in(admin_users: Option<&str>, user: &str) -> bool {
    let admins: Vec<&str> = admin_users
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if admins.is_empty() {
        return true;
    }
    admins.iter().any(|a| a.eq_ignore_ascii_case(user.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_means_everyone() {
        assert!(is_admin_in(None, "bob"));
        assert!(is_admin_in(Some(" , "), "bob"));
    }

    #[test]
    fn test_listed_users_only() {
        let list = Some("alice, Carol");
        assert!(is_admin_in(list, "alice"));
        assert!(is_admin_in(list, "carol"));
        assert!(!is_admin_in(list, "bob"));
    }
}
