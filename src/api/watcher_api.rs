// ==========================================
// Voltech 采集系统 - 监听控制 API
// ==========================================
// 职责: 启停/暂停/恢复、状态、强制接管、批量导入、租约诊断
// 约定: follower 不是错误，作为正常结果返回
// ==========================================

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tracing::{error, info};

use crate::api::error::{ApiError, ApiResult};
use crate::api::guard::PrivilegeGuard;
use crate::domain::action_log::ActionType;
use crate::domain::lease::WatcherLease;
use crate::domain::progress::{BatchProgress, MaintenanceProgress};
use crate::domain::status::{ImportOutcome, WatcherStatus};
use crate::domain::types::MAX_LOOKBACK_DAYS;
use crate::engine::watcher::WatcherService;

// ==========================================
// WatcherApi
// ==========================================

/// 监听控制API
///
/// 职责：
/// 1. 监听生命周期（start / stop / pause / resume）
/// 2. 主从状态与强制接管
/// 3. 区间 / 全量 / 维护导入
/// 4. 租约诊断与强制释放
pub struct WatcherApi {
    watcher: Arc<WatcherService>,
    guard: PrivilegeGuard,
}

impl WatcherApi {
    pub fn new(watcher: Arc<WatcherService>, guard: PrivilegeGuard) -> Self {
        Self { watcher, guard }
    }

    // ==========================================
    // 生命周期
    // ==========================================

    /// 启动监听
    ///
    /// # 返回
    /// - Ok(WatcherStatus): role=master 表示已启动；role=follower 表示他人持有租约
    /// - Err(ApiError::Configuration): server_path 缺失或无效
    pub async fn start(&self) -> ApiResult<WatcherStatus> {
        Ok(self.watcher.start().await?)
    }

    pub async fn stop(&self) -> ApiResult<WatcherStatus> {
        Ok(self.watcher.stop().await?)
    }

    pub async fn pause(&self) -> ApiResult<WatcherStatus> {
        Ok(self.watcher.pause().await?)
    }

    pub async fn resume(&self) -> ApiResult<WatcherStatus> {
        Ok(self.watcher.resume().await?)
    }

    pub fn status(&self) -> ApiResult<WatcherStatus> {
        Ok(self.watcher.status()?)
    }

    /// 强制接管 master（需管理员；审计由主从协调器写入）
    pub async fn force_acquire(&self) -> ApiResult<WatcherStatus> {
        self.guard.require_admin("force_acquire_master")?;
        info!(user = %self.guard.user(), "请求强制接管 master");
        Ok(self.watcher.force_acquire().await?)
    }

    // ==========================================
    // 批量导入
    // ==========================================

    /// 按日期区间导入
    ///
    /// # 参数
    /// - start_date / end_date: YYYY-MM-DD，含端点
    pub async fn import_range(
        &self,
        start_date: &str,
        end_date: &str,
    ) -> ApiResult<ImportOutcome<BatchProgress>> {
        let start = parse_date("start_date", start_date)?;
        let end = parse_date("end_date", end_date)?;
        if start > end {
            return Err(ApiError::InvalidInput(format!(
                "开始日期 {} 晚于结束日期 {}",
                start, end
            )));
        }

        self.guard.require_admin("import_range")?;
        let outcome = self.watcher.import_range(start, end).await?;
        self.audit_completed(
            ActionType::RangeImport,
            json!({ "start_date": start.to_string(), "end_date": end.to_string() }),
            &outcome,
        );
        Ok(outcome)
    }

    /// 维护重扫：最近 days 天内修改过的文件
    pub async fn maintenance_scan(
        &self,
        days: i64,
    ) -> ApiResult<ImportOutcome<MaintenanceProgress>> {
        if days <= 0 || days > MAX_LOOKBACK_DAYS {
            return Err(ApiError::InvalidInput(format!(
                "天数必须在 1..={} 之间: {}",
                MAX_LOOKBACK_DAYS, days
            )));
        }
        self.guard.require_admin("maintenance_scan")?;
        let outcome = self.watcher.maintenance_scan(days).await?;
        self.audit_completed(ActionType::MaintenanceScan, json!({ "days": days }), &outcome);
        Ok(outcome)
    }

    /// 全量历史导入（需先停止监听）
    pub async fn full_import(&self) -> ApiResult<ImportOutcome<BatchProgress>> {
        self.guard.require_admin("full_import")?;
        let outcome = self.watcher.full_import().await?;
        self.audit_completed(ActionType::FullImport, json!({}), &outcome);
        Ok(outcome)
    }

    /// 只为真正执行了的批量导入留痕；follower 结果不写审计
    ///
    /// 导入已提交，审计写入失败只记日志，不改变返回结果
    fn audit_completed<T: Serialize>(
        &self,
        action_type: ActionType,
        mut payload: JsonValue,
        outcome: &ImportOutcome<T>,
    ) {
        let ImportOutcome::Completed { result } = outcome else {
            info!(user = %self.guard.user(), action = ?action_type, "follower 未执行批量导入，不写审计");
            return;
        };
        if let (Some(map), Ok(summary)) = (payload.as_object_mut(), serde_json::to_value(result)) {
            map.insert("result".to_string(), summary);
        }
        if let Err(e) = self.guard.audit(action_type, payload) {
            error!(target: "audit", user = %self.guard.user(), action = ?action_type, error = %e, "批量导入审计写入失败");
        }
    }

    // ==========================================
    // 租约诊断
    // ==========================================

    pub fn lock_status(&self) -> ApiResult<Option<WatcherLease>> {
        Ok(self.watcher.leadership().lock_status()?)
    }

    /// 强制释放租约（需管理员；审计由主从协调器写入）
    ///
    /// # 返回
    /// - Ok(true): 释放了一个活动租约
    /// - Ok(false): 当前没有活动租约
    pub fn force_release_lock(&self) -> ApiResult<bool> {
        self.guard.require_admin("force_release_lock")?;
        Ok(self
            .watcher
            .leadership()
            .force_release_lock(self.guard.user())?)
    }
}

fn parse_date(field: &str, raw: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::InvalidInput(format!("{} 日期格式错误: {}", field, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("start_date", " 2025-11-19 ").ok(),
            NaiveDate::from_ymd_opt(2025, 11, 19)
        );
        assert!(matches!(
            parse_date("start_date", "19-11-25"),
            Err(ApiError::InvalidInput(_))
        ));
    }
}
