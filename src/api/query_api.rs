// ==========================================
// Voltech 采集系统 - 结果查询 API
// ==========================================
// 职责: 批次 / 零件 / 测试 / 统计 查询
// 约定: 只读查询失败时降级（列表为空、统计为 0、详情为 None）并记录 warn
// ==========================================

use std::sync::Arc;

use tracing::warn;

use crate::domain::query::{
    group_by_time, BatchListItem, BatchSearchFilter, BatchSummary, BatchTestGroup, DailyStats,
    DateBounds, OperatorStats, OverallStats, PartDateStats, PartListItem, PartSummary,
    RecentActivity, SerialNumberInfo, TestSearchFilter, TopFailedPart, TrendData,
};
use crate::domain::test_result::TestResult;
use crate::repository::batch_repo::BatchRepository;
use crate::repository::error::RepositoryResult;
use crate::repository::part_repo::PartRepository;
use crate::repository::stats_repo::StatsRepository;
use crate::repository::test_result_repo::TestResultRepository;

/// 最近批次默认条数
const DEFAULT_RECENT_BATCHES: i64 = 10;
/// 不合格零件排行默认条数
const DEFAULT_TOP_FAILED: i64 = 10;
/// 零件序列号列表默认条数
const DEFAULT_SERIAL_NUMBERS: i64 = 100;
/// 最近活动默认条数
const DEFAULT_RECENT_ACTIVITY: i64 = 20;

/// 失败时降级为 fallback
fn degrade<T>(op: &str, result: RepositoryResult<T>, fallback: T) -> T {
    match result {
        Ok(v) => v,
        Err(e) => {
            warn!(op, error = %e, "查询失败，返回空结果");
            fallback
        }
    }
}

/// 测试明细分页结果
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TestPage {
    pub items: Vec<TestResult>,
    pub total: i64,
}

// ==========================================
// QueryApi
// ==========================================

/// 结果查询API
pub struct QueryApi {
    test_repo: Arc<TestResultRepository>,
    batch_repo: Arc<BatchRepository>,
    part_repo: Arc<PartRepository>,
    stats_repo: Arc<StatsRepository>,
}

impl QueryApi {
    pub fn new(
        test_repo: Arc<TestResultRepository>,
        batch_repo: Arc<BatchRepository>,
        part_repo: Arc<PartRepository>,
        stats_repo: Arc<StatsRepository>,
    ) -> Self {
        Self {
            test_repo,
            batch_repo,
            part_repo,
            stats_repo,
        }
    }

    // ===== 测试 =====

    pub fn get_test(&self, id: i64) -> Option<TestResult> {
        degrade("get_test", self.test_repo.find_by_id(id), None)
    }

    pub fn tests_by_serial(&self, serial_num: &str) -> Vec<TestResult> {
        if serial_num.trim().is_empty() {
            return Vec::new();
        }
        degrade(
            "tests_by_serial",
            self.test_repo.find_by_serial(serial_num.trim()),
            Vec::new(),
        )
    }

    pub fn batch_tests(&self, batch: &str, part: Option<&str>) -> Vec<TestResult> {
        degrade(
            "batch_tests",
            self.test_repo.find_by_batch(batch, part),
            Vec::new(),
        )
    }

    /// 批次内测试按测试时刻排序
    pub fn batch_tests_by_time(&self, batch: &str, part: Option<&str>) -> Vec<TestResult> {
        degrade(
            "batch_tests_by_time",
            self.test_repo.find_by_batch_by_time(batch, part),
            Vec::new(),
        )
    }

    /// 批次内测试按测试时刻分组
    pub fn batch_tests_grouped(&self, batch: &str, part: Option<&str>) -> Vec<BatchTestGroup> {
        group_by_time(self.batch_tests_by_time(batch, part))
    }

    /// 条件搜索，附带总数（分页用）
    pub fn search_tests(&self, filter: &TestSearchFilter) -> TestPage {
        let items = degrade("search_tests", self.test_repo.search(filter), Vec::new());
        let total = degrade("count_tests", self.test_repo.count(filter), 0);
        TestPage { items, total }
    }

    pub fn failed_tests(
        &self,
        part: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Vec<TestResult> {
        degrade(
            "failed_tests",
            self.test_repo.failed_tests(part, limit, offset),
            Vec::new(),
        )
    }

    // ===== 批次 =====

    pub fn batch_detail(&self, batch: &str, part: Option<&str>) -> Option<BatchSummary> {
        degrade(
            "batch_detail",
            self.batch_repo.batch_detail(batch, part),
            None,
        )
    }

    pub fn search_batches(&self, filter: &BatchSearchFilter) -> Vec<BatchListItem> {
        degrade("search_batches", self.batch_repo.search(filter), Vec::new())
    }

    pub fn recent_batches_for_part(&self, part: &str, limit: Option<i64>) -> Vec<BatchListItem> {
        degrade(
            "recent_batches_for_part",
            self.batch_repo
                .recent_for_part(part, limit.unwrap_or(DEFAULT_RECENT_BATCHES)),
            Vec::new(),
        )
    }

    pub fn batches_for_part(&self, part: &str) -> Vec<BatchListItem> {
        degrade(
            "batches_for_part",
            self.batch_repo.batches_for_part(part),
            Vec::new(),
        )
    }

    // ===== 零件 =====

    pub fn part_summary(&self, part: &str) -> Option<PartSummary> {
        degrade("part_summary", self.part_repo.part_summary(part), None)
    }

    pub fn list_parts(
        &self,
        search: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Vec<PartListItem> {
        degrade(
            "list_parts",
            self.part_repo.list_parts(search, limit, offset),
            Vec::new(),
        )
    }

    pub fn part_daily_stats(&self, part: &str, bounds: &DateBounds) -> Vec<PartDateStats> {
        degrade(
            "part_daily_stats",
            self.part_repo.part_daily_stats(part, bounds),
            Vec::new(),
        )
    }

    pub fn serial_numbers_for_part(&self, part: &str, limit: Option<i64>) -> Vec<SerialNumberInfo> {
        degrade(
            "serial_numbers_for_part",
            self.part_repo
                .serial_numbers_for_part(part, limit.unwrap_or(DEFAULT_SERIAL_NUMBERS).max(1)),
            Vec::new(),
        )
    }

    pub fn parts_by_date_range(&self, bounds: &DateBounds) -> Vec<PartListItem> {
        degrade(
            "parts_by_date_range",
            self.part_repo.parts_by_date_range(bounds),
            Vec::new(),
        )
    }

    // ===== 统计 =====

    pub fn overall_stats(&self, bounds: &DateBounds) -> OverallStats {
        degrade(
            "overall_stats",
            self.stats_repo.overall(bounds),
            OverallStats::default(),
        )
    }

    pub fn daily_stats(&self, bounds: &DateBounds, limit: Option<i64>) -> Vec<DailyStats> {
        degrade("daily_stats", self.stats_repo.daily(bounds, limit), Vec::new())
    }

    pub fn operator_stats(&self, bounds: &DateBounds) -> Vec<OperatorStats> {
        degrade("operator_stats", self.stats_repo.operators(bounds), Vec::new())
    }

    pub fn top_failed_parts(&self, bounds: &DateBounds, limit: Option<i64>) -> Vec<TopFailedPart> {
        degrade(
            "top_failed_parts",
            self.stats_repo
                .top_failed_parts(bounds, limit.unwrap_or(DEFAULT_TOP_FAILED)),
            Vec::new(),
        )
    }

    pub fn recent_activity(&self, limit: Option<i64>) -> Vec<RecentActivity> {
        degrade(
            "recent_activity",
            self.stats_repo
                .recent_activity(limit.unwrap_or(DEFAULT_RECENT_ACTIVITY)),
            Vec::new(),
        )
    }

    /// 最近 days 个有测试的日期的趋势
    pub fn trend_data(&self, days: i64) -> TrendData {
        TrendData::from_daily(self.daily_stats(&DateBounds::default(), Some(days.max(1))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::error::RepositoryError;

    #[test]
    fn test_degrade_returns_fallback_on_error() {
        let failed: RepositoryResult<Vec<i64>> =
            Err(RepositoryError::DatabaseBusy("locked".to_string()));
        assert!(degrade("t", failed, Vec::new()).is_empty());
        assert_eq!(degrade("t", Ok(3), 0), 3);
    }
}
