// ==========================================
// Voltech 采集系统 - 查询视图与过滤条件
// ==========================================
// 批次 / 零件 / 测试 / 统计 的只读视图
// 统计全部由 SQL 聚合得出，不做缓存
// ==========================================

use serde::{Deserialize, Serialize};

use crate::domain::test_result::TestResult;

// ==========================================
// 过滤条件
// ==========================================

/// 测试明细搜索（日期为 YYYY-MM-DD，含端点）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSearchFilter {
    pub part: Option<String>,
    pub batch: Option<String>,
    pub operator: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub pass_fail: Option<String>,
    pub serial_num: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 批次搜索
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSearchFilter {
    pub part: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub operator: Option<String>,
    pub min_tests: Option<i64>,
    pub has_failures: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 统计日期区间
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateBounds {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

// ==========================================
// 批次视图
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch: String,
    pub part: String,
    pub operator: String,
    pub date: String,
    pub normalized_date: Option<String>,
    pub total_tests: i64,
    pub passed: i64,
    pub failed: i64,
    pub pass_rate: f64,
    pub first_result: Option<i64>,
    pub last_result: Option<i64>,
    pub file_path: String,
}

/// 同一测试时刻的一组测试（time 缺失的归为 None 一组）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchTestGroup {
    pub time: Option<String>,
    pub tests: Vec<TestResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchListItem {
    pub batch: String,
    pub part: String,
    pub operator: String,
    pub date: String,
    pub normalized_date: Option<String>,
    pub total_tests: i64,
    pub passed: i64,
    pub failed: i64,
    pub pass_rate: f64,
}

// ==========================================
// 零件视图
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartSummary {
    pub part: String,
    pub total_batches: i64,
    pub total_tests: i64,
    pub passed: i64,
    pub failed: i64,
    pub pass_rate: f64,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    pub latest_batch: Option<String>,
    pub latest_operator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartListItem {
    pub part: String,
    pub total_batches: i64,
    pub total_tests: i64,
    pub pass_rate: f64,
    pub last_date: Option<String>,
}

/// 单个零件按日统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartDateStats {
    pub date: String,
    pub total_tests: i64,
    pub passed: i64,
    pub failed: i64,
    pub pass_rate: f64,
}

/// 零件下的序列号汇总；latest_* 取自该序列号最后导入的一次测试
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialNumberInfo {
    pub serial_num: String,
    pub total_tests: i64,
    pub passed: i64,
    pub failed: i64,
    pub latest_batch: String,
    pub latest_date: Option<String>,
}

// ==========================================
// 统计视图
// ==========================================

/// 最近活动：一行 = 一个 (零件, 批次, 日期, 操作员) 组合
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentActivity {
    pub date: String,
    pub normalized_date: Option<String>,
    pub part: String,
    pub batch: String,
    pub operator: String,
    pub tests_run: i64,
    pub last_imported_at: String,
}

/// 仪表盘趋势（按日期升序，三个序列一一对应）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendData {
    pub daily_stats: Vec<DailyStats>,
    pub pass_rate_trend: Vec<f64>,
    pub volume_trend: Vec<i64>,
}

impl TrendData {
    /// daily 为最近日期优先的每日统计
    pub fn from_daily(mut daily: Vec<DailyStats>) -> Self {
        daily.reverse();
        Self {
            pass_rate_trend: daily.iter().map(|d| d.pass_rate).collect(),
            volume_trend: daily.iter().map(|d| d.total_tests).collect(),
            daily_stats: daily,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: String,
    pub total_tests: i64,
    pub passed: i64,
    pub failed: i64,
    pub pass_rate: f64,
    pub parts_tested: i64,
    pub batches_tested: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorStats {
    pub operator: String,
    pub total_tests: i64,
    pub passed: i64,
    pub failed: i64,
    pub pass_rate: f64,
    pub parts_tested: i64,
    pub batches_completed: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallStats {
    pub total_tests: i64,
    pub passed: i64,
    pub failed: i64,
    pub pass_rate: f64,
    pub total_parts: i64,
    pub total_batches: i64,
    pub total_operators: i64,
    pub first_date: Option<String>,
    pub last_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopFailedPart {
    pub part: String,
    pub total_tests: i64,
    pub failed: i64,
    pub failure_rate: f64,
}

/// 通过率（百分比，保留两位小数）；总数为 0 时返回 0.0
pub fn pass_rate(passed: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    ((passed as f64 / total as f64) * 10_000.0).round() / 100.0
}

/// 把已按 time 排序的测试切成连续的同时刻分组
pub fn group_by_time(tests: Vec<TestResult>) -> Vec<BatchTestGroup> {
    let mut groups: Vec<BatchTestGroup> = Vec::new();
    for test in tests {
        match groups.last_mut() {
            Some(group) if group.time == test.time => group.tests.push(test),
            _ => groups.push(BatchTestGroup {
                time: test.time.clone(),
                tests: vec![test],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_at(id: i64, time: Option<&str>) -> TestResult {
        TestResult {
            id,
            file_path: "/src/C1111925.atr".to_string(),
            result_num: id,
            part: "TX-100".to_string(),
            operator: "alice".to_string(),
            batch: "B42".to_string(),
            date: "19-11-25".to_string(),
            normalized_date: Some("2025-11-19".to_string()),
            serial_num: format!("SN{:03}", id),
            pass_fail: "Pass".to_string(),
            time: time.map(str::to_string),
            retries: None,
            measurements: serde_json::json!({}),
            created_at: "2025-11-19 08:00:00".to_string(),
        }
    }

    #[test]
    fn test_group_by_time() {
        let groups = group_by_time(vec![
            test_at(1, None),
            test_at(2, Some("08:00:01")),
            test_at(3, Some("08:00:01")),
            test_at(4, Some("08:00:05")),
        ]);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].time, None);
        assert_eq!(groups[1].time.as_deref(), Some("08:00:01"));
        let ids: Vec<i64> = groups[1].tests.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(group_by_time(Vec::new()).is_empty());
    }

    #[test]
    fn test_trend_is_chronological() {
        let day = |date: &str, total: i64, passed: i64| DailyStats {
            date: date.to_string(),
            total_tests: total,
            passed,
            failed: total - passed,
            pass_rate: pass_rate(passed, total),
            parts_tested: 1,
            batches_tested: 1,
        };
        let trend = TrendData::from_daily(vec![day("2025-11-20", 2, 1), day("2025-11-19", 5, 4)]);
        assert_eq!(trend.daily_stats[0].date, "2025-11-19");
        assert_eq!(trend.volume_trend, vec![5, 2]);
        assert_eq!(trend.pass_rate_trend, vec![80.0, 50.0]);
    }

    #[test]
    fn test_pass_rate() {
        assert_eq!(pass_rate(0, 0), 0.0);
        assert_eq!(pass_rate(3, 4), 75.0);
        assert_eq!(pass_rate(1, 3), 33.33);
    }
}
