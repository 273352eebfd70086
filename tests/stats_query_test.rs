// ==========================================
// 结果查询与统计测试
// ==========================================
// 职责: 导入两个零件后校验批次/零件/统计视图；空库降级为零值
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod stats_query_test {
    use voltech_acquisition::app::AppState;
    use voltech_acquisition::domain::types::ImportMode;
    use voltech_acquisition::domain::{
        BatchSearchFilter, DateBounds, OverallStats, TestSearchFilter, TrendData,
    };
    use voltech_acquisition::engine::Unsupervised;

    use crate::test_helpers::*;

    /// 导入 FIVE_RECORDS（TX-100/B42，2025-11-19）与 SECOND_PART（TX-200/B43，2025-11-20）
    async fn seeded_state() -> (tempfile::NamedTempFile, AppState) {
        let (tmp, db_path) = create_test_db().unwrap();
        let client = build_client(&db_path, "alice", fast_config());
        let src = source_dir();
        write_source(src.path(), "C1111925.atr", FIVE_RECORDS.as_bytes());
        write_source(src.path(), "C1112025.atr", SECOND_PART.as_bytes());

        let files = client.pipeline.list_files(src.path()).await.unwrap();
        client
            .pipeline
            .run(files, ImportMode::Full, &Unsupervised)
            .await
            .unwrap();

        let state = AppState::with_user(db_path, "alice".to_string()).unwrap();
        (tmp, state)
    }

    #[tokio::test]
    async fn test_overall_stats() {
        let (_tmp, state) = seeded_state().await;
        let stats = state.query_api.overall_stats(&DateBounds::default());

        assert_eq!(stats.total_tests, 7);
        assert_eq!(stats.passed, 5);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.pass_rate, 71.43);
        assert_eq!(stats.total_parts, 2);
        assert_eq!(stats.total_batches, 2);
        assert_eq!(stats.total_operators, 2);
        assert_eq!(stats.first_date.as_deref(), Some("2025-11-19"));
        assert_eq!(stats.last_date.as_deref(), Some("2025-11-20"));

        // 日期区间含端点
        let one_day = state.query_api.overall_stats(&DateBounds {
            date_from: Some("2025-11-20".to_string()),
            date_to: Some("2025-11-20".to_string()),
        });
        assert_eq!(one_day.total_tests, 2);
        assert_eq!(one_day.pass_rate, 50.0);
    }

    #[tokio::test]
    async fn test_empty_database_yields_zero_stats() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let state = AppState::with_user(db_path, "alice".to_string()).unwrap();

        let stats = state.query_api.overall_stats(&DateBounds::default());
        assert_eq!(stats, OverallStats::default());
        assert_eq!(stats.pass_rate, 0.0);

        assert!(state.query_api.daily_stats(&DateBounds::default(), None).is_empty());
        assert!(state.query_api.part_summary("TX-100").is_none());
        assert!(state.query_api.batch_detail("B42", None).is_none());
        assert!(state.query_api.get_test(1).is_none());

        assert!(state
            .query_api
            .part_daily_stats("TX-100", &DateBounds::default())
            .is_empty());
        assert!(state.query_api.serial_numbers_for_part("TX-100", None).is_empty());
        assert!(state
            .query_api
            .parts_by_date_range(&DateBounds::default())
            .is_empty());
        assert!(state.query_api.recent_activity(None).is_empty());
        assert_eq!(state.query_api.trend_data(30), TrendData::default());
        assert!(state.query_api.batch_tests_grouped("B42", None).is_empty());
    }

    #[tokio::test]
    async fn test_daily_and_operator_stats() {
        let (_tmp, state) = seeded_state().await;

        let daily = state.query_api.daily_stats(&DateBounds::default(), None);
        assert_eq!(daily.len(), 2);
        // 最近日期优先
        assert_eq!(daily[0].date, "2025-11-20");
        assert_eq!(daily[0].total_tests, 2);
        assert_eq!(daily[1].date, "2025-11-19");
        assert_eq!(daily[1].failed, 1);
        assert_eq!(daily[1].batches_tested, 1);

        let limited = state.query_api.daily_stats(&DateBounds::default(), Some(1));
        assert_eq!(limited.len(), 1);

        let operators = state.query_api.operator_stats(&DateBounds::default());
        assert_eq!(operators.len(), 2);
        assert_eq!(operators[0].operator, "alice");
        assert_eq!(operators[0].total_tests, 5);
        assert_eq!(operators[0].pass_rate, 80.0);
        assert_eq!(operators[1].operator, "bob");
    }

    #[tokio::test]
    async fn test_batch_and_part_views() {
        let (_tmp, state) = seeded_state().await;

        let batch = state.query_api.batch_detail("B42", Some("TX-100")).unwrap();
        assert_eq!(batch.total_tests, 5);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.first_result, Some(1));
        assert_eq!(batch.last_result, Some(5));
        assert_eq!(batch.normalized_date.as_deref(), Some("2025-11-19"));

        let tests = state.query_api.batch_tests("B42", None);
        let nums: Vec<i64> = tests.iter().map(|t| t.result_num).collect();
        assert_eq!(nums, vec![1, 2, 3, 4, 5]);
        // 空序列号记为 NONE
        assert_eq!(tests[4].serial_num, "NONE");

        let failing = state.query_api.search_batches(&BatchSearchFilter {
            has_failures: Some(true),
            ..Default::default()
        });
        assert_eq!(failing.len(), 2);
        let big = state.query_api.search_batches(&BatchSearchFilter {
            min_tests: Some(3),
            ..Default::default()
        });
        assert_eq!(big.len(), 1);
        assert_eq!(big[0].batch, "B42");

        let part = state.query_api.part_summary("TX-200").unwrap();
        assert_eq!(part.total_batches, 1);
        assert_eq!(part.total_tests, 2);
        assert_eq!(part.latest_batch.as_deref(), Some("B43"));
        assert_eq!(part.latest_operator.as_deref(), Some("bob"));

        let parts = state.query_api.list_parts(Some("TX"), None, None);
        assert_eq!(parts.len(), 2);
        // 最近测试的零件在前
        assert_eq!(parts[0].part, "TX-200");

        assert_eq!(state.query_api.recent_batches_for_part("TX-100", None).len(), 1);
        assert_eq!(state.query_api.batches_for_part("TX-100").len(), 1);
    }

    #[tokio::test]
    async fn test_test_search_and_failures() {
        let (_tmp, state) = seeded_state().await;

        let page = state.query_api.search_tests(&TestSearchFilter {
            part: Some("TX-100".to_string()),
            limit: Some(2),
            ..Default::default()
        });
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, 5);

        let by_serial = state.query_api.tests_by_serial("SN003");
        assert_eq!(by_serial.len(), 1);
        assert_eq!(by_serial[0].pass_fail, "Fail");
        let found = state.query_api.get_test(by_serial[0].id).unwrap();
        assert_eq!(found.serial_num, "SN003");

        let failed = state.query_api.failed_tests(None, None, None);
        assert_eq!(failed.len(), 2);
        // 最近优先
        assert_eq!(failed[0].serial_num, "SN103");

        let top = state
            .query_api
            .top_failed_parts(&DateBounds::default(), None);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].part, "TX-100");
        assert_eq!(top[0].failure_rate, 20.0);
        assert_eq!(top[1].failure_rate, 50.0);
    }

    #[tokio::test]
    async fn test_part_drilldown() {
        let (_tmp, state) = seeded_state().await;

        let daily = state
            .query_api
            .part_daily_stats("TX-100", &DateBounds::default());
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].date, "2025-11-19");
        assert_eq!(daily[0].total_tests, 5);
        assert_eq!(daily[0].failed, 1);
        assert_eq!(daily[0].pass_rate, 80.0);

        let serials = state.query_api.serial_numbers_for_part("TX-100", None);
        assert_eq!(serials.len(), 5);
        // 最后导入的结果 5 没有序列号
        assert_eq!(serials[0].serial_num, "NONE");
        assert_eq!(serials[0].latest_batch, "B42");
        assert_eq!(serials[0].latest_date.as_deref(), Some("2025-11-19"));
        let sn003 = serials.iter().find(|s| s.serial_num == "SN003").unwrap();
        assert_eq!(sn003.total_tests, 1);
        assert_eq!(sn003.failed, 1);
        assert_eq!(state.query_api.serial_numbers_for_part("TX-100", Some(2)).len(), 2);

        let day_two = state.query_api.parts_by_date_range(&DateBounds {
            date_from: Some("2025-11-20".to_string()),
            date_to: Some("2025-11-20".to_string()),
        });
        assert_eq!(day_two.len(), 1);
        assert_eq!(day_two[0].part, "TX-200");
        assert_eq!(
            state
                .query_api
                .parts_by_date_range(&DateBounds::default())
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_activity_trend_and_time_groups() {
        let (_tmp, state) = seeded_state().await;

        let activity = state.query_api.recent_activity(None);
        assert_eq!(activity.len(), 2);
        let first_part = activity.iter().find(|a| a.part == "TX-100").unwrap();
        assert_eq!(first_part.batch, "B42");
        assert_eq!(first_part.operator, "alice");
        assert_eq!(first_part.tests_run, 5);
        assert_eq!(first_part.normalized_date.as_deref(), Some("2025-11-19"));
        assert_eq!(state.query_api.recent_activity(Some(1)).len(), 1);

        // 趋势按日期升序
        let trend = state.query_api.trend_data(30);
        let dates: Vec<&str> = trend.daily_stats.iter().map(|d| d.date.as_str()).collect();
        assert_eq!(dates, vec!["2025-11-19", "2025-11-20"]);
        assert_eq!(trend.volume_trend, vec![5, 2]);
        assert_eq!(trend.pass_rate_trend, vec![80.0, 50.0]);
        // 只取最近 1 个有测试的日期
        assert_eq!(state.query_api.trend_data(1).volume_trend, vec![2]);

        let by_time = state.query_api.batch_tests_by_time("B42", None);
        let nums: Vec<i64> = by_time.iter().map(|t| t.result_num).collect();
        assert_eq!(nums, vec![1, 2, 3, 4, 5]);

        let groups = state.query_api.batch_tests_grouped("B42", Some("TX-100"));
        assert_eq!(groups.len(), 5);
        assert_eq!(groups[0].time.as_deref(), Some("08:00:01"));
        assert!(groups.iter().all(|g| g.tests.len() == 1));
    }
}
