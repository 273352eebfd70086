// ==========================================
// 导入管道集成测试
// ==========================================
// 职责: 单文件单元、幂等重导入、台账写入、存储不可用时的退避
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod import_pipeline_test {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use voltech_acquisition::domain::lease::ProcessedFile;
    use voltech_acquisition::domain::types::ImportMode;
    use voltech_acquisition::domain::{ErrorFilter, ImportProgress};
    use voltech_acquisition::engine::{
        ControlSignal, ImportPipeline, PipelineControl, PipelineError, Unsupervised,
    };
    use voltech_acquisition::importer::{FileScanner, VoltechParser};
    use voltech_acquisition::repository::{
        CommitSummary, FileCommit, ImportRepository, RepositoryError, RepositoryResult,
    };

    use crate::test_helpers::*;

    // ==========================================
    // 测试辅助
    // ==========================================

    /// 前 fail_times 次提交返回“数据库繁忙”
    struct FlakyImportRepository {
        fail_times: u32,
        commits: AtomicU32,
        committed: Mutex<Vec<String>>,
    }

    impl FlakyImportRepository {
        fn new(fail_times: u32) -> Self {
            Self {
                fail_times,
                commits: AtomicU32::new(0),
                committed: Mutex::new(Vec::new()),
            }
        }
    }

    impl ImportRepository for FlakyImportRepository {
        fn get_processed(&self, _file_path: &str) -> RepositoryResult<Option<ProcessedFile>> {
            Ok(None)
        }

        fn processed_index(&self) -> RepositoryResult<HashMap<String, (i64, i64)>> {
            Ok(HashMap::new())
        }

        fn commit_file(&self, commit: &FileCommit<'_>) -> RepositoryResult<CommitSummary> {
            let n = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_times {
                return Err(RepositoryError::DatabaseBusy("database is locked".to_string()));
            }
            self.committed
                .lock()
                .unwrap()
                .push(commit.file_path.to_string());
            Ok(CommitSummary {
                records_added: commit.records.len(),
                errors_appended: commit.errors.len(),
            })
        }
    }

    /// 记录回调次数的控制器
    #[derive(Default)]
    struct CountingControl {
        unavailable: AtomicU32,
        recovered: AtomicU32,
        checkpoints: AtomicU32,
        stop_after: Option<u32>,
    }

    #[async_trait]
    impl PipelineControl for CountingControl {
        async fn checkpoint(&self, _progress: &ImportProgress) -> ControlSignal {
            let n = self.checkpoints.fetch_add(1, Ordering::SeqCst);
            match self.stop_after {
                Some(limit) if n >= limit => ControlSignal::Interrupt("test stop".to_string()),
                _ => ControlSignal::Continue,
            }
        }

        async fn store_unavailable(
            &self,
            _attempt: u32,
            delay: Duration,
            _error: &RepositoryError,
        ) -> bool {
            self.unavailable.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            true
        }

        fn store_recovered(&self) {
            self.recovered.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pipeline_with(repo: Arc<dyn ImportRepository>) -> ImportPipeline {
        ImportPipeline::new(
            repo,
            Arc::new(VoltechParser::new()),
            Arc::new(FileScanner::new().unwrap()),
            fast_config(),
        )
    }

    // ==========================================
    // 正常导入
    // ==========================================

    #[tokio::test]
    async fn test_valid_and_unreadable_file() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let client = build_client(&db_path, "alice", fast_config());
        let src = source_dir();
        write_source(src.path(), "C1111925.atr", FIVE_RECORDS.as_bytes());
        let bad = write_source(src.path(), "C1112025.atr", &[0x50, 0x61, 0xff, 0xfe, 0x0a]);

        let files = client.pipeline.list_files(src.path()).await.unwrap();
        assert_eq!(files.len(), 2);

        let outcome = client
            .pipeline
            .run(files, ImportMode::Full, &Unsupervised)
            .await
            .unwrap();

        assert!(outcome.interrupted.is_none());
        assert_eq!(outcome.progress.processed_files, 2);
        assert_eq!(outcome.progress.records_added, 5);
        assert_eq!(outcome.progress.error_count, 1);
        assert_eq!(count_results(&db_path), 5);

        let errors = client.error_repo.list(&ErrorFilter::default()).unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].file_path, bad.to_string_lossy());
        assert_eq!(errors[0].line_number, None);
        assert!(!errors[0].acknowledged);
    }

    #[tokio::test]
    async fn test_reimport_is_idempotent() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let client = build_client(&db_path, "alice", fast_config());
        let src = source_dir();
        write_source(src.path(), "C1111925.atr", FIVE_RECORDS.as_bytes());
        write_source(src.path(), "2025/11/C1112025.atr", SECOND_PART.as_bytes());

        let files = client.pipeline.list_files(src.path()).await.unwrap();
        let first = client
            .pipeline
            .run(files.clone(), ImportMode::Full, &Unsupervised)
            .await
            .unwrap();
        assert_eq!(first.progress.records_added, 7);
        assert_eq!(first.progress.error_count, 1);

        // 文件未变化：全部跳过，不重复写入记录和台账
        let second = client
            .pipeline
            .run(files, ImportMode::Full, &Unsupervised)
            .await
            .unwrap();
        assert_eq!(second.progress.files_checked, 2);
        assert_eq!(second.progress.processed_files, 0);
        assert_eq!(second.progress.records_added, 0);
        assert_eq!(count_results(&db_path), 7);
        assert_eq!(count_errors(&db_path), 1);

        assert!(client
            .pipeline
            .discover_pending(src.path())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_appended_rows_are_picked_up() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let client = build_client(&db_path, "alice", fast_config());
        let src = source_dir();
        let path = write_source(src.path(), "C1111925.atr", FIVE_RECORDS.as_bytes());

        let files = client.pipeline.list_files(src.path()).await.unwrap();
        client
            .pipeline
            .run(files, ImportMode::Watch, &Unsupervised)
            .await
            .unwrap();

        append_source(&path, "6,SN006,Pass,08:00:21,,10.0,12.0,11.1,Pass\n");

        let pending = client.pipeline.discover_pending(src.path()).await.unwrap();
        assert_eq!(pending.len(), 1);
        let outcome = client
            .pipeline
            .run(pending, ImportMode::Watch, &Unsupervised)
            .await
            .unwrap();

        // 已有 5 条被唯一约束忽略，只新增 1 条
        assert_eq!(outcome.progress.records_added, 1);
        assert_eq!(count_results(&db_path), 6);
    }

    #[tokio::test]
    async fn test_reparsed_file_keeps_single_ledger_entry() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let client = build_client(&db_path, "alice", fast_config());
        let src = source_dir();
        let path = write_source(src.path(), "C1112025.atr", SECOND_PART.as_bytes());

        let files = client.pipeline.list_files(src.path()).await.unwrap();
        client
            .pipeline
            .run(files, ImportMode::Watch, &Unsupervised)
            .await
            .unwrap();
        assert_eq!(count_errors(&db_path), 1);

        // 仪器继续追加两次，坏行每次都会被重新解析
        for (row, serial) in [(4, "SN104"), (5, "SN105")] {
            append_source(
                &path,
                &format!("{},{},Pass,09:00:1{},,10.0,12.0,11.0,Pass\n", row, serial, row),
            );
            let pending = client.pipeline.discover_pending(src.path()).await.unwrap();
            assert_eq!(pending.len(), 1);
            let outcome = client
                .pipeline
                .run(pending, ImportMode::Watch, &Unsupervised)
                .await
                .unwrap();
            assert_eq!(outcome.progress.records_added, 1);
            assert_eq!(outcome.progress.error_count, 0);
        }

        assert_eq!(count_results(&db_path), 4);
        assert_eq!(count_errors(&db_path), 1);

        // 已确认的错误也不会因重新解析而重新出现
        client.error_repo.acknowledge_by_file(&path.to_string_lossy()).unwrap();
        append_source(&path, "6,SN106,Pass,09:00:20,,10.0,12.0,11.0,Pass\n");
        let pending = client.pipeline.discover_pending(src.path()).await.unwrap();
        client
            .pipeline
            .run(pending, ImportMode::Watch, &Unsupervised)
            .await
            .unwrap();
        assert_eq!(count_errors(&db_path), 1);
        assert_eq!(client.error_repo.counts().unwrap().unacknowledged, 0);
    }

    #[tokio::test]
    async fn test_checkpoint_interrupt_stops_at_file_boundary() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let client = build_client(&db_path, "alice", fast_config());
        let src = source_dir();
        write_source(src.path(), "C1111925.atr", FIVE_RECORDS.as_bytes());
        write_source(src.path(), "C1112025.atr", SECOND_PART.as_bytes());

        let control = CountingControl {
            stop_after: Some(1),
            ..Default::default()
        };
        let files = client.pipeline.list_files(src.path()).await.unwrap();
        let outcome = client
            .pipeline
            .run(files, ImportMode::Full, &control)
            .await
            .unwrap();

        assert_eq!(outcome.interrupted.as_deref(), Some("test stop"));
        assert_eq!(outcome.progress.processed_files, 1);
        // 第一个文件完整提交，没有半个文件
        assert_eq!(count_results(&db_path), 5);
    }

    // ==========================================
    // 存储不可用
    // ==========================================

    #[tokio::test]
    async fn test_store_recovers_after_retry() {
        let repo = Arc::new(FlakyImportRepository::new(1));
        let pipeline = pipeline_with(repo.clone());
        let src = source_dir();
        write_source(src.path(), "C1111925.atr", FIVE_RECORDS.as_bytes());

        let control = CountingControl::default();
        let files = pipeline.list_files(src.path()).await.unwrap();
        let outcome = pipeline
            .run(files, ImportMode::Watch, &control)
            .await
            .unwrap();

        assert_eq!(control.unavailable.load(Ordering::SeqCst), 1);
        assert_eq!(control.recovered.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.progress.records_added, 5);
        assert_eq!(repo.committed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_waits_for_checkpoint() {
        let repo = Arc::new(FlakyImportRepository::new(1));
        let pipeline = pipeline_with(repo.clone());
        let src = source_dir();
        write_source(src.path(), "C1111925.atr", FIVE_RECORDS.as_bytes());

        // 文件边界放行，重试前的检查点中断（例如退避期间失去租约）
        let control = CountingControl {
            stop_after: Some(1),
            ..Default::default()
        };
        let files = pipeline.list_files(src.path()).await.unwrap();
        let outcome = pipeline
            .run(files, ImportMode::Full, &control)
            .await
            .unwrap();

        assert_eq!(outcome.interrupted.as_deref(), Some("test stop"));
        assert_eq!(control.checkpoints.load(Ordering::SeqCst), 2);
        assert_eq!(control.unavailable.load(Ordering::SeqCst), 1);
        // 中断后不再重试提交
        assert_eq!(repo.commits.load(Ordering::SeqCst), 1);
        assert!(repo.committed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_retries_exhausted() {
        let repo = Arc::new(FlakyImportRepository::new(u32::MAX));
        let pipeline = pipeline_with(repo.clone());
        let src = source_dir();
        write_source(src.path(), "C1111925.atr", FIVE_RECORDS.as_bytes());

        let control = CountingControl::default();
        let files = pipeline.list_files(src.path()).await.unwrap();
        let result = pipeline.run(files, ImportMode::Watch, &control).await;

        match result {
            Err(PipelineError::StoreExhausted { attempts, source }) => {
                assert_eq!(attempts, 2);
                assert!(source.is_unavailable());
            }
            other => panic!("Expected StoreExhausted, got {:?}", other.map(|o| o.progress)),
        }
        // 首次 + 2 次重试
        assert_eq!(repo.commits.load(Ordering::SeqCst), 3);
        assert_eq!(control.unavailable.load(Ordering::SeqCst), 2);
        assert!(repo.committed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_source_dir_is_scan_error() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let client = build_client(&db_path, "alice", fast_config());
        let src = source_dir();
        let missing = src.path().join("missing");

        let result = client.pipeline.list_files(&missing).await;
        assert!(matches!(result, Err(PipelineError::Scan(_))));
    }
}
