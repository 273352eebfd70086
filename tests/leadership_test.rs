// ==========================================
// 主从仲裁集成测试
// ==========================================
// 职责: 多个客户端共享同一数据库文件时的租约语义
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod leadership_test {
    use std::sync::Arc;
    use std::time::Duration;

    use voltech_acquisition::domain::types::WatcherRole;
    use voltech_acquisition::domain::WatcherProgress;
    use voltech_acquisition::engine::{LeadershipCoordinator, LeaseConfig};
    use voltech_acquisition::repository::{ActionLogRepository, LeaseRepository};

    use crate::test_helpers::{create_test_db, shared_conn};

    fn coordinator(db_path: &str, user: &str, ttl_secs: i64) -> Arc<LeadershipCoordinator> {
        let conn = shared_conn(db_path);
        Arc::new(LeadershipCoordinator::new(
            Arc::new(LeaseRepository::new(conn.clone())),
            Arc::new(ActionLogRepository::new(conn)),
            user,
            LeaseConfig {
                ttl: chrono::Duration::seconds(ttl_secs),
                acquire_timeout: Duration::from_secs(5),
            },
        ))
    }

    #[tokio::test]
    async fn test_concurrent_acquire_single_master() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let clients: Vec<_> = (0..5)
            .map(|i| coordinator(&db_path, &format!("user{}", i), 60))
            .collect();

        let handles: Vec<_> = clients
            .iter()
            .cloned()
            .map(|c| tokio::spawn(async move { c.acquire().await.unwrap() }))
            .collect();

        let mut masters = 0;
        let mut followers = 0;
        for h in handles {
            match h.await.unwrap().role {
                WatcherRole::Master => masters += 1,
                WatcherRole::Follower => followers += 1,
                WatcherRole::None => panic!("acquire 不应返回 none"),
            }
        }
        assert_eq!(masters, 1);
        assert_eq!(followers, 4);

        // 各自 status 也只能看到一个 master
        let views: Vec<_> = clients.iter().map(|c| c.status().unwrap().role).collect();
        assert_eq!(views.iter().filter(|r| **r == WatcherRole::Master).count(), 1);
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_claimed() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let a = coordinator(&db_path, "alice", 1);
        let b = coordinator(&db_path, "bob", 60);

        assert!(a.acquire().await.unwrap().is_master());
        assert!(!b.acquire().await.unwrap().is_master());

        // alice 不再续约，等待租约过期
        tokio::time::sleep(Duration::from_millis(1300)).await;

        let status = b.acquire().await.unwrap();
        assert!(status.is_master());
        assert!(!a.renew(None).await.unwrap(), "过期后被接管，alice 续约应失败");
        assert_eq!(a.status().unwrap().role, WatcherRole::Follower);
    }

    #[tokio::test]
    async fn test_release_lets_other_acquire() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let a = coordinator(&db_path, "alice", 60);
        let b = coordinator(&db_path, "bob", 60);

        a.acquire().await.unwrap();
        assert!(a.release().await.unwrap());
        assert_eq!(a.status().unwrap().role, WatcherRole::None);
        assert!(b.acquire().await.unwrap().is_master());
    }

    #[tokio::test]
    async fn test_force_acquire_bumps_generation_and_audits() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let a = coordinator(&db_path, "alice", 60);
        let b = coordinator(&db_path, "bob", 60);

        let first = a.acquire().await.unwrap();
        let taken = b.force_acquire().await.unwrap();
        assert!(taken.is_master());
        assert!(taken.generation.unwrap() > first.generation.unwrap());

        // 已是 master 时再次强制接管不改变 generation
        let again = b.force_acquire().await.unwrap();
        assert_eq!(again.generation, taken.generation);

        // 原持有者下一次续约发现被夺权
        assert!(!a.renew(None).await.unwrap());

        let logs = ActionLogRepository::new(shared_conn(&db_path))
            .find_by_type("FORCE_ACQUIRE")
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].actor, "bob");
    }

    #[tokio::test]
    async fn test_master_progress_visible_to_follower() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let a = coordinator(&db_path, "alice", 60);
        let b = coordinator(&db_path, "bob", 60);

        a.acquire().await.unwrap();
        let progress = WatcherProgress {
            total_files: 10,
            processed_files: 4,
            total_records: 120,
            error_count: 1,
            current_file: Some("/src/C1111925.atr".to_string()),
        };
        assert!(a.renew(Some(&progress)).await.unwrap());

        let status = b.status().unwrap();
        assert_eq!(status.role, WatcherRole::Follower);
        assert_eq!(status.master_user.as_deref(), Some("alice"));
        assert_eq!(status.master_progress, Some(progress));
    }

    #[tokio::test]
    async fn test_force_release_lock() {
        let (_tmp, db_path) = create_test_db().unwrap();
        let a = coordinator(&db_path, "alice", 60);
        let b = coordinator(&db_path, "bob", 60);

        a.acquire().await.unwrap();
        assert!(b.lock_status().unwrap().unwrap().is_active);

        assert!(b.force_release_lock("bob").unwrap());
        assert!(!b.lock_status().unwrap().unwrap().is_active);
        assert!(!a.renew(None).await.unwrap());
        assert!(b.acquire().await.unwrap().is_master());

        let logs = ActionLogRepository::new(shared_conn(&db_path))
            .find_by_type("FORCE_RELEASE")
            .unwrap();
        assert_eq!(logs.len(), 1);
    }
}
