// ==========================================
// Voltech 采集系统 - 主从租约仓储
// ==========================================
// 表: watcher_lock（id 恒为 1 的单行）
// 抢占: INSERT ... ON CONFLICT(id) DO UPDATE ... WHERE <可抢占条件>
//       单条语句完成“检查 + 占用”，多进程间原子
// 红线: 时间一律由调用方传入（便于测试过期场景）
// ==========================================

use crate::domain::lease::WatcherLease;
use crate::domain::types::to_db_ts;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct LeaseRepository {
    conn: Arc<Mutex<Connection>>,
}

impl LeaseRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 尝试抢占租约
    ///
    /// 可抢占条件：无行 / 未激活 / 已过期 / 持有者就是自己
    ///
    /// # 返回
    /// - Ok(Some(generation)): 抢占成功
    /// - Ok(None): 另有存活持有者
    pub fn try_acquire(
        &self,
        holder_id: &str,
        holder_name: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> RepositoryResult<Option<i64>> {
        let conn = self.get_conn()?;
        let now_s = to_db_ts(now);
        let expires_s = to_db_ts(now + ttl);

        let changed = conn.execute(
            r#"
            INSERT INTO watcher_lock (
                id, holder_id, holder_name, acquired_at, last_heartbeat,
                expires_at, is_active, generation, progress_json
            ) VALUES (1, ?1, ?2, ?3, ?3, ?4, 1, 1, NULL)
            ON CONFLICT(id) DO UPDATE SET
                generation = CASE
                    WHEN watcher_lock.holder_id = excluded.holder_id AND watcher_lock.is_active = 1
                    THEN watcher_lock.generation
                    ELSE watcher_lock.generation + 1
                END,
                acquired_at = CASE
                    WHEN watcher_lock.holder_id = excluded.holder_id AND watcher_lock.is_active = 1
                    THEN watcher_lock.acquired_at
                    ELSE excluded.acquired_at
                END,
                holder_id = excluded.holder_id,
                holder_name = excluded.holder_name,
                last_heartbeat = excluded.last_heartbeat,
                expires_at = excluded.expires_at,
                is_active = 1
            WHERE watcher_lock.holder_id = excluded.holder_id
               OR watcher_lock.is_active = 0
               OR watcher_lock.expires_at <= excluded.last_heartbeat
            "#,
            params![holder_id, holder_name, now_s, expires_s],
        )?;

        if changed == 0 {
            return Ok(None);
        }

        let generation: i64 =
            conn.query_row("SELECT generation FROM watcher_lock WHERE id = 1", [], |row| {
                row.get(0)
            })?;
        Ok(Some(generation))
    }

    /// 无条件夺取租约（忽略存活检查），generation 一律 +1
    pub fn force_acquire(
        &self,
        holder_id: &str,
        holder_name: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let now_s = to_db_ts(now);
        let expires_s = to_db_ts(now + ttl);

        conn.execute(
            r#"
            INSERT INTO watcher_lock (
                id, holder_id, holder_name, acquired_at, last_heartbeat,
                expires_at, is_active, generation, progress_json
            ) VALUES (1, ?1, ?2, ?3, ?3, ?4, 1, 1, NULL)
            ON CONFLICT(id) DO UPDATE SET
                generation = watcher_lock.generation + 1,
                holder_id = excluded.holder_id,
                holder_name = excluded.holder_name,
                acquired_at = excluded.acquired_at,
                last_heartbeat = excluded.last_heartbeat,
                expires_at = excluded.expires_at,
                is_active = 1,
                progress_json = NULL
            "#,
            params![holder_id, holder_name, now_s, expires_s],
        )?;

        let generation: i64 =
            conn.query_row("SELECT generation FROM watcher_lock WHERE id = 1", [], |row| {
                row.get(0)
            })?;
        Ok(generation)
    }

    /// 心跳续约（同时写入最新进度快照）
    ///
    /// # 返回
    /// - Ok(true): 续约成功
    /// - Ok(false): 租约已不属于 (holder_id, generation)
    pub fn renew(
        &self,
        holder_id: &str,
        generation: i64,
        now: DateTime<Utc>,
        ttl: Duration,
        progress_json: Option<&str>,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            r#"
            UPDATE watcher_lock
            SET last_heartbeat = ?3,
                expires_at = ?4,
                progress_json = COALESCE(?5, progress_json)
            WHERE id = 1 AND holder_id = ?1 AND generation = ?2 AND is_active = 1
            "#,
            params![
                holder_id,
                generation,
                to_db_ts(now),
                to_db_ts(now + ttl),
                progress_json
            ],
        )?;
        Ok(changed == 1)
    }

    /// 主动释放（仅当自己持有）
    pub fn release(&self, holder_id: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            r#"
            UPDATE watcher_lock
            SET is_active = 0, progress_json = NULL
            WHERE id = 1 AND holder_id = ?1 AND is_active = 1
            "#,
            params![holder_id],
        )?;
        Ok(changed == 1)
    }

    /// 强制清除租约（运维逃生口）
    pub fn force_release(&self) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE watcher_lock SET is_active = 0, progress_json = NULL WHERE id = 1 AND is_active = 1",
            [],
        )?;
        Ok(changed == 1)
    }

    /// 读取租约行
    pub fn get(&self) -> RepositoryResult<Option<WatcherLease>> {
        let conn = self.get_conn()?;
        let lease = conn
            .query_row(
                r#"
                SELECT holder_id, holder_name, acquired_at, last_heartbeat,
                       expires_at, is_active, generation, progress_json
                FROM watcher_lock WHERE id = 1
                "#,
                [],
                |row| {
                    Ok(WatcherLease {
                        holder_id: row.get(0)?,
                        holder_name: row.get(1)?,
                        acquired_at: row.get(2)?,
                        last_heartbeat: row.get(3)?,
                        expires_at: row.get(4)?,
                        is_active: row.get::<_, i64>(5)? != 0,
                        generation: row.get(6)?,
                        progress_json: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(lease)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_and_migrate;
    use tempfile::NamedTempFile;

    fn setup() -> (NamedTempFile, LeaseRepository) {
        let temp = NamedTempFile::new().unwrap();
        let conn = open_and_migrate(temp.path().to_str().unwrap()).unwrap();
        (temp, LeaseRepository::new(Arc::new(Mutex::new(conn))))
    }

    #[test]
    fn test_first_claim_wins_second_is_denied() {
        let (_t, repo) = setup();
        let now = Utc::now();
        let ttl = Duration::seconds(120);

        assert_eq!(repo.try_acquire("a", "alice", now, ttl).unwrap(), Some(1));
        assert_eq!(repo.try_acquire("b", "bob", now, ttl).unwrap(), None);

        // 自己重复抢占保持 generation 不变
        assert_eq!(repo.try_acquire("a", "alice", now, ttl).unwrap(), Some(1));
    }

    #[test]
    fn test_expired_lease_can_be_reclaimed() {
        let (_t, repo) = setup();
        let now = Utc::now();
        let ttl = Duration::seconds(120);

        repo.try_acquire("a", "alice", now, ttl).unwrap();
        let later = now + Duration::seconds(121);
        assert_eq!(repo.try_acquire("b", "bob", later, ttl).unwrap(), Some(2));

        // 原持有者续约失败
        assert!(!repo.renew("a", 1, later, ttl, None).unwrap());
        assert!(repo.renew("b", 2, later, ttl, Some("{}")).unwrap());
    }

    #[test]
    fn test_force_acquire_bumps_generation() {
        let (_t, repo) = setup();
        let now = Utc::now();
        let ttl = Duration::seconds(120);

        repo.try_acquire("a", "alice", now, ttl).unwrap();
        assert_eq!(repo.force_acquire("b", "bob", now, ttl).unwrap(), 2);
        assert_eq!(repo.force_acquire("b", "bob", now, ttl).unwrap(), 3);

        let lease = repo.get().unwrap().unwrap();
        assert_eq!(lease.holder_id, "b");
        assert!(lease.is_active);
    }

    #[test]
    fn test_release_only_by_holder() {
        let (_t, repo) = setup();
        let now = Utc::now();
        let ttl = Duration::seconds(120);

        repo.try_acquire("a", "alice", now, ttl).unwrap();
        assert!(!repo.release("b").unwrap());
        assert!(repo.release("a").unwrap());
        assert!(!repo.get().unwrap().unwrap().is_active);

        // 释放后任何人可抢占
        assert_eq!(repo.try_acquire("b", "bob", now, ttl).unwrap(), Some(2));
        assert!(repo.force_release().unwrap());
        assert!(!repo.force_release().unwrap());
    }
}
