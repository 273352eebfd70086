// ==========================================
// Voltech 采集系统 - 主从仲裁
// ==========================================
// 模型: 单行租约（holder_id + expires_at + generation）
// 抢占: 数据库内原子 CAS，见 LeaseRepository::try_acquire
// 防护: 每次租约操作 = busy_timeout + 外层 tokio timeout，超时即失败
// 夺权: force_acquire 使 generation +1，原持有者在下一次续约时发现
// ==========================================

use crate::config::settings_manager::WatcherConfig;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::lease::WatcherLease;
use crate::domain::progress::WatcherProgress;
use crate::domain::status::LeadershipStatus;
use crate::domain::types::WatcherRole;
use crate::repository::action_log_repo::ActionLogRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::lease_repo::LeaseRepository;
use chrono::Utc;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum LeadershipError {
    #[error("租约操作超时（{0:?}）")]
    Timeout(Duration),

    #[error("租约仓储错误: {0}")]
    Repository(#[from] RepositoryError),

    #[error("租约后台任务失败: {0}")]
    Join(String),
}

pub type LeadershipResult<T> = Result<T, LeadershipError>;

/// 租约参数
#[derive(Debug, Clone, Copy)]
pub struct LeaseConfig {
    pub ttl: chrono::Duration,
    pub acquire_timeout: Duration,
}

impl From<&WatcherConfig> for LeaseConfig {
    fn from(cfg: &WatcherConfig) -> Self {
        Self {
            ttl: chrono::Duration::from_std(cfg.lease_ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(120)),
            acquire_timeout: cfg.acquire_timeout,
        }
    }
}

// ==========================================
// LeadershipCoordinator
// ==========================================
pub struct LeadershipCoordinator {
    lease_repo: Arc<LeaseRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    instance_id: String,
    user_name: String,
    config: LeaseConfig,
    // 本进程认为自己持有的 generation（None = 未持有）
    held_generation: Mutex<Option<i64>>,
}

impl LeadershipCoordinator {
    pub fn new(
        lease_repo: Arc<LeaseRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        user_name: impl Into<String>,
        config: LeaseConfig,
    ) -> Self {
        Self {
            lease_repo,
            action_log_repo,
            instance_id: uuid::Uuid::new_v4().to_string(),
            user_name: user_name.into(),
            config,
            held_generation: Mutex::new(None),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn config(&self) -> LeaseConfig {
        self.config
    }

    /// 本进程当前认为持有的 generation
    pub fn held_generation(&self) -> Option<i64> {
        match self.held_generation.lock() {
            Ok(g) => *g,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_held(&self, generation: Option<i64>) {
        match self.held_generation.lock() {
            Ok(mut g) => *g = generation,
            Err(poisoned) => *poisoned.into_inner() = generation,
        }
    }

    /// 在阻塞线程上执行租约操作，外层限时
    async fn bounded<T, F>(&self, op: &'static str, f: F) -> LeadershipResult<T>
    where
        F: FnOnce() -> RepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let task = tokio::task::spawn_blocking(f);
        match tokio::time::timeout(self.config.acquire_timeout, task).await {
            Err(_) => {
                warn!(op, timeout = ?self.config.acquire_timeout, "租约操作超时");
                Err(LeadershipError::Timeout(self.config.acquire_timeout))
            }
            Ok(Err(join)) => Err(LeadershipError::Join(join.to_string())),
            Ok(Ok(result)) => Ok(result?),
        }
    }

    // ==========================================
    // 抢占 / 夺权 / 续约 / 释放
    // ==========================================

    /// 尝试成为 master；租约被他人持有时返回 follower
    pub async fn acquire(&self) -> LeadershipResult<LeadershipStatus> {
        let repo = Arc::clone(&self.lease_repo);
        let (id, name, ttl) = (
            self.instance_id.clone(),
            self.user_name.clone(),
            self.config.ttl,
        );

        let claimed = self
            .bounded("acquire", move || {
                repo.try_acquire(&id, &name, Utc::now(), ttl)
            })
            .await?;

        match claimed {
            Some(generation) => {
                self.set_held(Some(generation));
                info!(
                    instance_id = %self.instance_id,
                    user = %self.user_name,
                    generation,
                    "已成为 master"
                );
                Ok(self.master_status(generation))
            }
            None => {
                self.set_held(None);
                let repo = Arc::clone(&self.lease_repo);
                let lease = self.bounded("read_lease", move || repo.get()).await?;
                let status = lease
                    .as_ref()
                    .map(follower_status)
                    .unwrap_or_else(LeadershipStatus::none);
                info!(
                    master_user = ?status.master_user,
                    "租约由他人持有，以 follower 身份运行"
                );
                Ok(status)
            }
        }
    }

    /// 强制接管（特权操作，写审计）
    ///
    /// 已是 master 时直接返回，不增加 generation
    pub async fn force_acquire(&self) -> LeadershipResult<LeadershipStatus> {
        let current = {
            let repo = Arc::clone(&self.lease_repo);
            self.bounded("read_lease", move || repo.get()).await?
        };
        if let (Some(lease), Some(held)) = (&current, self.held_generation()) {
            if lease.is_active && lease.holder_id == self.instance_id && lease.generation == held
            {
                debug!(generation = held, "已是 master，强制接管无操作");
                return Ok(self.master_status(held));
            }
        }

        let previous_holder = current.as_ref().map(|l| l.holder_name.clone());
        warn!(
            target: "audit",
            user = %self.user_name,
            previous_holder = ?previous_holder,
            "强制接管 master"
        );

        let lease_repo = Arc::clone(&self.lease_repo);
        let audit_repo = Arc::clone(&self.action_log_repo);
        let (id, name, ttl) = (
            self.instance_id.clone(),
            self.user_name.clone(),
            self.config.ttl,
        );
        let generation = self
            .bounded("force_acquire", move || {
                let generation = lease_repo.force_acquire(&id, &name, Utc::now(), ttl)?;
                let log = ActionLog::new(ActionType::ForceAcquire, &name).with_payload(json!({
                    "instance_id": id,
                    "previous_holder": previous_holder,
                    "generation": generation,
                }));
                audit_repo.insert(&log)?;
                Ok(generation)
            })
            .await?;

        self.set_held(Some(generation));
        Ok(self.master_status(generation))
    }

    /// 心跳续约，同时写入进度快照
    ///
    /// # 返回
    /// - Ok(true): 仍是 master
    /// - Ok(false): 租约已丢失（被夺权或被强制释放）
    pub async fn renew(&self, progress: Option<&WatcherProgress>) -> LeadershipResult<bool> {
        let Some(generation) = self.held_generation() else {
            return Ok(false);
        };

        let progress_json = progress.and_then(|p| serde_json::to_string(p).ok());
        let repo = Arc::clone(&self.lease_repo);
        let (id, ttl) = (self.instance_id.clone(), self.config.ttl);

        let renewed = self
            .bounded("renew", move || {
                repo.renew(&id, generation, Utc::now(), ttl, progress_json.as_deref())
            })
            .await?;

        if !renewed {
            warn!(generation, "续约失败，租约已被接管或释放");
            self.set_held(None);
        }
        Ok(renewed)
    }

    /// 主动释放（仅当自己持有）
    pub async fn release(&self) -> LeadershipResult<bool> {
        if self.held_generation().is_none() {
            return Ok(false);
        }
        let repo = Arc::clone(&self.lease_repo);
        let id = self.instance_id.clone();
        let released = self.bounded("release", move || repo.release(&id)).await;
        self.set_held(None);

        let released = released?;
        info!(released, "已释放 master 租约");
        Ok(released)
    }

    // ==========================================
    // 只读对账 / 诊断
    // ==========================================

    /// 以租约行为准校正本地认知
    pub fn status(&self) -> RepositoryResult<LeadershipStatus> {
        let lease = self.lease_repo.get()?;
        let held = self.held_generation();
        let now = Utc::now();

        match lease {
            Some(l)
                if l.is_active
                    && l.holder_id == self.instance_id
                    && Some(l.generation) == held =>
            {
                let mut status = self.master_status(l.generation);
                status.master_progress = parse_progress(&l);
                Ok(status)
            }
            Some(l) if l.is_live_at(now) => {
                if held.is_some() {
                    warn!("本地认为持有租约，但租约行已属于他人");
                    self.set_held(None);
                }
                Ok(follower_status(&l))
            }
            _ => {
                if held.is_some() {
                    self.set_held(None);
                }
                Ok(LeadershipStatus::none())
            }
        }
    }

    pub fn lock_status(&self) -> RepositoryResult<Option<WatcherLease>> {
        self.lease_repo.get()
    }

    /// 强制清除租约（特权操作，写审计）
    pub fn force_release_lock(&self, actor: &str) -> RepositoryResult<bool> {
        let previous = self.lease_repo.get()?;
        let released = self.lease_repo.force_release()?;

        warn!(
            target: "audit",
            user = %actor,
            previous_holder = ?previous.as_ref().map(|l| &l.holder_name),
            released,
            "强制释放 master 租约"
        );
        let log = ActionLog::new(ActionType::ForceRelease, actor).with_payload(json!({
            "previous_holder": previous.as_ref().map(|l| l.holder_name.clone()),
            "generation": previous.as_ref().map(|l| l.generation),
            "released": released,
        }));
        self.action_log_repo.insert(&log)?;

        if previous.map_or(false, |l| l.holder_id == self.instance_id) {
            self.set_held(None);
        }
        Ok(released)
    }

    fn master_status(&self, generation: i64) -> LeadershipStatus {
        LeadershipStatus {
            role: WatcherRole::Master,
            master_user: Some(self.user_name.clone()),
            generation: Some(generation),
            master_progress: None,
        }
    }
}

fn follower_status(lease: &WatcherLease) -> LeadershipStatus {
    if !lease.is_live_at(Utc::now()) {
        return LeadershipStatus::none();
    }
    LeadershipStatus {
        role: WatcherRole::Follower,
        master_user: Some(lease.holder_name.clone()),
        generation: Some(lease.generation),
        master_progress: parse_progress(lease),
    }
}

fn parse_progress(lease: &WatcherLease) -> Option<WatcherProgress> {
    lease
        .progress_json
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_and_migrate;
    use rusqlite::Connection;
    use tempfile::NamedTempFile;

    fn coordinator(conn: &Arc<std::sync::Mutex<Connection>>, user: &str) -> LeadershipCoordinator {
        LeadershipCoordinator::new(
            Arc::new(LeaseRepository::new(conn.clone())),
            Arc::new(ActionLogRepository::new(conn.clone())),
            user,
            LeaseConfig {
                ttl: chrono::Duration::seconds(120),
                acquire_timeout: Duration::from_secs(5),
            },
        )
    }

    fn shared_db() -> (NamedTempFile, Arc<std::sync::Mutex<Connection>>) {
        let temp = NamedTempFile::new().unwrap();
        let conn = open_and_migrate(temp.path().to_str().unwrap()).unwrap();
        (temp, Arc::new(std::sync::Mutex::new(conn)))
    }

    #[tokio::test]
    async fn test_acquire_then_follower() {
        let (_t, conn) = shared_db();
        let a = coordinator(&conn, "alice");
        let b = coordinator(&conn, "bob");

        assert!(a.acquire().await.unwrap().is_master());
        let status = b.acquire().await.unwrap();
        assert_eq!(status.role, WatcherRole::Follower);
        assert_eq!(status.master_user.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_renew_without_lease_is_false() {
        let (_t, conn) = shared_db();
        let a = coordinator(&conn, "alice");
        assert!(!a.renew(None).await.unwrap());
        assert!(!a.release().await.unwrap());
    }

    #[tokio::test]
    async fn test_status_reconciles_after_takeover() {
        let (_t, conn) = shared_db();
        let a = coordinator(&conn, "alice");
        let b = coordinator(&conn, "bob");

        a.acquire().await.unwrap();
        b.force_acquire().await.unwrap();

        let status = a.status().unwrap();
        assert_eq!(status.role, WatcherRole::Follower);
        assert_eq!(a.held_generation(), None);
        assert!(!a.renew(None).await.unwrap());
    }
}
