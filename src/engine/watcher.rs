// ==========================================
// Voltech 采集系统 - 监听服务
// ==========================================
// 状态机: Stopped -> Starting -> Running <-> Paused -> Stopping -> Stopped
//         任意活动状态 --ForceStop--> Stopped（失去租约 / 存储重试耗尽）
// 后台任务: tokio::select! { 控制通道, 心跳, 轮询 }
// 互斥: 监听轮询与批量导入共用 import_gate（轮询用 try_lock，不排队）
// ==========================================

use crate::config::permissions::PermissionChecker;
use crate::config::settings_manager::{ConfigError, SettingsManager, WatcherConfig};
use crate::domain::progress::{BatchProgress, ImportProgress, MaintenanceProgress, WatcherProgress};
use crate::domain::status::{ImportOutcome, WatcherStatus};
use crate::domain::types::{
    ImportMode, WatcherCommand, WatcherPhase, WatcherRole, MAX_LOOKBACK_DAYS,
};
use crate::engine::events::{OptionalEventPublisher, WatcherEvent};
use crate::engine::leadership::{LeadershipCoordinator, LeadershipError};
use crate::engine::pipeline::{
    ControlSignal, ImportPipeline, PipelineControl, PipelineError, PipelineResult, RunOutcome,
};
use crate::importer::file_scanner::{filter_by_date_range, filter_recent};
use crate::repository::error::RepositoryError;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum WatcherError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("租约错误: {0}")]
    Leadership(#[from] LeadershipError),

    #[error("导入失败: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("仓储错误: {0}")]
    Repository(#[from] RepositoryError),

    #[error("当前状态不允许该操作: {0}")]
    InvalidState(String),

    #[error("参数无效: {0}")]
    InvalidInput(String),
}

pub type WatcherResult<T> = Result<T, WatcherError>;

/// 用户期望的运行状态（控制通道内容）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DesiredState {
    Run,
    Pause,
    Stop,
}

/// 后台任务退出原因
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoopExit {
    Stopped,
    LeaseLost,
    Fatal(String),
}

/// 进程内运行时状态（status() 读取，无需访问数据库）
#[derive(Debug, Clone)]
struct WatcherRuntime {
    phase: WatcherPhase,
    is_paused: bool,
    // 因存储不可用而自动暂停（区别于用户暂停）
    store_paused: bool,
    retry_count: u32,
    last_error: Option<String>,
    last_progress: Option<WatcherProgress>,
}

impl Default for WatcherRuntime {
    fn default() -> Self {
        Self {
            phase: WatcherPhase::Stopped,
            is_paused: false,
            store_paused: false,
            retry_count: 0,
            last_error: None,
            last_progress: None,
        }
    }
}

// ==========================================
// WatcherService
// ==========================================
pub struct WatcherService {
    inner: Arc<WatcherInner>,
    task: AsyncMutex<Option<JoinHandle<()>>>,
}

struct WatcherInner {
    leadership: Arc<LeadershipCoordinator>,
    pipeline: Arc<ImportPipeline>,
    settings: Arc<SettingsManager>,
    permissions: Arc<PermissionChecker>,
    events: OptionalEventPublisher,
    config: WatcherConfig,
    runtime: RwLock<WatcherRuntime>,
    desired: watch::Sender<DesiredState>,
    // status() 发现租约已属他人时唤醒循环立即续约
    lease_check: Notify,
    import_gate: AsyncMutex<()>,
}

impl WatcherService {
    pub fn new(
        leadership: Arc<LeadershipCoordinator>,
        pipeline: Arc<ImportPipeline>,
        settings: Arc<SettingsManager>,
        permissions: Arc<PermissionChecker>,
        events: OptionalEventPublisher,
        config: WatcherConfig,
    ) -> Self {
        let (desired, _) = watch::channel(DesiredState::Stop);
        Self {
            inner: Arc::new(WatcherInner {
                leadership,
                pipeline,
                settings,
                permissions,
                events,
                config,
                runtime: RwLock::new(WatcherRuntime::default()),
                desired,
                lease_check: Notify::new(),
                import_gate: AsyncMutex::new(()),
            }),
            task: AsyncMutex::new(None),
        }
    }

    pub fn leadership(&self) -> &Arc<LeadershipCoordinator> {
        &self.inner.leadership
    }

    // ==========================================
    // 生命周期
    // ==========================================

    /// 启动监听
    ///
    /// - server_path 缺失/无效: Err(Configuration)，保持 Stopped
    /// - 租约被他人持有: Ok(status.role = follower)，保持 Stopped
    /// - 成为 master: 启动后台任务
    pub async fn start(&self) -> WatcherResult<WatcherStatus> {
        let mut task = self.task.lock().await;
        if task.as_ref().map_or(false, |h| h.is_finished()) {
            task.take();
        }
        let already_active = self.inner.read_runtime().phase.is_active();
        if already_active {
            debug!("监听已在运行");
            return self.status();
        }

        let root = self.inner.settings.validated_server_path()?;
        self.inner.transition(WatcherCommand::Start);

        let leadership = match self.inner.leadership.acquire().await {
            Ok(status) => status,
            Err(e) => {
                self.inner.transition(WatcherCommand::LeaderDenied);
                return Err(e.into());
            }
        };

        if !leadership.is_master() {
            self.inner.transition(WatcherCommand::LeaderDenied);
            info!(master_user = ?leadership.master_user, "以 follower 身份运行，不启动监听");
            return self.status();
        }

        {
            let mut rt = self.inner.write_runtime();
            rt.is_paused = false;
            rt.store_paused = false;
            rt.retry_count = 0;
            rt.last_error = None;
            rt.last_progress = None;
        }
        self.inner.transition(WatcherCommand::LeaderGranted);
        self.inner.desired.send_replace(DesiredState::Run);

        info!(root = %root.display(), "监听已启动");
        *task = Some(tokio::spawn(watch_loop(Arc::clone(&self.inner), root)));
        drop(task);
        self.status()
    }

    /// 停止监听：完成当前文件后退出并释放租约
    pub async fn stop(&self) -> WatcherResult<WatcherStatus> {
        let mut task = self.task.lock().await;

        let active = self.inner.read_runtime().phase.is_active();
        if active {
            self.inner.transition(WatcherCommand::Stop);
            self.inner.desired.send_replace(DesiredState::Stop);
        }

        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "监听后台任务异常退出");
                let mut rt = self.inner.write_runtime();
                rt.phase = WatcherPhase::Stopped;
                rt.last_error = Some(e.to_string());
            }
        }
        drop(task);
        self.status()
    }

    /// 暂停（协作式：当前文件完成后生效；心跳继续）
    pub async fn pause(&self) -> WatcherResult<WatcherStatus> {
        let phase = self.inner.read_runtime().phase;
        match phase {
            WatcherPhase::Running | WatcherPhase::Paused => {
                self.inner.transition(WatcherCommand::Pause);
                {
                    let mut rt = self.inner.write_runtime();
                    rt.is_paused = true;
                }
                if self.inner.desired.send_replace(DesiredState::Pause) != DesiredState::Pause {
                    self.inner.events.publish(WatcherEvent::WatcherPaused {
                        reason: "用户暂停".to_string(),
                    });
                    info!("监听已暂停");
                }
                self.status()
            }
            other => Err(WatcherError::InvalidState(format!(
                "监听未运行（{}），无法暂停",
                other
            ))),
        }
    }

    /// 恢复：立即重扫
    pub async fn resume(&self) -> WatcherResult<WatcherStatus> {
        let phase = self.inner.read_runtime().phase;
        match phase {
            WatcherPhase::Running | WatcherPhase::Paused => {
                self.inner.transition(WatcherCommand::Resume);
                {
                    let mut rt = self.inner.write_runtime();
                    rt.is_paused = false;
                    rt.store_paused = false;
                }
                if self.inner.desired.send_replace(DesiredState::Run) != DesiredState::Run {
                    self.inner.events.publish(WatcherEvent::WatcherResumed);
                    info!("监听已恢复");
                }
                self.status()
            }
            other => Err(WatcherError::InvalidState(format!(
                "监听未运行（{}），无法恢复",
                other
            ))),
        }
    }

    /// 强制接管 master 并启动监听（权限检查在 API 层）
    pub async fn force_acquire(&self) -> WatcherResult<WatcherStatus> {
        self.inner.settings.validated_server_path()?;
        self.inner.leadership.force_acquire().await?;
        self.start().await
    }

    /// 当前状态（以租约行为准校正角色）
    pub fn status(&self) -> WatcherResult<WatcherStatus> {
        let leadership = self.inner.leadership.status()?;
        let rt = self.inner.read_runtime().clone();

        let can_force_master = leadership.role == WatcherRole::Follower
            && self
                .inner
                .permissions
                .is_admin(self.inner.leadership.user_name())
                .unwrap_or_else(|e| {
                    warn!(error = %e, "权限检查失败，按无权限处理");
                    false
                });

        let master_progress = if leadership.role == WatcherRole::Master {
            rt.last_progress.clone()
        } else {
            leadership.master_progress.clone()
        };

        // 循环仍在运行但租约已不属于本实例：按已停止上报，循环随后以 LeaseLost 退出
        let revoked = leadership.role != WatcherRole::Master
            && matches!(rt.phase, WatcherPhase::Running | WatcherPhase::Paused);
        let (phase, is_paused) = if revoked {
            debug!(phase = %rt.phase, "租约已被接管，唤醒监听循环");
            self.inner.lease_check.notify_one();
            (WatcherPhase::Stopping, false)
        } else {
            (rt.phase, rt.is_paused)
        };

        Ok(WatcherStatus {
            role: leadership.role,
            master_user: leadership.master_user,
            is_active: !revoked && phase.is_active(),
            is_paused,
            can_force_master,
            retry_count: rt.retry_count,
            phase,
            last_error: rt.last_error,
            master_progress,
        })
    }

    // ==========================================
    // 批量操作（与监听轮询互斥）
    // ==========================================

    /// 按日期区间导入（日期取自文件名，缺失时取修改时间）
    pub async fn import_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> WatcherResult<ImportOutcome<BatchProgress>> {
        if start > end {
            return Err(WatcherError::InvalidInput(format!(
                "开始日期 {} 晚于结束日期 {}",
                start, end
            )));
        }
        let root = self.inner.settings.validated_server_path()?;

        let outcome = self
            .inner
            .run_bulk(&root, BulkJob::Range { start, end })
            .await?;

        Ok(map_outcome(outcome, |o| o.progress.as_batch()))
    }

    /// 维护重扫：最近 days 天内修改过的文件
    pub async fn maintenance_scan(
        &self,
        days: i64,
    ) -> WatcherResult<ImportOutcome<MaintenanceProgress>> {
        if days <= 0 || days > MAX_LOOKBACK_DAYS {
            return Err(WatcherError::InvalidInput(format!(
                "天数必须在 1..={} 之间: {}",
                MAX_LOOKBACK_DAYS, days
            )));
        }
        let root = self.inner.settings.validated_server_path()?;

        let outcome = self
            .inner
            .run_bulk(&root, BulkJob::Maintenance { days })
            .await?;

        Ok(map_outcome(outcome, |o| o.progress.as_maintenance()))
    }

    /// 全量历史导入（要求监听已停止）
    pub async fn full_import(&self) -> WatcherResult<ImportOutcome<BatchProgress>> {
        let active = self.inner.read_runtime().phase.is_active();
        if active {
            return Err(WatcherError::InvalidState(
                "全量导入前需先停止监听".to_string(),
            ));
        }
        let root = self.inner.settings.validated_server_path()?;

        let outcome = self.inner.run_bulk(&root, BulkJob::Full).await?;

        Ok(map_outcome(outcome, |o| o.progress.as_batch()))
    }
}

fn map_outcome<T>(
    outcome: ImportOutcome<RunOutcome>,
    view: impl FnOnce(&RunOutcome) -> T,
) -> ImportOutcome<T> {
    match outcome {
        ImportOutcome::Completed { result } => ImportOutcome::Completed {
            result: view(&result),
        },
        ImportOutcome::Follower { master_user } => ImportOutcome::Follower { master_user },
    }
}

// ==========================================
// WatcherInner
// ==========================================
impl WatcherInner {
    fn read_runtime(&self) -> RwLockReadGuard<'_, WatcherRuntime> {
        match self.runtime.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_runtime(&self) -> RwLockWriteGuard<'_, WatcherRuntime> {
        match self.runtime.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn desired(&self) -> DesiredState {
        *self.desired.borrow()
    }

    /// 应用状态机转换；非法转换忽略
    fn transition(&self, cmd: WatcherCommand) -> WatcherPhase {
        let mut rt = self.write_runtime();
        match rt.phase.apply(cmd) {
            Some(next) => {
                debug!(from = %rt.phase, to = %next, ?cmd, "监听状态转换");
                rt.phase = next;
            }
            None => debug!(phase = %rt.phase, ?cmd, "忽略非法状态转换"),
        }
        rt.phase
    }

    fn last_progress(&self) -> Option<WatcherProgress> {
        self.read_runtime().last_progress.clone()
    }

    fn set_last_error(&self, message: String) {
        self.write_runtime().last_error = Some(message);
    }


    // ==========================================
    // 批量操作
    // ==========================================

    /// 持有 import_gate；监听未以 master 运行时临时占用租约，结束后释放
    async fn run_bulk(&self, root: &Path, job: BulkJob) -> WatcherResult<ImportOutcome<RunOutcome>> {
        let _gate = self.import_gate.lock().await;

        let watcher_active = self.read_runtime().phase.is_active();
        let watcher_holds = watcher_active && self.leadership.held_generation().is_some();
        let temporary = if watcher_holds {
            false
        } else {
            let status = self.leadership.acquire().await?;
            if !status.is_master() {
                info!(master_user = ?status.master_user, mode = job.mode().as_str(), "非 master，批量导入交由 master 执行");
                return Ok(ImportOutcome::Follower {
                    master_user: status.master_user,
                });
            }
            true
        };

        let control = RunControl::bulk(self, job.mode());
        let result = match job {
            BulkJob::Range { start, end } => self.run_range(root, start, end, &control).await,
            BulkJob::Maintenance { days } => self.run_maintenance(root, days, &control).await,
            BulkJob::Full => self.run_full(root, &control).await,
        };

        let watcher_active = self.read_runtime().phase.is_active();
        if temporary && !watcher_active {
            if let Err(e) = self.leadership.release().await {
                warn!(error = %e, "释放临时租约失败（将自然过期）");
            }
        }

        if control.lease_lost() {
            let master_user = self.leadership.status().ok().and_then(|s| s.master_user);
            warn!(mode = job.mode().as_str(), "批量导入期间失去 master 租约");
            return Ok(ImportOutcome::Follower { master_user });
        }

        Ok(ImportOutcome::Completed { result: result? })
    }

    async fn run_range(
        &self,
        root: &Path,
        start: NaiveDate,
        end: NaiveDate,
        control: &RunControl<'_>,
    ) -> PipelineResult<RunOutcome> {
        let files = filter_by_date_range(self.pipeline.list_files(root).await?, start, end);
        info!(%start, %end, files = files.len(), "区间导入开始");
        self.pipeline.run(files, ImportMode::Range, control).await
    }

    async fn run_full(&self, root: &Path, control: &RunControl<'_>) -> PipelineResult<RunOutcome> {
        let files = self.pipeline.list_files(root).await?;
        info!(files = files.len(), "全量导入开始");
        self.pipeline.run(files, ImportMode::Full, control).await
    }

    /// 维护重扫：最近 days 天修改过的文件；完整跑完才更新 last_monthly_scan
    async fn run_maintenance(
        &self,
        root: &Path,
        days: i64,
        control: &RunControl<'_>,
    ) -> PipelineResult<RunOutcome> {
        self.events.publish(WatcherEvent::MaintenanceStart { days });

        let files = self.pipeline.list_files(root).await?;
        let recent = filter_recent(files, days, Utc::now());
        info!(days, files = recent.len(), "维护重扫开始");

        let outcome = self
            .pipeline
            .run(recent, ImportMode::Maintenance, control)
            .await?;

        if outcome.interrupted.is_none() {
            if let Err(e) = self.settings.set_last_monthly_scan(Utc::now()) {
                warn!(error = %e, "记录维护时间失败");
            }
        }
        self.events.publish(WatcherEvent::MaintenanceComplete(
            outcome.progress.as_maintenance(),
        ));
        Ok(outcome)
    }

    // ==========================================
    // 监听循环
    // ==========================================

    /// 一轮轮询：续约 -> 发现 -> 导入 -> 到期则维护
    async fn poll_once(&self, root: &Path) -> Option<LoopExit> {
        let Ok(_gate) = self.import_gate.try_lock() else {
            debug!("批量导入进行中，跳过本轮轮询");
            return None;
        };

        match self.leadership.renew(self.last_progress().as_ref()).await {
            Ok(true) => {}
            Ok(false) => return Some(LoopExit::LeaseLost),
            Err(e) => warn!(error = %e, "轮询前续约失败"),
        }

        let pending = match self.pipeline.discover_pending(root).await {
            Ok(pending) => pending,
            Err(e) => return self.discovery_failed(e),
        };

        if !pending.is_empty() {
            info!(files = pending.len(), "发现新增或变化的文件");
            let control = RunControl::supervised(self, ImportMode::Watch);
            let result = self.pipeline.run(pending, ImportMode::Watch, &control).await;
            if let Ok(outcome) = &result {
                self.events
                    .publish(WatcherEvent::BatchProgress(outcome.progress.as_batch()));
            }
            if let Some(exit) = self.classify(result, &control) {
                return Some(exit);
            }
        }

        self.maybe_weekly_maintenance(root).await
    }

    async fn maybe_weekly_maintenance(&self, root: &Path) -> Option<LoopExit> {
        if self.desired() != DesiredState::Run {
            return None;
        }

        let due = match self.settings.last_monthly_scan() {
            Ok(None) => true,
            Ok(Some(last)) => {
                let interval = chrono::Duration::try_days(self.config.maintenance_interval_days);
                interval.map_or(false, |i| Utc::now() - last >= i)
            }
            Err(e) => {
                warn!(error = %e, "读取上次维护时间失败，跳过本轮维护");
                false
            }
        };
        if !due {
            return None;
        }

        let control = RunControl::supervised(self, ImportMode::Maintenance);
        let result = self
            .run_maintenance(root, self.config.maintenance_days, &control)
            .await;
        self.classify(result, &control)
    }

    fn discovery_failed(&self, e: PipelineError) -> Option<LoopExit> {
        match e {
            PipelineError::Repository(ref re) if re.is_unavailable() => {
                warn!(error = %e, "存储暂不可用，下一轮轮询重试");
                self.set_last_error(e.to_string());
                None
            }
            PipelineError::Scan(_) => {
                warn!(error = %e, "源目录扫描失败，下一轮轮询重试");
                self.set_last_error(e.to_string());
                None
            }
            other => {
                error!(error = %other, "发现阶段出现不可恢复错误");
                Some(LoopExit::Fatal(other.to_string()))
            }
        }
    }

    /// 把一次运行的结果映射为循环是否需要退出
    fn classify(
        &self,
        result: PipelineResult<RunOutcome>,
        control: &RunControl<'_>,
    ) -> Option<LoopExit> {
        if control.lease_lost() {
            return Some(LoopExit::LeaseLost);
        }
        match result {
            Ok(outcome) => {
                if outcome.interrupted.is_some() && self.desired() == DesiredState::Stop {
                    Some(LoopExit::Stopped)
                } else {
                    None
                }
            }
            Err(PipelineError::Scan(e)) => {
                warn!(error = %e, "源目录扫描失败，下一轮轮询重试");
                self.set_last_error(e.to_string());
                None
            }
            Err(e) => {
                error!(error = %e, "导入出现不可恢复错误，停止监听");
                Some(LoopExit::Fatal(e.to_string()))
            }
        }
    }

    /// 后台任务退出：释放租约（失去租约时不释放）、落定状态、通知前端
    async fn finish(&self, exit: LoopExit) {
        let reason = match &exit {
            LoopExit::Stopped => None,
            LoopExit::LeaseLost => Some("master 租约已被其他实例接管".to_string()),
            LoopExit::Fatal(message) => Some(message.clone()),
        };

        if exit != LoopExit::LeaseLost {
            if let Err(e) = self.leadership.release().await {
                warn!(error = %e, "释放租约失败（将自然过期）");
            }
        }

        {
            let mut rt = self.write_runtime();
            let cmd = if exit == LoopExit::Stopped {
                WatcherCommand::Halted
            } else {
                WatcherCommand::ForceStop
            };
            let current = rt.phase;
            rt.phase = current
                .apply(cmd)
                .or_else(|| current.apply(WatcherCommand::ForceStop))
                .unwrap_or(WatcherPhase::Stopped);
            rt.is_paused = false;
            rt.store_paused = false;
            if let Some(r) = &reason {
                rt.last_error = Some(r.clone());
            }
        }
        self.desired.send_replace(DesiredState::Stop);

        match &reason {
            None => info!("监听已停止"),
            Some(r) => error!(reason = %r, "监听被强制停止"),
        }
        self.events.publish(WatcherEvent::WatcherStopped { reason });
    }
}

async fn watch_loop(inner: Arc<WatcherInner>, root: PathBuf) {
    let mut desired_rx = inner.desired.subscribe();
    desired_rx.borrow_and_update();

    let mut heartbeat = tokio::time::interval(inner.config.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    // 首个 tick 立即触发，即启动后马上扫描一次
    let mut poll = tokio::time::interval(inner.config.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            changed = desired_rx.changed() => {
                if changed.is_err() {
                    break LoopExit::Stopped;
                }
                let desired = *desired_rx.borrow_and_update();
                match desired {
                    DesiredState::Stop => break LoopExit::Stopped,
                    DesiredState::Run => {
                        debug!("恢复后立即重扫");
                        if let Some(exit) = inner.poll_once(&root).await {
                            break exit;
                        }
                    }
                    DesiredState::Pause => {}
                }
            }
            _ = inner.lease_check.notified() => {
                debug!("租约对账");
                match inner.leadership.renew(inner.last_progress().as_ref()).await {
                    Ok(true) => {}
                    Ok(false) => break LoopExit::LeaseLost,
                    Err(e) => warn!(error = %e, "对账续约失败，下次重试"),
                }
            }
            _ = heartbeat.tick() => {
                let progress = inner.last_progress();
                match inner.leadership.renew(progress.as_ref()).await {
                    Ok(true) => {}
                    Ok(false) => break LoopExit::LeaseLost,
                    Err(e) => warn!(error = %e, "心跳续约失败，下次重试"),
                }
            }
            _ = poll.tick() => {
                if inner.desired() == DesiredState::Run {
                    if let Some(exit) = inner.poll_once(&root).await {
                        break exit;
                    }
                }
            }
        }
    };

    inner.finish(exit).await;
}

/// 批量操作类型
#[derive(Debug, Clone, Copy)]
enum BulkJob {
    Range { start: NaiveDate, end: NaiveDate },
    Maintenance { days: i64 },
    Full,
}

impl BulkJob {
    fn mode(self) -> ImportMode {
        match self {
            BulkJob::Range { .. } => ImportMode::Range,
            BulkJob::Maintenance { .. } => ImportMode::Maintenance,
            BulkJob::Full => ImportMode::Full,
        }
    }
}

// ==========================================
// RunControl - 管道控制实现
// ==========================================
struct RunControl<'a> {
    inner: &'a WatcherInner,
    mode: ImportMode,
    // 监听循环内运行：响应暂停/停止，存储故障时自动暂停
    supervised: bool,
    lease_lost: AtomicBool,
}

impl<'a> RunControl<'a> {
    fn supervised(inner: &'a WatcherInner, mode: ImportMode) -> Self {
        Self {
            inner,
            mode,
            supervised: true,
            lease_lost: AtomicBool::new(false),
        }
    }

    fn bulk(inner: &'a WatcherInner, mode: ImportMode) -> Self {
        Self {
            inner,
            mode,
            supervised: false,
            lease_lost: AtomicBool::new(false),
        }
    }

    fn lease_lost(&self) -> bool {
        self.lease_lost.load(Ordering::SeqCst)
    }

    /// 续约；返回 false 表示租约已丢失
    async fn renew(&self, progress: Option<&WatcherProgress>) -> bool {
        match self.inner.leadership.renew(progress).await {
            Ok(true) => true,
            Ok(false) => {
                self.lease_lost.store(true, Ordering::SeqCst);
                false
            }
            Err(e) => {
                warn!(error = %e, "文件边界续约失败，继续处理");
                true
            }
        }
    }

    /// 退避等待：期间保持心跳，失去租约时提前返回 false
    ///
    /// 监听循环内还会响应停止请求；批量导入不受监听的期望状态影响
    async fn wait_backoff(&self, delay: Duration) -> bool {
        let mut rx = self.inner.desired.subscribe();
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        let mut heartbeat = tokio::time::interval(self.inner.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        loop {
            let desired = *rx.borrow_and_update();
            if self.supervised && desired == DesiredState::Stop {
                return false;
            }
            tokio::select! {
                _ = &mut sleep => return true,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = heartbeat.tick() => {
                    let progress = self.inner.last_progress();
                    if !self.renew(progress.as_ref()).await {
                        return false;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl<'a> PipelineControl for RunControl<'a> {
    async fn checkpoint(&self, progress: &ImportProgress) -> ControlSignal {
        if self.supervised {
            match self.inner.desired() {
                DesiredState::Stop => return ControlSignal::Interrupt("收到停止请求".to_string()),
                DesiredState::Pause => return ControlSignal::Interrupt("监听已暂停".to_string()),
                DesiredState::Run => {}
            }
        }
        let snapshot = progress.as_watcher();
        if !self.renew(Some(&snapshot)).await {
            return ControlSignal::Interrupt("master 租约已丢失".to_string());
        }
        ControlSignal::Continue
    }

    fn progress(&self, progress: &ImportProgress) {
        let snapshot = progress.as_watcher();
        self.inner.write_runtime().last_progress = Some(snapshot.clone());

        let event = match self.mode {
            ImportMode::Watch => WatcherEvent::WatcherProgress(snapshot),
            ImportMode::Range | ImportMode::Full => {
                WatcherEvent::BatchProgress(progress.as_batch())
            }
            ImportMode::Maintenance => WatcherEvent::MaintenanceProgress(progress.as_maintenance()),
        };
        self.inner.events.publish(event);
    }

    async fn store_unavailable(&self, attempt: u32, delay: Duration, error: &RepositoryError) -> bool {
        if !self.supervised {
            self.inner.write_runtime().retry_count = attempt;
            return self.wait_backoff(delay).await;
        }

        let reason = format!(
            "存储不可用（第 {} 次重试，{} 秒后）: {}",
            attempt,
            delay.as_secs(),
            error
        );
        let newly_paused = {
            let mut rt = self.inner.write_runtime();
            rt.retry_count = attempt;
            rt.last_error = Some(reason.clone());
            let was_paused = rt.is_paused;
            rt.is_paused = true;
            rt.store_paused = true;
            let current = rt.phase;
            rt.phase = current.apply(WatcherCommand::Pause).unwrap_or(current);
            !was_paused
        };
        if newly_paused {
            self.inner
                .events
                .publish(WatcherEvent::WatcherPaused { reason });
        }

        self.wait_backoff(delay).await
    }

    fn store_recovered(&self) {
        if !self.supervised {
            self.inner.write_runtime().retry_count = 0;
            return;
        }
        let user_wants_run = self.inner.desired() == DesiredState::Run;
        let resumed = {
            let mut rt = self.inner.write_runtime();
            rt.retry_count = 0;
            rt.last_error = None;
            if rt.store_paused {
                rt.store_paused = false;
                if user_wants_run {
                    rt.is_paused = false;
                    let current = rt.phase;
                    rt.phase = current.apply(WatcherCommand::Resume).unwrap_or(current);
                }
                user_wants_run
            } else {
                false
            }
        };
        if resumed {
            info!("存储已恢复，监听继续");
            self.inner.events.publish(WatcherEvent::WatcherResumed);
        }
    }
}
