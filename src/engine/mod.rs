// ==========================================
// Voltech 采集系统 - 引擎层
// ==========================================
// 职责: 主从仲裁、导入管道、监听服务、事件发布
// 红线: Engine 不拼 SQL，数据访问经 Repository
// ==========================================

pub mod events;
pub mod leadership;
pub mod pipeline;
pub mod watcher;

// 重导出核心引擎
pub use events::{
    BroadcastEventPublisher, NoOpEventPublisher, OptionalEventPublisher, WatcherEvent,
    WatcherEventPublisher,
};
pub use leadership::{LeadershipCoordinator, LeadershipError, LeaseConfig};
pub use pipeline::{
    ControlSignal, ImportPipeline, PipelineControl, PipelineError, RunOutcome, Unsupervised,
};
pub use watcher::{WatcherError, WatcherService};
