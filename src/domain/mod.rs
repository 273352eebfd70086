// ==========================================
// Voltech 采集系统 - 领域模型层
// ==========================================
// 职责: 定义实体、视图、状态机
// 红线: 不含数据访问逻辑，不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod lease;
pub mod parse_error;
pub mod progress;
pub mod query;
pub mod status;
pub mod test_result;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use lease::{ProcessedFile, WatcherLease};
pub use parse_error::{ErrorCounts, ErrorFilter, NewParseError, ParseError};
pub use progress::{
    BatchProgress, ImportProgress, MaintenanceProgress, UnitOutcome, WatcherProgress,
};
pub use query::{
    BatchListItem, BatchSearchFilter, BatchSummary, BatchTestGroup, DailyStats, DateBounds,
    OperatorStats, OverallStats, PartDateStats, PartListItem, PartSummary, RecentActivity,
    SerialNumberInfo, TestSearchFilter, TopFailedPart, TrendData,
};
pub use status::{ImportOutcome, LeadershipStatus, WatcherStatus};
pub use test_result::{TestRecord, TestResult};
pub use types::{ImportMode, ProcessedStatus, WatcherCommand, WatcherPhase, WatcherRole};
