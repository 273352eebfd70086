// ==========================================
// Voltech 采集系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod action_log_repo;
pub mod batch_repo;
pub mod error;
pub mod import_repo;
pub mod import_repo_impl;
pub mod lease_repo;
pub mod parse_error_repo;
pub mod part_repo;
pub mod sql_builder;
pub mod stats_repo;
pub mod test_result_repo;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use batch_repo::BatchRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use import_repo::{CommitSummary, FileCommit, ImportRepository};
pub use import_repo_impl::SqliteImportRepository;
pub use lease_repo::LeaseRepository;
pub use parse_error_repo::ParseErrorRepository;
pub use part_repo::PartRepository;
pub use stats_repo::StatsRepository;
pub use test_result_repo::TestResultRepository;
