// ==========================================
// Voltech 采集系统 - 导入 Repository Trait
// ==========================================
// 职责: 定义导入管道所需的数据访问接口（不包含业务逻辑）
// 红线: 一个文件 = 一个事务；多文件之间互不回滚
// ==========================================

use crate::domain::lease::ProcessedFile;
use crate::domain::parse_error::NewParseError;
use crate::domain::test_result::TestRecord;
use crate::domain::types::ProcessedStatus;
use crate::repository::error::RepositoryResult;
use std::collections::HashMap;

/// 单个文件的提交内容
#[derive(Debug, Clone)]
pub struct FileCommit<'a> {
    pub file_path: &'a str,
    pub file_size: i64,
    pub file_modified: i64,
    pub records: &'a [TestRecord],
    pub errors: &'a [NewParseError],
    pub status: ProcessedStatus,
}

/// 单个文件的提交结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub records_added: usize,
    pub errors_appended: usize,
}

// ==========================================
// ImportRepository Trait
// ==========================================
// 实现者: SqliteImportRepository（rusqlite）
// 调用方在 spawn_blocking 中调用，接口保持同步
pub trait ImportRepository: Send + Sync {
    /// 查询文件处理记录
    fn get_processed(&self, file_path: &str) -> RepositoryResult<Option<ProcessedFile>>;

    /// 全部文件处理记录：file_path -> (file_size, file_modified)
    fn processed_index(&self) -> RepositoryResult<HashMap<String, (i64, i64)>>;

    /// 在一个事务内写入：测试记录（重复忽略）+ 台账 + processed_files
    fn commit_file(&self, commit: &FileCommit<'_>) -> RepositoryResult<CommitSummary>;

    /// 大小或修改时间变化才需要处理
    fn needs_processing(
        &self,
        file_path: &str,
        file_size: i64,
        file_modified: i64,
    ) -> RepositoryResult<bool> {
        Ok(match self.get_processed(file_path)? {
            Some(pf) => !pf.is_unchanged(file_size, file_modified),
            None => true,
        })
    }
}
