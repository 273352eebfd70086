// ==========================================
// Voltech 采集系统 - 导入管道
// ==========================================
// 单元: 一个文件 = 元数据 -> 变更检测 -> 解析 -> 单事务提交
// 取消点: 只在文件边界（绝不在记录中途）
// 存储不可用: 同一文件按退避表重试，超过上限视为致命
// 三种入口（监听 / 区间 / 维护）共用同一个 run()
// ==========================================

use crate::config::settings_manager::WatcherConfig;
use crate::domain::parse_error::NewParseError;
use crate::domain::progress::{ImportProgress, UnitOutcome};
use crate::domain::types::{ImportMode, ProcessedStatus};
use crate::importer::error::ImportError;
use crate::importer::file_scanner::{unix_seconds, FileScanner, ScannedFile};
use crate::importer::parser_trait::FileParser;
use crate::perf::PerfGuard;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_repo::{FileCommit, ImportRepository};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("存储持续不可用，已重试 {attempts} 次: {source}")]
    StoreExhausted {
        attempts: u32,
        source: RepositoryError,
    },

    #[error("存储错误: {0}")]
    Repository(#[from] RepositoryError),

    #[error("扫描失败: {0}")]
    Scan(#[from] ImportError),

    #[error("后台任务失败: {0}")]
    Join(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// 文件边界检查点的决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlSignal {
    Continue,
    Interrupt(String),
}

/// 单个文件的处理结果（含重试）
enum UnitAttempt {
    Done(UnitOutcome),
    Interrupted(String),
}

/// 一次运行的结果
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub progress: ImportProgress,
    /// 被暂停/停止/失去租约打断时的原因
    pub interrupted: Option<String>,
}

// ==========================================
// PipelineControl Trait
// ==========================================
// 实现者: 监听循环（watcher）、批量导入（bulk）
#[async_trait]
pub trait PipelineControl: Send + Sync {
    /// 文件边界检查点（续约、检查暂停/停止）
    async fn checkpoint(&self, _progress: &ImportProgress) -> ControlSignal {
        ControlSignal::Continue
    }

    /// 进度快照
    fn progress(&self, _progress: &ImportProgress) {}

    /// 存储不可用：等待 delay 后返回 true 继续重试；返回 false 放弃本次运行
    async fn store_unavailable(
        &self,
        _attempt: u32,
        delay: Duration,
        _error: &RepositoryError,
    ) -> bool {
        tokio::time::sleep(delay).await;
        true
    }

    /// 重试后恢复
    fn store_recovered(&self) {}
}

/// 不做任何控制（测试、一次性导入）
pub struct Unsupervised;

#[async_trait]
impl PipelineControl for Unsupervised {}

// ==========================================
// ImportPipeline
// ==========================================
pub struct ImportPipeline {
    import_repo: Arc<dyn ImportRepository>,
    parser: Arc<dyn FileParser>,
    scanner: Arc<FileScanner>,
    config: WatcherConfig,
}

impl ImportPipeline {
    pub fn new(
        import_repo: Arc<dyn ImportRepository>,
        parser: Arc<dyn FileParser>,
        scanner: Arc<FileScanner>,
        config: WatcherConfig,
    ) -> Self {
        Self {
            import_repo,
            parser,
            scanner,
            config,
        }
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// 递归列出源目录下全部 Voltech 文件
    pub async fn list_files(&self, root: &Path) -> PipelineResult<Vec<ScannedFile>> {
        let scanner = Arc::clone(&self.scanner);
        let root: PathBuf = root.to_path_buf();
        let files = tokio::task::spawn_blocking(move || scanner.list_files(&root))
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))??;
        Ok(files)
    }

    /// 读取 processed_files 索引
    pub async fn processed_index(&self) -> PipelineResult<HashMap<String, (i64, i64)>> {
        let repo = Arc::clone(&self.import_repo);
        let index = tokio::task::spawn_blocking(move || repo.processed_index())
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))??;
        Ok(index)
    }

    /// 源目录中未处理或已变化的文件
    pub async fn discover_pending(&self, root: &Path) -> PipelineResult<Vec<ScannedFile>> {
        let files = self.list_files(root).await?;
        let index = self.processed_index().await?;
        let pending = filter_pending(files, &index);
        debug!(pending = pending.len(), "待处理文件");
        Ok(pending)
    }

    /// 依次处理文件，在每个文件边界咨询 control
    pub async fn run(
        &self,
        files: Vec<ScannedFile>,
        mode: ImportMode,
        control: &dyn PipelineControl,
    ) -> PipelineResult<RunOutcome> {
        let mut progress = ImportProgress::new(mode, files.len());
        control.progress(&progress);

        for file in files {
            if let ControlSignal::Interrupt(reason) = control.checkpoint(&progress).await {
                info!(mode = mode.as_str(), reason = %reason, "导入在文件边界处中断");
                progress.finish();
                return Ok(RunOutcome {
                    progress,
                    interrupted: Some(reason),
                });
            }

            progress.begin_file(&file.path_str());
            let outcome = match self.process_with_retry(&file, &progress, control).await? {
                UnitAttempt::Done(outcome) => outcome,
                UnitAttempt::Interrupted(reason) => {
                    info!(mode = mode.as_str(), reason = %reason, "存储重试期间中断");
                    progress.finish();
                    return Ok(RunOutcome {
                        progress,
                        interrupted: Some(reason),
                    });
                }
            };

            progress.record_unit(&outcome);
            if outcome != UnitOutcome::Unchanged {
                control.progress(&progress);
            }
        }

        progress.finish();
        control.progress(&progress);
        info!(
            mode = mode.as_str(),
            files_checked = progress.files_checked,
            processed_files = progress.processed_files,
            records_added = progress.records_added,
            error_count = progress.error_count,
            "导入运行完成"
        );
        Ok(RunOutcome {
            progress,
            interrupted: None,
        })
    }

    /// 处理单个文件；存储不可用时按退避表重试同一文件
    ///
    /// 每次重试前再过一次检查点（续约、暂停/停止），失去租约后不再写入
    async fn process_with_retry(
        &self,
        file: &ScannedFile,
        progress: &ImportProgress,
        control: &dyn PipelineControl,
    ) -> PipelineResult<UnitAttempt> {
        let mut attempt: u32 = 0;

        loop {
            let repo = Arc::clone(&self.import_repo);
            let parser = Arc::clone(&self.parser);
            let unit_file = file.clone();
            let result = tokio::task::spawn_blocking(move || {
                process_unit(repo.as_ref(), parser.as_ref(), &unit_file)
            })
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))?;

            match result {
                Ok(outcome) => {
                    if attempt > 0 {
                        info!(file = %file.path.display(), attempt, "存储已恢复");
                        control.store_recovered();
                    }
                    return Ok(UnitAttempt::Done(outcome));
                }
                Err(e) if e.is_unavailable() => {
                    attempt += 1;
                    if attempt > self.config.max_store_retries {
                        error!(
                            file = %file.path.display(),
                            attempts = self.config.max_store_retries,
                            error = %e,
                            "存储重试耗尽"
                        );
                        return Err(PipelineError::StoreExhausted {
                            attempts: self.config.max_store_retries,
                            source: e,
                        });
                    }

                    let delay = self.config.retry_delay(attempt);
                    warn!(
                        file = %file.path.display(),
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "存储不可用，稍后重试同一文件"
                    );
                    if !control.store_unavailable(attempt, delay, &e).await {
                        return Ok(UnitAttempt::Interrupted(
                            "存储重试期间收到停止请求".to_string(),
                        ));
                    }
                    if let ControlSignal::Interrupt(reason) = control.checkpoint(progress).await {
                        return Ok(UnitAttempt::Interrupted(reason));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// 去掉大小与修改时间都未变化的文件
pub fn filter_pending(
    files: Vec<ScannedFile>,
    index: &HashMap<String, (i64, i64)>,
) -> Vec<ScannedFile> {
    files
        .into_iter()
        .filter(|f| index.get(&f.path_str()) != Some(&(f.size, f.modified)))
        .collect()
}

/// 单个文件单元（阻塞，运行在 spawn_blocking 中）
///
/// 解析失败是“文件级错误”：追加 1 条台账并标记 status=error，
/// 返回 Ok(FileFailed)；只有存储错误才返回 Err
pub fn process_unit(
    repo: &dyn ImportRepository,
    parser: &dyn FileParser,
    file: &ScannedFile,
) -> RepositoryResult<UnitOutcome> {
    let _perf = PerfGuard::new("import_unit");
    let path = file.path_str();

    // 扫描后文件可能又被仪器追加，重新取元数据
    let (size, modified) = match std::fs::metadata(&file.path) {
        Ok(meta) => (meta.len() as i64, unix_seconds(&meta)),
        Err(_) => (file.size, file.modified),
    };

    if !repo.needs_processing(&path, size, modified)? {
        debug!(file = %path, "文件未变化，跳过");
        return Ok(UnitOutcome::Unchanged);
    }

    match parser.parse_file(&file.path) {
        Ok(parsed) => {
            let errors: Vec<NewParseError> = parsed
                .errors
                .iter()
                .map(|e| NewParseError::at_line(path.as_str(), e.line_number, e.message.as_str()))
                .collect();

            let summary = repo.commit_file(&FileCommit {
                file_path: &path,
                file_size: size,
                file_modified: modified,
                records: &parsed.records,
                errors: &errors,
                status: ProcessedStatus::Ok,
            })?;

            debug!(
                file = %path,
                parsed = parsed.records.len(),
                added = summary.records_added,
                record_errors = summary.errors_appended,
                "文件已导入"
            );

            Ok(UnitOutcome::Imported {
                records_parsed: parsed.records.len(),
                records_added: summary.records_added,
                record_errors: summary.errors_appended,
                first_error: parsed
                    .errors
                    .first()
                    .map(|e| format!("{}:{}: {}", path, e.line_number, e.message)),
            })
        }
        Err(e) => {
            let message = e.to_string();
            warn!(file = %path, error = %message, "文件级解析失败");

            let errors = [NewParseError::file_level(path.as_str(), message.as_str())];
            repo.commit_file(&FileCommit {
                file_path: &path,
                file_size: size,
                file_modified: modified,
                records: &[],
                errors: &errors,
                status: ProcessedStatus::Error,
            })?;

            Ok(UnitOutcome::FileFailed {
                message: format!("{}: {}", path, message),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanned(path: &str, size: i64, modified: i64) -> ScannedFile {
        ScannedFile {
            path: PathBuf::from(path),
            size,
            modified,
            name_date: None,
        }
    }

    #[test]
    fn test_filter_pending() {
        let mut index = HashMap::new();
        index.insert("/src/C1111925.atr".to_string(), (100, 10));
        index.insert("/src/C1112025.atr".to_string(), (100, 10));

        let files = vec![
            scanned("/src/C1111925.atr", 100, 10), // 未变化
            scanned("/src/C1112025.atr", 120, 11), // 已追加
            scanned("/src/C1112125.atr", 50, 12),  // 新文件
        ];
        let pending = filter_pending(files, &index);
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|f| f.path_str() != "/src/C1111925.atr"));
    }
}
