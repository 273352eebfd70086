// ==========================================
// Voltech 采集系统 - 导入进度模型
// ==========================================
// 一个内部累加器 ImportProgress，三种对外视图：
// - WatcherProgress      持续监听
// - BatchProgress        日期区间 / 全量导入
// - MaintenanceProgress  维护重扫
// 快照语义：后到覆盖先到，订阅方只关心最新值
// ==========================================

use crate::domain::types::ImportMode;
use serde::{Deserialize, Serialize};

/// 单次运行内最多保留的错误摘要条数
pub const MAX_ERROR_SUMMARIES: usize = 50;

// ==========================================
// ImportProgress - 内部累加器
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportProgress {
    pub mode: ImportMode,
    pub total_files: usize,     // 本次运行的候选文件数
    pub files_checked: usize,   // 已访问（含未变更跳过）
    pub processed_files: usize, // 实际处理并提交（成功或文件级失败）
    pub files_updated: usize,   // 新增了记录的文件
    pub records_added: usize,   // 实际插入的行（重复行不计）
    pub error_count: usize,     // 追加到台账的条数
    pub current_file: Option<String>,
    pub errors: Vec<String>, // 错误摘要（截断）
}

impl ImportProgress {
    pub fn new(mode: ImportMode, total_files: usize) -> Self {
        Self {
            mode,
            total_files,
            files_checked: 0,
            processed_files: 0,
            files_updated: 0,
            records_added: 0,
            error_count: 0,
            current_file: None,
            errors: Vec::new(),
        }
    }

    /// 开始处理某个文件
    pub fn begin_file(&mut self, file_path: &str) {
        self.current_file = Some(file_path.to_string());
    }

    /// 合并单个文件单元的结果
    pub fn record_unit(&mut self, unit: &UnitOutcome) {
        self.files_checked += 1;
        match unit {
            UnitOutcome::Unchanged => {}
            UnitOutcome::Imported {
                records_added,
                record_errors,
                first_error,
                ..
            } => {
                self.processed_files += 1;
                self.records_added += records_added;
                self.error_count += record_errors;
                if *records_added > 0 {
                    self.files_updated += 1;
                }
                if let Some(msg) = first_error {
                    self.push_error(msg.clone());
                }
            }
            UnitOutcome::FileFailed { message } => {
                self.processed_files += 1;
                self.error_count += 1;
                self.push_error(message.clone());
            }
        }
    }

    pub fn push_error(&mut self, message: String) {
        if self.errors.len() < MAX_ERROR_SUMMARIES {
            self.errors.push(message);
        }
    }

    pub fn finish(&mut self) {
        self.current_file = None;
    }

    pub fn as_watcher(&self) -> WatcherProgress {
        WatcherProgress {
            total_files: self.total_files,
            processed_files: self.processed_files,
            total_records: self.records_added,
            error_count: self.error_count,
            current_file: self.current_file.clone(),
        }
    }

    pub fn as_batch(&self) -> BatchProgress {
        BatchProgress {
            files_processed: self.processed_files,
            records_inserted: self.records_added,
            errors: self.errors.clone(),
        }
    }

    pub fn as_maintenance(&self) -> MaintenanceProgress {
        MaintenanceProgress {
            files_checked: self.files_checked,
            files_updated: self.files_updated,
            records_added: self.records_added,
        }
    }
}

// ==========================================
// UnitOutcome - 单个文件单元的结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// 大小与修改时间均未变化
    Unchanged,
    /// 已解析并提交（可能含记录级错误）
    Imported {
        records_parsed: usize,
        records_added: usize,
        record_errors: usize,
        first_error: Option<String>,
    },
    /// 文件级失败，已追加 1 条台账并标记为 error
    FileFailed { message: String },
}

// ==========================================
// 对外视图
// ==========================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherProgress {
    pub total_files: usize,
    pub processed_files: usize,
    pub total_records: usize,
    pub error_count: usize,
    pub current_file: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub files_processed: usize,
    pub records_inserted: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceProgress {
    pub files_checked: usize,
    pub files_updated: usize,
    pub records_added: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_views_share_one_accumulator() {
        let mut p = ImportProgress::new(ImportMode::Maintenance, 3);
        p.begin_file("a.atr");
        p.record_unit(&UnitOutcome::Imported {
            records_parsed: 5,
            records_added: 5,
            record_errors: 0,
            first_error: None,
        });
        p.record_unit(&UnitOutcome::Unchanged);
        p.record_unit(&UnitOutcome::FileFailed {
            message: "b.atr: 非 UTF-8 文本".to_string(),
        });
        p.finish();

        let w = p.as_watcher();
        assert_eq!(w.total_files, 3);
        assert_eq!(w.processed_files, 2);
        assert_eq!(w.total_records, 5);
        assert_eq!(w.error_count, 1);
        assert_eq!(w.current_file, None);

        let m = p.as_maintenance();
        assert_eq!(m.files_checked, 3);
        assert_eq!(m.files_updated, 1);
        assert_eq!(m.records_added, 5);

        let b = p.as_batch();
        assert_eq!(b.files_processed, 2);
        assert_eq!(b.errors.len(), 1);
    }

    #[test]
    fn test_error_summaries_are_capped() {
        let mut p = ImportProgress::new(ImportMode::Full, 0);
        for i in 0..(MAX_ERROR_SUMMARIES + 10) {
            p.record_unit(&UnitOutcome::FileFailed {
                message: format!("f{}", i),
            });
        }
        assert_eq!(p.errors.len(), MAX_ERROR_SUMMARIES);
        assert_eq!(p.error_count, MAX_ERROR_SUMMARIES + 10);
    }
}
