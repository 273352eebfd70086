// ==========================================
// Voltech 采集系统 - 源目录扫描
// ==========================================
// 文件名模式: C#MMDDYY.atr（# 为仪器编号 0-9）
// 扫描方式: 递归遍历，结果按路径排序
// ==========================================

use crate::domain::types::days_before;
use crate::importer::error::{ImportError, ImportResult};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::warn;

/// 扫描到的文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub size: i64,
    /// 修改时间（Unix 秒）
    pub modified: i64,
    /// 文件名中的日期
    pub name_date: Option<NaiveDate>,
}

impl ScannedFile {
    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().to_string()
    }

    fn modified_date(&self) -> Option<NaiveDate> {
        DateTime::<Utc>::from_timestamp(self.modified, 0).map(|dt| dt.date_naive())
    }
}

pub struct FileScanner {
    pattern: Regex,
}

impl FileScanner {
    pub fn new() -> ImportResult<Self> {
        Ok(Self {
            pattern: Regex::new(r"(?i)^C\d{7}\.atr$")?,
        })
    }

    pub fn is_voltech_file(&self, name: &str) -> bool {
        self.pattern.is_match(name)
    }

    /// 文件名中的日期（C#MMDDYY）
    pub fn file_date(&self, name: &str) -> Option<NaiveDate> {
        if !self.is_voltech_file(name) {
            return None;
        }
        let digits = &name[1..8];
        let month: u32 = digits[1..3].parse().ok()?;
        let day: u32 = digits[3..5].parse().ok()?;
        let year: i32 = digits[5..7].parse().ok()?;
        NaiveDate::from_ymd_opt(2000 + year, month, day)
    }

    /// 递归列出源目录下全部 Voltech 文件
    ///
    /// 根目录不可读为错误；子目录不可读只记录警告
    pub fn list_files(&self, root: &Path) -> ImportResult<Vec<ScannedFile>> {
        let root_entries = std::fs::read_dir(root).map_err(|e| ImportError::DirectoryReadError {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;

        let mut files = Vec::new();
        let mut pending: Vec<std::fs::ReadDir> = vec![root_entries];

        while let Some(entries) = pending.pop() {
            for entry in entries.flatten() {
                let path = entry.path();
                let Ok(file_type) = entry.file_type() else { continue };

                if file_type.is_dir() {
                    match std::fs::read_dir(&path) {
                        Ok(sub) => pending.push(sub),
                        Err(e) => warn!(dir = %path.display(), error = %e, "子目录不可读，跳过"),
                    }
                    continue;
                }

                let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
                if !self.is_voltech_file(name) {
                    continue;
                }

                let name_date = self.file_date(name);
                match entry.metadata() {
                    Ok(meta) => files.push(ScannedFile {
                        size: meta.len() as i64,
                        modified: unix_seconds(&meta),
                        name_date,
                        path,
                    }),
                    Err(e) => warn!(file = %path.display(), error = %e, "读取文件元数据失败，跳过"),
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

/// 按日期范围过滤（含两端）；文件名无日期时用修改时间
pub fn filter_by_date_range(
    files: Vec<ScannedFile>,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<ScannedFile> {
    files
        .into_iter()
        .filter(|f| {
            f.name_date
                .or_else(|| f.modified_date())
                .map_or(false, |d| d >= start && d <= end)
        })
        .collect()
}

/// 最近 N 天内修改过的文件
pub fn filter_recent(files: Vec<ScannedFile>, days: i64, now: DateTime<Utc>) -> Vec<ScannedFile> {
    let cutoff = days_before(now, days).timestamp();
    files.into_iter().filter(|f| f.modified >= cutoff).collect()
}

pub(crate) fn unix_seconds(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn scanned(name: &str, modified: i64) -> ScannedFile {
        let scanner = FileScanner::new().unwrap();
        ScannedFile {
            path: PathBuf::from(name),
            size: 1,
            modified,
            name_date: scanner.file_date(name),
        }
    }

    #[test]
    fn test_pattern() {
        let s = FileScanner::new().unwrap();
        assert!(s.is_voltech_file("C1111925.atr"));
        assert!(s.is_voltech_file("c1111925.ATR"));
        assert!(!s.is_voltech_file("C111192.atr"));
        assert!(!s.is_voltech_file("C1111925.csv"));
        assert!(!s.is_voltech_file("notes.txt"));
    }

    #[test]
    fn test_file_date() {
        let s = FileScanner::new().unwrap();
        assert_eq!(s.file_date("C1111925.atr"), NaiveDate::from_ymd_opt(2025, 11, 19));
        assert_eq!(s.file_date("C1133125.atr"), None);
    }

    #[test]
    fn test_list_files_recursive() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("2025").join("11");
        fs::create_dir_all(&sub).unwrap();
        fs::write(dir.path().join("C1111925.atr"), "x").unwrap();
        fs::write(sub.join("C2112025.atr"), "xy").unwrap();
        fs::write(sub.join("readme.txt"), "x").unwrap();

        let files = FileScanner::new().unwrap().list_files(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f.size == 2));
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = TempDir::new().unwrap();
        let result = FileScanner::new()
            .unwrap()
            .list_files(&dir.path().join("missing"));
        assert!(matches!(result, Err(ImportError::DirectoryReadError { .. })));
    }

    #[test]
    fn test_filters() {
        let files = vec![scanned("C1111925.atr", 0), scanned("C1120125.atr", 0)];
        let start = NaiveDate::from_ymd_opt(2025, 11, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 11, 30).unwrap();
        assert_eq!(filter_by_date_range(files, start, end).len(), 1);

        let now = Utc::now();
        let recent = vec![
            scanned("C1111925.atr", now.timestamp()),
            scanned("C1111825.atr", (now - chrono::Duration::days(40)).timestamp()),
        ];
        assert_eq!(filter_recent(recent.clone(), 30, now).len(), 1);
        // 超大天数不溢出，等同于全部文件
        assert_eq!(filter_recent(recent, i64::MAX, now).len(), 2);
    }
}
