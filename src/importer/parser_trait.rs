// ==========================================
// Voltech 采集系统 - 解析器 Trait
// ==========================================
// 红线: 解析是纯函数，不写库、不改文件
// ==========================================

use crate::domain::test_result::TestRecord;
use crate::importer::error::ImportResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 记录级错误：只影响这一行，解析继续
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub line_number: usize,
    pub message: String,
}

/// 单文件解析结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFile {
    pub records: Vec<TestRecord>,
    pub errors: Vec<RecordError>,
}

// ==========================================
// FileParser Trait
// ==========================================
// 实现者: VoltechParser
pub trait FileParser: Send + Sync {
    /// 解析文件
    ///
    /// # 返回
    /// - Ok(ParsedFile): 有效记录 + 记录级错误
    /// - Err(ImportError): 文件级失败（零记录）
    fn parse_file(&self, path: &Path) -> ImportResult<ParsedFile>;
}
