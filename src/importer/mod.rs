// ==========================================
// Voltech 采集系统 - 导入层
// ==========================================
// 职责: 发现仪器文件、解析为测试记录
// 不负责: 写库（见 repository::import_repo）
// ==========================================

pub mod error;
pub mod file_parser;
pub mod file_scanner;
pub mod parser_trait;

// 重导出
pub use error::{ImportError, ImportResult};
pub use file_parser::VoltechParser;
pub use file_scanner::{filter_by_date_range, filter_recent, FileScanner, ScannedFile};
pub use parser_trait::{FileParser, ParsedFile, RecordError};
