// ==========================================
// Voltech 采集系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 这里的错误都是“文件级”错误（整份文件不可用）
//       记录级错误见 RecordError，不会中断解析
// ==========================================

use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件相关错误 =====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件读取失败: {path}: {message}")]
    FileReadError { path: String, message: String },

    #[error("文件不是有效的 UTF-8 文本: {0}")]
    InvalidEncoding(String),

    #[error("文件中没有表头也没有结果行: {0}")]
    NoResultData(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    // ===== 目录扫描错误 =====
    #[error("目录读取失败: {path}: {message}")]
    DirectoryReadError { path: String, message: String },

    #[error("文件名模式无效: {0}")]
    PatternError(String),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    pub fn read_error(path: &str, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            ImportError::FileNotFound(path.to_string())
        } else {
            ImportError::FileReadError {
                path: path.to_string(),
                message: err.to_string(),
            }
        }
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<regex::Error>
impl From<regex::Error> for ImportError {
    fn from(err: regex::Error) -> Self {
        ImportError::PatternError(err.to_string())
    }
}

/// Result 类型别名
pub type ImportResult<T> = Result<T, ImportError>;
