// ==========================================
// Voltech 采集系统 - 解析错误台账模型
// ==========================================
// 红线: 台账记录永不自动删除；确认只能 0 -> 1
// ==========================================

use serde::{Deserialize, Serialize};

/// 已落库的台账记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub id: i64,
    pub file_path: String,
    pub error_message: String,
    pub line_number: Option<i64>,
    pub timestamp: String,
    pub acknowledged: bool,
}

/// 待追加的台账记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewParseError {
    pub file_path: String,
    pub error_message: String,
    pub line_number: Option<i64>,
}

impl NewParseError {
    pub fn file_level(file_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            error_message: message.into(),
            line_number: None,
        }
    }

    pub fn at_line(file_path: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            error_message: message.into(),
            line_number: Some(line as i64),
        }
    }
}

/// 台账查询过滤条件（日期为 YYYY-MM-DD，含端点）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFilter {
    pub acknowledged: Option<bool>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub file_path: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 台账计数（首页徽标用）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounts {
    pub total: i64,
    pub unacknowledged: i64,
}
