// ==========================================
// Voltech 采集系统 - 测试结果领域模型
// ==========================================
// 对齐: test_results 表，唯一键 (file_path, result_num)
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

// ==========================================
// TestRecord - 解析器输出的单条记录（尚未落库）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub file_path: String,
    pub result_num: i64,
    pub part: String,
    pub operator: String,
    pub batch: String,
    pub date: String,                       // 仪器原始日期 DD-MM-YY
    pub normalized_date: Option<NaiveDate>, // 由 date 推导
    pub serial_num: String,                 // 空值落为 "NONE"
    pub pass_fail: String,
    pub time: Option<String>,
    pub retries: Option<String>,
    pub measurements: Map<String, JsonValue>,
    pub line_number: usize, // 源文件行号（1 起）
}

impl TestRecord {
    pub fn is_pass(&self) -> bool {
        self.pass_fail.trim().eq_ignore_ascii_case("pass")
    }
}

// ==========================================
// TestResult - 已落库的测试结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub id: i64,
    pub file_path: String,
    pub result_num: i64,
    pub part: String,
    pub operator: String,
    pub batch: String,
    pub date: String,
    pub normalized_date: Option<String>,
    pub serial_num: String,
    pub pass_fail: String,
    pub time: Option<String>,
    pub retries: Option<String>,
    pub measurements: JsonValue,
    pub created_at: String,
}

/// 仪器日期 DD-MM-YY -> NaiveDate（两位年份视为 20YY）
pub fn parse_instrument_date(raw: &str) -> Option<NaiveDate> {
    let mut it = raw.trim().split('-');
    let day = it.next()?.trim().parse::<u32>().ok()?;
    let month = it.next()?.trim().parse::<u32>().ok()?;
    let year = it.next()?.trim().parse::<i32>().ok()?;
    if it.next().is_some() {
        return None;
    }
    let full_year = if year < 100 { 2000 + year } else { year };
    NaiveDate::from_ymd_opt(full_year, month, day)
}
