// ==========================================
// Voltech 采集系统 - Voltech .atr 解析器
// ==========================================
// 文件结构（逗号分隔，字段可加双引号）:
//   File Name: C#MMDDYY.atr   -> 测试日期 DD-MM-YY
//   Test Date: <date>         -> 测试日期（覆盖）
//   Part #,<part>             -> 新零件段（清空 operator / batch / 表头）
//   Operator,<name>
//   Batch #,<batch>
//   Result #,...              -> 表头第 1 行；下一行为表头第 2 行
//   <数字开头的行>            -> 结果行
// 记录级错误不会中断解析；文件级错误返回 Err 且零记录
// ==========================================

use crate::domain::test_result::{parse_instrument_date, TestRecord};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::parser_trait::{FileParser, ParsedFile, RecordError};
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::HashSet;
use std::path::Path;

// 固定列
const COL_RESULT: &str = "Result #";
const COL_SERIAL: &str = "Serial #";
const COL_PASS_FAIL: &str = "Pass/Fail";
const COL_TIME: &str = "Time";
const COL_RETRIES: &str = "Retries";

const EMPTY_SERIAL: &str = "NONE";

/// 原始行：行号 + 字段
type RawLine = (usize, Vec<String>);

#[derive(Debug, Default)]
pub struct VoltechParser;

impl VoltechParser {
    pub fn new() -> Self {
        Self
    }

    /// 从字节解析（file_path 仅用于填充记录与错误信息）
    pub fn parse_bytes(&self, file_path: &str, bytes: &[u8]) -> ImportResult<ParsedFile> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| ImportError::InvalidEncoding(file_path.to_string()))?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        if text.trim().is_empty() {
            return Ok(ParsedFile::default());
        }

        let (lines, csv_errors) = split_lines(text);
        let mut state = SectionState::new(file_path);
        let mut out = ParsedFile {
            records: Vec::new(),
            errors: csv_errors,
        };
        let mut seen_results: HashSet<i64> = HashSet::new();
        let mut saw_header = false;
        let mut saw_rows = false;

        let mut i = 0;
        while i < lines.len() {
            let (line_no, fields) = &lines[i];
            let first = fields.first().map(|s| s.trim()).unwrap_or("");

            if first.as_bytes().first().map_or(false, |b| b.is_ascii_digit()) {
                saw_rows = true;
                match state.build_record(*line_no, fields) {
                    Ok(record) => {
                        if seen_results.insert(record.result_num) {
                            out.records.push(record);
                        } else {
                            out.errors.push(RecordError {
                                line_number: *line_no,
                                message: format!("结果编号重复: {}", record.result_num),
                            });
                        }
                    }
                    Err(message) => out.errors.push(RecordError {
                        line_number: *line_no,
                        message,
                    }),
                }
            } else {
                match first {
                    "Part #" => state.start_part(field_at(fields, 1)),
                    "Operator" => state.operator = field_at(fields, 1),
                    "Batch #" => state.batch = field_at(fields, 1),
                    COL_RESULT => {
                        let second = lines
                            .get(i + 1)
                            .filter(|(_, next)| !starts_with_digit(next))
                            .map(|(_, next)| next.as_slice())
                            .unwrap_or(&[]);
                        state.header = combine_header(fields, second);
                        saw_header = true;
                        if !second.is_empty() {
                            i += 1;
                        }
                    }
                    _ if first.starts_with("File Name") => {
                        if let Some(date) = date_from_file_name_field(first) {
                            state.date = date;
                        }
                    }
                    _ if first.starts_with("Test Date") => {
                        if let Some((_, rest)) = first.split_once(':') {
                            let d = rest.trim();
                            if !d.is_empty() {
                                state.date = d.to_string();
                            }
                        }
                    }
                    _ => {}
                }
            }
            i += 1;
        }

        if !saw_header && !saw_rows {
            return Err(ImportError::NoResultData(file_path.to_string()));
        }

        Ok(out)
    }
}

impl FileParser for VoltechParser {
    fn parse_file(&self, path: &Path) -> ImportResult<ParsedFile> {
        let label = path.to_string_lossy().to_string();
        let bytes = std::fs::read(path).map_err(|e| ImportError::read_error(&label, &e))?;
        self.parse_bytes(&label, &bytes)
    }
}

// ==========================================
// 段落状态
// ==========================================
struct SectionState {
    file_path: String,
    part: String,
    operator: String,
    batch: String,
    date: String,
    header: Vec<Option<String>>,
}

impl SectionState {
    fn new(file_path: &str) -> Self {
        // 文件内没有日期行时，回落到文件名中的日期
        let date = Path::new(file_path)
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(date_from_voltech_name)
            .unwrap_or_default();

        Self {
            file_path: file_path.to_string(),
            part: String::new(),
            operator: String::new(),
            batch: String::new(),
            date,
            header: Vec::new(),
        }
    }

    fn start_part(&mut self, part: String) {
        self.part = part;
        self.operator.clear();
        self.batch.clear();
        self.header.clear();
    }

    fn build_record(&self, line_number: usize, fields: &[String]) -> Result<TestRecord, String> {
        if self.header.is_empty() {
            return Err("结果行出现在表头之前".to_string());
        }

        let mut result_num: Option<i64> = None;
        let mut raw_result = String::new();
        let mut serial_num = EMPTY_SERIAL.to_string();
        let mut pass_fail = String::new();
        let mut time = None;
        let mut retries = None;
        let mut measurements = Map::new();

        for (idx, column) in self.header.iter().enumerate() {
            let Some(name) = column else { continue };
            let value = fields.get(idx).map(|s| s.trim()).unwrap_or("");

            match name.as_str() {
                COL_RESULT => {
                    raw_result = value.to_string();
                    result_num = value.parse::<i64>().ok();
                }
                COL_SERIAL => {
                    if !value.is_empty() {
                        serial_num = value.to_string();
                    }
                }
                COL_PASS_FAIL => pass_fail = value.to_string(),
                COL_TIME => time = Some(value.to_string()).filter(|v| !v.is_empty()),
                COL_RETRIES => retries = Some(value.to_string()).filter(|v| !v.is_empty()),
                _ => {
                    if !value.is_empty() {
                        measurements.insert(name.clone(), measurement_value(value));
                    }
                }
            }
        }

        let result_num =
            result_num.ok_or_else(|| format!("结果编号不是整数: '{}'", raw_result))?;
        if pass_fail.is_empty() {
            return Err(format!("结果 {} 缺少 Pass/Fail", result_num));
        }

        Ok(TestRecord {
            file_path: self.file_path.clone(),
            result_num,
            part: self.part.clone(),
            operator: self.operator.clone(),
            batch: self.batch.clone(),
            date: self.date.clone(),
            normalized_date: parse_instrument_date(&self.date),
            serial_num,
            pass_fail,
            time,
            retries,
            measurements,
            line_number,
        })
    }
}

// ==========================================
// 辅助函数
// ==========================================

/// 用 csv 切分所有行；csv 层错误转为记录级错误
fn split_lines(text: &str) -> (Vec<RawLine>, Vec<RecordError>) {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut lines = Vec::new();
    let mut errors = Vec::new();
    for result in reader.records() {
        match result {
            Ok(record) => {
                let line_no = record.position().map(|p| p.line() as usize).unwrap_or(0);
                lines.push((line_no, record.iter().map(|s| s.to_string()).collect()));
            }
            Err(e) => {
                let line_no = e.position().map(|p| p.line() as usize).unwrap_or(0);
                errors.push(RecordError {
                    line_number: line_no,
                    message: format!("CSV 解析失败: {}", e),
                });
            }
        }
    }
    (lines, errors)
}

fn field_at(fields: &[String], idx: usize) -> String {
    fields.get(idx).map(|s| s.trim().to_string()).unwrap_or_default()
}

fn starts_with_digit(fields: &[String]) -> bool {
    fields
        .first()
        .and_then(|s| s.trim().bytes().next())
        .map_or(false, |b| b.is_ascii_digit())
}

/// 合并两行表头，保持列位置
///
/// - 数字开头的标签开启一个测试块（同列的第 2 行标签直接拼接）
/// - 单独出现的 Minimum / Maximum 加测试名前缀
/// - Reading / Polarity 加前缀，其后的空标签列为对应的判定列
/// - 其余空标签列丢弃（None）
pub(crate) fn combine_header(first: &[String], second: &[String]) -> Vec<Option<String>> {
    let width = first.len().max(second.len());
    let mut columns = Vec::with_capacity(width);
    let mut current_test = String::new();
    let mut pending_verdict: Option<String> = None;

    for idx in 0..width {
        let a = first.get(idx).map(|s| s.trim()).unwrap_or("");
        let b = second.get(idx).map(|s| s.trim()).unwrap_or("");
        let label = match (a.is_empty(), b.is_empty()) {
            (true, true) => String::new(),
            (true, false) => b.to_string(),
            (false, true) => a.to_string(),
            (false, false) => format!("{} {}", a, b),
        };

        if label.is_empty() {
            columns.push(pending_verdict.take());
            continue;
        }
        pending_verdict = None;

        // 测试名取第 1 行（"1 LS" 与第 2 行 "Minimum" 同列）
        if a.as_bytes().first().map_or(false, |c| c.is_ascii_digit()) {
            current_test = a.to_string();
        } else if label.as_bytes()[0].is_ascii_digit() {
            current_test = label.clone();
        }

        let qualified = |suffix: &str| {
            if current_test.is_empty() {
                suffix.to_string()
            } else {
                format!("{} {}", current_test, suffix)
            }
        };

        // 测试名列下方的第 2 行标签决定列类型
        let kind = if !a.is_empty() && !b.is_empty() && a == current_test {
            b
        } else {
            label.as_str()
        };

        match kind {
            "Minimum" | "Maximum" => columns.push(Some(qualified(kind))),
            "Reading" => {
                columns.push(Some(qualified("Reading")));
                pending_verdict = Some(qualified("Pass/Fail"));
            }
            "Polarity" => {
                columns.push(Some(qualified("Polarity")));
                pending_verdict = Some(qualified("Polarity Pass/Fail"));
            }
            _ => columns.push(Some(label)),
        }
    }

    columns
}

/// 测量值：整数 / 浮点 / 字符串
fn measurement_value(raw: &str) -> JsonValue {
    if let Ok(i) = raw.parse::<i64>() {
        return JsonValue::Number(Number::from(i));
    }
    if looks_numeric(raw) {
        if let Some(n) = raw.parse::<f64>().ok().and_then(Number::from_f64) {
            return JsonValue::Number(n);
        }
    }
    JsonValue::String(raw.to_string())
}

// 排除 "inf" / "NaN" 之类被 f64 接受的单词
fn looks_numeric(raw: &str) -> bool {
    raw.bytes().any(|b| b.is_ascii_digit())
        && raw
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
}

/// "File Name: C1111925.atr" -> "19-11-25"
fn date_from_file_name_field(field: &str) -> Option<String> {
    let (_, name) = field.split_once(':')?;
    date_from_voltech_name(name.trim())
}

/// C#MMDDYY(.atr) -> DD-MM-YY
pub(crate) fn date_from_voltech_name(name: &str) -> Option<String> {
    if !name.as_bytes().first()?.eq_ignore_ascii_case(&b'C') {
        return None;
    }
    // 按字节切片前先确认边界，文件名行可能含多字节字符
    let digits = name.get(1..8)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (mm, dd, yy) = (&digits[1..3], &digits[3..5], &digits[5..7]);
    Some(format!("{}-{}-{}", dd, mm, yy))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
File Name: C1111925.atr
Part #,TX-100
Operator,alice
Batch #,B42
Result #,Serial #,Pass/Fail,Time,,1 LS,,,
,,,,,Minimum,Maximum,Reading,
1,SN001,Pass,08:00:01,,10.0,12.0,11.2,Pass
2,,Pass,08:00:05,,10.0,12.0,11.4,Pass
3,SN003,Fail,08:00:09,,10.0,12.0,13.9,Fail
";

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_combine_header_qualifies_test_columns() {
        let h = combine_header(
            &s(&["Result #", "Serial #", "", "2 TR", "", "", "3 PO", ""]),
            &s(&["", "", "", "", "Maximum", "Reading", "Polarity", ""]),
        );
        assert_eq!(
            h,
            vec![
                Some("Result #".to_string()),
                Some("Serial #".to_string()),
                None,
                Some("2 TR".to_string()),
                Some("2 TR Maximum".to_string()),
                Some("2 TR Reading".to_string()),
                Some("3 PO Polarity".to_string()),
                Some("3 PO Polarity Pass/Fail".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_sample() {
        let parsed = VoltechParser::new()
            .parse_bytes("/data/C1111925.atr", SAMPLE.as_bytes())
            .unwrap();
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        assert_eq!(parsed.records.len(), 3);

        let r1 = &parsed.records[0];
        assert_eq!(r1.result_num, 1);
        assert_eq!(r1.part, "TX-100");
        assert_eq!(r1.operator, "alice");
        assert_eq!(r1.batch, "B42");
        assert_eq!(r1.date, "19-11-25");
        assert_eq!(
            r1.normalized_date,
            chrono::NaiveDate::from_ymd_opt(2025, 11, 19)
        );
        assert_eq!(r1.measurements["1 LS Minimum"], serde_json::json!(10.0));
        assert_eq!(r1.measurements["1 LS Reading"], serde_json::json!(11.2));
        assert_eq!(r1.measurements["1 LS Pass/Fail"], serde_json::json!("Pass"));
        assert_eq!(r1.line_number, 7);

        // 空序列号
        assert_eq!(parsed.records[1].serial_num, "NONE");
        assert!(!parsed.records[2].is_pass());
    }

    #[test]
    fn test_one_malformed_record_does_not_discard_the_rest() {
        let content = SAMPLE.replace("2,,Pass", "2x,,Pass")
            + "4,SN004,,08:00:12,,10.0,12.0,11.0,Pass\n"
            + "5,SN005,Pass,08:00:15,,10.0,12.0,11.0,Pass\n";
        let parsed = VoltechParser::new()
            .parse_bytes("/data/C1111925.atr", content.as_bytes())
            .unwrap();

        // 2x 与缺少 Pass/Fail 的 4 各产生一条错误
        assert_eq!(parsed.records.len(), 3);
        assert_eq!(parsed.errors.len(), 2);
        assert_eq!(parsed.errors[0].line_number, 8);
        assert!(parsed.errors[0].message.contains("2x"));
    }

    #[test]
    fn test_duplicate_result_number_is_a_record_error() {
        let content = format!("{}1,SN009,Pass,08:01:00,,10.0,12.0,11.0,Pass\n", SAMPLE);
        let parsed = VoltechParser::new()
            .parse_bytes("/data/C1111925.atr", content.as_bytes())
            .unwrap();
        assert_eq!(parsed.records.len(), 3);
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].message.contains("重复"));
    }

    #[test]
    fn test_row_before_header() {
        let parsed = VoltechParser::new()
            .parse_bytes("/data/x.atr", b"Part #,A\n1,S1,Pass\n")
            .unwrap();
        assert!(parsed.records.is_empty());
        assert_eq!(parsed.errors.len(), 1);
    }

    #[test]
    fn test_file_level_failures() {
        let p = VoltechParser::new();
        assert!(matches!(
            p.parse_bytes("/data/bad.atr", &[0xff, 0xfe, 0x00, 0x81]),
            Err(ImportError::InvalidEncoding(_))
        ));
        assert!(matches!(
            p.parse_bytes("/data/junk.atr", b"hello world\nnothing here\n"),
            Err(ImportError::NoResultData(_))
        ));
        assert_eq!(p.parse_bytes("/data/empty.atr", b"").unwrap(), ParsedFile::default());
    }

    #[test]
    fn test_test_date_line_overrides_file_name() {
        let content = SAMPLE.replace("Part #,TX-100", "Test Date: 02-01-26\nPart #,TX-100");
        let parsed = VoltechParser::new()
            .parse_bytes("/data/C1111925.atr", content.as_bytes())
            .unwrap();
        assert_eq!(parsed.records[0].date, "02-01-26");
    }

    #[test]
    fn test_parse_is_deterministic() {
        let p = VoltechParser::new();
        let a = p.parse_bytes("/data/C1111925.atr", SAMPLE.as_bytes()).unwrap();
        let b = p.parse_bytes("/data/C1111925.atr", SAMPLE.as_bytes()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_date_from_voltech_name() {
        assert_eq!(date_from_voltech_name("C1111925.atr").as_deref(), Some("19-11-25"));
        assert_eq!(date_from_voltech_name("X1111925.atr"), None);
        assert_eq!(date_from_voltech_name("C11"), None);
        assert_eq!(date_from_voltech_name("C123456é.atr"), None);
        assert_eq!(date_from_voltech_name("Cé"), None);
    }

    #[test]
    fn test_multibyte_file_name_line_is_not_fatal() {
        let content = SAMPLE.replace("File Name: C1111925.atr", "File Name: C123456é.atr");
        let parsed = VoltechParser::new()
            .parse_bytes("/data/C1111925.atr", content.as_bytes())
            .unwrap();
        assert_eq!(parsed.records.len(), 3);
        assert!(parsed.errors.is_empty());
        // 回落到路径中的日期
        assert_eq!(parsed.records[0].date, "19-11-25");
    }
}
