// ==========================================
// Voltech 采集系统 - 动态 SQL 过滤构建
// ==========================================
// 职责: 查询仓储共用的 WHERE 拼接 + 参数收集
// 红线: 值一律走参数绑定，列名只来自代码常量
// ==========================================

use rusqlite::types::Value as SqlValue;

/// 判定“合格”的 SQL 表达式（大小写不敏感）
pub const PASS_EXPR: &str = "lower(trim(pass_fail)) = 'pass'";

/// 默认分页大小
pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// 分页上限
pub const MAX_PAGE_SIZE: i64 = 10_000;

#[derive(Debug, Default)]
pub struct FilterBuilder {
    clauses: Vec<String>,
    args: Vec<SqlValue>,
}

impl FilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// column = ?（None 或空串时跳过）
    pub fn eq(&mut self, column: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.clauses.push(format!("{} = ?", column));
            self.args.push(SqlValue::Text(v.to_string()));
        }
        self
    }

    /// column LIKE %value%
    pub fn contains(&mut self, column: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.clauses.push(format!("{} LIKE ?", column));
            self.args.push(SqlValue::Text(format!("%{}%", v)));
        }
        self
    }

    /// 大小写不敏感相等
    pub fn eq_ignore_case(&mut self, column: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.clauses.push(format!("lower({}) = lower(?)", column));
            self.args.push(SqlValue::Text(v.to_string()));
        }
        self
    }

    /// 日期区间（含端点）
    pub fn date_range(
        &mut self,
        column: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> &mut Self {
        if let Some(f) = from.filter(|v| !v.is_empty()) {
            self.clauses.push(format!("{} >= ?", column));
            self.args.push(SqlValue::Text(f.to_string()));
        }
        if let Some(t) = to.filter(|v| !v.is_empty()) {
            self.clauses.push(format!("{} <= ?", column));
            self.args.push(SqlValue::Text(t.to_string()));
        }
        self
    }

    /// 无参数的固定条件
    pub fn raw(&mut self, clause: &str) -> &mut Self {
        self.clauses.push(clause.to_string());
        self
    }

    /// " WHERE a AND b"；无条件时返回空串
    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn push_arg(&mut self, value: SqlValue) -> &mut Self {
        self.args.push(value);
        self
    }

    pub fn args(&self) -> &[SqlValue] {
        &self.args
    }
}

/// 规范化分页参数
pub fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_builder_has_no_where() {
        assert_eq!(FilterBuilder::new().where_sql(), "");
    }

    #[test]
    fn test_blank_values_are_skipped() {
        let mut b = FilterBuilder::new();
        b.eq("part", Some("  "))
            .eq("batch", Some("B1"))
            .date_range("normalized_date", Some("2025-01-01"), None);
        assert_eq!(b.where_sql(), " WHERE batch = ? AND normalized_date >= ?");
        assert_eq!(b.args().len(), 2);
    }

    #[test]
    fn test_page_clamps() {
        assert_eq!(page(None, None), (DEFAULT_PAGE_SIZE, 0));
        assert_eq!(page(Some(0), Some(-5)), (1, 0));
        assert_eq!(page(Some(1_000_000), Some(20)), (MAX_PAGE_SIZE, 20));
    }
}
