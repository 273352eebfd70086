// ==========================================
// Voltech 采集系统 - 测试结果查询仓储
// ==========================================
// 表: test_results（只读）
// ==========================================

use crate::domain::query::TestSearchFilter;
use crate::domain::test_result::TestResult;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_builder::{page, FilterBuilder, PASS_EXPR};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT id, file_path, result_num, part, operator, batch, date, normalized_date,
           serial_num, pass_fail, time, retries, measurements, created_at
    FROM test_results
"#;

pub struct TestResultRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TestResultRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按 id 查询
    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<TestResult>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let row = conn.query_row(&sql, params![id], map_row).optional()?;
        Ok(row)
    }

    /// 按序列号查询（一个序列号可能被多次测试）
    pub fn find_by_serial(&self, serial_num: &str) -> RepositoryResult<Vec<TestResult>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "{} WHERE serial_num = ?1 ORDER BY normalized_date DESC, id DESC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![serial_num], map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 查询批次内全部测试（按结果编号）
    pub fn find_by_batch(
        &self,
        batch: &str,
        part: Option<&str>,
    ) -> RepositoryResult<Vec<TestResult>> {
        let conn = self.get_conn()?;
        let mut fb = FilterBuilder::new();
        fb.eq("batch", Some(batch)).eq("part", part);
        let sql = format!(
            "{}{} ORDER BY result_num ASC, id ASC",
            SELECT_COLUMNS,
            fb.where_sql()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(fb.args().iter()), map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 批次内全部测试，按测试时刻排序（time 缺失的排在最前）
    pub fn find_by_batch_by_time(
        &self,
        batch: &str,
        part: Option<&str>,
    ) -> RepositoryResult<Vec<TestResult>> {
        let conn = self.get_conn()?;
        let mut fb = FilterBuilder::new();
        fb.eq("batch", Some(batch)).eq("part", part);
        let sql = format!(
            "{}{} ORDER BY time ASC, result_num ASC, id ASC",
            SELECT_COLUMNS,
            fb.where_sql()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(fb.args().iter()), map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 条件搜索（分页）
    pub fn search(&self, filter: &TestSearchFilter) -> RepositoryResult<Vec<TestResult>> {
        let conn = self.get_conn()?;
        let mut fb = Self::build_filter(filter);
        let (limit, offset) = page(filter.limit, filter.offset);
        fb.push_arg(SqlValue::Integer(limit))
            .push_arg(SqlValue::Integer(offset));

        let sql = format!(
            "{}{} ORDER BY normalized_date DESC, id DESC LIMIT ? OFFSET ?",
            SELECT_COLUMNS,
            fb.where_sql()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(fb.args().iter()), map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 条件计数（与 search 同一过滤条件，忽略分页）
    pub fn count(&self, filter: &TestSearchFilter) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let fb = Self::build_filter(filter);
        let sql = format!("SELECT COUNT(*) FROM test_results{}", fb.where_sql());
        let n = conn.query_row(&sql, params_from_iter(fb.args().iter()), |row| row.get(0))?;
        Ok(n)
    }

    /// 不合格测试（最近优先）
    pub fn failed_tests(
        &self,
        part: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> RepositoryResult<Vec<TestResult>> {
        let conn = self.get_conn()?;
        let mut fb = FilterBuilder::new();
        fb.raw(&format!("NOT ({})", PASS_EXPR)).eq("part", part);
        let (limit, offset) = page(limit, offset);
        fb.push_arg(SqlValue::Integer(limit))
            .push_arg(SqlValue::Integer(offset));

        let sql = format!(
            "{}{} ORDER BY normalized_date DESC, id DESC LIMIT ? OFFSET ?",
            SELECT_COLUMNS,
            fb.where_sql()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(fb.args().iter()), map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn build_filter(filter: &TestSearchFilter) -> FilterBuilder {
        let mut fb = FilterBuilder::new();
        fb.eq("part", filter.part.as_deref())
            .eq("batch", filter.batch.as_deref())
            .eq("operator", filter.operator.as_deref())
            .contains("serial_num", filter.serial_num.as_deref())
            .eq_ignore_case("pass_fail", filter.pass_fail.as_deref())
            .date_range(
                "normalized_date",
                filter.date_from.as_deref(),
                filter.date_to.as_deref(),
            );
        fb
    }
}

pub(crate) fn map_row(row: &Row) -> rusqlite::Result<TestResult> {
    let measurements: String = row.get(12)?;
    Ok(TestResult {
        id: row.get(0)?,
        file_path: row.get(1)?,
        result_num: row.get(2)?,
        part: row.get(3)?,
        operator: row.get(4)?,
        batch: row.get(5)?,
        date: row.get(6)?,
        normalized_date: row.get(7)?,
        serial_num: row.get(8)?,
        pass_fail: row.get(9)?,
        time: row.get(10)?,
        retries: row.get(11)?,
        measurements: serde_json::from_str(&measurements)
            .unwrap_or(serde_json::Value::Object(Default::default())),
        created_at: row.get(13)?,
    })
}
