// ==========================================
// Voltech 采集系统 - 批次聚合仓储
// ==========================================
// 批次 = (part, batch) 分组，聚合在 SQL 内完成
// ==========================================

use crate::domain::query::{pass_rate, BatchListItem, BatchSearchFilter, BatchSummary};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_builder::{page, FilterBuilder, PASS_EXPR};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

pub struct BatchRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BatchRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn list_select() -> String {
        format!(
            r#"
            SELECT batch, part, MAX(operator), MAX(date), MIN(normalized_date),
                   COUNT(*) AS total_tests,
                   COALESCE(SUM(CASE WHEN {pass} THEN 1 ELSE 0 END), 0) AS passed
            FROM test_results
            "#,
            pass = PASS_EXPR
        )
    }

    /// 批次详情
    pub fn batch_detail(
        &self,
        batch: &str,
        part: Option<&str>,
    ) -> RepositoryResult<Option<BatchSummary>> {
        let conn = self.get_conn()?;
        let mut fb = FilterBuilder::new();
        fb.eq("batch", Some(batch)).eq("part", part);

        let sql = format!(
            r#"
            SELECT batch, part, MAX(operator), MAX(date), MIN(normalized_date),
                   COUNT(*),
                   COALESCE(SUM(CASE WHEN {pass} THEN 1 ELSE 0 END), 0),
                   MIN(result_num), MAX(result_num), MIN(file_path)
            FROM test_results
            {where_sql}
            GROUP BY part, batch
            ORDER BY MIN(normalized_date) DESC
            LIMIT 1
            "#,
            pass = PASS_EXPR,
            where_sql = fb.where_sql()
        );

        let summary = conn
            .query_row(&sql, params_from_iter(fb.args().iter()), |row| {
                let total: i64 = row.get(5)?;
                let passed: i64 = row.get(6)?;
                Ok(BatchSummary {
                    batch: row.get(0)?,
                    part: row.get(1)?,
                    operator: row.get(2)?,
                    date: row.get(3)?,
                    normalized_date: row.get(4)?,
                    total_tests: total,
                    passed,
                    failed: total - passed,
                    pass_rate: pass_rate(passed, total),
                    first_result: row.get(7)?,
                    last_result: row.get(8)?,
                    file_path: row.get(9)?,
                })
            })
            .optional()?;
        Ok(summary)
    }

    /// 批次搜索（分页）
    pub fn search(&self, filter: &BatchSearchFilter) -> RepositoryResult<Vec<BatchListItem>> {
        let conn = self.get_conn()?;
        let mut fb = FilterBuilder::new();
        fb.eq("part", filter.part.as_deref())
            .eq("operator", filter.operator.as_deref())
            .date_range(
                "normalized_date",
                filter.date_from.as_deref(),
                filter.date_to.as_deref(),
            );

        let mut having = Vec::new();
        if let Some(min) = filter.min_tests {
            having.push("COUNT(*) >= ?".to_string());
            fb.push_arg(SqlValue::Integer(min));
        }
        match filter.has_failures {
            Some(true) => having.push(format!("SUM(CASE WHEN {} THEN 0 ELSE 1 END) > 0", PASS_EXPR)),
            Some(false) => having.push(format!("SUM(CASE WHEN {} THEN 0 ELSE 1 END) = 0", PASS_EXPR)),
            None => {}
        }
        let having_sql = if having.is_empty() {
            String::new()
        } else {
            format!(" HAVING {}", having.join(" AND "))
        };

        let (limit, offset) = page(filter.limit, filter.offset);
        fb.push_arg(SqlValue::Integer(limit))
            .push_arg(SqlValue::Integer(offset));

        let sql = format!(
            "{}{} GROUP BY part, batch{} ORDER BY MIN(normalized_date) DESC, batch DESC LIMIT ? OFFSET ?",
            Self::list_select(),
            fb.where_sql(),
            having_sql
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(fb.args().iter()), map_list_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 某零件最近的批次
    pub fn recent_for_part(&self, part: &str, limit: i64) -> RepositoryResult<Vec<BatchListItem>> {
        self.search(&BatchSearchFilter {
            part: Some(part.to_string()),
            limit: Some(limit),
            ..Default::default()
        })
    }

    /// 某零件的全部批次
    pub fn batches_for_part(&self, part: &str) -> RepositoryResult<Vec<BatchListItem>> {
        let conn = self.get_conn()?;
        let mut fb = FilterBuilder::new();
        fb.eq("part", Some(part));
        let sql = format!(
            "{}{} GROUP BY part, batch ORDER BY MIN(normalized_date) DESC, batch DESC",
            Self::list_select(),
            fb.where_sql()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(fb.args().iter()), map_list_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn map_list_row(row: &Row) -> rusqlite::Result<BatchListItem> {
    let total: i64 = row.get(5)?;
    let passed: i64 = row.get(6)?;
    Ok(BatchListItem {
        batch: row.get(0)?,
        part: row.get(1)?,
        operator: row.get(2)?,
        date: row.get(3)?,
        normalized_date: row.get(4)?,
        total_tests: total,
        passed,
        failed: total - passed,
        pass_rate: pass_rate(passed, total),
    })
}
