// ==========================================
// Voltech 采集系统 - 零件聚合仓储
// ==========================================

use crate::domain::query::{
    pass_rate, DateBounds, PartDateStats, PartListItem, PartSummary, SerialNumberInfo,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_builder::{page, FilterBuilder, PASS_EXPR};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct PartRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PartRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 零件汇总；零件不存在时返回 None
    pub fn part_summary(&self, part: &str) -> RepositoryResult<Option<PartSummary>> {
        let conn = self.get_conn()?;

        let sql = format!(
            r#"
            SELECT part,
                   COUNT(DISTINCT batch),
                   COUNT(*),
                   COALESCE(SUM(CASE WHEN {pass} THEN 1 ELSE 0 END), 0),
                   MIN(normalized_date),
                   MAX(normalized_date)
            FROM test_results
            WHERE part = ?1
            GROUP BY part
            "#,
            pass = PASS_EXPR
        );

        let base = conn
            .query_row(&sql, params![part], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })
            .optional()?;

        let Some((part_name, batches, total, passed, first_date, last_date)) = base else {
            return Ok(None);
        };

        // 最近批次：按日期，其次按插入顺序
        let latest = conn
            .query_row(
                r#"
                SELECT batch, operator FROM test_results
                WHERE part = ?1
                ORDER BY normalized_date DESC, id DESC
                LIMIT 1
                "#,
                params![part],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        Ok(Some(PartSummary {
            part: part_name,
            total_batches: batches,
            total_tests: total,
            passed,
            failed: total - passed,
            pass_rate: pass_rate(passed, total),
            first_date,
            last_date,
            latest_batch: latest.as_ref().map(|(b, _)| b.clone()),
            latest_operator: latest.map(|(_, o)| o),
        }))
    }

    /// 零件列表（可按名称模糊搜索，分页）
    pub fn list_parts(
        &self,
        search: Option<&str>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> RepositoryResult<Vec<PartListItem>> {
        let mut fb = FilterBuilder::new();
        fb.contains("part", search);
        let (limit, offset) = page(limit, offset);
        fb.push_arg(SqlValue::Integer(limit))
            .push_arg(SqlValue::Integer(offset));
        self.part_list(&fb)
    }

    /// 区间内测试过的零件（含端点，不分页）
    pub fn parts_by_date_range(&self, bounds: &DateBounds) -> RepositoryResult<Vec<PartListItem>> {
        let mut fb = FilterBuilder::new();
        fb.date_range(
            "normalized_date",
            bounds.date_from.as_deref(),
            bounds.date_to.as_deref(),
        );
        fb.push_arg(SqlValue::Integer(-1)).push_arg(SqlValue::Integer(0));
        self.part_list(&fb)
    }

    /// fb 的参数末尾必须是 LIMIT / OFFSET
    fn part_list(&self, fb: &FilterBuilder) -> RepositoryResult<Vec<PartListItem>> {
        let conn = self.get_conn()?;
        let sql = format!(
            r#"
            SELECT part,
                   COUNT(DISTINCT batch),
                   COUNT(*),
                   COALESCE(SUM(CASE WHEN {pass} THEN 1 ELSE 0 END), 0),
                   MAX(normalized_date)
            FROM test_results
            {where_sql}
            GROUP BY part
            ORDER BY MAX(normalized_date) DESC, part ASC
            LIMIT ? OFFSET ?
            "#,
            pass = PASS_EXPR,
            where_sql = fb.where_sql()
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(fb.args().iter()), |row| {
                let total: i64 = row.get(2)?;
                let passed: i64 = row.get(3)?;
                Ok(PartListItem {
                    part: row.get(0)?,
                    total_batches: row.get(1)?,
                    total_tests: total,
                    pass_rate: pass_rate(passed, total),
                    last_date: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 单个零件按日统计（最近日期优先）
    pub fn part_daily_stats(
        &self,
        part: &str,
        bounds: &DateBounds,
    ) -> RepositoryResult<Vec<PartDateStats>> {
        let conn = self.get_conn()?;
        let mut fb = FilterBuilder::new();
        fb.eq("part", Some(part))
            .raw("normalized_date IS NOT NULL")
            .date_range(
                "normalized_date",
                bounds.date_from.as_deref(),
                bounds.date_to.as_deref(),
            );

        let sql = format!(
            r#"
            SELECT normalized_date,
                   COUNT(*),
                   COALESCE(SUM(CASE WHEN {pass} THEN 1 ELSE 0 END), 0)
            FROM test_results
            {where_sql}
            GROUP BY normalized_date
            ORDER BY normalized_date DESC
            "#,
            pass = PASS_EXPR,
            where_sql = fb.where_sql()
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(fb.args().iter()), |row| {
                let total: i64 = row.get(1)?;
                let passed: i64 = row.get(2)?;
                Ok(PartDateStats {
                    date: row.get(0)?,
                    total_tests: total,
                    passed,
                    failed: total - passed,
                    pass_rate: pass_rate(passed, total),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 零件下的序列号（最近导入的在前）
    pub fn serial_numbers_for_part(
        &self,
        part: &str,
        limit: i64,
    ) -> RepositoryResult<Vec<SerialNumberInfo>> {
        let conn = self.get_conn()?;
        // 只有一个 MAX() 聚合时，SQLite 的裸列 batch / normalized_date 取自 MAX(id) 所在行
        let sql = format!(
            r#"
            SELECT serial_num,
                   COUNT(*),
                   COALESCE(SUM(CASE WHEN {pass} THEN 1 ELSE 0 END), 0),
                   MAX(id),
                   batch,
                   normalized_date
            FROM test_results
            WHERE part = ?1
            GROUP BY serial_num
            ORDER BY MAX(id) DESC
            LIMIT ?2
            "#,
            pass = PASS_EXPR
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![part, limit], |row| {
                let total: i64 = row.get(1)?;
                let passed: i64 = row.get(2)?;
                Ok(SerialNumberInfo {
                    serial_num: row.get(0)?,
                    total_tests: total,
                    passed,
                    failed: total - passed,
                    latest_batch: row.get(4)?,
                    latest_date: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
