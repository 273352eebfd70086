// ==========================================
// Voltech 采集系统 - 统计聚合仓储
// ==========================================
// 红线: 空结果集 = 全零计数 + pass_rate 0.0，不是错误
// ==========================================

use crate::domain::query::{
    pass_rate, DailyStats, DateBounds, OperatorStats, OverallStats, RecentActivity,
    TopFailedPart,
};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::sql_builder::{FilterBuilder, PASS_EXPR};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};
use std::sync::{Arc, Mutex};

pub struct StatsRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StatsRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn bounds_filter(bounds: &DateBounds) -> FilterBuilder {
        let mut fb = FilterBuilder::new();
        fb.date_range(
            "normalized_date",
            bounds.date_from.as_deref(),
            bounds.date_to.as_deref(),
        );
        fb
    }

    /// 全局统计
    pub fn overall(&self, bounds: &DateBounds) -> RepositoryResult<OverallStats> {
        let conn = self.get_conn()?;
        let fb = Self::bounds_filter(bounds);
        let sql = format!(
            r#"
            SELECT COUNT(*),
                   COALESCE(SUM(CASE WHEN {pass} THEN 1 ELSE 0 END), 0),
                   COUNT(DISTINCT part),
                   COUNT(DISTINCT part || char(31) || batch),
                   COUNT(DISTINCT operator),
                   MIN(normalized_date),
                   MAX(normalized_date)
            FROM test_results
            {where_sql}
            "#,
            pass = PASS_EXPR,
            where_sql = fb.where_sql()
        );

        let stats = conn.query_row(&sql, params_from_iter(fb.args().iter()), |row| {
            let total: i64 = row.get(0)?;
            let passed: i64 = row.get(1)?;
            Ok(OverallStats {
                total_tests: total,
                passed,
                failed: total - passed,
                pass_rate: pass_rate(passed, total),
                total_parts: row.get(2)?,
                total_batches: row.get(3)?,
                total_operators: row.get(4)?,
                first_date: row.get(5)?,
                last_date: row.get(6)?,
            })
        })?;
        Ok(stats)
    }

    /// 每日统计（最近日期优先）
    pub fn daily(&self, bounds: &DateBounds, limit: Option<i64>) -> RepositoryResult<Vec<DailyStats>> {
        let conn = self.get_conn()?;
        let mut fb = Self::bounds_filter(bounds);
        fb.raw("normalized_date IS NOT NULL");
        fb.push_arg(SqlValue::Integer(limit.unwrap_or(-1)));

        let sql = format!(
            r#"
            SELECT normalized_date,
                   COUNT(*),
                   COALESCE(SUM(CASE WHEN {pass} THEN 1 ELSE 0 END), 0),
                   COUNT(DISTINCT part),
                   COUNT(DISTINCT part || char(31) || batch)
            FROM test_results
            {where_sql}
            GROUP BY normalized_date
            ORDER BY normalized_date DESC
            LIMIT ?
            "#,
            pass = PASS_EXPR,
            where_sql = fb.where_sql()
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(fb.args().iter()), |row| {
                let total: i64 = row.get(1)?;
                let passed: i64 = row.get(2)?;
                Ok(DailyStats {
                    date: row.get(0)?,
                    total_tests: total,
                    passed,
                    failed: total - passed,
                    pass_rate: pass_rate(passed, total),
                    parts_tested: row.get(3)?,
                    batches_tested: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 操作员统计（测试量降序）
    pub fn operators(&self, bounds: &DateBounds) -> RepositoryResult<Vec<OperatorStats>> {
        let conn = self.get_conn()?;
        let fb = Self::bounds_filter(bounds);
        let sql = format!(
            r#"
            SELECT operator,
                   COUNT(*),
                   COALESCE(SUM(CASE WHEN {pass} THEN 1 ELSE 0 END), 0),
                   COUNT(DISTINCT part),
                   COUNT(DISTINCT part || char(31) || batch)
            FROM test_results
            {where_sql}
            GROUP BY operator
            ORDER BY COUNT(*) DESC, operator ASC
            "#,
            pass = PASS_EXPR,
            where_sql = fb.where_sql()
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(fb.args().iter()), |row| {
                let total: i64 = row.get(1)?;
                let passed: i64 = row.get(2)?;
                Ok(OperatorStats {
                    operator: row.get(0)?,
                    total_tests: total,
                    passed,
                    failed: total - passed,
                    pass_rate: pass_rate(passed, total),
                    parts_tested: row.get(3)?,
                    batches_completed: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 不合格数最多的零件
    pub fn top_failed_parts(
        &self,
        bounds: &DateBounds,
        limit: i64,
    ) -> RepositoryResult<Vec<TopFailedPart>> {
        let conn = self.get_conn()?;
        let mut fb = Self::bounds_filter(bounds);
        fb.push_arg(SqlValue::Integer(limit.max(1)));

        let sql = format!(
            r#"
            SELECT part,
                   COUNT(*),
                   COALESCE(SUM(CASE WHEN {pass} THEN 0 ELSE 1 END), 0) AS failed
            FROM test_results
            {where_sql}
            GROUP BY part
            HAVING failed > 0
            ORDER BY failed DESC, part ASC
            LIMIT ?
            "#,
            pass = PASS_EXPR,
            where_sql = fb.where_sql()
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(fb.args().iter()), |row| {
                let total: i64 = row.get(1)?;
                let failed: i64 = row.get(2)?;
                Ok(TopFailedPart {
                    part: row.get(0)?,
                    total_tests: total,
                    failed,
                    failure_rate: pass_rate(failed, total),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 最近活动（最后导入的组合在前）
    pub fn recent_activity(&self, limit: i64) -> RepositoryResult<Vec<RecentActivity>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT date, MAX(normalized_date), part, batch, operator, COUNT(*), MAX(created_at)
            FROM test_results
            GROUP BY part, batch, date, operator
            ORDER BY MAX(id) DESC
            LIMIT ?1
            "#,
        )?;
        let rows = stmt
            .query_map(params![limit.max(1)], |row| {
                Ok(RecentActivity {
                    date: row.get(0)?,
                    normalized_date: row.get(1)?,
                    part: row.get(2)?,
                    batch: row.get(3)?,
                    operator: row.get(4)?,
                    tests_run: row.get(5)?,
                    last_imported_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
