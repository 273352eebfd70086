// ==========================================
// Voltech 采集系统 - 解析错误台账仓储
// ==========================================
// 表: parse_errors
// 红线:
// - 确认只做 acknowledged 0 -> 1，重复确认是空操作
// - 清理只删除 acknowledged = 1 的行
// ==========================================

use crate::domain::parse_error::{ErrorCounts, ErrorFilter, NewParseError, ParseError};
use crate::domain::types::{days_before, to_db_ts};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::sync::{Arc, Mutex};

/// 单次查询默认上限
pub const DEFAULT_ERROR_PAGE: i64 = 500;

pub struct ParseErrorRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ParseErrorRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入
    // ==========================================

    /// 追加一条台账
    pub fn append(&self, error: &NewParseError) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO parse_errors (file_path, error_message, line_number, timestamp, acknowledged)
            VALUES (?1, ?2, ?3, ?4, 0)
            "#,
            params![
                error.file_path,
                error.error_message,
                error.line_number,
                to_db_ts(Utc::now())
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 按 id 确认；返回本次实际翻转的行数
    pub fn acknowledge(&self, ids: &[i64]) -> RepositoryResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut changed = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE parse_errors SET acknowledged = 1 WHERE id = ?1 AND acknowledged = 0",
            )?;
            for id in ids {
                changed += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    /// 按文件确认
    pub fn acknowledge_by_file(&self, file_path: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE parse_errors SET acknowledged = 1 WHERE file_path = ?1 AND acknowledged = 0",
            params![file_path],
        )?;
        Ok(changed)
    }

    /// 清理已确认记录；older_than_days 为 None 时清理全部已确认
    pub fn clear_acknowledged(&self, older_than_days: Option<i64>) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let deleted = match older_than_days {
            Some(days) => {
                let cutoff = to_db_ts(days_before(Utc::now(), days.max(0)));
                conn.execute(
                    "DELETE FROM parse_errors WHERE acknowledged = 1 AND timestamp < ?1",
                    params![cutoff],
                )?
            }
            None => conn.execute("DELETE FROM parse_errors WHERE acknowledged = 1", [])?,
        };
        Ok(deleted)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 按条件分页查询（时间倒序）
    pub fn list(&self, filter: &ErrorFilter) -> RepositoryResult<Vec<ParseError>> {
        let conn = self.get_conn()?;

        let mut sql = String::from(
            r#"
            SELECT id, file_path, error_message, line_number, timestamp, acknowledged
            FROM parse_errors
            WHERE 1 = 1
            "#,
        );
        let mut args: Vec<SqlValue> = Vec::new();

        if let Some(ack) = filter.acknowledged {
            sql.push_str(" AND acknowledged = ?");
            args.push(SqlValue::Integer(ack as i64));
        }
        if let Some(path) = &filter.file_path {
            sql.push_str(" AND file_path = ?");
            args.push(SqlValue::Text(path.clone()));
        }
        if let Some(from) = &filter.date_from {
            sql.push_str(" AND substr(timestamp, 1, 10) >= ?");
            args.push(SqlValue::Text(from.clone()));
        }
        if let Some(to) = &filter.date_to {
            sql.push_str(" AND substr(timestamp, 1, 10) <= ?");
            args.push(SqlValue::Text(to.clone()));
        }

        sql.push_str(" ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?");
        args.push(SqlValue::Integer(filter.limit.unwrap_or(DEFAULT_ERROR_PAGE)));
        args.push(SqlValue::Integer(filter.offset.unwrap_or(0)));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 计数
    pub fn counts(&self) -> RepositoryResult<ErrorCounts> {
        let conn = self.get_conn()?;
        let counts = conn.query_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(CASE WHEN acknowledged = 0 THEN 1 ELSE 0 END), 0)
            FROM parse_errors
            "#,
            [],
            |row| {
                Ok(ErrorCounts {
                    total: row.get(0)?,
                    unacknowledged: row.get(1)?,
                })
            },
        )?;
        Ok(counts)
    }
}

fn map_row(row: &Row) -> rusqlite::Result<ParseError> {
    Ok(ParseError {
        id: row.get(0)?,
        file_path: row.get(1)?,
        error_message: row.get(2)?,
        line_number: row.get(3)?,
        timestamp: row.get(4)?,
        acknowledged: row.get::<_, i64>(5)? != 0,
    })
}
