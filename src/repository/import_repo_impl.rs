// ==========================================
// Voltech 采集系统 - 导入 Repository 实现
// ==========================================
// 职责: 实现导入相关数据访问（rusqlite）
// 幂等: test_results 以 (file_path, result_num) 去重，ON CONFLICT DO NOTHING
//       parse_errors 以 (file_path, line_number, error_message) 去重
// ==========================================

use crate::domain::lease::ProcessedFile;
use crate::domain::parse_error::NewParseError;
use crate::domain::test_result::TestRecord;
use crate::domain::types::{to_db_ts, ProcessedStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_repo::{CommitSummary, FileCommit, ImportRepository};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct SqliteImportRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteImportRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 在事务中插入测试记录，返回实际插入行数
    fn insert_records_tx(
        tx: &Transaction,
        records: &[TestRecord],
        created_at: &str,
    ) -> RepositoryResult<usize> {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO test_results (
                file_path, result_num, part, operator, batch, date, normalized_date,
                serial_num, pass_fail, time, retries, measurements, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(file_path, result_num) DO NOTHING
            "#,
        )?;

        let mut inserted = 0;
        for r in records {
            let measurements = serde_json::Value::Object(r.measurements.clone()).to_string();
            inserted += stmt.execute(params![
                r.file_path,
                r.result_num,
                r.part,
                r.operator,
                r.batch,
                r.date,
                r.normalized_date.map(|d| d.format("%Y-%m-%d").to_string()),
                r.serial_num,
                r.pass_fail,
                r.time,
                r.retries,
                measurements,
                created_at,
            ])?;
        }
        Ok(inserted)
    }

    /// 在事务中追加台账，返回实际新增条数
    ///
    /// 文件被追加后会整体重新解析，已记录过的同一行同一错误不再追加（已确认的也算）
    fn append_errors_tx(
        tx: &Transaction,
        errors: &[NewParseError],
        timestamp: &str,
    ) -> RepositoryResult<usize> {
        let mut stmt = tx.prepare(
            r#"
            INSERT INTO parse_errors (file_path, error_message, line_number, timestamp, acknowledged)
            SELECT ?1, ?2, ?3, ?4, 0
            WHERE NOT EXISTS (
                SELECT 1 FROM parse_errors
                WHERE file_path = ?1 AND line_number IS ?3 AND error_message = ?2
            )
            "#,
        )?;
        let mut appended = 0;
        for e in errors {
            appended += stmt.execute(params![e.file_path, e.error_message, e.line_number, timestamp])?;
        }
        Ok(appended)
    }
}

impl ImportRepository for SqliteImportRepository {
    fn get_processed(&self, file_path: &str) -> RepositoryResult<Option<ProcessedFile>> {
        let conn = self.get_conn()?;
        let pf = conn
            .query_row(
                r#"
                SELECT file_path, file_size, file_modified, record_count, status, processed_at
                FROM processed_files WHERE file_path = ?1
                "#,
                params![file_path],
                |row| {
                    let status: String = row.get(4)?;
                    Ok(ProcessedFile {
                        file_path: row.get(0)?,
                        file_size: row.get(1)?,
                        file_modified: row.get(2)?,
                        record_count: row.get(3)?,
                        status: ProcessedStatus::parse(&status),
                        processed_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(pf)
    }

    fn processed_index(&self) -> RepositoryResult<HashMap<String, (i64, i64)>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT file_path, file_size, file_modified FROM processed_files")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, (row.get(1)?, row.get(2)?)))
        })?;

        let mut index = HashMap::new();
        for row in rows {
            let (path, meta) = row?;
            index.insert(path, meta);
        }
        Ok(index)
    }

    fn commit_file(&self, commit: &FileCommit<'_>) -> RepositoryResult<CommitSummary> {
        let mut conn = self.get_conn()?;
        let now = to_db_ts(Utc::now());

        let tx = conn.transaction()?;
        let records_added = Self::insert_records_tx(&tx, commit.records, &now)?;
        let errors_appended = Self::append_errors_tx(&tx, commit.errors, &now)?;

        tx.execute(
            r#"
            INSERT INTO processed_files (
                file_path, file_size, file_modified, record_count, status, processed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(file_path) DO UPDATE SET
                file_size = excluded.file_size,
                file_modified = excluded.file_modified,
                record_count = excluded.record_count,
                status = excluded.status,
                processed_at = excluded.processed_at
            "#,
            params![
                commit.file_path,
                commit.file_size,
                commit.file_modified,
                commit.records.len() as i64,
                commit.status.as_str(),
                now,
            ],
        )?;
        tx.commit()?;

        Ok(CommitSummary {
            records_added,
            errors_appended,
        })
    }
}
