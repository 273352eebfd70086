// ==========================================
// Voltech 采集系统 - SQL 性能观测
// ==========================================
// 开关：
// - Debug 默认开启；Release 默认关闭
// - `VOLTECH_PERF_SQL=1` 强制开启 / `=0` 强制关闭
// - `VOLTECH_SLOW_SQL_MS=50` 慢 SQL 阈值（毫秒）
// ==========================================

use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

static PERF_SQL_ENABLED: AtomicBool = AtomicBool::new(false);
static SLOW_SQL_THRESHOLD_MS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    // 当前线程上活跃的 PerfGuard 层数；为 0 时不计数
    static GUARD_DEPTH: Cell<u32> = Cell::new(0);
    static STATEMENT_COUNT: Cell<u64> = Cell::new(0);
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

/// 为连接安装 trace/profile 回调
pub fn install_sqlite_tracing(conn: &mut Connection) {
    let enabled = env_flag("VOLTECH_PERF_SQL").unwrap_or(cfg!(debug_assertions));
    PERF_SQL_ENABLED.store(enabled, Ordering::Relaxed);

    if !enabled {
        conn.trace(None);
        conn.profile(None);
        return;
    }

    let slow_ms = std::env::var("VOLTECH_SLOW_SQL_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(if cfg!(debug_assertions) { 50 } else { 200 });
    SLOW_SQL_THRESHOLD_MS.store(slow_ms, Ordering::Relaxed);

    conn.trace(Some(on_statement));
    conn.profile(Some(on_profile));
}

fn on_statement(_sql: &str) {
    if GUARD_DEPTH.with(|d| d.get()) > 0 {
        STATEMENT_COUNT.with(|c| c.set(c.get().saturating_add(1)));
    }
}

fn on_profile(sql: &str, duration: Duration) {
    if !PERF_SQL_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let ms = duration.as_millis() as u64;
    let threshold = SLOW_SQL_THRESHOLD_MS.load(Ordering::Relaxed);
    if threshold > 0 && ms >= threshold {
        let compact: String = sql.split_whitespace().collect::<Vec<_>>().join(" ");
        let shown: String = compact.chars().take(400).collect();
        tracing::warn!(target: "slow_sql", duration_ms = ms, sql = %shown, "slow sql");
    }
}

/// 操作级耗时统计：drop 时输出 elapsed_ms + 本线程执行的 SQL 条数
///
/// ```ignore
/// let _perf = voltech_acquisition::perf::PerfGuard::new("query.search_tests");
/// ```
pub struct PerfGuard {
    op: &'static str,
    start: Instant,
    statements_before: u64,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        GUARD_DEPTH.with(|d| d.set(d.get().saturating_add(1)));
        Self {
            op,
            start: Instant::now(),
            statements_before: STATEMENT_COUNT.with(|c| c.get()),
        }
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        let statements = STATEMENT_COUNT
            .with(|c| c.get())
            .saturating_sub(self.statements_before);
        tracing::debug!(target: "perf", op = self.op, elapsed_ms, statements, "done");
        GUARD_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    }
}
