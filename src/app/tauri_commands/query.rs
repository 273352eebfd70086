use crate::app::state::AppState;
use crate::domain::query::{BatchSearchFilter, DateBounds, TestSearchFilter};

use super::common::to_json;

// ==========================================
// 结果查询相关命令（只读，失败降级为空结果）
// ==========================================

// ===== 测试 =====

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_test(
    state: tauri::State<'_, AppState>,
    test_id: i64,
) -> Result<String, String> {
    to_json(&state.query_api.get_test(test_id))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_tests_by_serial(
    state: tauri::State<'_, AppState>,
    serial_num: String,
) -> Result<String, String> {
    to_json(&state.query_api.tests_by_serial(&serial_num))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_batch_tests(
    state: tauri::State<'_, AppState>,
    batch: String,
    part: Option<String>,
) -> Result<String, String> {
    to_json(&state.query_api.batch_tests(&batch, part.as_deref()))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn search_voltech_tests(
    state: tauri::State<'_, AppState>,
    filter: TestSearchFilter,
) -> Result<String, String> {
    to_json(&state.query_api.search_tests(&filter))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_failed_tests(
    state: tauri::State<'_, AppState>,
    part: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<String, String> {
    to_json(&state.query_api.failed_tests(part.as_deref(), limit, offset))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_batch_tests_by_time(
    state: tauri::State<'_, AppState>,
    batch: String,
    part: Option<String>,
) -> Result<String, String> {
    to_json(&state.query_api.batch_tests_by_time(&batch, part.as_deref()))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_batch_tests_grouped(
    state: tauri::State<'_, AppState>,
    batch: String,
    part: Option<String>,
) -> Result<String, String> {
    to_json(&state.query_api.batch_tests_grouped(&batch, part.as_deref()))
}

// ===== 批次 =====

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_batch_detail(
    state: tauri::State<'_, AppState>,
    batch: String,
    part: Option<String>,
) -> Result<String, String> {
    to_json(&state.query_api.batch_detail(&batch, part.as_deref()))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn search_voltech_batches(
    state: tauri::State<'_, AppState>,
    filter: BatchSearchFilter,
) -> Result<String, String> {
    to_json(&state.query_api.search_batches(&filter))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_recent_batches(
    state: tauri::State<'_, AppState>,
    part: String,
    limit: Option<i64>,
) -> Result<String, String> {
    to_json(&state.query_api.recent_batches_for_part(&part, limit))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_part_batches(
    state: tauri::State<'_, AppState>,
    part: String,
) -> Result<String, String> {
    to_json(&state.query_api.batches_for_part(&part))
}

// ===== 零件 =====

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_part_summary(
    state: tauri::State<'_, AppState>,
    part: String,
) -> Result<String, String> {
    to_json(&state.query_api.part_summary(&part))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn search_voltech_parts(
    state: tauri::State<'_, AppState>,
    search: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<String, String> {
    to_json(&state.query_api.list_parts(search.as_deref(), limit, offset))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_part_daily_stats(
    state: tauri::State<'_, AppState>,
    part: String,
    date_from: Option<String>,
    date_to: Option<String>,
) -> Result<String, String> {
    let bounds = DateBounds { date_from, date_to };
    to_json(&state.query_api.part_daily_stats(&part, &bounds))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_part_serial_numbers(
    state: tauri::State<'_, AppState>,
    part: String,
    limit: Option<i64>,
) -> Result<String, String> {
    to_json(&state.query_api.serial_numbers_for_part(&part, limit))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_parts_by_date_range(
    state: tauri::State<'_, AppState>,
    date_from: String,
    date_to: String,
) -> Result<String, String> {
    let bounds = DateBounds {
        date_from: Some(date_from),
        date_to: Some(date_to),
    };
    to_json(&state.query_api.parts_by_date_range(&bounds))
}

// ===== 统计 =====

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_overall_stats(
    state: tauri::State<'_, AppState>,
    date_from: Option<String>,
    date_to: Option<String>,
) -> Result<String, String> {
    let bounds = DateBounds { date_from, date_to };
    to_json(&state.query_api.overall_stats(&bounds))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_daily_stats(
    state: tauri::State<'_, AppState>,
    date_from: Option<String>,
    date_to: Option<String>,
    limit: Option<i64>,
) -> Result<String, String> {
    let bounds = DateBounds { date_from, date_to };
    to_json(&state.query_api.daily_stats(&bounds, limit))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_operator_stats(
    state: tauri::State<'_, AppState>,
    date_from: Option<String>,
    date_to: Option<String>,
) -> Result<String, String> {
    let bounds = DateBounds { date_from, date_to };
    to_json(&state.query_api.operator_stats(&bounds))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_top_failed_parts(
    state: tauri::State<'_, AppState>,
    date_from: Option<String>,
    date_to: Option<String>,
    limit: Option<i64>,
) -> Result<String, String> {
    let bounds = DateBounds { date_from, date_to };
    to_json(&state.query_api.top_failed_parts(&bounds, limit))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_recent_activity(
    state: tauri::State<'_, AppState>,
    limit: Option<i64>,
) -> Result<String, String> {
    to_json(&state.query_api.recent_activity(limit))
}

/// 仪表盘趋势（默认最近 30 个有测试的日期）
#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_trend_data(
    state: tauri::State<'_, AppState>,
    days: Option<i64>,
) -> Result<String, String> {
    to_json(&state.query_api.trend_data(days.unwrap_or(30)))
}
