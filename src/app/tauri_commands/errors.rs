use crate::app::state::AppState;
use crate::domain::parse_error::ErrorFilter;

use super::common::{map_api_error, to_json};

// ==========================================
// 解析错误台账相关命令
// ==========================================

/// 查询台账（日期为 YYYY-MM-DD）
#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_errors(
    state: tauri::State<'_, AppState>,
    acknowledged: Option<bool>,
    date_from: Option<String>,
    date_to: Option<String>,
    file_path: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<String, String> {
    let filter = ErrorFilter {
        acknowledged,
        date_from,
        date_to,
        file_path,
        limit,
        offset,
    };
    to_json(&state.error_ledger_api.list_errors(&filter))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_error_counts(
    state: tauri::State<'_, AppState>,
) -> Result<String, String> {
    to_json(&state.error_ledger_api.counts())
}

#[tauri::command(rename_all = "snake_case")]
pub async fn acknowledge_voltech_errors(
    state: tauri::State<'_, AppState>,
    error_ids: Vec<i64>,
) -> Result<String, String> {
    let changed = state
        .error_ledger_api
        .acknowledge(&error_ids)
        .map_err(map_api_error)?;
    to_json(&serde_json::json!({ "acknowledged": changed }))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn acknowledge_file_errors(
    state: tauri::State<'_, AppState>,
    file_path: String,
) -> Result<String, String> {
    let changed = state
        .error_ledger_api
        .acknowledge_by_file(&file_path)
        .map_err(map_api_error)?;
    to_json(&serde_json::json!({ "acknowledged": changed }))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn clear_acknowledged_voltech_errors(
    state: tauri::State<'_, AppState>,
    older_than_days: Option<i64>,
) -> Result<String, String> {
    let deleted = state
        .error_ledger_api
        .clear_acknowledged(older_than_days)
        .map_err(map_api_error)?;
    to_json(&serde_json::json!({ "deleted": deleted }))
}
