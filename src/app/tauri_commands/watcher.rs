use crate::app::state::AppState;

use super::common::{map_api_error, to_json};

// ==========================================
// 监听控制相关命令
// ==========================================

#[tauri::command(rename_all = "snake_case")]
pub async fn start_voltech_watcher(state: tauri::State<'_, AppState>) -> Result<String, String> {
    let status = state.watcher_api.start().await.map_err(map_api_error)?;
    to_json(&status)
}

#[tauri::command(rename_all = "snake_case")]
pub async fn stop_voltech_watcher(state: tauri::State<'_, AppState>) -> Result<String, String> {
    let status = state.watcher_api.stop().await.map_err(map_api_error)?;
    to_json(&status)
}

#[tauri::command(rename_all = "snake_case")]
pub async fn pause_voltech_watcher(state: tauri::State<'_, AppState>) -> Result<String, String> {
    let status = state.watcher_api.pause().await.map_err(map_api_error)?;
    to_json(&status)
}

#[tauri::command(rename_all = "snake_case")]
pub async fn resume_voltech_watcher(state: tauri::State<'_, AppState>) -> Result<String, String> {
    let status = state.watcher_api.resume().await.map_err(map_api_error)?;
    to_json(&status)
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_watcher_status(
    state: tauri::State<'_, AppState>,
) -> Result<String, String> {
    let status = state.watcher_api.status().map_err(map_api_error)?;
    to_json(&status)
}

/// 强制接管 master（管理员）
#[tauri::command(rename_all = "snake_case")]
pub async fn force_acquire_voltech_master(
    state: tauri::State<'_, AppState>,
) -> Result<String, String> {
    let status = state
        .watcher_api
        .force_acquire()
        .await
        .map_err(map_api_error)?;
    to_json(&status)
}

// ==========================================
// 批量导入
// ==========================================

/// 按日期区间导入（YYYY-MM-DD）
#[tauri::command(rename_all = "snake_case")]
pub async fn import_voltech_files(
    state: tauri::State<'_, AppState>,
    start_date: String,
    end_date: String,
) -> Result<String, String> {
    let outcome = state
        .watcher_api
        .import_range(&start_date, &end_date)
        .await
        .map_err(map_api_error)?;
    to_json(&outcome)
}

#[tauri::command(rename_all = "snake_case")]
pub async fn full_import_voltech_files(
    state: tauri::State<'_, AppState>,
) -> Result<String, String> {
    let outcome = state
        .watcher_api
        .full_import()
        .await
        .map_err(map_api_error)?;
    to_json(&outcome)
}

#[tauri::command(rename_all = "snake_case")]
pub async fn run_voltech_maintenance_scan(
    state: tauri::State<'_, AppState>,
    days: Option<i64>,
) -> Result<String, String> {
    let outcome = state
        .watcher_api
        .maintenance_scan(days.unwrap_or(30))
        .await
        .map_err(map_api_error)?;
    to_json(&outcome)
}

// ==========================================
// 租约诊断
// ==========================================

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_lock_status(state: tauri::State<'_, AppState>) -> Result<String, String> {
    let lease = state.watcher_api.lock_status().map_err(map_api_error)?;
    to_json(&lease)
}

#[tauri::command(rename_all = "snake_case")]
pub async fn force_release_voltech_lock(
    state: tauri::State<'_, AppState>,
) -> Result<String, String> {
    let released = state
        .watcher_api
        .force_release_lock()
        .map_err(map_api_error)?;
    to_json(&released)
}
