use crate::app::state::AppState;

use super::common::{map_api_error, to_json};

// ==========================================
// 设置相关命令
// ==========================================

#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_settings(state: tauri::State<'_, AppState>) -> Result<String, String> {
    let settings = state.settings_api.get_settings().map_err(map_api_error)?;
    to_json(&settings)
}

#[tauri::command(rename_all = "snake_case")]
pub async fn get_all_voltech_settings(
    state: tauri::State<'_, AppState>,
) -> Result<String, String> {
    to_json(&state.settings_api.list_settings())
}

#[tauri::command(rename_all = "snake_case")]
pub async fn set_voltech_setting(
    state: tauri::State<'_, AppState>,
    key: String,
    value: String,
) -> Result<String, String> {
    state
        .settings_api
        .set_setting(&key, &value)
        .map_err(map_api_error)?;
    to_json(&serde_json::json!({ "key": key, "updated": true }))
}

#[tauri::command(rename_all = "snake_case")]
pub async fn delete_voltech_setting(
    state: tauri::State<'_, AppState>,
    key: String,
) -> Result<String, String> {
    let existed = state
        .settings_api
        .delete_setting(&key)
        .map_err(map_api_error)?;
    to_json(&serde_json::json!({ "key": key, "deleted": existed }))
}

/// 特权操作审计记录
#[tauri::command(rename_all = "snake_case")]
pub async fn get_voltech_action_log(
    state: tauri::State<'_, AppState>,
    action_type: Option<String>,
    limit: Option<i64>,
) -> Result<String, String> {
    to_json(&state.settings_api.action_log(action_type.as_deref(), limit))
}
