// ==========================================
// Voltech 采集系统 - Tauri 主入口
// ==========================================
// 技术栈: Tauri + Rust + SQLite
// 事件桥接: WatcherEvent（进程内广播）-> 前端 emit_all
// ==========================================

// 禁止控制台窗口 (Windows)
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use voltech_acquisition::app::{get_default_db_path, AppState};
use voltech_acquisition::logging;

#[cfg(feature = "tauri-app")]
fn main() {
    use tauri::Manager;
    use tokio::sync::broadcast::error::RecvError;
    use voltech_acquisition::app::tauri_commands::*;

    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", voltech_acquisition::APP_NAME);
    tracing::info!("系统版本: {}", voltech_acquisition::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let app_state = match AppState::new(db_path) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "无法初始化AppState");
            std::process::exit(1);
        }
    };
    let events = app_state.events.clone();

    let app = tauri::Builder::default()
        .manage(app_state)
        .setup(move |app| {
            // 事件桥接：落后时丢弃旧快照，只保留最新
            let handle = app.handle();
            let mut rx = events.subscribe();
            tauri::async_runtime::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            if let Err(e) = handle.emit_all(event.event_name(), event.payload()) {
                                tracing::warn!(event = event.event_name(), error = %e, "emit_all failed");
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "前端事件桥接落后，跳过旧事件");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            });
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // ==========================================
            // 监听控制
            // ==========================================
            start_voltech_watcher,
            stop_voltech_watcher,
            pause_voltech_watcher,
            resume_voltech_watcher,
            get_voltech_watcher_status,
            force_acquire_voltech_master,

            // ==========================================
            // 批量导入
            // ==========================================
            import_voltech_files,
            full_import_voltech_files,
            run_voltech_maintenance_scan,

            // ==========================================
            // 租约诊断
            // ==========================================
            get_voltech_lock_status,
            force_release_voltech_lock,

            // ==========================================
            // 设置
            // ==========================================
            get_voltech_settings,
            set_voltech_setting,
            delete_voltech_setting,
            get_all_voltech_settings,
            get_voltech_action_log,

            // ==========================================
            // 解析错误台账
            // ==========================================
            get_voltech_errors,
            get_voltech_error_counts,
            acknowledge_voltech_errors,
            acknowledge_file_errors,
            clear_acknowledged_voltech_errors,

            // ==========================================
            // 结果查询
            // ==========================================
            get_voltech_test,
            get_voltech_tests_by_serial,
            get_voltech_batch_tests,
            get_voltech_batch_tests_by_time,
            get_voltech_batch_tests_grouped,
            search_voltech_tests,
            get_voltech_failed_tests,
            get_voltech_batch_detail,
            search_voltech_batches,
            get_voltech_recent_batches,
            get_voltech_part_batches,
            get_voltech_part_summary,
            search_voltech_parts,
            get_voltech_part_daily_stats,
            get_voltech_part_serial_numbers,
            get_voltech_parts_by_date_range,
            get_voltech_overall_stats,
            get_voltech_daily_stats,
            get_voltech_operator_stats,
            get_voltech_top_failed_parts,
            get_voltech_recent_activity,
            get_voltech_trend_data,
        ])
        .build(tauri::generate_context!());

    let app = match app {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "启动Tauri应用失败");
            std::process::exit(1);
        }
    };

    app.run(|handle, event| {
        if let tauri::RunEvent::Exit = event {
            // 退出前停止监听并释放租约，其他客户端无需等待过期
            let state = handle.state::<AppState>();
            if let Err(e) = tauri::async_runtime::block_on(state.watcher.stop()) {
                tracing::warn!(error = %e, "退出时停止监听失败");
            }
            tracing::info!("Tauri应用已退出");
        }
    });
}

#[cfg(not(feature = "tauri-app"))]
fn main() {
    logging::init();

    println!("==================================================");
    println!("{}", voltech_acquisition::APP_NAME);
    println!("系统版本: {}", voltech_acquisition::VERSION);
    println!("==================================================");
    println!();

    let db_path = get_default_db_path();
    match AppState::new(db_path.clone()) {
        Ok(state) => {
            println!("数据库: {}", db_path);
            match state.settings_api.get_settings() {
                Ok(settings) => println!(
                    "数据源目录: {}",
                    settings.server_path.as_deref().unwrap_or("(未配置)")
                ),
                Err(e) => println!("读取设置失败: {}", e),
            }
        }
        Err(e) => println!("初始化失败: {}", e),
    }

    println!();
    println!("此可执行文件需要启用 tauri-app 特性");
    println!("使用: cargo run --features tauri-app");
}
