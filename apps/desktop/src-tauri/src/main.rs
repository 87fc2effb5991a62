#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::path::PathBuf;

use modsweep_core::{ProgressEvent, ScanReport};
use modsweep_service::{
    cancel_session as service_cancel_session, clean as service_clean,
    get_session as service_get_session, poll_session_events as service_poll_session_events,
    scan as service_scan, start_clean as service_start_clean, start_scan as service_start_scan,
    CancelSessionResponse, CleanRequest, CleanResponse, ScanRequest, SessionSnapshot,
};

#[tauri::command]
async fn scan_node_modules(base_dir: String, calculate_size: bool) -> Result<ScanReport, String> {
    service_scan(ScanRequest::new(base_dir, calculate_size)).map_err(|err| err.to_string())
}

#[tauri::command]
async fn clean_node_modules(paths: Vec<String>) -> Result<CleanResponse, String> {
    let request = CleanRequest::new(paths.into_iter().map(PathBuf::from).collect());
    Ok(service_clean(request))
}

#[tauri::command]
fn start_scan(request: ScanRequest) -> Result<String, String> {
    service_start_scan(request).map_err(|err| err.to_string())
}

#[tauri::command]
fn start_clean(request: CleanRequest) -> Result<String, String> {
    service_start_clean(request).map_err(|err| err.to_string())
}

#[tauri::command]
fn poll_session_events(session_id: String, from_seq: u64) -> Result<Vec<ProgressEvent>, String> {
    service_poll_session_events(&session_id, from_seq).map_err(|err| err.to_string())
}

#[tauri::command]
fn get_session(session_id: String) -> Result<SessionSnapshot, String> {
    service_get_session(&session_id).map_err(|err| err.to_string())
}

#[tauri::command]
fn cancel_session(session_id: String) -> Result<CancelSessionResponse, String> {
    service_cancel_session(&session_id).map_err(|err| err.to_string())
}

fn main() {
    tauri::Builder::default()
        .invoke_handler(tauri::generate_handler![
            scan_node_modules,
            clean_node_modules,
            start_scan,
            start_clean,
            poll_session_events,
            get_session,
            cancel_session,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
