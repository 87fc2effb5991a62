use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;

use anyhow::{anyhow, Context, Result};
use modsweep_core::{
    run_clean_with_callback, run_scan_with_callback, CleanOptions, CleanOutcome, CleanSummary,
    ProgressEvent, ScanOptions, ScanReport, SweepConfig, TargetOrder,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub root_path: PathBuf,
    #[serde(default)]
    pub compute_sizes: bool,
    #[serde(default)]
    pub config: SweepConfig,
    #[serde(default)]
    pub order: TargetOrder,
    #[serde(default)]
    pub omit_empty: bool,
    #[serde(default = "default_emit_progress_events")]
    pub emit_progress_events: bool,
    #[serde(default)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub paths: Vec<PathBuf>,
    #[serde(default)]
    pub config: SweepConfig,
    #[serde(default)]
    pub measure_freed: bool,
    #[serde(default = "default_emit_progress_events")]
    pub emit_progress_events: bool,
}

fn default_emit_progress_events() -> bool {
    true
}

impl ScanRequest {
    pub fn new(root_path: impl Into<PathBuf>, compute_sizes: bool) -> Self {
        Self {
            session_id: None,
            root_path: root_path.into(),
            compute_sizes,
            config: SweepConfig::default(),
            order: TargetOrder::Traversal,
            omit_empty: false,
            emit_progress_events: default_emit_progress_events(),
            output: None,
        }
    }

    fn into_options(self, cancel_flag: Option<Arc<AtomicBool>>) -> ScanOptions {
        ScanOptions {
            root: self.root_path,
            compute_sizes: self.compute_sizes,
            config: self.config,
            order: self.order,
            omit_empty: self.omit_empty,
            scan_id: self.session_id,
            emit_progress_events: self.emit_progress_events,
            cancel_flag,
        }
    }
}

impl CleanRequest {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            session_id: None,
            paths,
            config: SweepConfig::default(),
            measure_freed: false,
            emit_progress_events: default_emit_progress_events(),
        }
    }

    fn into_options(self, cancel_flag: Option<Arc<AtomicBool>>) -> CleanOptions {
        CleanOptions {
            paths: self.paths,
            config: self.config,
            measure_freed: self.measure_freed,
            session_id: self.session_id,
            emit_progress_events: self.emit_progress_events,
            cancel_flag,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanResponse {
    pub outcomes: Vec<CleanOutcome>,
    pub summary: CleanSummary,
}

impl CleanResponse {
    fn from_outcomes(outcomes: Vec<CleanOutcome>) -> Self {
        let summary = CleanSummary::from_outcomes(&outcomes);
        Self { outcomes, summary }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Scan,
    Clean,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub error: Option<String>,
    pub total_events: u64,
    pub report: Option<ScanReport>,
    pub clean: Option<CleanResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelSessionResponse {
    pub session_id: String,
    pub status: SessionStatus,
}

#[derive(Debug, Clone)]
struct Session {
    kind: SessionKind,
    status: SessionStatus,
    report: Option<ScanReport>,
    clean: Option<CleanResponse>,
    error: Option<String>,
    events: Vec<ProgressEvent>,
    cancel_flag: Arc<AtomicBool>,
}

static SESSIONS: Lazy<Mutex<HashMap<String, Session>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Runs a scan on the calling thread.
pub fn scan(request: ScanRequest) -> Result<ScanReport> {
    let output = request.output.clone();
    let report = run_scan_with_callback(&request.into_options(None), |_| {})?;
    if let Some(path) = output {
        write_report(&report, &path)?;
    }
    Ok(report)
}

/// Runs a clean on the calling thread. Never fails as a whole; failures are
/// per-path outcomes.
pub fn clean(request: CleanRequest) -> CleanResponse {
    let outcomes = run_clean_with_callback(&request.into_options(None), |_| {});
    CleanResponse::from_outcomes(outcomes)
}

pub fn start_scan(request: ScanRequest) -> Result<String> {
    let session_id = request
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let cancel_flag = register_session(&session_id, SessionKind::Scan)?;

    let thread_session_id = session_id.clone();
    let mut request = request;
    request.session_id = Some(session_id.clone());
    thread::spawn(move || {
        let output = request.output.clone();
        let options = request.into_options(Some(Arc::clone(&cancel_flag)));
        let run_result = run_scan_with_callback(&options, |event| {
            push_event(&thread_session_id, event);
        })
        .map_err(anyhow::Error::from)
        .and_then(|report| match &output {
            Some(path) => write_report(&report, path).map(|_| report),
            None => Ok(report),
        });

        match run_result {
            Ok(report) => finish_session(&thread_session_id, &cancel_flag, |session| {
                session.report = Some(report);
            }),
            Err(err) => fail_session(&thread_session_id, err.to_string()),
        }
    });

    info!("scan session {} started", session_id);
    Ok(session_id)
}

pub fn start_clean(request: CleanRequest) -> Result<String> {
    let session_id = request
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let cancel_flag = register_session(&session_id, SessionKind::Clean)?;

    let thread_session_id = session_id.clone();
    let mut request = request;
    request.session_id = Some(session_id.clone());
    thread::spawn(move || {
        let options = request.into_options(Some(Arc::clone(&cancel_flag)));
        let callback_session_id = thread_session_id.clone();
        let outcomes = run_clean_with_callback(&options, move |event| {
            push_event(&callback_session_id, event);
        });
        finish_session(&thread_session_id, &cancel_flag, |session| {
            session.clean = Some(CleanResponse::from_outcomes(outcomes));
        });
    });

    info!("clean session {} started", session_id);
    Ok(session_id)
}

pub fn poll_session_events(session_id: &str, from_seq: u64) -> Result<Vec<ProgressEvent>> {
    let sessions = lock_sessions()?;
    let session = sessions
        .get(session_id)
        .ok_or_else(|| anyhow!("session not found: {session_id}"))?;

    Ok(session
        .events
        .iter()
        .filter(|event| event.seq > from_seq)
        .cloned()
        .collect())
}

pub fn cancel_session(session_id: &str) -> Result<CancelSessionResponse> {
    let mut sessions = lock_sessions()?;
    let session = sessions
        .get_mut(session_id)
        .ok_or_else(|| anyhow!("session not found: {session_id}"))?;

    session.cancel_flag.store(true, Ordering::Relaxed);
    info!("cancel requested for session {}", session_id);

    Ok(CancelSessionResponse {
        session_id: session_id.to_string(),
        status: session.status,
    })
}

pub fn get_session(session_id: &str) -> Result<SessionSnapshot> {
    let sessions = lock_sessions()?;
    let session = sessions
        .get(session_id)
        .ok_or_else(|| anyhow!("session not found: {session_id}"))?;

    Ok(SessionSnapshot {
        session_id: session_id.to_string(),
        kind: session.kind,
        status: session.status,
        error: session.error.clone(),
        total_events: session.events.len() as u64,
        report: session.report.clone(),
        clean: session.clean.clone(),
    })
}

/// Drops a finished session from the registry. Running sessions are kept.
pub fn forget_session(session_id: &str) -> Result<bool> {
    let mut sessions = lock_sessions()?;
    match sessions.get(session_id) {
        Some(session) if session.status == SessionStatus::Running => Ok(false),
        Some(_) => Ok(sessions.remove(session_id).is_some()),
        None => Err(anyhow!("session not found: {session_id}")),
    }
}

fn register_session(session_id: &str, kind: SessionKind) -> Result<Arc<AtomicBool>> {
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let mut sessions = lock_sessions()?;
    if sessions
        .get(session_id)
        .is_some_and(|session| session.status == SessionStatus::Running)
    {
        return Err(anyhow!("session already running: {session_id}"));
    }
    sessions.insert(
        session_id.to_string(),
        Session {
            kind,
            status: SessionStatus::Running,
            report: None,
            clean: None,
            error: None,
            events: Vec::new(),
            cancel_flag: Arc::clone(&cancel_flag),
        },
    );
    Ok(cancel_flag)
}

fn push_event(session_id: &str, event: ProgressEvent) {
    if let Ok(mut sessions) = lock_sessions() {
        if let Some(session) = sessions.get_mut(session_id) {
            session.events.push(event);
        }
    }
}

fn finish_session<F>(session_id: &str, cancel_flag: &AtomicBool, store: F)
where
    F: FnOnce(&mut Session),
{
    if let Ok(mut sessions) = lock_sessions() {
        if let Some(session) = sessions.get_mut(session_id) {
            store(session);
            session.status = if cancel_flag.load(Ordering::Relaxed) {
                SessionStatus::Cancelled
            } else {
                SessionStatus::Completed
            };
            session.error = None;
        }
    }
}

fn fail_session(session_id: &str, error: String) {
    warn!("session {} failed: {}", session_id, error);
    if let Ok(mut sessions) = lock_sessions() {
        if let Some(session) = sessions.get_mut(session_id) {
            session.status = SessionStatus::Failed;
            session.error = Some(error);
        }
    }
}

fn write_report(report: &ScanReport, path: &Path) -> Result<()> {
    let payload =
        serde_json::to_string_pretty(report).context("failed to serialize report payload")?;
    fs::write(path, payload)
        .with_context(|| format!("failed to write report to {}", path.display()))
}

fn lock_sessions() -> Result<std::sync::MutexGuard<'static, HashMap<String, Session>>> {
    SESSIONS
        .lock()
        .map_err(|_| anyhow!("session registry lock poisoned"))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::{Duration, Instant};

    use modsweep_core::{CleanStatus, ProgressPhase};

    use super::{
        cancel_session, clean, forget_session, get_session, poll_session_events, scan,
        start_clean, start_scan, CleanRequest, ScanRequest, SessionKind, SessionSnapshot,
        SessionStatus,
    };

    fn wait_for(session_id: &str) -> SessionSnapshot {
        let started = Instant::now();
        loop {
            let snapshot = get_session(session_id).expect("session exists");
            if snapshot.status != SessionStatus::Running {
                return snapshot;
            }
            assert!(started.elapsed() < Duration::from_secs(30));
            std::thread::sleep(Duration::from_millis(25));
        }
    }

    #[test]
    fn start_scan_creates_session_and_events() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("app/node_modules/pkg")).expect("mkdir");
        fs::write(dir.path().join("app/node_modules/pkg/index.js"), b"1234").expect("write");

        let session_id =
            start_scan(ScanRequest::new(dir.path(), true)).expect("scan starts");
        let snapshot = wait_for(&session_id);

        assert_eq!(snapshot.kind, SessionKind::Scan);
        assert_eq!(snapshot.status, SessionStatus::Completed);
        let report = snapshot.report.expect("report stored");
        assert_eq!(report.scan_id, session_id);
        assert_eq!(report.total_size_bytes, Some(4));

        let events = poll_session_events(&session_id, 0).expect("events");
        assert!(events.iter().any(|event| event.phase == ProgressPhase::Done));
        let later = poll_session_events(&session_id, events[0].seq).expect("events");
        assert_eq!(later.len(), events.len() - 1);

        let cancel = cancel_session(&session_id).expect("cancel response");
        assert_eq!(cancel.session_id, session_id);
        assert!(forget_session(&session_id).expect("forget"));
        assert!(get_session(&session_id).is_err());
    }

    #[test]
    fn invalid_root_fails_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session_id = start_scan(ScanRequest::new(dir.path().join("missing"), false))
            .expect("session registers");
        let snapshot = wait_for(&session_id);
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert!(snapshot
            .error
            .as_deref()
            .is_some_and(|error| error.contains("invalid scan root")));
    }

    #[test]
    fn start_clean_stores_outcomes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("app/node_modules");
        fs::create_dir_all(&target).expect("mkdir");

        let session_id = start_clean(CleanRequest::new(vec![
            target.clone(),
            dir.path().join("gone/node_modules"),
        ]))
        .expect("clean starts");
        let snapshot = wait_for(&session_id);

        assert_eq!(snapshot.kind, SessionKind::Clean);
        let response = snapshot.clean.expect("outcomes stored");
        assert_eq!(response.summary.deleted, 1);
        assert_eq!(response.summary.not_found, 1);
        assert_eq!(response.outcomes[1].status, CleanStatus::NotFound);
        assert!(!target.exists());
    }

    #[test]
    fn synchronous_scan_then_clean() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("a/node_modules")).expect("mkdir");
        let output = dir.path().join("report.json");

        let mut request = ScanRequest::new(dir.path(), false);
        request.output = Some(output.clone());
        let report = scan(request).expect("scan succeeds");
        assert_eq!(report.targets.len(), 1);
        assert!(output.exists());

        let response = clean(CleanRequest::new(
            report.targets.iter().map(|target| target.path.clone().into()).collect(),
        ));
        assert_eq!(response.summary.deleted, 1);
        assert!(!response.summary.has_failures());
    }

    #[test]
    fn request_defaults_from_json() {
        let request: ScanRequest =
            serde_json::from_str(r#"{ "root_path": "/work" }"#).expect("parses");
        assert!(!request.compute_sizes);
        assert!(request.emit_progress_events);
        assert_eq!(request.config.target_names, vec!["node_modules".to_string()]);

        let request: CleanRequest =
            serde_json::from_str(r#"{ "paths": ["/work/a/node_modules"] }"#).expect("parses");
        assert_eq!(request.paths.len(), 1);
        assert!(request.config.require_target_name);
    }
}
