pub mod service;

pub use service::{
    cancel_session, clean, forget_session, get_session, poll_session_events, scan, start_clean,
    start_scan, CancelSessionResponse, CleanRequest, CleanResponse, ScanRequest, SessionKind,
    SessionSnapshot, SessionStatus,
};
