pub mod config;
pub mod error;
pub mod filter;
pub mod format;
pub mod markdown;
pub mod model;
pub mod remove;
pub mod scan;
pub mod size;
pub mod walk;

pub use config::{load_config, resolve_config, SweepConfig, CONFIG_ENV_VAR};
pub use error::ScanError;
pub use filter::{
    EntryClass, ExcludeMatcher, PathFilter, DEFAULT_SKIP_NAMES, DEFAULT_TARGET_NAMES,
};
pub use format::{format_size, parse_size, sum_formatted, GB_THRESHOLD};
pub use markdown::{render_clean_markdown, render_markdown_summary, status_label};
pub use model::{
    CleanOutcome, CleanStatus, CleanSummary, DiscoveredTarget, ProgressEvent, ProgressPhase,
    ScanMetrics, ScanReport, ScanWarning, ScanWarningKind, TargetOrder, REPORT_VERSION,
};
pub use remove::{clean, run_clean, run_clean_with_callback, CleanOptions};
pub use scan::{run_scan, run_scan_with_callback, scan, ScanOptions};
pub use size::{estimate_size, estimate_sizes, SizeEstimate};
pub use walk::{WalkEvent, Walker};
