use serde::{Deserialize, Serialize};

pub const REPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanReport {
    pub report_version: String,
    pub generated_at: String,
    #[serde(default = "default_scan_id")]
    pub scan_id: String,
    pub root: String,
    pub compute_sizes: bool,
    pub targets: Vec<DiscoveredTarget>,
    #[serde(default)]
    pub total_size_bytes: Option<u64>,
    #[serde(default)]
    pub total_size: Option<String>,
    /// False when any subtree was unreadable, any size was partial, or the
    /// scan was cancelled before it finished.
    pub complete: bool,
    #[serde(default)]
    pub warnings: Vec<ScanWarning>,
    #[serde(default)]
    pub metrics: ScanMetrics,
}

fn default_scan_id() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveredTarget {
    pub path: String,
    pub display_name: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub size_partial: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanWarning {
    pub kind: ScanWarningKind,
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ScanWarningKind {
    UnreadableSubtree,
    PartialSize,
    Cancelled,
    /// The target path is not valid UTF-8 and is reported lossily.
    NonUtf8Path,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ScanMetrics {
    #[serde(default)]
    pub elapsed_ms: u64,
    #[serde(default)]
    pub directories_visited: u64,
    #[serde(default)]
    pub targets_found: u64,
    #[serde(default)]
    pub unreadable_subtrees: u64,
    #[serde(default)]
    pub files_measured: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetOrder {
    /// Depth-first discovery order, entries sorted by name at each level.
    #[default]
    Traversal,
    /// Largest first; ties keep discovery order.
    SizeDesc,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CleanOutcome {
    pub path: String,
    pub status: CleanStatus,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub bytes_freed: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CleanStatus {
    Deleted,
    NotFound,
    PermissionDenied,
    OtherFailure,
    /// Never attempted because the request was cancelled first.
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CleanSummary {
    pub requested: u64,
    pub deleted: u64,
    pub not_found: u64,
    pub permission_denied: u64,
    pub other_failure: u64,
    pub cancelled: u64,
    pub bytes_freed: u64,
}

impl CleanSummary {
    pub fn from_outcomes(outcomes: &[CleanOutcome]) -> Self {
        let mut summary = Self {
            requested: outcomes.len() as u64,
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome.status {
                CleanStatus::Deleted => summary.deleted += 1,
                CleanStatus::NotFound => summary.not_found += 1,
                CleanStatus::PermissionDenied => summary.permission_denied += 1,
                CleanStatus::OtherFailure => summary.other_failure += 1,
                CleanStatus::Cancelled => summary.cancelled += 1,
            }
            if let Some(bytes) = outcome.bytes_freed {
                summary.bytes_freed = summary.bytes_freed.saturating_add(bytes);
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.permission_denied > 0 || self.other_failure > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    pub seq: u64,
    pub session_id: String,
    pub phase: ProgressPhase,
    pub current_path: Option<String>,
    pub targets_found: u64,
    pub measured_bytes: u64,
    pub errors: u64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    Walking,
    Sizing,
    Cleaning,
    Done,
}

#[cfg(test)]
mod tests {
    use super::{CleanOutcome, CleanStatus, CleanSummary, ScanReport};

    #[test]
    fn summary_counts_each_status() {
        let outcome = |status, bytes| CleanOutcome {
            path: "/tmp/x/node_modules".to_string(),
            status,
            detail: None,
            bytes_freed: bytes,
        };
        let summary = CleanSummary::from_outcomes(&[
            outcome(CleanStatus::Deleted, Some(10)),
            outcome(CleanStatus::Deleted, Some(5)),
            outcome(CleanStatus::NotFound, None),
            outcome(CleanStatus::PermissionDenied, None),
            outcome(CleanStatus::Cancelled, None),
        ]);

        assert_eq!(summary.requested, 5);
        assert_eq!(summary.deleted, 2);
        assert_eq!(summary.not_found, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.bytes_freed, 15);
        assert!(summary.has_failures());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&CleanStatus::PermissionDenied).expect("serializes");
        assert_eq!(json, "\"permission_denied\"");
    }

    #[test]
    fn report_defaults_optional_fields() {
        let report: ScanReport = serde_json::from_str(
            r#"{
                "report_version": "1.0.0",
                "generated_at": "2024-01-01T00:00:00Z",
                "root": "/work",
                "compute_sizes": false,
                "targets": [{"path": "/work/app/node_modules", "display_name": ".../app"}],
                "complete": true
            }"#,
        )
        .expect("report parses");

        assert_eq!(report.scan_id, "unknown");
        assert_eq!(report.total_size_bytes, None);
        assert_eq!(report.targets[0].size_bytes, None);
        assert!(report.warnings.is_empty());
    }
}
