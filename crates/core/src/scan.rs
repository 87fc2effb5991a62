use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SweepConfig;
use crate::error::ScanError;
use crate::filter::ExcludeMatcher;
use crate::format::format_size;
use crate::model::{
    DiscoveredTarget, ProgressEvent, ProgressPhase, ScanMetrics, ScanReport, ScanWarning,
    ScanWarningKind, TargetOrder, REPORT_VERSION,
};
use crate::size::{estimate_sizes, SizeEstimate};
use crate::walk::{WalkEvent, Walker};

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root: PathBuf,
    pub compute_sizes: bool,
    pub config: SweepConfig,
    pub order: TargetOrder,
    /// Drop measured targets holding zero bytes. Ignored without sizes.
    pub omit_empty: bool,
    pub scan_id: Option<String>,
    pub emit_progress_events: bool,
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            compute_sizes: false,
            config: SweepConfig::default(),
            order: TargetOrder::Traversal,
            omit_empty: false,
            scan_id: None,
            emit_progress_events: false,
            cancel_flag: None,
        }
    }
}

pub fn scan(root: impl Into<PathBuf>, compute_sizes: bool) -> Result<ScanReport, ScanError> {
    run_scan(&ScanOptions {
        root: root.into(),
        compute_sizes,
        ..ScanOptions::default()
    })
}

pub fn run_scan(options: &ScanOptions) -> Result<ScanReport, ScanError> {
    run_scan_with_callback(options, |_| {})
}

pub fn run_scan_with_callback<F>(
    options: &ScanOptions,
    mut on_event: F,
) -> Result<ScanReport, ScanError>
where
    F: FnMut(ProgressEvent),
{
    validate_scan_options(options)?;
    let root = validate_root(&options.root)?;
    let started = Instant::now();
    let scan_id = options
        .scan_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut progress = ProgressTracker::new(&scan_id, options.emit_progress_events);

    info!(
        "scan {} started at {} (sizes: {})",
        scan_id,
        root.display(),
        options.compute_sizes
    );

    let filter = options.config.path_filter();
    let mut exclude_warnings = Vec::new();
    let excludes = ExcludeMatcher::new(&options.config.excludes, &mut exclude_warnings);
    for warning in exclude_warnings {
        warn!("{warning}");
    }

    let mut warnings = Vec::new();
    let mut found = Vec::new();
    let mut walker = Walker::new(root.clone(), &filter)
        .excludes(&excludes)
        .max_depth(options.config.max_depth)
        .cancel_flag(options.cancel_flag.clone());

    for event in walker.by_ref() {
        match event {
            WalkEvent::Target(path) => {
                debug!("target {}", path.display());
                found.push(path);
                progress.emit(
                    &mut on_event,
                    ProgressPhase::Walking,
                    found.last().map(|path| path.to_string_lossy().to_string()),
                    found.len() as u64,
                    0,
                    warnings.len() as u64,
                );
            }
            WalkEvent::Unreadable { path, error } => warnings.push(ScanWarning {
                kind: ScanWarningKind::UnreadableSubtree,
                path: path.to_string_lossy().to_string(),
                message: error.to_string(),
            }),
            WalkEvent::Cancelled => warnings.push(ScanWarning {
                kind: ScanWarningKind::Cancelled,
                path: root.to_string_lossy().to_string(),
                message: "scan canceled while walking; report contains partial data".to_string(),
            }),
        }
    }

    let mut metrics = ScanMetrics {
        directories_visited: walker.directories_visited(),
        targets_found: found.len() as u64,
        unreadable_subtrees: warnings
            .iter()
            .filter(|warning| warning.kind == ScanWarningKind::UnreadableSubtree)
            .count() as u64,
        ..ScanMetrics::default()
    };

    let estimates: Option<Vec<SizeEstimate>> = if options.compute_sizes {
        progress.emit(
            &mut on_event,
            ProgressPhase::Sizing,
            None,
            found.len() as u64,
            0,
            warnings.len() as u64,
        );
        Some(estimate_sizes(
            &found,
            options.config.size_workers,
            options.cancel_flag.clone(),
        ))
    } else {
        None
    };

    let mut targets = Vec::with_capacity(found.len());
    let mut measured_bytes = 0_u64;
    for (index, path) in found.iter().enumerate() {
        let estimate = estimates.as_ref().map(|estimates| &estimates[index]);
        if let Some(estimate) = estimate {
            if options.omit_empty && estimate.bytes == 0 && !estimate.partial {
                continue;
            }
            metrics.files_measured += estimate.files;
            measured_bytes = measured_bytes.saturating_add(estimate.bytes);
            if estimate.partial {
                warnings.push(ScanWarning {
                    kind: ScanWarningKind::PartialSize,
                    path: path.to_string_lossy().to_string(),
                    message: estimate.errors.join("; "),
                });
            }
            progress.emit(
                &mut on_event,
                ProgressPhase::Sizing,
                Some(path.to_string_lossy().to_string()),
                found.len() as u64,
                measured_bytes,
                warnings.len() as u64,
            );
        }

        if path.to_str().is_none() {
            warnings.push(ScanWarning {
                kind: ScanWarningKind::NonUtf8Path,
                path: path.to_string_lossy().to_string(),
                message: "path is not valid UTF-8; cleaning the reported path will not find it"
                    .to_string(),
            });
        }

        targets.push(DiscoveredTarget {
            path: path.to_string_lossy().to_string(),
            display_name: display_name(&root, path),
            size_bytes: estimate.map(|estimate| estimate.bytes),
            size: estimate.map(|estimate| format_size(estimate.bytes)),
            size_partial: estimate.is_some_and(|estimate| estimate.partial),
        });
    }

    if options.order == TargetOrder::SizeDesc {
        targets.sort_by(|a, b| b.size_bytes.unwrap_or(0).cmp(&a.size_bytes.unwrap_or(0)));
    }

    let total_size_bytes = options.compute_sizes.then(|| {
        targets
            .iter()
            .filter_map(|target| target.size_bytes)
            .fold(0_u64, |acc, bytes| acc.saturating_add(bytes))
    });

    metrics.elapsed_ms = started.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
    let complete = warnings.is_empty();

    progress.emit(
        &mut on_event,
        ProgressPhase::Done,
        None,
        targets.len() as u64,
        total_size_bytes.unwrap_or(0),
        warnings.len() as u64,
    );

    info!(
        "scan {} finished: {} target(s), {} warning(s), {} ms",
        scan_id,
        targets.len(),
        warnings.len(),
        metrics.elapsed_ms
    );

    Ok(ScanReport {
        report_version: REPORT_VERSION.to_string(),
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        scan_id,
        root: root.to_string_lossy().to_string(),
        compute_sizes: options.compute_sizes,
        targets,
        total_size_bytes,
        total_size: total_size_bytes.map(format_size),
        complete,
        warnings,
        metrics,
    })
}

struct ProgressTracker<'a> {
    session_id: &'a str,
    enabled: bool,
    seq: u64,
}

impl<'a> ProgressTracker<'a> {
    fn new(session_id: &'a str, enabled: bool) -> Self {
        Self {
            session_id,
            enabled,
            seq: 0,
        }
    }

    fn emit<F>(
        &mut self,
        on_event: &mut F,
        phase: ProgressPhase,
        current_path: Option<String>,
        targets_found: u64,
        measured_bytes: u64,
        errors: u64,
    ) where
        F: FnMut(ProgressEvent),
    {
        if !self.enabled {
            return;
        }
        self.seq += 1;
        on_event(ProgressEvent {
            seq: self.seq,
            session_id: self.session_id.to_string(),
            phase,
            current_path,
            targets_found,
            measured_bytes,
            errors,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });
    }
}

fn validate_root(root: &Path) -> Result<PathBuf, ScanError> {
    if root.as_os_str().is_empty() {
        return Err(ScanError::InvalidRoot {
            path: root.to_path_buf(),
            reason: "path is empty".to_string(),
        });
    }
    let root = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|err| ScanError::InvalidRoot {
                path: root.to_path_buf(),
                reason: format!("cannot resolve relative path: {err}"),
            })?
            .join(root)
    };
    // drops `.` components so reported paths stay clean
    let root: PathBuf = root.components().collect();

    match fs::metadata(&root) {
        Ok(metadata) if metadata.is_dir() => Ok(root),
        Ok(_) => Err(ScanError::InvalidRoot {
            path: root,
            reason: "not a directory".to_string(),
        }),
        Err(err) => Err(ScanError::InvalidRoot {
            path: root,
            reason: err.to_string(),
        }),
    }
}

fn validate_scan_options(options: &ScanOptions) -> Result<(), ScanError> {
    if options.config.target_names.is_empty() {
        return Err(ScanError::InvalidOptions(
            "at least one target name is required".to_string(),
        ));
    }
    if options
        .config
        .target_names
        .iter()
        .any(|name| name.is_empty() || name.contains(|ch| ch == '/' || ch == '\\'))
    {
        return Err(ScanError::InvalidOptions(
            "target names must be plain directory names".to_string(),
        ));
    }
    Ok(())
}

/// `.../<parent>` for targets with a named parent, otherwise the path
/// relative to the root.
fn display_name(root: &Path, target: &Path) -> String {
    let parent = target
        .parent()
        .and_then(|parent| parent.file_name())
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    if parent.is_empty() {
        target
            .strip_prefix(root)
            .unwrap_or(target)
            .to_string_lossy()
            .to_string()
    } else {
        format!(".../{parent}")
    }
}
