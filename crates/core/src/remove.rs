use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use chrono::{SecondsFormat, Utc};
use rayon::prelude::*;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SweepConfig;
use crate::filter::PathFilter;
use crate::model::{CleanOutcome, CleanStatus, ProgressEvent, ProgressPhase};
use crate::size::estimate_size;

#[derive(Debug, Clone, Default)]
pub struct CleanOptions {
    pub paths: Vec<PathBuf>,
    pub config: SweepConfig,
    /// Measure each directory right before deleting it.
    pub measure_freed: bool,
    pub session_id: Option<String>,
    pub emit_progress_events: bool,
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

pub fn clean(paths: &[PathBuf]) -> Vec<CleanOutcome> {
    run_clean(&CleanOptions {
        paths: paths.to_vec(),
        ..CleanOptions::default()
    })
}

pub fn run_clean(options: &CleanOptions) -> Vec<CleanOutcome> {
    run_clean_with_callback(options, |_| {})
}

/// Deletes every requested directory independently. Returns exactly one
/// outcome per requested path, in request order, whatever happens to the
/// others.
pub fn run_clean_with_callback<F>(options: &CleanOptions, on_event: F) -> Vec<CleanOutcome>
where
    F: FnMut(ProgressEvent) + Send,
{
    let session_id = options
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    info!(
        "clean {} started for {} path(s)",
        session_id,
        options.paths.len()
    );

    let filter = options.config.path_filter();
    let cancel_flag = options.cancel_flag.as_deref();
    let sink = Mutex::new(EventSink {
        session_id: &session_id,
        enabled: options.emit_progress_events,
        seq: 0,
        done: 0,
        freed: 0,
        errors: 0,
        on_event,
    });

    let run = || -> Vec<CleanOutcome> {
        options
            .paths
            .par_iter()
            .map(|path| {
                let outcome = remove_target(path, &filter, options, cancel_flag);
                if let Ok(mut sink) = sink.lock() {
                    sink.record(&outcome);
                }
                outcome
            })
            .collect()
    };

    let outcomes = if options.config.clean_workers == 0 {
        run()
    } else {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(options.config.clean_workers)
            .build()
        {
            Ok(pool) => pool.install(run),
            Err(err) => {
                warn!("failed to build clean worker pool: {err}; using global pool");
                run()
            }
        }
    };

    if let Ok(mut sink) = sink.lock() {
        sink.finish();
    }

    let deleted = outcomes
        .iter()
        .filter(|outcome| outcome.status == CleanStatus::Deleted)
        .count();
    info!(
        "clean {} finished: {}/{} deleted",
        session_id,
        deleted,
        outcomes.len()
    );
    outcomes
}

struct EventSink<'a, F> {
    session_id: &'a str,
    enabled: bool,
    seq: u64,
    done: u64,
    freed: u64,
    errors: u64,
    on_event: F,
}

impl<F> EventSink<'_, F>
where
    F: FnMut(ProgressEvent),
{
    fn record(&mut self, outcome: &CleanOutcome) {
        self.done += 1;
        self.freed = self
            .freed
            .saturating_add(outcome.bytes_freed.unwrap_or(0));
        if matches!(
            outcome.status,
            CleanStatus::PermissionDenied | CleanStatus::OtherFailure
        ) {
            self.errors += 1;
        }
        self.emit(ProgressPhase::Cleaning, Some(outcome.path.clone()));
    }

    fn finish(&mut self) {
        self.emit(ProgressPhase::Done, None);
    }

    fn emit(&mut self, phase: ProgressPhase, current_path: Option<String>) {
        if !self.enabled {
            return;
        }
        self.seq += 1;
        (self.on_event)(ProgressEvent {
            seq: self.seq,
            session_id: self.session_id.to_string(),
            phase,
            current_path,
            targets_found: self.done,
            measured_bytes: self.freed,
            errors: self.errors,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });
    }
}

/// Revalidates `path` from scratch and deletes it. Nothing is assumed from
/// an earlier scan: the entry may have vanished or been replaced since.
fn remove_target(
    path: &Path,
    filter: &PathFilter,
    options: &CleanOptions,
    cancel_flag: Option<&AtomicBool>,
) -> CleanOutcome {
    if cancel_flag.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
        return outcome(
            path,
            CleanStatus::Cancelled,
            Some("request cancelled before this path was attempted".to_string()),
        );
    }

    if let Err(reason) = check_location(path, &options.config.allowed_roots) {
        warn!("refusing to delete {}: {}", path.display(), reason);
        return outcome(path, CleanStatus::OtherFailure, Some(reason));
    }

    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) => {
            let status = status_for(&err);
            return outcome(path, status, Some(err.to_string()));
        }
    };
    if metadata.file_type().is_symlink() {
        warn!("refusing to delete symbolic link {}", path.display());
        return outcome(
            path,
            CleanStatus::OtherFailure,
            Some("path is a symbolic link; links are never followed".to_string()),
        );
    }
    if !metadata.is_dir() {
        return outcome(
            path,
            CleanStatus::OtherFailure,
            Some("path is not a directory".to_string()),
        );
    }
    if options.config.require_target_name
        && !path
            .file_name()
            .is_some_and(|name| filter.is_target_name(name))
    {
        return outcome(
            path,
            CleanStatus::OtherFailure,
            Some("directory name is not a configured target name".to_string()),
        );
    }

    let (bytes_freed, detail) = if options.measure_freed {
        match measure_before_removal(path, cancel_flag) {
            Measured::Exact(bytes) => (Some(bytes), None),
            Measured::Partial(reason) => (None, Some(reason)),
            Measured::Cancelled => {
                return outcome(
                    path,
                    CleanStatus::Cancelled,
                    Some("request cancelled while measuring; nothing was deleted".to_string()),
                );
            }
        }
    } else {
        (None, None)
    };

    match fs::remove_dir_all(path) {
        Ok(()) => {
            info!("removed {}", path.display());
            CleanOutcome {
                bytes_freed,
                ..outcome(path, CleanStatus::Deleted, detail)
            }
        }
        Err(err) => {
            let status = status_for(&err);
            let still_present = fs::symlink_metadata(path).is_ok();
            let detail = match (status, still_present) {
                (CleanStatus::NotFound, false) => format!("vanished during deletion: {err}"),
                (_, true) => format!("deletion incomplete, directory still present: {err}"),
                (_, false) => format!("deletion reported an error: {err}"),
            };
            warn!("failed to remove {}: {}", path.display(), detail);
            outcome(path, status, Some(detail))
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Measured {
    Exact(u64),
    /// Some entries could not be read; the freed size is unknown.
    Partial(String),
    Cancelled,
}

fn measure_before_removal(path: &Path, cancel_flag: Option<&AtomicBool>) -> Measured {
    let estimate = estimate_size(path, cancel_flag);
    if !estimate.partial {
        return Measured::Exact(estimate.bytes);
    }
    if cancel_flag.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
        return Measured::Cancelled;
    }
    Measured::Partial(format!(
        "freed size unknown, measurement was partial: {}",
        estimate.errors.join("; ")
    ))
}

fn check_location(path: &Path, allowed_roots: &[PathBuf]) -> Result<(), String> {
    if !path.is_absolute() {
        return Err("path must be absolute".to_string());
    }
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return Err("path must not contain '..' components".to_string());
    }
    if !allowed_roots.is_empty()
        && !allowed_roots
            .iter()
            .any(|root| path.starts_with(root) && path != root.as_path())
    {
        return Err("path is outside every allowed root".to_string());
    }
    Ok(())
}

fn status_for(err: &io::Error) -> CleanStatus {
    match err.kind() {
        io::ErrorKind::NotFound => CleanStatus::NotFound,
        io::ErrorKind::PermissionDenied => CleanStatus::PermissionDenied,
        _ => CleanStatus::OtherFailure,
    }
}

fn outcome(path: &Path, status: CleanStatus, detail: Option<String>) -> CleanOutcome {
    CleanOutcome {
        path: path.to_string_lossy().to_string(),
        status,
        detail: with_lossy_path_note(path, detail),
        bytes_freed: None,
    }
}

/// Non-UTF-8 paths are reported lossily; say so instead of passing off the
/// rendering as the real path.
fn with_lossy_path_note(path: &Path, detail: Option<String>) -> Option<String> {
    if path.to_str().is_some() {
        return detail;
    }
    let note = "path is not valid UTF-8; the reported path is a lossy rendering";
    Some(match detail {
        Some(detail) => format!("{detail}; {note}"),
        None => note.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::{atomic::AtomicBool, Arc};

    use super::{
        check_location, clean, measure_before_removal, run_clean, run_clean_with_callback,
        with_lossy_path_note, CleanOptions, Measured,
    };
    use crate::config::SweepConfig;
    use crate::model::{CleanStatus, ProgressPhase};

    fn make_target(root: &Path, project: &str) -> PathBuf {
        let target = root.join(project).join("node_modules");
        fs::create_dir_all(target.join("pkg/lib")).expect("mkdir");
        fs::write(target.join("pkg/lib/index.js"), vec![1_u8; 64]).expect("write");
        target
    }

    #[test]
    fn deletes_and_reports_in_request_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = make_target(dir.path(), "a");
        let b = make_target(dir.path(), "b");
        let gone = dir.path().join("c/node_modules");

        let outcomes = clean(&[b.clone(), gone.clone(), a.clone()]);
        let statuses: Vec<_> = outcomes.iter().map(|outcome| outcome.status).collect();
        assert_eq!(
            statuses,
            vec![CleanStatus::Deleted, CleanStatus::NotFound, CleanStatus::Deleted]
        );
        assert_eq!(outcomes[1].path, gone.to_string_lossy());
        assert!(!a.exists());
        assert!(!b.exists());
        assert!(dir.path().join("a").exists());
    }

    #[test]
    fn file_is_rejected_without_deleting() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("node_modules");
        fs::write(&file, b"keep me").expect("write");

        let outcomes = clean(&[file.clone()]);
        assert_eq!(outcomes[0].status, CleanStatus::OtherFailure);
        assert_eq!(fs::read(&file).expect("still there"), b"keep me");
    }

    #[test]
    fn non_target_name_is_rejected_by_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("src");
        fs::create_dir_all(&src).expect("mkdir");

        let outcomes = clean(&[src.clone()]);
        assert_eq!(outcomes[0].status, CleanStatus::OtherFailure);
        assert!(src.exists());

        let options = CleanOptions {
            paths: vec![src.clone()],
            config: SweepConfig {
                require_target_name: false,
                ..SweepConfig::default()
            },
            ..CleanOptions::default()
        };
        assert_eq!(run_clean(&options)[0].status, CleanStatus::Deleted);
        assert!(!src.exists());
    }

    #[test]
    fn allowed_roots_are_enforced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inside = make_target(dir.path(), "inside/app");
        let outside = make_target(dir.path(), "outside/app");

        let options = CleanOptions {
            paths: vec![inside.clone(), outside.clone()],
            config: SweepConfig {
                allowed_roots: vec![dir.path().join("inside")],
                ..SweepConfig::default()
            },
            ..CleanOptions::default()
        };
        let outcomes = run_clean(&options);
        assert_eq!(outcomes[0].status, CleanStatus::Deleted);
        assert_eq!(outcomes[1].status, CleanStatus::OtherFailure);
        assert!(outside.exists());
    }

    #[test]
    fn location_checks() {
        assert!(check_location(Path::new("relative/node_modules"), &[]).is_err());
        assert!(check_location(Path::new("/a/../etc/node_modules"), &[]).is_err());
        assert!(check_location(Path::new("/a/node_modules"), &[PathBuf::from("/a")]).is_ok());
        assert!(check_location(Path::new("/a"), &[PathBuf::from("/a")]).is_err());
        assert!(check_location(Path::new("/ab/node_modules"), &[PathBuf::from("/a")]).is_err());
    }

    #[test]
    fn measures_freed_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = make_target(dir.path(), "app");

        let options = CleanOptions {
            paths: vec![target],
            measure_freed: true,
            emit_progress_events: true,
            ..CleanOptions::default()
        };
        let mut events = Vec::new();
        let outcomes = run_clean_with_callback(&options, |event| events.push(event));
        assert_eq!(outcomes[0].bytes_freed, Some(64));
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].phase, ProgressPhase::Cleaning);
        assert_eq!(events[1].phase, ProgressPhase::Done);
        assert_eq!(events[1].measured_bytes, 64);
    }

    #[test]
    fn cancelled_request_touches_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = make_target(dir.path(), "app");

        let options = CleanOptions {
            paths: vec![target.clone()],
            cancel_flag: Some(Arc::new(AtomicBool::new(true))),
            ..CleanOptions::default()
        };
        let outcomes = run_clean(&options);
        assert_eq!(outcomes[0].status, CleanStatus::Cancelled);
        assert!(target.exists());
    }

    #[test]
    fn cancellation_during_measurement_deletes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = make_target(dir.path(), "app");

        let flag = AtomicBool::new(true);
        assert_eq!(
            measure_before_removal(&target, Some(&flag)),
            Measured::Cancelled
        );
        assert!(target.join("pkg/lib/index.js").exists());

        let flag = AtomicBool::new(false);
        assert_eq!(
            measure_before_removal(&target, Some(&flag)),
            Measured::Exact(64)
        );
    }

    #[test]
    fn partial_measurement_is_not_reported_as_exact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gone = dir.path().join("gone/node_modules");

        match measure_before_removal(&gone, None) {
            Measured::Partial(reason) => assert!(reason.contains("partial")),
            other => panic!("expected a partial measurement, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_are_flagged_in_detail() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(b"/work/caf\xe9/node_modules"));
        let detail = with_lossy_path_note(path, Some("deleted".to_string()));
        assert!(detail
            .as_deref()
            .is_some_and(|detail| detail.starts_with("deleted; ") && detail.contains("UTF-8")));
        assert_eq!(
            with_lossy_path_note(Path::new("/work/cafe/node_modules"), None),
            None
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlink_is_rejected_and_target_kept() {
        let dir = tempfile::tempdir().expect("tempdir");
        let real = make_target(dir.path(), "real");
        let link_parent = dir.path().join("linked");
        fs::create_dir_all(&link_parent).expect("mkdir");
        let link = link_parent.join("node_modules");
        std::os::unix::fs::symlink(&real, &link).expect("symlink");

        let outcomes = clean(&[link.clone()]);
        assert_eq!(outcomes[0].status, CleanStatus::OtherFailure);
        assert!(real.join("pkg/lib/index.js").exists());
        assert!(fs::symlink_metadata(&link).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn permission_error_is_reported_not_hidden() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("tempdir");
        let target = make_target(dir.path(), "app");
        let locked = target.join("pkg/lib");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).expect("chmod");

        // Privileged users bypass directory permissions; nothing to observe.
        let probe = locked.join(".probe");
        if fs::write(&probe, b"").is_ok() {
            let _ = fs::remove_file(&probe);
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod");
            return;
        }

        let outcomes = clean(&[target.clone()]);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("chmod");

        assert_eq!(outcomes[0].status, CleanStatus::PermissionDenied);
        assert!(outcomes[0]
            .detail
            .as_deref()
            .is_some_and(|detail| detail.contains("still present")));
        assert!(target.exists());
    }
}
