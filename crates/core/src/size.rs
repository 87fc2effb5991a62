use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeEstimate {
    pub bytes: u64,
    pub files: u64,
    /// Set when some entry could not be read or the estimate was cut short
    /// by cancellation; `bytes` then undercounts.
    pub partial: bool,
    pub errors: Vec<String>,
}

/// Sums the sizes of regular files under `path` without following symbolic
/// links. Unreadable entries contribute zero and mark the estimate partial.
pub fn estimate_size(path: &Path, cancel_flag: Option<&AtomicBool>) -> SizeEstimate {
    let mut estimate = SizeEstimate::default();

    for item in WalkDir::new(path).follow_links(false) {
        if cancel_flag.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            estimate.partial = true;
            estimate
                .errors
                .push(format!("size of {} cut short by cancellation", path.display()));
            break;
        }

        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                estimate.partial = true;
                estimate.errors.push(err.to_string());
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        match entry.metadata() {
            Ok(metadata) => {
                estimate.bytes = estimate.bytes.saturating_add(metadata.len());
                estimate.files += 1;
            }
            Err(err) => {
                estimate.partial = true;
                estimate.errors.push(format!(
                    "metadata read failed for {}: {}",
                    entry.path().display(),
                    err
                ));
            }
        }
    }

    if estimate.partial {
        warn!(
            "partial size for {} ({} error(s))",
            path.display(),
            estimate.errors.len()
        );
    } else {
        debug!("{}: {} bytes in {} file(s)", path.display(), estimate.bytes, estimate.files);
    }
    estimate
}

/// Measures independent targets on a bounded pool. Results are returned in
/// the order of `paths`. `workers == 0` uses rayon's global pool.
pub fn estimate_sizes(
    paths: &[PathBuf],
    workers: usize,
    cancel_flag: Option<Arc<AtomicBool>>,
) -> Vec<SizeEstimate> {
    let flag = cancel_flag.as_deref();
    let measure = || -> Vec<SizeEstimate> {
        paths
            .par_iter()
            .map(|path| estimate_size(path, flag))
            .collect()
    };

    if workers == 0 {
        return measure();
    }

    match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
        Ok(pool) => pool.install(measure),
        Err(err) => {
            warn!("failed to build size worker pool: {err}; using global pool");
            measure()
        }
    }
}
