use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a whole scan request. Problems inside the tree are
/// reported as warnings on the report instead.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid scan root {}: {reason}", path.display())]
    InvalidRoot { path: PathBuf, reason: String },
    #[error("invalid scan options: {0}")]
    InvalidOptions(String),
}
