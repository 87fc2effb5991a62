use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::filter::{PathFilter, DEFAULT_SKIP_NAMES, DEFAULT_TARGET_NAMES};

pub const CONFIG_ENV_VAR: &str = "MODSWEEP_CONFIG";

/// Engine settings shared by scans and cleans. Every field has a default so
/// a partial JSON file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepConfig {
    #[serde(default = "default_target_names")]
    pub target_names: Vec<String>,
    #[serde(default = "default_skip_names")]
    pub skip_names: Vec<String>,
    #[serde(default)]
    pub skip_hidden: bool,
    #[serde(default)]
    pub excludes: Vec<String>,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "default_workers")]
    pub size_workers: usize,
    #[serde(default = "default_workers")]
    pub clean_workers: usize,
    #[serde(default = "default_require_target_name")]
    pub require_target_name: bool,
    #[serde(default)]
    pub allowed_roots: Vec<PathBuf>,
}

fn default_target_names() -> Vec<String> {
    DEFAULT_TARGET_NAMES.iter().map(|name| name.to_string()).collect()
}

fn default_skip_names() -> Vec<String> {
    DEFAULT_SKIP_NAMES.iter().map(|name| name.to_string()).collect()
}

fn default_workers() -> usize {
    4
}

fn default_require_target_name() -> bool {
    true
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            target_names: default_target_names(),
            skip_names: default_skip_names(),
            skip_hidden: false,
            excludes: Vec::new(),
            max_depth: None,
            size_workers: default_workers(),
            clean_workers: default_workers(),
            require_target_name: default_require_target_name(),
            allowed_roots: Vec::new(),
        }
    }
}

impl SweepConfig {
    pub fn path_filter(&self) -> PathFilter {
        PathFilter::new(
            self.target_names.iter().cloned(),
            self.skip_names.iter().cloned(),
            self.skip_hidden,
        )
    }
}

pub fn load_config(path: impl AsRef<Path>) -> Result<SweepConfig> {
    let path = path.as_ref();
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: SweepConfig = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    if config.target_names.is_empty() {
        anyhow::bail!("config {} lists no target names", path.display());
    }
    Ok(config)
}

/// Explicit path first, then `MODSWEEP_CONFIG`, then built-in defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<SweepConfig> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match std::env::var_os(CONFIG_ENV_VAR) {
        Some(path) if !path.is_empty() => load_config(PathBuf::from(path)),
        _ => Ok(SweepConfig::default()),
    }
}
