use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

pub const DEFAULT_TARGET_NAMES: &[&str] = &["node_modules"];

/// Version-control metadata: never holds dependency caches and is expensive
/// to list on large repositories.
pub const DEFAULT_SKIP_NAMES: &[&str] = &[".git", ".hg", ".svn", ".bzr", "_darcs", ".jj"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryClass {
    Target,
    Skip,
    Descend,
}

#[derive(Debug, Clone)]
pub struct PathFilter {
    target_names: HashSet<String>,
    skip_names: HashSet<String>,
    skip_hidden: bool,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(
            DEFAULT_TARGET_NAMES.iter().map(|name| name.to_string()),
            DEFAULT_SKIP_NAMES.iter().map(|name| name.to_string()),
            false,
        )
    }
}

impl PathFilter {
    pub fn new<T, S>(target_names: T, skip_names: S, skip_hidden: bool) -> Self
    where
        T: IntoIterator<Item = String>,
        S: IntoIterator<Item = String>,
    {
        Self {
            target_names: target_names.into_iter().collect(),
            skip_names: skip_names.into_iter().collect(),
            skip_hidden,
        }
    }

    /// Classifies a single directory entry by name. Target names win over
    /// skip rules so a hidden target name is still reported.
    pub fn classify(&self, entry_name: &str, is_directory: bool) -> EntryClass {
        if !is_directory {
            return EntryClass::Descend;
        }
        if self.target_names.contains(entry_name) {
            return EntryClass::Target;
        }
        if self.skip_names.contains(entry_name) {
            return EntryClass::Skip;
        }
        if self.skip_hidden && entry_name.starts_with('.') && entry_name.len() > 1 {
            return EntryClass::Skip;
        }
        EntryClass::Descend
    }

    pub fn classify_os(&self, entry_name: &OsStr, is_directory: bool) -> EntryClass {
        self.classify(&entry_name.to_string_lossy(), is_directory)
    }

    pub fn is_target_name(&self, entry_name: &OsStr) -> bool {
        entry_name
            .to_str()
            .is_some_and(|name| self.target_names.contains(name))
    }
}

/// Path-level excludes: glob patterns, or plain substrings for patterns
/// without glob metacharacters.
pub struct ExcludeMatcher {
    globset: Option<GlobSet>,
    substrings: Vec<String>,
}

impl ExcludeMatcher {
    pub fn new(patterns: &[String], warnings: &mut Vec<String>) -> Self {
        if patterns.is_empty() {
            return Self::empty();
        }

        let mut builder = GlobSetBuilder::new();
        let mut substrings = Vec::new();
        for pattern in patterns {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }

            if is_plain_substring_pattern(pattern) {
                substrings.push(pattern.to_lowercase());
                continue;
            }

            match Glob::new(pattern) {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(err) => {
                    warnings.push(format!(
                        "invalid exclude glob '{pattern}': {err}; using substring fallback."
                    ));
                    substrings.push(pattern.to_lowercase());
                }
            }
        }

        let globset = match builder.build() {
            Ok(set) if !set.is_empty() => Some(set),
            Ok(_) => None,
            Err(err) => {
                warnings.push(format!(
                    "failed to compile exclude glob set: {err}; glob excludes disabled."
                ));
                None
            }
        };

        Self {
            globset,
            substrings,
        }
    }

    pub fn empty() -> Self {
        Self {
            globset: None,
            substrings: Vec::new(),
        }
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        if let Some(globset) = &self.globset {
            if globset.is_match(path) {
                return true;
            }
        }

        if self.substrings.is_empty() {
            return false;
        }

        let lowered = path.to_string_lossy().to_lowercase();
        self.substrings
            .iter()
            .any(|pattern| lowered.contains(pattern))
    }
}

fn is_plain_substring_pattern(pattern: &str) -> bool {
    !pattern
        .chars()
        .any(|ch| matches!(ch, '*' | '?' | '[' | ']' | '{' | '}'))
}
