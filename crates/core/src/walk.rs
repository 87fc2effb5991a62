use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tracing::{debug, warn};

use crate::filter::{EntryClass, ExcludeMatcher, PathFilter};

#[derive(Debug)]
pub enum WalkEvent {
    /// A target directory. Its contents are never visited.
    Target(PathBuf),
    /// A directory (or a single entry of one) that could not be listed. The
    /// walk continues with its siblings.
    Unreadable { path: PathBuf, error: io::Error },
    /// The cancel flag was raised; nothing follows this event.
    Cancelled,
}

struct Child {
    path: PathBuf,
    name: OsString,
    is_dir: bool,
}

struct Frame {
    depth: usize,
    children: std::vec::IntoIter<Child>,
}

/// Depth-first walk that reports target directories without descending into
/// them. Entries are visited in file-name order at every level and symbolic
/// links are never followed, so the walk terminates on cyclic layouts and
/// is reproducible for an unchanged tree.
pub struct Walker<'a> {
    filter: &'a PathFilter,
    excludes: Option<&'a ExcludeMatcher>,
    max_depth: Option<usize>,
    cancel_flag: Option<Arc<AtomicBool>>,
    root: Option<PathBuf>,
    stack: Vec<Frame>,
    deferred: VecDeque<WalkEvent>,
    directories_visited: u64,
    finished: bool,
}

impl<'a> Walker<'a> {
    pub fn new(root: impl Into<PathBuf>, filter: &'a PathFilter) -> Self {
        Self {
            filter,
            excludes: None,
            max_depth: None,
            cancel_flag: None,
            root: Some(root.into()),
            stack: Vec::new(),
            deferred: VecDeque::new(),
            directories_visited: 0,
            finished: false,
        }
    }

    pub fn excludes(mut self, excludes: &'a ExcludeMatcher) -> Self {
        self.excludes = Some(excludes);
        self
    }

    /// Root is depth 0. Nothing deeper than `max_depth` is listed or
    /// reported, so `Some(0)` yields no targets.
    pub fn max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn cancel_flag(mut self, cancel_flag: Option<Arc<AtomicBool>>) -> Self {
        self.cancel_flag = cancel_flag;
        self
    }

    pub fn directories_visited(&self) -> u64 {
        self.directories_visited
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.excludes
            .is_some_and(|excludes| excludes.is_excluded(path))
    }

    fn enter(&mut self, path: &Path, depth: usize) {
        match read_children(path, &mut self.deferred) {
            Ok(children) => {
                self.directories_visited += 1;
                self.stack.push(Frame {
                    depth,
                    children: children.into_iter(),
                });
            }
            Err(error) => {
                warn!("cannot list {}: {}", path.display(), error);
                self.deferred.push_back(WalkEvent::Unreadable {
                    path: path.to_path_buf(),
                    error,
                });
            }
        }
    }
}

impl Iterator for Walker<'_> {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        loop {
            if let Some(event) = self.deferred.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }
            if self.is_cancelled() {
                self.finished = true;
                self.stack.clear();
                return Some(WalkEvent::Cancelled);
            }

            if let Some(root) = self.root.take() {
                self.enter(&root, 0);
                continue;
            }

            let Some(frame) = self.stack.last_mut() else {
                self.finished = true;
                return None;
            };
            let depth = frame.depth + 1;
            let Some(child) = frame.children.next() else {
                self.stack.pop();
                continue;
            };

            if !child.is_dir {
                continue;
            }

            match self.filter.classify_os(&child.name, true) {
                EntryClass::Skip => {
                    debug!("skipping {}", child.path.display());
                }
                EntryClass::Target => {
                    if self.max_depth.is_some_and(|max| depth > max) {
                        continue;
                    }
                    if !self.is_excluded(&child.path) {
                        return Some(WalkEvent::Target(child.path));
                    }
                }
                EntryClass::Descend => {
                    if self.is_excluded(&child.path) {
                        continue;
                    }
                    if self.max_depth.is_some_and(|max| depth >= max) {
                        continue;
                    }
                    self.enter(&child.path, depth);
                }
            }
        }
    }
}

/// Lists a directory sorted by file name. Entries that fail individually are
/// queued as unreadable events instead of failing the whole listing.
fn read_children(path: &Path, deferred: &mut VecDeque<WalkEvent>) -> io::Result<Vec<Child>> {
    let mut children = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) => {
                deferred.push_back(WalkEvent::Unreadable {
                    path: path.to_path_buf(),
                    error,
                });
                continue;
            }
        };
        // DirEntry::file_type does not traverse symlinks.
        let is_dir = match entry.file_type() {
            Ok(file_type) => file_type.is_dir(),
            Err(error) => {
                deferred.push_back(WalkEvent::Unreadable {
                    path: entry.path(),
                    error,
                });
                continue;
            }
        };
        children.push(Child {
            path: entry.path(),
            name: entry.file_name(),
            is_dir,
        });
    }
    children.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(children)
}
