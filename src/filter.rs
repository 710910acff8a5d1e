//! Per-entry traversal decisions.

use std::collections::HashSet;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::categories::Category;
use crate::rules::RuleSet;

/// Why a directory is not descended into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    PermissionDenied,
    /// Reached again through a symlink or bind mount.
    AlreadyVisited,
}

/// What the walker should do with one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Descend,
    SkipSubtree(SkipReason),
    RecordMatch(Category),
    Ignore,
}

/// One listed entry as the filter sees it.
pub struct Entry<'a> {
    pub path: &'a Path,
    pub name: &'a str,
    /// Metadata of the link target when a symlink is being followed,
    /// otherwise of the entry itself.
    pub metadata: &'a Metadata,
    pub is_symlink: bool,
}

/// Identity of a directory for cycle detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DirKey {
    #[cfg(unix)]
    Inode { dev: u64, ino: u64 },
    #[cfg_attr(unix, allow(dead_code))]
    Path(PathBuf),
}

impl DirKey {
    #[cfg(unix)]
    fn of(_path: &Path, metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        DirKey::Inode {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    #[cfg(not(unix))]
    fn of(path: &Path, _metadata: &Metadata) -> Self {
        DirKey::Path(std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()))
    }
}

/// Decides, per entry, between descending, skipping, recording and ignoring.
///
/// Holds the session's visited-directory set; nothing else is mutated.
pub struct PathFilter {
    rules: Arc<RuleSet>,
    visited: Mutex<HashSet<DirKey>>,
}

impl PathFilter {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self {
            rules,
            visited: Mutex::new(HashSet::new()),
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Seed the visited set with the scan root so links back to it are
    /// recognised as cycles.
    pub fn mark_root(&self, root: &Path, metadata: &Metadata) {
        self.first_visit(root, metadata);
    }

    pub fn evaluate(&self, entry: &Entry<'_>) -> Decision {
        let is_dir = entry.metadata.is_dir();

        if is_dir {
            if !self.first_visit(entry.path, entry.metadata) {
                return Decision::SkipSubtree(SkipReason::AlreadyVisited);
            }
            if !can_list(entry.path) {
                return Decision::SkipSubtree(SkipReason::PermissionDenied);
            }
        }

        match self.rules.classify(entry.name, entry.path, is_dir) {
            Some(category) => Decision::RecordMatch(category),
            None if is_dir => Decision::Descend,
            None => Decision::Ignore,
        }
    }

    /// Returns false if the directory was seen before.
    fn first_visit(&self, path: &Path, metadata: &Metadata) -> bool {
        let key = DirKey::of(path, metadata);
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key)
    }
}

/// Whether the process may list `dir` (read + search permission).
#[cfg(unix)]
fn can_list(dir: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(dir.as_os_str().as_bytes()) else {
        return false;
    };
    let ret = unsafe { libc::access(c_path.as_ptr(), libc::R_OK | libc::X_OK) };
    ret == 0
}

#[cfg(not(unix))]
fn can_list(dir: &Path) -> bool {
    std::fs::read_dir(dir).is_ok()
}
