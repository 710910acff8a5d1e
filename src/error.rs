//! Error types for scanning, configuration and deletion.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Hard failures surfaced to the caller.
///
/// Per-entry scan problems and per-item deletion failures are not in here;
/// they are recorded as [`EntryAccessError`] and [`DeletionFailed`] values
/// and never unwind the whole operation.
#[derive(Debug, Error)]
pub enum CleanError {
    /// The scan root is missing, unreadable or not a directory.
    #[error("cannot access scan root {}: {source}", path.display())]
    RootPathInaccessible {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Deletion was requested without operator confirmation.
    #[error("deletion of {count} item(s) was not confirmed")]
    NotConfirmed { count: usize },

    /// Deletion was requested while the scan is still writing results.
    #[error("scan of {} is still running; wait for it or cancel it first", root.display())]
    SessionNotTerminal { root: PathBuf },

    /// The background scan thread could not be started.
    #[error("failed to start scan thread: {0}")]
    Spawn(#[source] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Problems reading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Why an entry could not be inspected during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryErrorKind {
    PermissionDenied,
    /// The entry vanished between listing and inspection.
    NotFound,
    /// A followed symlink points at nothing.
    BrokenSymlink,
    Io,
}

impl EntryErrorKind {
    fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::NotFound => Self::NotFound,
            _ => Self::Io,
        }
    }
}

/// A non-fatal, per-entry scan error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {reason}", path.display())]
pub struct EntryAccessError {
    pub path: PathBuf,
    pub kind: EntryErrorKind,
    pub reason: String,
}

impl EntryAccessError {
    pub fn new(path: impl Into<PathBuf>, kind: EntryErrorKind, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            reason: reason.into(),
        }
    }

    pub fn from_io(path: &Path, err: &io::Error) -> Self {
        Self::new(path, EntryErrorKind::from_io(err), err.to_string())
    }

    pub fn permission_denied(path: &Path) -> Self {
        Self::new(path, EntryErrorKind::PermissionDenied, "permission denied")
    }

    pub fn broken_symlink(path: &Path, err: &io::Error) -> Self {
        Self::new(
            path,
            EntryErrorKind::BrokenSymlink,
            format!("broken symlink: {err}"),
        )
    }
}

/// Category of a failed deletion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletionFailureKind {
    NotFound,
    PermissionDenied,
    /// The path now holds a different kind of entry than was scanned.
    TypeChanged,
    /// The match was not produced by the session it was submitted to.
    NotInSession,
    Io,
}

impl fmt::Display for DeletionFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::PermissionDenied => "permission denied",
            Self::TypeChanged => "type changed",
            Self::NotInSession => "not part of this scan session",
            Self::Io => "I/O error",
        };
        f.write_str(s)
    }
}

/// A non-fatal, per-item deletion failure recorded in the report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct DeletionFailed {
    pub kind: DeletionFailureKind,
    pub detail: String,
}

impl DeletionFailed {
    pub fn new(kind: DeletionFailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn from_io(err: &io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => DeletionFailureKind::NotFound,
            io::ErrorKind::PermissionDenied => DeletionFailureKind::PermissionDenied,
            _ => DeletionFailureKind::Io,
        };
        Self::new(kind, err.to_string())
    }
}

pub type Result<T, E = CleanError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_error_kind_from_io() {
        let err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let entry = EntryAccessError::from_io(Path::new("/x/y"), &err);
        assert_eq!(entry.kind, EntryErrorKind::NotFound);
        assert_eq!(entry.to_string(), "/x/y: gone");
    }

    #[test]
    fn test_deletion_failed_detail_mentions_not_found() {
        let err = io::Error::new(io::ErrorKind::NotFound, "No such file or directory");
        let failed = DeletionFailed::from_io(&err);
        assert_eq!(failed.kind, DeletionFailureKind::NotFound);
        assert!(failed.to_string().starts_with("not found"));
    }

    #[test]
    fn test_root_error_message() {
        let err = CleanError::RootPathInaccessible {
            path: PathBuf::from("/missing"),
            source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        };
        assert!(err.to_string().contains("/missing"));
    }
}
