//! Deletion of operator-approved matches.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::aggregator::Match;
use crate::error::{CleanError, DeletionFailed, DeletionFailureKind};
use crate::utils;

/// Result of one attempted deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionOutcome {
    pub target: Match,
    pub error: Option<DeletionFailed>,
}

impl DeletionOutcome {
    pub fn success(target: Match) -> Self {
        Self { target, error: None }
    }

    pub fn failure(target: Match, error: DeletionFailed) -> Self {
        Self {
            target,
            error: Some(error),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

/// Every outcome of one deletion run, in selection order.
///
/// Partial success is a normal result, not an error.
#[derive(Debug, Clone, Default)]
pub struct DeletionReport {
    pub outcomes: Vec<DeletionOutcome>,
    pub duration: Duration,
}

impl DeletionReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(DeletionOutcome::succeeded)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &DeletionOutcome> {
        self.outcomes.iter().filter(|o| o.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &DeletionOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    /// Bytes freed, going by the sizes recorded at scan time.
    pub fn freed_bytes(&self) -> u64 {
        self.succeeded().map(|o| o.target.size_bytes).sum()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Removes approved matches one at a time, in selection order.
///
/// Keeps a ledger of every path it removed or found already gone. A path in
/// the ledger is never touched again, even if something new has appeared
/// there since; the attempt is reported as "not found". The ledger lock is
/// held for a whole run, so concurrent calls are serialized.
#[derive(Debug, Default)]
pub struct Deleter {
    settled: Mutex<HashSet<PathBuf>>,
}

impl Deleter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with [`CleanError::NotConfirmed`], before touching anything, if
    /// `confirmed` is false and any selected category requires confirmation.
    pub fn check_confirmation(selected: &[Match], confirmed: bool) -> Result<(), CleanError> {
        if !confirmed && selected.iter().any(|m| m.category.requires_confirmation()) {
            return Err(CleanError::NotConfirmed {
                count: selected.len(),
            });
        }
        Ok(())
    }

    /// Whether an earlier run removed `path` or found it gone.
    pub fn is_settled(&self, path: &Path) -> bool {
        self.settled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(path)
    }

    pub fn delete(&self, selected: &[Match], confirmed: bool) -> Result<DeletionReport, CleanError> {
        Self::check_confirmation(selected, confirmed)?;

        let start = Instant::now();
        let mut settled = self.settled.lock().unwrap_or_else(PoisonError::into_inner);
        let mut seen = HashSet::new();
        let mut outcomes = Vec::with_capacity(selected.len());

        for target in selected {
            if !seen.insert(target.path.clone()) {
                continue;
            }

            if settled.contains(&target.path) {
                outcomes.push(DeletionOutcome::failure(
                    target.clone(),
                    DeletionFailed::new(DeletionFailureKind::NotFound, "already removed or missing earlier in this session"),
                ));
                continue;
            }

            match remove(target) {
                Ok(()) => {
                    tracing::debug!(
                        "Deleted {} ({})",
                        target.path.display(),
                        utils::format_size(target.size_bytes)
                    );
                    settled.insert(target.path.clone());
                    outcomes.push(DeletionOutcome::success(target.clone()));
                }
                Err(e) => {
                    if e.kind == DeletionFailureKind::NotFound {
                        settled.insert(target.path.clone());
                    }
                    tracing::warn!("Failed to remove {}: {}", target.path.display(), e);
                    outcomes.push(DeletionOutcome::failure(target.clone(), e));
                }
            }
        }
        drop(settled);

        let report = DeletionReport {
            outcomes,
            duration: start.elapsed(),
        };
        tracing::info!(
            "Deletion finished: {} removed, {} failed, {} freed",
            report.succeeded().count(),
            report.failed().count(),
            utils::format_size(report.freed_bytes())
        );
        Ok(report)
    }
}

/// Remove one match. The entry is re-stat'ed only to catch a vanished path
/// or a type change since the scan.
fn remove(target: &Match) -> Result<(), DeletionFailed> {
    let current = fs::symlink_metadata(&target.path).map_err(|e| DeletionFailed::from_io(&e))?;

    if current.is_dir() != target.is_directory {
        let now = if current.is_dir() { "directory" } else { "file" };
        let was = if target.is_directory { "directory" } else { "file" };
        return Err(DeletionFailed::new(
            DeletionFailureKind::TypeChanged,
            format!("scanned as a {was}, now a {now}"),
        ));
    }

    utils::safe_remove(&target.path, target.is_directory).map_err(|e| DeletionFailed::from_io(&e))
}
