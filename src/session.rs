//! Scan sessions: one background walk, its results and its deletions.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use crate::aggregator::{Aggregator, CategoryTotals, Filtered, Match};
use crate::categories::Category;
use crate::cleaner::{DeletionOutcome, DeletionReport, Deleter};
use crate::config::{Config, ScanOptions};
use crate::error::{CleanError, DeletionFailed, DeletionFailureKind, EntryAccessError, Result};
use crate::filter::PathFilter;
use crate::rules::RuleSet;
use crate::utils;
use crate::walker::{self, CancelToken, ProgressCallback, ScanProgress, WalkOutcome, Walker};

/// Lifecycle of a session. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Completed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::Running)
    }
}

/// Everything a front end needs to render a session at one instant.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub matches: Vec<Match>,
    pub totals: BTreeMap<Category, CategoryTotals>,
    pub total_bytes: u64,
    pub errors: Vec<EntryAccessError>,
    pub state: SessionState,
    pub is_complete: bool,
    /// Time spent walking so far, or in total once terminal.
    pub elapsed: Duration,
}

struct Status {
    state: SessionState,
    elapsed: Option<Duration>,
}

struct StatusCell {
    status: Mutex<Status>,
    changed: Condvar,
}

impl StatusCell {
    fn new() -> Self {
        Self {
            status: Mutex::new(Status {
                state: SessionState::Running,
                elapsed: None,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, state: SessionState, elapsed: Duration) {
        let mut status = self.lock();
        status.state = state;
        status.elapsed = Some(elapsed);
        drop(status);
        self.changed.notify_all();
    }

    fn wait_terminal(&self) -> SessionState {
        let mut status = self.lock();
        while !status.state.is_terminal() {
            status = self
                .changed
                .wait(status)
                .unwrap_or_else(PoisonError::into_inner);
        }
        status.state
    }
}

/// Sets the terminal state when the scan thread exits, including by panic.
struct FinishGuard {
    status: Arc<StatusCell>,
    started: Instant,
    outcome: Option<WalkOutcome>,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let state = match self.outcome {
            Some(WalkOutcome::Completed) => SessionState::Completed,
            Some(WalkOutcome::Cancelled) => SessionState::Cancelled,
            None => {
                tracing::error!("Scan thread panicked, marking session cancelled");
                SessionState::Cancelled
            }
        };
        self.status.finish(state, self.started.elapsed());
    }
}

/// Configures and starts scan sessions.
pub struct Scanner {
    rules: Arc<RuleSet>,
    options: ScanOptions,
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl Scanner {
    pub fn new(config: &Config) -> Self {
        Self::with_rules(config.rule_set(), config.scan.clone())
    }

    pub fn with_rules(rules: RuleSet, options: ScanOptions) -> Self {
        Self {
            rules: Arc::new(rules),
            options,
            progress_callback: None,
        }
    }

    /// Called from worker threads once per directory listing that produced
    /// new matches. Keep it short; the worker waits for it.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(ScanProgress) + Send + Sync + 'static,
    {
        let callback: ProgressCallback = Box::new(callback);
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Validate `root` and start walking it on a background thread.
    ///
    /// Only an inaccessible root or a failed thread spawn are errors; every
    /// problem below the root is recorded in the session instead.
    pub fn start(&self, root: &Path, cancel: CancelToken) -> Result<ScanSession> {
        let (root, root_metadata) = walker::check_root(root)?;

        let aggregator = Arc::new(Aggregator::new());
        let status = Arc::new(StatusCell::new());
        let started_at = SystemTime::now();
        let started = Instant::now();

        let walker = Walker::new(
            Arc::new(PathFilter::new(Arc::clone(&self.rules))),
            Arc::clone(&aggregator),
            cancel.clone(),
        )
        .with_workers(self.options.workers)
        .with_follow_links(self.options.follow_links)
        .with_progress_callback(self.progress_callback.clone());

        tracing::info!(
            "Starting scan of {} ({} workers, {} rules)",
            root.display(),
            self.options.workers.max(1),
            self.rules.len()
        );

        let handle = {
            let root = root.clone();
            let aggregator = Arc::clone(&aggregator);
            let status = Arc::clone(&status);
            std::thread::Builder::new()
                .name("junkclean-scan".to_string())
                .spawn(move || {
                    let mut guard = FinishGuard {
                        status,
                        started,
                        outcome: None,
                    };
                    let outcome = walker.run(root.clone(), &root_metadata);
                    tracing::info!(
                        "Scan of {} {}: {} matches, {} in {:.2?}",
                        root.display(),
                        if outcome == WalkOutcome::Completed { "completed" } else { "cancelled" },
                        aggregator.len(),
                        utils::format_size(aggregator.total_bytes()),
                        started.elapsed()
                    );
                    guard.outcome = Some(outcome);
                })
                .map_err(CleanError::Spawn)?
        };

        Ok(ScanSession {
            root,
            started_at,
            started,
            aggregator,
            cancel,
            status,
            handle: Mutex::new(Some(handle)),
            deleter: Deleter::new(),
        })
    }
}

/// Handle to one scan. Results can be read while the walk is running;
/// deletion is only allowed once it is terminal.
pub struct ScanSession {
    root: PathBuf,
    started_at: SystemTime,
    started: Instant,
    aggregator: Arc<Aggregator>,
    cancel: CancelToken,
    status: Arc<StatusCell>,
    handle: Mutex<Option<JoinHandle<()>>>,
    deleter: Deleter,
}

impl ScanSession {
    /// Canonical scan root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn state(&self) -> SessionState {
        self.status.lock().state
    }

    pub fn is_complete(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the walk is terminal and return the final state.
    pub fn wait(&self) -> SessionState {
        let state = self.status.wait_terminal();
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            // a panic has already been logged and turned into Cancelled
            let _ = handle.join();
        }
        state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let (state, elapsed) = {
            let status = self.status.lock();
            (status.state, status.elapsed)
        };
        let snap = self.aggregator.snapshot();
        SessionSnapshot {
            matches: snap.matches,
            totals: snap.totals,
            total_bytes: snap.total_bytes,
            errors: snap.errors,
            state,
            is_complete: state.is_terminal(),
            elapsed: elapsed.unwrap_or_else(|| self.started.elapsed()),
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn deselect(&self, path: &Path) -> Option<Match> {
        self.aggregator.deselect(path)
    }

    pub fn filter<P>(&self, predicate: P) -> Filtered<P>
    where
        P: Fn(&Match) -> bool,
    {
        self.aggregator.filter(predicate)
    }

    /// Delete operator-approved matches.
    ///
    /// Matches that were never found by this session, or were deselected
    /// since, fail with "not part of this scan session". A match this session
    /// already deleted, or already found missing, is reported as "not found".
    /// Removed and vanished entries leave the session's results.
    pub fn request_deletion(&self, selected: &[Match], confirmed: bool) -> Result<DeletionReport> {
        if !self.state().is_terminal() {
            return Err(CleanError::SessionNotTerminal {
                root: self.root.clone(),
            });
        }
        Deleter::check_confirmation(selected, confirmed)?;

        let start = Instant::now();
        let held = self
            .aggregator
            .contains_all(selected.iter().map(|m| m.path.as_path()));
        let mut known = Vec::with_capacity(selected.len());
        let mut unknown = Vec::new();
        for (m, held) in selected.iter().zip(held) {
            // The ledger is updated before results are consumed, so a match
            // that just left the aggregator is still recognised here.
            if held || self.deleter.is_settled(&m.path) {
                known.push(m.clone());
            } else {
                unknown.push(m);
            }
        }

        let mut by_path: HashMap<PathBuf, DeletionOutcome> = self
            .deleter
            .delete(&known, confirmed)?
            .outcomes
            .into_iter()
            .map(|o| (o.target.path.clone(), o))
            .collect();
        for m in unknown {
            tracing::warn!("{} is not part of this scan session", m.path.display());
            by_path.entry(m.path.clone()).or_insert_with(|| {
                DeletionOutcome::failure(
                    m.clone(),
                    DeletionFailed::new(DeletionFailureKind::NotInSession, m.path.display().to_string()),
                )
            });
        }

        let mut outcomes = Vec::with_capacity(by_path.len());
        for m in selected {
            if let Some(outcome) = by_path.remove(&m.path) {
                outcomes.push(outcome);
            }
        }

        let gone = outcomes.iter().filter(|o| match &o.error {
            None => true,
            Some(e) => e.kind == DeletionFailureKind::NotFound,
        });
        self.aggregator
            .consume_all(gone.map(|o| o.target.path.as_path()));

        Ok(DeletionReport {
            outcomes,
            duration: start.elapsed(),
        })
    }
}

impl Drop for ScanSession {
    /// A dropped session stops its walk; the thread winds down on its own.
    fn drop(&mut self) {
        if !self.state().is_terminal() {
            tracing::debug!("Session for {} dropped while running, cancelling", self.root.display());
        }
        self.cancel.cancel();
    }
}

/// Start a scan of `root` using the user's config file, or the defaults if
/// there is none.
pub fn start_scan(root: &Path, cancel: CancelToken) -> Result<ScanSession> {
    let config = Config::load_default()?;
    Scanner::new(&config).start(root, cancel)
}

pub fn get_snapshot(session: &ScanSession) -> SessionSnapshot {
    session.snapshot()
}

pub fn request_deletion(
    session: &ScanSession,
    selected: &[Match],
    confirmed: bool,
) -> Result<DeletionReport> {
    session.request_deletion(selected, confirmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scanner() -> Scanner {
        Scanner::with_rules(
            RuleSet::builtin(),
            ScanOptions {
                workers: 2,
                follow_links: false,
            },
        )
    }

    #[test]
    fn test_session_reaches_completed() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("a.tmp"), vec![0u8; 12]).unwrap();

        let session = scanner().start(temp.path(), CancelToken::new()).unwrap();
        assert_eq!(session.wait(), SessionState::Completed);

        let snap = session.snapshot();
        assert!(snap.is_complete);
        assert_eq!(snap.state, SessionState::Completed);
        assert_eq!(snap.total_bytes, 12);
        // repeated waits are fine
        assert_eq!(session.wait(), SessionState::Completed);
    }

    #[test]
    fn test_cancelled_token_ends_cancelled() {
        let temp = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let session = scanner().start(temp.path(), cancel).unwrap();
        assert_eq!(session.wait(), SessionState::Cancelled);
        assert!(session.snapshot().matches.is_empty());
    }

    #[test]
    fn test_dropping_a_running_session_cancels_its_walk() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("held.tmp"), b"x").unwrap();

        let (release, gate) = std::sync::mpsc::channel::<()>();
        let gate = Mutex::new(gate);
        let cancel = CancelToken::new();
        let session = scanner()
            .with_progress_callback(move |_| {
                let _ = gate.lock().unwrap().recv();
            })
            .start(temp.path(), cancel.clone())
            .unwrap();

        assert!(!cancel.is_cancelled());
        drop(session);
        assert!(cancel.is_cancelled());
        drop(release);
    }

    #[test]
    fn test_deselected_match_is_not_in_session() {
        let temp = tempfile::tempdir().unwrap();
        let file = temp.path().join("keep.log");
        fs::write(&file, b"abc").unwrap();

        let session = scanner().start(temp.path(), CancelToken::new()).unwrap();
        session.wait();
        let target = session.snapshot().matches[0].clone();
        assert!(session.deselect(&target.path).is_some());

        let report = session.request_deletion(&[target], true).unwrap();
        assert_eq!(
            report.outcomes[0].error.as_ref().map(|e| e.kind),
            Some(DeletionFailureKind::NotInSession)
        );
        assert!(file.exists());
    }

    #[test]
    fn test_deleted_matches_leave_the_session() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("one.tmp"), vec![0u8; 5]).unwrap();
        fs::write(temp.path().join("two.tmp"), vec![0u8; 7]).unwrap();

        let session = scanner().start(temp.path(), CancelToken::new()).unwrap();
        session.wait();
        let matches = session.snapshot().matches;
        assert_eq!(matches.len(), 2);

        let report = session.request_deletion(&matches[..1], true).unwrap();
        assert!(report.all_succeeded());
        let snap = session.snapshot();
        assert_eq!(snap.matches.len(), 1);
        assert_eq!(snap.total_bytes, matches[1].size_bytes);
    }

    #[test]
    fn test_outcomes_follow_selection_order() {
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("b.tmp"), b"b").unwrap();
        fs::write(temp.path().join("a.tmp"), b"aa").unwrap();

        let session = scanner().start(temp.path(), CancelToken::new()).unwrap();
        session.wait();
        let mut selected = session.snapshot().matches;
        let stranger = Match {
            path: temp.path().join("stranger.tmp"),
            ..selected[0].clone()
        };
        selected.insert(1, stranger.clone());
        selected.reverse();

        let report = session.request_deletion(&selected, true).unwrap();
        let order: Vec<_> = report.outcomes.iter().map(|o| o.target.path.clone()).collect();
        let expected: Vec<_> = selected.iter().map(|m| m.path.clone()).collect();
        assert_eq!(order, expected);
        assert_eq!(report.failed().count(), 1);
    }
}
