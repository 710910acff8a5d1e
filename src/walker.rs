//! Concurrent directory walker.
//!
//! A fixed pool of workers drains an explicit queue of pending directories.
//! Each worker lists one directory, runs every entry through the
//! [`PathFilter`], pushes child directories back onto the queue and hands the
//! listing's matches and errors to the [`Aggregator`] in one batch.
//!
//! The walk ends when the in-flight counter (queued plus in-progress
//! directories) drops to zero. The worker that drops it closes the `done`
//! channel, which every idle worker is selecting on.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crossbeam_channel::{select, unbounded, Receiver, Sender};

use crate::aggregator::{Aggregator, Match};
use crate::error::{CleanError, EntryAccessError};
use crate::filter::{Decision, Entry, PathFilter, SkipReason};

/// Cooperative cancellation signal shared between a session and its workers.
///
/// Workers look at it before listing a directory and again after the listing,
/// never in the middle of one.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Matches from one directory listing plus running totals.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    pub new_matches: Vec<Match>,
    pub matches_total: usize,
    pub bytes_total: u64,
}

/// Type alias for progress callback function
pub type ProgressCallback = Box<dyn Fn(ScanProgress) + Send + Sync>;

/// How a walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    Completed,
    Cancelled,
}

struct WorkQueue {
    tx: Sender<PathBuf>,
    rx: Receiver<PathBuf>,
    in_flight: AtomicUsize,
    done_tx: Mutex<Option<Sender<()>>>,
    done_rx: Receiver<()>,
}

impl WorkQueue {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        let (done_tx, done_rx) = crossbeam_channel::bounded(0);
        Self {
            tx,
            rx,
            in_flight: AtomicUsize::new(0),
            done_tx: Mutex::new(Some(done_tx)),
            done_rx,
        }
    }

    /// Count the directory before it becomes visible to other workers.
    fn push(&self, dir: PathBuf) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(dir).is_err() {
            self.finish_one();
        }
    }

    fn finish_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            // dropping the sender wakes every worker blocked in select!
            self.done_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
        }
    }
}

/// Verify the scan root before any worker starts. This is the only fatal
/// error a walk can produce.
pub fn check_root(root: &Path) -> Result<(PathBuf, fs::Metadata), CleanError> {
    let inaccessible = |source: std::io::Error| CleanError::RootPathInaccessible {
        path: root.to_path_buf(),
        source,
    };

    let canonical = root.canonicalize().map_err(inaccessible)?;
    let metadata = fs::metadata(&canonical).map_err(inaccessible)?;
    if !metadata.is_dir() {
        return Err(inaccessible(std::io::Error::new(
            std::io::ErrorKind::Other,
            "not a directory",
        )));
    }
    fs::read_dir(&canonical).map_err(inaccessible)?;
    Ok((canonical, metadata))
}

/// Parallel walker over one root.
pub struct Walker {
    filter: Arc<PathFilter>,
    aggregator: Arc<Aggregator>,
    cancel: CancelToken,
    workers: usize,
    follow_links: bool,
    progress_callback: Option<Arc<ProgressCallback>>,
}

impl Walker {
    pub fn new(filter: Arc<PathFilter>, aggregator: Arc<Aggregator>, cancel: CancelToken) -> Self {
        Self {
            filter,
            aggregator,
            cancel,
            workers: 1,
            follow_links: false,
            progress_callback: None,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_follow_links(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    pub fn with_progress_callback(mut self, callback: Option<Arc<ProgressCallback>>) -> Self {
        self.progress_callback = callback;
        self
    }

    /// Walk `root` to completion or cancellation. Blocks the calling thread.
    ///
    /// `root` and its metadata come from [`check_root`].
    pub fn run(&self, root: PathBuf, root_metadata: &fs::Metadata) -> WalkOutcome {
        self.filter.mark_root(&root, root_metadata);

        let queue = WorkQueue::new();
        queue.push(root);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("junkclean-walker-{i}"))
            .build();

        match pool {
            Ok(pool) => pool.scope(|s| {
                for _ in 0..self.workers {
                    s.spawn(|_| self.worker_loop(&queue));
                }
            }),
            Err(e) => {
                tracing::warn!("Worker pool unavailable ({}), walking on one thread", e);
                self.worker_loop(&queue);
            }
        }

        if self.cancel.is_cancelled() {
            WalkOutcome::Cancelled
        } else {
            WalkOutcome::Completed
        }
    }

    fn worker_loop(&self, queue: &WorkQueue) {
        loop {
            select! {
                recv(queue.rx) -> msg => match msg {
                    Ok(dir) => {
                        self.process(&dir, queue);
                        queue.finish_one();
                    }
                    Err(_) => break,
                },
                recv(queue.done_rx) -> _ => break,
            }
        }
    }

    /// List one directory. Child directories are only enqueued if the walk
    /// was not cancelled while listing.
    fn process(&self, dir: &Path, queue: &WorkQueue) {
        if self.cancel.is_cancelled() {
            return;
        }

        let read_dir = match fs::read_dir(dir) {
            Ok(rd) => rd,
            Err(e) => {
                self.aggregator.record_error(EntryAccessError::from_io(dir, &e));
                return;
            }
        };

        let mut found = Vec::new();
        let mut errors = Vec::new();
        let mut children = Vec::new();

        for entry in read_dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    errors.push(EntryAccessError::from_io(dir, &e));
                    continue;
                }
            };
            let path = entry.path();

            let link_metadata = match fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    errors.push(EntryAccessError::from_io(&path, &e));
                    continue;
                }
            };
            let is_symlink = link_metadata.file_type().is_symlink();
            let metadata = if is_symlink && self.follow_links {
                match fs::metadata(&path) {
                    Ok(m) => m,
                    Err(e) => {
                        errors.push(EntryAccessError::broken_symlink(&path, &e));
                        continue;
                    }
                }
            } else {
                link_metadata
            };

            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            let candidate = Entry {
                path: &path,
                name: &name,
                metadata: &metadata,
                is_symlink,
            };

            match self.filter.evaluate(&candidate) {
                Decision::Descend => children.push(path),
                Decision::RecordMatch(category) => found.push(Match::capture(&candidate, category)),
                Decision::SkipSubtree(SkipReason::PermissionDenied) => {
                    errors.push(EntryAccessError::permission_denied(&path));
                }
                Decision::SkipSubtree(SkipReason::AlreadyVisited) => {
                    tracing::trace!("Already visited, skipping {}", path.display());
                }
                Decision::Ignore => {}
            }
        }

        self.report(found, errors);

        if self.cancel.is_cancelled() {
            tracing::debug!(
                "Scan cancelled, dropping {} subdirectories of {}",
                children.len(),
                dir.display()
            );
            return;
        }
        for child in children {
            queue.push(child);
        }
    }

    fn report(&self, found: Vec<Match>, errors: Vec<EntryAccessError>) {
        let batch = match &self.progress_callback {
            Some(_) if !found.is_empty() => Some(found.clone()),
            _ => None,
        };
        if !found.is_empty() {
            tracing::debug!("Recording {} matches", found.len());
        }
        self.aggregator.record(found, errors);

        if let (Some(callback), Some(new_matches)) = (&self.progress_callback, batch) {
            callback(ScanProgress {
                new_matches,
                matches_total: self.aggregator.len(),
                bytes_total: self.aggregator.total_bytes(),
            });
        }
    }
}
