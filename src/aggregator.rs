//! Thread-safe accumulation of scan results.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use crate::categories::Category;
use crate::error::EntryAccessError;
use crate::filter::Entry;
use crate::utils;

/// One junk entry found during a scan.
///
/// `size_bytes` is captured at scan time and never re-read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub path: PathBuf,
    pub category: Category,
    pub size_bytes: u64,
    pub is_directory: bool,
    pub modified: Option<SystemTime>,
}

impl Match {
    /// Capture a classified entry. A directory is sized by the files inside
    /// it; a symlink is never treated as a directory, so deleting it removes
    /// only the link.
    pub fn capture(entry: &Entry<'_>, category: Category) -> Self {
        let is_directory = entry.metadata.is_dir() && !entry.is_symlink;
        let (size_bytes, modified) = if entry.is_symlink {
            match std::fs::symlink_metadata(entry.path) {
                Ok(link) => (link.len(), link.modified().ok()),
                Err(_) => (0, None),
            }
        } else if is_directory {
            (utils::dir_size(entry.path), entry.metadata.modified().ok())
        } else {
            (entry.metadata.len(), entry.metadata.modified().ok())
        };

        Self {
            path: entry.path.to_path_buf(),
            category,
            size_bytes,
            is_directory,
            modified,
        }
    }

    /// Snapshot order: category, then largest first, then path.
    pub fn display_order(a: &Match, b: &Match) -> Ordering {
        a.category
            .cmp(&b.category)
            .then_with(|| b.size_bytes.cmp(&a.size_bytes))
            .then_with(|| a.path.cmp(&b.path))
    }
}

/// Running count and size of one category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryTotals {
    pub count: usize,
    pub bytes: u64,
}

/// A consistent, point-in-time view of the aggregator.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Ordered by [`Match::display_order`].
    pub matches: Vec<Match>,
    /// Only categories with at least one match appear.
    pub totals: BTreeMap<Category, CategoryTotals>,
    pub total_bytes: u64,
    pub errors: Vec<EntryAccessError>,
}

impl Snapshot {
    pub fn category_count(&self) -> usize {
        self.totals.len()
    }
}

#[derive(Default)]
struct State {
    matches: HashMap<PathBuf, Match>,
    totals: BTreeMap<Category, CategoryTotals>,
    total_bytes: u64,
    errors: Vec<EntryAccessError>,
}

impl State {
    /// A path recorded twice keeps only its latest match.
    fn add(&mut self, m: Match) {
        self.count(&m);
        if let Some(replaced) = self.matches.insert(m.path.clone(), m) {
            self.uncount(&replaced);
        }
    }

    fn remove(&mut self, path: &Path) -> Option<Match> {
        let m = self.matches.remove(path)?;
        self.uncount(&m);
        Some(m)
    }

    fn count(&mut self, m: &Match) {
        let totals = self.totals.entry(m.category).or_default();
        totals.count += 1;
        totals.bytes += m.size_bytes;
        self.total_bytes += m.size_bytes;
    }

    fn uncount(&mut self, m: &Match) {
        if let Some(totals) = self.totals.get_mut(&m.category) {
            totals.count -= 1;
            totals.bytes -= m.size_bytes;
            if totals.count == 0 {
                self.totals.remove(&m.category);
            }
        }
        self.total_bytes -= m.size_bytes;
    }

    fn cloned_matches(&self) -> Vec<Match> {
        self.matches.values().cloned().collect()
    }
}

/// Collects matches and entry errors for one session.
///
/// Totals are maintained incrementally; `total_bytes` always equals the sum
/// of `size_bytes` over the matches currently held. Accumulation is
/// commutative, so the order in which workers report does not matter.
#[derive(Default)]
pub struct Aggregator {
    state: RwLock<State>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the results of one directory listing in a single critical
    /// section.
    pub fn record(&self, matches: Vec<Match>, errors: Vec<EntryAccessError>) {
        if matches.is_empty() && errors.is_empty() {
            return;
        }
        let mut state = self.write();
        for m in matches {
            state.add(m);
        }
        state.errors.extend(errors);
    }

    pub fn record_match(&self, m: Match) {
        self.write().add(m);
    }

    pub fn record_error(&self, error: EntryAccessError) {
        self.write().errors.push(error);
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.read();
        let mut matches = state.cloned_matches();
        let totals = state.totals.clone();
        let total_bytes = state.total_bytes;
        let errors = state.errors.clone();
        drop(state);

        matches.sort_by(Match::display_order);
        Snapshot {
            matches,
            totals,
            total_bytes,
            errors,
        }
    }

    /// A lazy, restartable view of the matches accepted by `predicate`,
    /// taken over a snapshot of the current state.
    pub fn filter<P>(&self, predicate: P) -> Filtered<P>
    where
        P: Fn(&Match) -> bool,
    {
        let mut matches = self.read().cloned_matches();
        matches.sort_by(Match::display_order);
        Filtered {
            matches: matches.into(),
            predicate,
        }
    }

    /// Operator deselection: drop a match from the session.
    pub fn deselect(&self, path: &Path) -> Option<Match> {
        self.write().remove(path)
    }

    /// Remove a match that the deletion executor has dealt with.
    pub fn consume(&self, path: &Path) -> Option<Match> {
        self.write().remove(path)
    }

    /// Remove every listed path under one write lock. Returns the matches
    /// that were still held.
    pub fn consume_all<'a, I>(&self, paths: I) -> Vec<Match>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut state = self.write();
        paths
            .into_iter()
            .filter_map(|path| state.remove(path))
            .collect()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.read().matches.contains_key(path)
    }

    /// Membership of each path, in order, under one read lock.
    pub fn contains_all<'a, I>(&self, paths: I) -> Vec<bool>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let state = self.read();
        paths
            .into_iter()
            .map(|path| state.matches.contains_key(path))
            .collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.read().total_bytes
    }

    pub fn len(&self) -> usize {
        self.read().matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().matches.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.read().errors.len()
    }
}

/// Matches accepted by a predicate, in snapshot order.
///
/// Iterating does not consume the view; call [`Filtered::iter`] again to
/// restart.
pub struct Filtered<P> {
    matches: Arc<[Match]>,
    predicate: P,
}

impl<P> Filtered<P>
where
    P: Fn(&Match) -> bool,
{
    pub fn iter(&self) -> impl Iterator<Item = &Match> + '_ {
        self.matches.iter().filter(move |m| (self.predicate)(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(path: &str, category: Category, size: u64) -> Match {
        Match {
            path: PathBuf::from(path),
            category,
            size_bytes: size,
            is_directory: false,
            modified: None,
        }
    }

    #[test]
    fn test_totals_track_inserts_and_removals() {
        let agg = Aggregator::new();
        agg.record(
            vec![
                m("/r/a", Category::Cache, 100),
                m("/r/b", Category::Cache, 50),
                m("/r/c", Category::Temporary, 7),
            ],
            vec![],
        );
        assert_eq!(agg.total_bytes(), 157);

        let removed = agg.deselect(Path::new("/r/a")).unwrap();
        assert_eq!(removed.size_bytes, 100);
        assert_eq!(agg.total_bytes(), 57);

        agg.consume(Path::new("/r/c"));
        let snap = agg.snapshot();
        assert_eq!(snap.total_bytes, 50);
        assert_eq!(snap.total_bytes, snap.matches.iter().map(|m| m.size_bytes).sum::<u64>());
        assert_eq!(snap.totals.get(&Category::Cache), Some(&CategoryTotals { count: 1, bytes: 50 }));
        assert!(!snap.totals.contains_key(&Category::Temporary));
    }

    #[test]
    fn test_snapshot_order() {
        let agg = Aggregator::new();
        agg.record_match(m("/r/t", Category::Temporary, 999));
        agg.record_match(m("/r/small", Category::Cache, 1));
        agg.record_match(m("/r/big", Category::Cache, 10));
        agg.record_match(m("/r/meta", Category::SystemMetadata, 0));

        let paths: Vec<_> = agg
            .snapshot()
            .matches
            .into_iter()
            .map(|m| m.path)
            .collect();
        assert_eq!(
            paths,
            ["/r/meta", "/r/big", "/r/small", "/r/t"]
                .iter()
                .map(PathBuf::from)
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_accumulation_is_order_independent() {
        let items = [
            m("/r/1", Category::Cache, 3),
            m("/r/2", Category::Temporary, 5),
            m("/r/3", Category::Cache, 11),
        ];
        let forward = Aggregator::new();
        let backward = Aggregator::new();
        for item in items.iter() {
            forward.record_match(item.clone());
        }
        for item in items.iter().rev() {
            backward.record_match(item.clone());
        }
        let (f, b) = (forward.snapshot(), backward.snapshot());
        assert_eq!(f.matches, b.matches);
        assert_eq!(f.totals, b.totals);
    }

    #[test]
    fn test_filter_is_restartable_and_read_only() {
        let agg = Aggregator::new();
        agg.record_match(m("/r/a", Category::Cache, 1));
        agg.record_match(m("/r/b", Category::Temporary, 2));
        agg.record_match(m("/r/c", Category::Cache, 3));

        let caches = agg.filter(|m| m.category == Category::Cache);
        let first: Vec<_> = caches.iter().map(|m| m.size_bytes).collect();
        let second: Vec<_> = caches.iter().map(|m| m.size_bytes).collect();
        assert_eq!(first, vec![3, 1]);
        assert_eq!(first, second);
        assert_eq!(agg.len(), 3);
    }

    #[test]
    fn test_batch_membership_and_consumption() {
        let agg = Aggregator::new();
        agg.record(
            (0..50_000)
                .map(|i| m(&format!("/r/{i}.tmp"), Category::Temporary, 2))
                .collect(),
            vec![],
        );
        assert_eq!(agg.total_bytes(), 100_000);

        let paths: Vec<PathBuf> = (0..50_000).map(|i| PathBuf::from(format!("/r/{i}.tmp"))).collect();
        let known = agg.contains_all(
            paths
                .iter()
                .map(PathBuf::as_path)
                .chain([Path::new("/elsewhere")]),
        );
        assert_eq!(known.len(), 50_001);
        assert!(known[..50_000].iter().all(|k| *k));
        assert!(!known[50_000]);

        let consumed = agg.consume_all(paths.iter().map(PathBuf::as_path));
        assert_eq!(consumed.len(), 50_000);
        assert!(agg.is_empty());
        assert_eq!(agg.total_bytes(), 0);
        assert!(agg.snapshot().totals.is_empty());

        // already gone
        assert!(agg.consume_all(paths.iter().take(3).map(PathBuf::as_path)).is_empty());
    }

    #[test]
    fn test_same_path_recorded_twice_is_held_once() {
        let agg = Aggregator::new();
        agg.record_match(m("/r/a", Category::Cache, 10));
        agg.record_match(m("/r/a", Category::Temporary, 4));
        let snap = agg.snapshot();
        assert_eq!(snap.matches.len(), 1);
        assert_eq!(snap.total_bytes, 4);
        assert!(!snap.totals.contains_key(&Category::Cache));
    }

    #[test]
    fn test_errors_are_kept() {
        let agg = Aggregator::new();
        agg.record(vec![], vec![EntryAccessError::permission_denied(Path::new("/r/x"))]);
        assert_eq!(agg.error_count(), 1);
        assert!(agg.is_empty());
    }
}
