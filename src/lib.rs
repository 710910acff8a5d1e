//! Find and remove junk files: OS metadata, caches and temporary files.
//!
//! A scan runs in the background and streams matches into its session; the
//! caller reads snapshots while it runs, picks what to remove, and asks the
//! session to delete the selection once the walk has finished or been
//! cancelled.
//!
//! ```no_run
//! use junkclean::{get_snapshot, request_deletion, start_scan, CancelToken};
//!
//! # fn main() -> junkclean::Result<()> {
//! let root = junkclean::default_scan_root().unwrap_or_else(|| ".".into());
//! let session = start_scan(&root, CancelToken::new())?;
//! session.wait();
//!
//! let snapshot = get_snapshot(&session);
//! let report = request_deletion(&session, &snapshot.matches, true)?;
//! println!("freed {} bytes", report.freed_bytes());
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod categories;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod filter;
pub mod rules;
pub mod session;
pub mod utils;
pub mod walker;

pub use aggregator::{Aggregator, CategoryTotals, Match, Snapshot};
pub use categories::Category;
pub use cleaner::{DeletionOutcome, DeletionReport};
pub use config::{Config, ScanOptions};
pub use error::{
    CleanError, ConfigError, DeletionFailed, DeletionFailureKind, EntryAccessError, EntryErrorKind,
    Result,
};
pub use rules::{CustomPattern, JunkRule, RuleSet};
pub use session::{
    get_snapshot, request_deletion, start_scan, ScanSession, Scanner, SessionSnapshot,
    SessionState,
};
pub use utils::default_scan_root;
pub use walker::{CancelToken, ScanProgress};
