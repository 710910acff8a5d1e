use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The user's home directory, the natural default root for a junk scan.
pub fn default_scan_root() -> Option<PathBuf> {
    dirs::home_dir()
}

/// Compute total size of a directory recursively.
/// Unreadable entries count as zero; links are not followed.
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Remove a file or a whole directory tree. Never follows a symlink: a link
/// is removed as a file.
pub fn safe_remove(path: &Path, is_dir: bool) -> Result<(), std::io::Error> {
    if is_dir {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

/// Format byte count as human-readable string.
pub fn format_size(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.2} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.2} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1_024 {
        format!("{:.2} KB", bytes as f64 / 1_024.0)
    } else {
        format!("{} B", bytes)
    }
}
