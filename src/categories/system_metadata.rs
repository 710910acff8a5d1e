use super::{name_rules, Category, RuleProvider};
use crate::rules::{EntryKind, JunkRule};

/// Files the OS or file manager drops next to user data.
const FILE_NAMES: &[&str] = &[
    ".DS_Store",
    "._.DS_Store",
    "desktop.ini",
    "Thumbs.db",
    ".localized",
];

/// Volume-level bookkeeping and trash folders.
const DIR_NAMES: &[&str] = &[
    "$RECYCLE.BIN",
    ".Trash",
    ".Trashes",
    ".fseventsd",
    ".Spotlight-V100",
    "System Volume Information",
];

pub struct SystemMetadata;

impl RuleProvider for SystemMetadata {
    fn category(&self) -> Category {
        Category::SystemMetadata
    }

    fn rules(&self) -> Vec<JunkRule> {
        name_rules(Category::SystemMetadata, EntryKind::File, FILE_NAMES)
            .chain(name_rules(
                Category::SystemMetadata,
                EntryKind::Directory,
                DIR_NAMES,
            ))
            .collect()
    }
}
