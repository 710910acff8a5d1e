use super::{extension_rules, glob_rules, name_rules, Category, RuleProvider};
use crate::rules::{EntryKind, JunkRule};

const EXTENSIONS: &[&str] = &[".cache"];

/// zsh writes one completion dump per host and version.
const FILE_GLOBS: &[&str] = &[".zcompdump*"];

const DIR_NAMES: &[&str] = &[
    ".cache",
    "Caches",
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".sass-cache",
];

/// Chromium/Electron style cache folders ("GPUCache", "Code Cache").
/// Matched case-sensitively so a plain "cache" folder of user files is
/// descended into instead of being swallowed whole.
const DIR_GLOBS_CASE_SENSITIVE: &[&str] = &["*Cache"];

pub struct Caches;

impl RuleProvider for Caches {
    fn category(&self) -> Category {
        Category::Cache
    }

    fn rules(&self) -> Vec<JunkRule> {
        extension_rules(Category::Cache, EXTENSIONS)
            .chain(glob_rules(Category::Cache, EntryKind::File, FILE_GLOBS, true))
            .chain(name_rules(Category::Cache, EntryKind::Directory, DIR_NAMES))
            .chain(glob_rules(
                Category::Cache,
                EntryKind::Directory,
                DIR_GLOBS_CASE_SENSITIVE,
                false,
            ))
            .collect()
    }
}
