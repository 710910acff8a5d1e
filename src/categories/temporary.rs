use super::{extension_rules, name_rules, Category, RuleProvider};
use crate::rules::{EntryKind, JunkRule};

const EXTENSIONS: &[&str] = &[".tmp", ".temp", ".log"];

/// Shell and tool history files.
const FILE_NAMES: &[&str] = &[
    ".bash_history",
    ".zsh_history",
    "fish_history",
    ".python_history",
    ".viminfo",
    ".lesshst",
    ".sharkgi",
];

const DIR_NAMES: &[&str] = &[
    "tmp",
    "temp",
    "log",
    "logs",
    "CrashReporter",
    ".zsh_sessions",
    ".TemporaryItems",
];

pub struct Temporary;

impl RuleProvider for Temporary {
    fn category(&self) -> Category {
        Category::Temporary
    }

    fn rules(&self) -> Vec<JunkRule> {
        extension_rules(Category::Temporary, EXTENSIONS)
            .chain(name_rules(Category::Temporary, EntryKind::File, FILE_NAMES))
            .chain(name_rules(
                Category::Temporary,
                EntryKind::Directory,
                DIR_NAMES,
            ))
            .collect()
    }
}
