//! Rule registry: junk rules and the ordered, immutable rule set that
//! classifies filesystem entries.

use std::path::Path;

use globset::{GlobBuilder, GlobMatcher};

use crate::categories::{self, Category};

/// Which kind of entry a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
    Any,
}

impl EntryKind {
    fn admits(self, is_dir: bool) -> bool {
        match self {
            EntryKind::File => !is_dir,
            EntryKind::Directory => is_dir,
            EntryKind::Any => true,
        }
    }
}

/// How a rule recognises an entry.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Exact entry name, stored lowercased and compared case-insensitively.
    Name(String),
    /// Name suffix such as ".tmp", stored lowercased. The name must be longer
    /// than the suffix, so a file called just ".log" does not match.
    Extension(String),
    /// Glob over the entry name.
    Glob(GlobMatcher),
    /// Glob over the full entry path.
    PathGlob(GlobMatcher),
}

/// Error building a rule from a pattern.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("empty pattern")]
    Empty,
    #[error("invalid glob '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// One classification rule. Immutable once built.
#[derive(Debug, Clone)]
pub struct JunkRule {
    category: Category,
    kind: EntryKind,
    matcher: Matcher,
    pattern: String,
}

impl JunkRule {
    pub fn name(category: Category, kind: EntryKind, name: &str) -> Self {
        Self {
            category,
            kind,
            matcher: Matcher::Name(name.to_lowercase()),
            pattern: name.to_string(),
        }
    }

    /// File-only rule matching a name suffix (".log").
    pub fn extension(category: Category, ext: &str) -> Self {
        Self {
            category,
            kind: EntryKind::File,
            matcher: Matcher::Extension(ext.to_lowercase()),
            pattern: format!("*{ext}"),
        }
    }

    pub fn glob(
        category: Category,
        kind: EntryKind,
        pattern: &str,
        case_insensitive: bool,
    ) -> Result<Self, RuleError> {
        let matcher = compile(pattern, case_insensitive)?;
        Ok(Self {
            category,
            kind,
            matcher: Matcher::Glob(matcher),
            pattern: pattern.to_string(),
        })
    }

    pub fn path_glob(category: Category, kind: EntryKind, pattern: &str) -> Result<Self, RuleError> {
        let anchored = format!("**/{}", pattern.trim_start_matches('/'));
        let matcher = compile(&anchored, true)?;
        Ok(Self {
            category,
            kind,
            matcher: Matcher::PathGlob(matcher),
            pattern: pattern.to_string(),
        })
    }

    /// Parse a glob-style pattern from user configuration.
    ///
    /// A trailing `/` limits the rule to directories. A pattern that still
    /// contains `/` is matched against the full path; one with glob
    /// metacharacters against the name; anything else is an exact name.
    /// User patterns are always case-insensitive.
    pub fn from_pattern(category: Category, raw: &str) -> Result<Self, RuleError> {
        let trimmed = raw.trim();
        let (body, kind) = match trimmed.strip_suffix('/') {
            Some(body) => (body, EntryKind::Directory),
            None => (trimmed, EntryKind::Any),
        };
        if body.is_empty() || body == "/" {
            return Err(RuleError::Empty);
        }

        if body.contains('/') {
            Self::path_glob(category, kind, body)
        } else if body.contains(['*', '?', '[', '{']) {
            Self::glob(category, kind, body, true)
        } else {
            Ok(Self::name(category, kind, body))
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// The pattern as written, for display and logging.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// `lower_name` is `name` already lowercased by the caller, so a rule set
    /// lowercases each entry once rather than once per rule.
    fn matches_prepared(&self, name: &str, lower_name: &str, path: &Path, is_dir: bool) -> bool {
        if !self.kind.admits(is_dir) {
            return false;
        }
        match &self.matcher {
            Matcher::Name(expected) => lower_name == expected,
            Matcher::Extension(ext) => lower_name.len() > ext.len() && lower_name.ends_with(ext.as_str()),
            Matcher::Glob(glob) => glob.is_match(name),
            Matcher::PathGlob(glob) => glob.is_match(path),
        }
    }

    pub fn matches(&self, name: &str, path: &Path, is_dir: bool) -> bool {
        self.matches_prepared(name, &name.to_lowercase(), path, is_dir)
    }
}

fn compile(pattern: &str, case_insensitive: bool) -> Result<GlobMatcher, RuleError> {
    GlobBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .literal_separator(true)
        .build()
        .map(|glob| glob.compile_matcher())
        .map_err(|source| RuleError::Glob {
            pattern: pattern.to_string(),
            source,
        })
}

/// A user-supplied rule addition, already validated for shape by the config
/// loader. The pattern itself is validated when the rule set is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomPattern {
    pub category: Category,
    pub pattern: String,
}

/// Ordered, immutable list of rules. First match wins.
///
/// Order: built-in SystemMetadata, Cache, Temporary rules, then custom rules
/// grouped by category in the same order, each group in the order given.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<JunkRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RuleSet {
    pub fn builtin() -> Self {
        let rules = categories::all_providers()
            .iter()
            .flat_map(|provider| provider.rules())
            .collect();
        Self { rules }
    }

    /// Built-in rules followed by `custom`. Invalid patterns are skipped with
    /// a warning.
    pub fn with_custom(custom: &[CustomPattern]) -> Self {
        let mut set = Self::builtin();
        for category in Category::ALL {
            for entry in custom.iter().filter(|c| c.category == category) {
                match JunkRule::from_pattern(category, &entry.pattern) {
                    Ok(rule) => set.rules.push(rule),
                    Err(e) => {
                        tracing::warn!("Skipping custom {} rule '{}': {}", category, entry.pattern, e);
                    }
                }
            }
        }
        set
    }

    /// Classify one entry. Pure and deterministic.
    pub fn classify(&self, name: &str, path: &Path, is_dir: bool) -> Option<Category> {
        self.first_match(name, path, is_dir).map(JunkRule::category)
    }

    /// The rule that decides the entry's category, if any.
    pub fn first_match(&self, name: &str, path: &Path, is_dir: bool) -> Option<&JunkRule> {
        let lower = name.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches_prepared(name, &lower, path, is_dir))
    }

    pub fn rules(&self) -> &[JunkRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(set: &RuleSet, path: &str, is_dir: bool) -> Option<Category> {
        let path = Path::new(path);
        let name = path.file_name().unwrap().to_string_lossy();
        set.classify(&name, path, is_dir)
    }

    #[test]
    fn test_builtin_files() {
        let set = RuleSet::builtin();
        assert_eq!(classify(&set, "/r/.DS_Store", false), Some(Category::SystemMetadata));
        assert_eq!(classify(&set, "/r/thumbs.db", false), Some(Category::SystemMetadata));
        assert_eq!(classify(&set, "/r/app.TMP", false), Some(Category::Temporary));
        assert_eq!(classify(&set, "/r/server.log", false), Some(Category::Temporary));
        assert_eq!(classify(&set, "/r/.zsh_history", false), Some(Category::Temporary));
        assert_eq!(classify(&set, "/r/.zcompdump-host-5.9", false), Some(Category::Cache));
        assert_eq!(classify(&set, "/r/fonts.cache", false), Some(Category::Cache));
        assert_eq!(classify(&set, "/r/notes.txt", false), None);
    }

    #[test]
    fn test_builtin_directories() {
        let set = RuleSet::builtin();
        assert_eq!(classify(&set, "/r/.Trash", true), Some(Category::SystemMetadata));
        assert_eq!(classify(&set, "/r/__pycache__", true), Some(Category::Cache));
        assert_eq!(classify(&set, "/r/GPUCache", true), Some(Category::Cache));
        assert_eq!(classify(&set, "/r/Code Cache", true), Some(Category::Cache));
        assert_eq!(classify(&set, "/r/Logs", true), Some(Category::Temporary));
        assert_eq!(classify(&set, "/r/tmp", true), Some(Category::Temporary));
    }

    #[test]
    fn test_plain_cache_directory_is_not_junk() {
        let set = RuleSet::builtin();
        assert_eq!(classify(&set, "/r/cache", true), None);
        assert_eq!(classify(&set, "/r/mycache", true), None);
    }

    #[test]
    fn test_kind_restrictions() {
        let set = RuleSet::builtin();
        // Directory names do not match files and vice versa.
        assert_eq!(classify(&set, "/r/tmp", false), None);
        assert_eq!(classify(&set, "/r/.DS_Store", true), None);
        assert_eq!(classify(&set, "/r/backup.log", true), None);
    }

    #[test]
    fn test_bare_extension_is_not_a_match() {
        let set = RuleSet::builtin();
        assert_eq!(classify(&set, "/r/.log", false), None);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let set = RuleSet::builtin();
        for (path, is_dir) in [("/r/.DS_Store", false), ("/r/x.tmp", false), ("/r/.cache", true)] {
            assert_eq!(classify(&set, path, is_dir), classify(&set, path, is_dir));
        }
    }

    #[test]
    fn test_first_match_wins_over_custom_rules() {
        let custom = vec![
            CustomPattern {
                category: Category::Temporary,
                pattern: ".z*".to_string(),
            },
            CustomPattern {
                category: Category::Cache,
                pattern: "*.swp".to_string(),
            },
            CustomPattern {
                category: Category::Temporary,
                pattern: "*.swp".to_string(),
            },
        ];
        let set = RuleSet::with_custom(&custom);

        // Built-in Cache rule precedes the custom Temporary one.
        assert_eq!(classify(&set, "/r/.zcompdump", false), Some(Category::Cache));
        assert_eq!(classify(&set, "/r/.zprofile.bak", false), Some(Category::Temporary));
        // Custom groups follow category order, not file order.
        assert_eq!(classify(&set, "/r/a.swp", false), Some(Category::Cache));
    }

    #[test]
    fn test_custom_pattern_forms() {
        let dir_only = JunkRule::from_pattern(Category::Cache, "node_modules/").unwrap();
        assert_eq!(dir_only.kind(), EntryKind::Directory);
        assert!(dir_only.matches("node_modules", Path::new("/p/node_modules"), true));
        assert!(!dir_only.matches("node_modules", Path::new("/p/node_modules"), false));

        let by_path = JunkRule::from_pattern(Category::Cache, "Library/Caches/").unwrap();
        assert!(matches!(by_path.matcher(), Matcher::PathGlob(_)));
        assert!(by_path.matches("Caches", Path::new("/Users/a/Library/Caches"), true));
        assert!(!by_path.matches("Caches", Path::new("/Users/a/Caches"), true));

        let exact = JunkRule::from_pattern(Category::Temporary, "Scratch").unwrap();
        assert!(exact.matches("scratch", Path::new("/p/scratch"), false));
    }

    #[test]
    fn test_invalid_custom_patterns_are_skipped() {
        let custom = vec![
            CustomPattern {
                category: Category::Cache,
                pattern: "[unclosed".to_string(),
            },
            CustomPattern {
                category: Category::Cache,
                pattern: "   ".to_string(),
            },
        ];
        let set = RuleSet::with_custom(&custom);
        assert_eq!(set.len(), RuleSet::builtin().len());
    }
}
