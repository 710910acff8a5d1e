//! Junk categories and their built-in rule tables.
//!
//! Each category lives in its own module and hands its table to the registry
//! through [`RuleProvider`]. [`all_providers`] fixes the evaluation order,
//! which is also the tie-break order when an entry matches more than one rule.

mod cache;
mod system_metadata;
mod temporary;

use std::fmt;
use std::str::FromStr;

use crate::rules::{EntryKind, JunkRule};

/// A class of junk entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    SystemMetadata,
    Cache,
    Temporary,
}

impl Category {
    /// Every category in rule-evaluation order.
    pub const ALL: [Category; 3] = [
        Category::SystemMetadata,
        Category::Cache,
        Category::Temporary,
    ];

    /// Machine-readable name (e.g. "system-metadata").
    pub fn name(&self) -> &'static str {
        match self {
            Category::SystemMetadata => "system-metadata",
            Category::Cache => "cache",
            Category::Temporary => "temporary",
        }
    }

    /// Human-readable label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Category::SystemMetadata => "System Metadata",
            Category::Cache => "Caches",
            Category::Temporary => "Temporary Files & Logs",
        }
    }

    /// Whether deleting matches of this category needs explicit operator
    /// confirmation. Every category does today.
    pub fn requires_confirmation(&self) -> bool {
        match self {
            Category::SystemMetadata | Category::Cache | Category::Temporary => true,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a config key names no known category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown junk category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Accepts "system-metadata", "system_metadata" or "SystemMetadata",
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "systemmetadata" | "metadata" => Ok(Category::SystemMetadata),
            "cache" | "caches" => Ok(Category::Cache),
            "temporary" | "temp" | "tmp" => Ok(Category::Temporary),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

/// The trait every category module implements.
pub trait RuleProvider {
    fn category(&self) -> Category;

    /// Built-in rules for this category, in evaluation order.
    fn rules(&self) -> Vec<JunkRule>;
}

/// All providers, in the order their rules are evaluated.
pub fn all_providers() -> Vec<Box<dyn RuleProvider>> {
    vec![
        Box::new(system_metadata::SystemMetadata),
        Box::new(cache::Caches),
        Box::new(temporary::Temporary),
    ]
}

/// Compile a table of glob patterns, dropping (and logging) any that fail.
fn glob_rules(
    category: Category,
    kind: EntryKind,
    patterns: &'static [&'static str],
    case_insensitive: bool,
) -> impl Iterator<Item = JunkRule> {
    patterns.iter().filter_map(move |pattern| {
        match JunkRule::glob(category, kind, pattern, case_insensitive) {
            Ok(rule) => Some(rule),
            Err(e) => {
                tracing::warn!("Skipping built-in {} rule '{}': {}", category, pattern, e);
                None
            }
        }
    })
}

fn name_rules(
    category: Category,
    kind: EntryKind,
    names: &'static [&'static str],
) -> impl Iterator<Item = JunkRule> {
    names
        .iter()
        .map(move |name| JunkRule::name(category, kind, name))
}

fn extension_rules(
    category: Category,
    extensions: &'static [&'static str],
) -> impl Iterator<Item = JunkRule> {
    extensions
        .iter()
        .map(move |ext| JunkRule::extension(category, ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_providers_follow_category_order() {
        let order: Vec<Category> = all_providers().iter().map(|p| p.category()).collect();
        assert_eq!(order, Category::ALL.to_vec());
    }

    #[test]
    fn test_every_provider_has_rules_of_its_own_category() {
        for provider in all_providers() {
            let rules = provider.rules();
            assert!(!rules.is_empty(), "{} has no rules", provider.category());
            assert!(rules.iter().all(|r| r.category() == provider.category()));
        }
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("system_metadata".parse(), Ok(Category::SystemMetadata));
        assert_eq!("System-Metadata".parse(), Ok(Category::SystemMetadata));
        assert_eq!("CACHE".parse(), Ok(Category::Cache));
        assert_eq!("temporary".parse(), Ok(Category::Temporary));
        assert!("downloads".parse::<Category>().is_err());
    }
}
