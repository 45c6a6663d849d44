//! Static suffix-list filter backed by a block list file.

use async_trait::async_trait;
use tracing::info;

use super::{DomainFilter, FilterError};
use crate::matcher::SuffixMatcher;
use crate::types::FilterAction;

/// Emits the configured action for domains matching a suffix list loaded
/// once at construction, `Pass` otherwise.
pub struct SuffixListFilter {
    name: String,
    action: FilterAction,
    matcher: SuffixMatcher,
}

impl SuffixListFilter {
    /// Load the suffix list from a file: one suffix per line, blank lines
    /// and `#` comments ignored.
    pub fn from_file(name: String, action: FilterAction, path: &str) -> Result<Self, FilterError> {
        let content = std::fs::read_to_string(path).map_err(|source| FilterError::ListLoad {
            path: path.to_string(),
            source,
        })?;

        let suffixes: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();

        info!(filter = %name, path = %path, suffixes = suffixes.len(), "Suffix list loaded");

        Ok(Self {
            name,
            action,
            matcher: SuffixMatcher::from_iter(suffixes),
        })
    }

    /// Build directly from an in-memory list.
    pub fn from_suffixes<I, S>(name: String, action: FilterAction, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name,
            action,
            matcher: SuffixMatcher::from_iter(suffixes),
        }
    }
}

#[async_trait]
impl DomainFilter for SuffixListFilter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn filter(&mut self, domains: &[String]) -> Vec<FilterAction> {
        domains
            .iter()
            .map(|d| {
                if self.matcher.contains(d) {
                    self.action
                } else {
                    FilterAction::Pass
                }
            })
            .collect()
    }
}
