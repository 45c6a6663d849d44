//! Wildcard/template pattern filter.

use async_trait::async_trait;

use super::DomainFilter;
use crate::types::FilterAction;

/// Flags domains containing wildcard characters, which cannot be concrete
/// hostnames and usually indicate template records leaking into the feed.
pub struct PatternFilter {
    name: String,
    action: FilterAction,
}

impl PatternFilter {
    pub fn new(name: String, action: FilterAction) -> Self {
        Self { name, action }
    }
}

#[async_trait]
impl DomainFilter for PatternFilter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn filter(&mut self, domains: &[String]) -> Vec<FilterAction> {
        domains
            .iter()
            .map(|d| {
                if d.contains('*') {
                    self.action
                } else {
                    FilterAction::Pass
                }
            })
            .collect()
    }
}
