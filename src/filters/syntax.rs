//! Hostname syntax validation filter.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use super::DomainFilter;
use crate::types::FilterAction;

/// Labels of 1-63 alphanumerics/hyphens without leading or trailing hyphen,
/// at least two labels, alphabetic top-level label.
static HOSTNAME_RE: OnceLock<Regex> = OnceLock::new();

fn hostname_re() -> &'static Regex {
    HOSTNAME_RE.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$")
            .expect("hostname regex is statically valid")
    })
}

/// True iff `domain` is a syntactically valid hostname. Expects normalized
/// (lowercase, trimmed) input.
pub fn is_valid_hostname(domain: &str) -> bool {
    domain.len() <= 253 && hostname_re().is_match(domain)
}

/// Flags syntactically invalid domains.
///
/// Polarity is inverted relative to the other filters: a *valid* domain gets
/// `Pass`, an invalid one gets the configured action.
pub struct SyntaxValidationFilter {
    name: String,
    action: FilterAction,
}

impl SyntaxValidationFilter {
    pub fn new(name: String, action: FilterAction) -> Self {
        Self { name, action }
    }
}

#[async_trait]
impl DomainFilter for SyntaxValidationFilter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn filter(&mut self, domains: &[String]) -> Vec<FilterAction> {
        domains
            .iter()
            .map(|d| {
                if is_valid_hostname(d) {
                    FilterAction::Pass
                } else {
                    self.action
                }
            })
            .collect()
    }
}
