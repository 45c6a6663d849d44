//! Probabilistic filter for synthetic load and pipeline testing.

use async_trait::async_trait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::DomainFilter;
use crate::types::FilterAction;

/// Emits the configured action independently per domain with a fixed
/// probability. Not a security control; used to exercise the pipeline.
pub struct ProbabilisticFilter {
    name: String,
    action: FilterAction,
    rate_percent: f64,
    rng: SmallRng,
}

impl ProbabilisticFilter {
    pub fn new(name: String, action: FilterAction, rate_percent: f64) -> Self {
        Self {
            name,
            action,
            rate_percent,
            rng: SmallRng::from_entropy(),
        }
    }
}

#[async_trait]
impl DomainFilter for ProbabilisticFilter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn filter(&mut self, domains: &[String]) -> Vec<FilterAction> {
        domains
            .iter()
            .map(|_| {
                if self.rng.gen_range(0.0..100.0) < self.rate_percent {
                    self.action
                } else {
                    FilterAction::Pass
                }
            })
            .collect()
    }
}
