//! Filter units: polymorphic pipeline stages emitting one verdict per domain.
//!
//! Every filter obeys the same contract: given an ordered batch of domains it
//! returns one [`FilterAction`] per input, in the same order, for any batch
//! size including zero. Filters never fail mid-tick; a variant with an
//! unreliable dependency (the remote feed) degrades to its last good state
//! instead of erroring.

mod pattern;
mod probabilistic;
mod remote_list;
mod suffix_list;
mod syntax;

pub use pattern::PatternFilter;
pub use probabilistic::ProbabilisticFilter;
pub use remote_list::RemoteListFilter;
pub use suffix_list::SuffixListFilter;
pub use syntax::SyntaxValidationFilter;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::FilterSpec;
use crate::types::FilterAction;

/// Why a filter could not be constructed. Initialization failures skip the
/// unit; they are never fatal to the pipeline.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("failed to load suffix list from '{path}': {source}")]
    ListLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Capability contract for one filter stage.
///
/// `filter` takes `&mut self` because each filter is exclusively owned by its
/// worker task; refresh state (TTL clocks, RNGs) lives inside the filter.
#[async_trait]
pub trait DomainFilter: Send + 'static {
    /// Display name, unique among the active filters. Used as the evidence
    /// map key.
    fn name(&self) -> &str;

    /// Evaluate an ordered batch. The result has the same length and order
    /// as the input.
    async fn filter(&mut self, domains: &[String]) -> Vec<FilterAction>;
}

/// Construct a filter from its validated spec.
///
/// Async because the remote-list variant performs its initial feed fetch
/// here (failure leaves it with an empty snapshot, it does not abort
/// construction).
pub async fn build_filter(spec: &FilterSpec) -> Result<Box<dyn DomainFilter>, FilterError> {
    match spec {
        FilterSpec::SuffixList { name, action, path } => Ok(Box::new(SuffixListFilter::from_file(
            name.clone(),
            *action,
            path,
        )?)),
        FilterSpec::Pattern { name, action } => {
            Ok(Box::new(PatternFilter::new(name.clone(), *action)))
        }
        FilterSpec::Syntax { name, action } => {
            Ok(Box::new(SyntaxValidationFilter::new(name.clone(), *action)))
        }
        FilterSpec::Probabilistic {
            name,
            action,
            rate_percent,
        } => Ok(Box::new(ProbabilisticFilter::new(
            name.clone(),
            *action,
            *rate_percent,
        ))),
        FilterSpec::RemoteList {
            name,
            action,
            feed_url,
            api_token,
            top_n,
            cache_time_s,
        } => {
            let mut filter = RemoteListFilter::new(
                name.clone(),
                *action,
                feed_url.clone(),
                api_token.clone(),
                *top_n,
                std::time::Duration::from_secs(*cache_time_s),
            );
            filter.refresh().await;
            Ok(Box::new(filter))
        }
    }
}
