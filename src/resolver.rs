//! Combines per-filter verdicts into one decision per domain.

use tracing::warn;

use crate::types::{EvidenceMap, FilterAction, ForwardedDomain};

/// One filter's response for a tick: its display name and its verdict row,
/// positionally aligned to the tick's domain batch.
pub type FilterResponse = (String, Vec<FilterAction>);

/// Resolve the tick's batch against the filters that responded in time.
///
/// For each domain, `resolved = max(verdicts)`, defaulting to `Pass` when no
/// filter responded. Domains resolving to `Drop` are discarded. A `Store`
/// resolution attaches the full per-filter verdict map; `Pass` forwards with
/// an empty map. A response row whose length does not match the batch is
/// ignored as a whole, since positional alignment is the only way verdicts
/// map back to domains.
pub fn resolve(batch: &[String], responses: &[FilterResponse]) -> Vec<ForwardedDomain> {
    let aligned: Vec<&FilterResponse> = responses
        .iter()
        .filter(|(name, actions)| {
            if actions.len() == batch.len() {
                true
            } else {
                warn!(
                    filter = %name,
                    expected = batch.len(),
                    got = actions.len(),
                    "Filter response not aligned to batch, discarding its verdicts"
                );
                false
            }
        })
        .collect();

    let mut forwarded = Vec::with_capacity(batch.len());
    for (i, domain) in batch.iter().enumerate() {
        let mut evidence = EvidenceMap::new();
        for (name, actions) in &aligned {
            evidence.insert(name.clone(), actions[i]);
        }

        let resolved = evidence.values().copied().max().unwrap_or(FilterAction::Pass);
        match resolved {
            FilterAction::Drop => continue,
            FilterAction::Store => forwarded.push(ForwardedDomain::stored(domain.clone(), evidence)),
            FilterAction::Pass => forwarded.push(ForwardedDomain::passed(domain.clone())),
        }
    }

    forwarded
}
