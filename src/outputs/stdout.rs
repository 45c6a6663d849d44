//! Console sink with bounded de-duplication.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use super::Output;
use crate::types::ForwardedDomain;

const DEDUP_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEDUP_CAPACITY: usize = 100_000;

/// Remembers recently seen keys for a TTL, with a hard entry cap.
///
/// When the cap is hit, expired entries are evicted first; if none have
/// expired yet the oldest entry goes. Memory stays bounded no matter how many
/// distinct domains flow through.
struct TtlCache {
    entries: HashMap<String, Instant>,
    ttl: Duration,
    capacity: usize,
}

impl TtlCache {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity,
        }
    }

    /// True if `key` was not seen within the TTL; records it either way.
    fn insert(&mut self, key: &str) -> bool {
        let now = Instant::now();
        if let Some(seen_at) = self.entries.get(key) {
            if now.duration_since(*seen_at) < self.ttl {
                return false;
            }
        }

        if self.entries.len() >= self.capacity && !self.entries.contains_key(key) {
            self.evict(now);
        }
        self.entries.insert(key.to_string(), now);
        true
    }

    fn evict(&mut self, now: Instant) {
        let before = self.entries.len();
        self.entries
            .retain(|_, seen_at| now.duration_since(*seen_at) < self.ttl);
        if self.entries.len() < before {
            return;
        }
        // Nothing expired, drop the oldest entry instead.
        if let Some(oldest) = self
            .entries
            .iter()
            .min_by_key(|(_, seen_at)| **seen_at)
            .map(|(key, _)| key.clone())
        {
            self.entries.remove(&oldest);
        }
    }
}

/// Prints each new domain once per TTL window, with its evidence when present.
pub struct StdOutput {
    name: String,
    seen: TtlCache,
}

impl StdOutput {
    pub fn new() -> Self {
        Self {
            name: "stdout".to_string(),
            seen: TtlCache::new(DEDUP_TTL, DEDUP_CAPACITY),
        }
    }
}

impl Default for StdOutput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Output for StdOutput {
    fn name(&self) -> &str {
        &self.name
    }

    async fn output(&mut self, domains: &[ForwardedDomain]) -> Vec<String> {
        let mut emitted = Vec::new();
        for forwarded in domains {
            if !self.seen.insert(&forwarded.domain) {
                debug!(domain = %forwarded.domain, "Suppressed duplicate");
                continue;
            }
            if forwarded.evidence.is_empty() {
                println!("{}", forwarded.domain);
            } else {
                let evidence = serde_json::to_string(&forwarded.evidence)
                    .unwrap_or_else(|_| "{}".to_string());
                println!("{} {}", forwarded.domain, evidence);
            }
            emitted.push(forwarded.domain.clone());
        }
        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FilterAction;

    #[tokio::test]
    async fn duplicates_within_ttl_are_suppressed() {
        let mut out = StdOutput::new();
        let batch = vec![
            ForwardedDomain::passed("fresh.example.com"),
            ForwardedDomain::passed("fresh.example.com"),
        ];
        assert_eq!(out.output(&batch).await, vec!["fresh.example.com"]);
        assert!(out.output(&batch).await.is_empty());
    }

    #[tokio::test]
    async fn stored_domains_are_still_emitted_once() {
        let mut out = StdOutput::new();
        let batch = vec![ForwardedDomain::stored(
            "flagged.example.com",
            [("block".to_string(), FilterAction::Store)],
        )];
        assert_eq!(out.output(&batch).await, vec!["flagged.example.com"]);
    }

    #[test]
    fn cache_capacity_is_a_hard_bound() {
        let mut cache = TtlCache::new(Duration::from_secs(60), 3);
        assert!(cache.insert("a.com"));
        assert!(cache.insert("b.com"));
        assert!(cache.insert("c.com"));
        assert!(cache.insert("d.com"));
        assert!(cache.entries.len() <= 3);
        // The newest entry always survives eviction.
        assert!(!cache.insert("d.com"));
    }

    #[test]
    fn expired_entries_are_seen_again() {
        let mut cache = TtlCache::new(Duration::ZERO, 10);
        assert!(cache.insert("a.com"));
        assert!(cache.insert("a.com"));
    }
}
