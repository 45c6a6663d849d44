//! Suffix filter backed by a periodically refreshed remote ranked feed.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::DomainFilter;
use crate::matcher::SuffixMatcher;
use crate::types::FilterAction;

/// Upper bound on one feed fetch, independent of the refresh TTL.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum wait between refresh attempts while the feed is failing, so a
/// degraded feed does not cost a fetch time-box on every single batch.
const RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Matches domains against the top-N entries of an external ranked feed.
///
/// The list is refreshed at most once per TTL window. A failed or slow fetch
/// is logged, backed off, and the previous snapshot keeps serving; `filter()`
/// itself never fails or blocks beyond the fetch time-box.
pub struct RemoteListFilter {
    name: String,
    action: FilterAction,
    client: reqwest::Client,
    feed_url: String,
    api_token: Option<String>,
    top_n: usize,
    ttl: Duration,
    last_fetch: Option<Instant>,
    last_attempt: Option<Instant>,
    matcher: SuffixMatcher,
}

impl RemoteListFilter {
    pub fn new(
        name: String,
        action: FilterAction,
        feed_url: String,
        api_token: Option<String>,
        top_n: usize,
        ttl: Duration,
    ) -> Self {
        Self {
            name,
            action,
            client: reqwest::Client::new(),
            feed_url,
            api_token,
            top_n,
            ttl,
            last_fetch: None,
            last_attempt: None,
            matcher: SuffixMatcher::new(),
        }
    }

    /// Fetch the feed and swap in a fresh snapshot on success.
    ///
    /// On failure the matcher is left untouched and `last_fetch` is not
    /// advanced; the recorded attempt time holds further retries back for
    /// the backoff window.
    pub async fn refresh(&mut self) {
        self.last_attempt = Some(Instant::now());
        let result = tokio::time::timeout(FETCH_TIMEOUT, self.fetch_feed()).await;
        match result {
            Ok(Ok(domains)) if !domains.is_empty() => {
                info!(
                    filter = %self.name,
                    url = %self.feed_url,
                    count = domains.len(),
                    "Remote list refreshed"
                );
                self.matcher.replace_all(domains);
                self.last_fetch = Some(Instant::now());
            }
            Ok(Ok(_)) => {
                warn!(filter = %self.name, url = %self.feed_url, "Remote feed returned no domains, keeping previous snapshot");
            }
            Ok(Err(e)) => {
                warn!(filter = %self.name, url = %self.feed_url, error = %e, "Remote feed fetch failed, keeping previous snapshot");
            }
            Err(_) => {
                warn!(
                    filter = %self.name,
                    url = %self.feed_url,
                    timeout_s = FETCH_TIMEOUT.as_secs(),
                    "Remote feed fetch timed out, keeping previous snapshot"
                );
            }
        }
    }

    async fn fetch_feed(&self) -> anyhow::Result<Vec<String>> {
        let mut request = self
            .client
            .get(&self.feed_url)
            .query(&[("limit", self.top_n)]);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let body: Value = request.send().await?.error_for_status()?.json().await?;
        Ok(parse_feed(&body))
    }

    fn ensure_fresh(&self) -> bool {
        if let Some(at) = self.last_fetch {
            if at.elapsed() < self.ttl {
                return false;
            }
        }
        match self.last_attempt {
            Some(at) if at.elapsed() < RETRY_BACKOFF => false,
            _ => true,
        }
    }
}

/// Extract domains from the feed response shape
/// `{"result": {"top_0": [{"domain": "..."}]}}`.
fn parse_feed(body: &Value) -> Vec<String> {
    body.get("result")
        .and_then(|r| r.get("top_0"))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("domain").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl DomainFilter for RemoteListFilter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn filter(&mut self, domains: &[String]) -> Vec<FilterAction> {
        if self.ensure_fresh() {
            debug!(filter = %self.name, "Remote list TTL expired, refreshing");
            self.refresh().await;
        }

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
