//! Label-aligned suffix matching over domain names.
//!
//! Stored suffixes and queried domains are split into dot-separated labels,
//! reversed, and walked through a tree keyed at label boundaries. That makes
//! "example.com" match itself and "a.example.com" but never "notexample.com",
//! which a raw string-suffix check would wrongly accept.
//!
//! Rebuilds publish a fresh tree through an atomic pointer swap, so a filter
//! refreshing its list never exposes a partially built structure to readers.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::types::normalize_domain;

/// One node per label boundary. `terminal` marks the end of a stored suffix.
#[derive(Debug, Clone, Default)]
struct Node {
    children: HashMap<String, Node>,
    terminal: bool,
}

impl Node {
    fn insert<'a>(&mut self, mut labels: impl Iterator<Item = &'a str>) {
        match labels.next() {
            Some(label) => self
                .children
                .entry(label.to_string())
                .or_default()
                .insert(labels),
            None => self.terminal = true,
        }
    }

    /// Walk reversed labels; any terminal node on the path is a match.
    fn lookup<'a>(&self, mut labels: impl Iterator<Item = &'a str>) -> bool {
        if self.terminal {
            return true;
        }
        match labels.next() {
            Some(label) => self
                .children
                .get(label)
                .is_some_and(|child| child.lookup(labels)),
            None => false,
        }
    }
}

/// Membership structure over domain suffixes.
///
/// `contains` runs in O(number of labels). `add` and `replace_all` build a
/// new tree and swap it in atomically; the matcher is safe to share with
/// concurrent readers during a refresh.
#[derive(Debug, Default)]
pub struct SuffixMatcher {
    root: ArcSwap<Node>,
}

impl SuffixMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a matcher from an initial set of suffixes.
    pub fn from_iter<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let matcher = Self::new();
        matcher.replace_all(suffixes);
        matcher
    }

    /// Add a single suffix. Idempotent: re-adding an existing suffix does not
    /// change matching behavior.
    pub fn add(&self, domain: &str) {
        let normalized = normalize_domain(domain);
        if normalized.is_empty() {
            return;
        }
        let mut next = Node::clone(&self.root.load_full());
        next.insert(normalized.split('.').rev());
        self.root.store(Arc::new(next));
    }

    /// Atomic bulk rebuild: the previous contents are discarded and readers
    /// switch from the old tree to the new one in a single step.
    pub fn replace_all<I, S>(&self, suffixes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut next = Node::default();
        for suffix in suffixes {
            let normalized = normalize_domain(suffix.as_ref());
            if normalized.is_empty() {
                continue;
            }
            next.insert(normalized.split('.').rev());
        }
        self.root.store(Arc::new(next));
    }

    /// True iff the domain equals a stored suffix or is a label-aligned
    /// subdomain of one.
    pub fn contains(&self, domain: &str) -> bool {
        let normalized = normalize_domain(domain);
        if normalized.is_empty() {
            return false;
        }
        self.root.load().lookup(normalized.split('.').rev())
    }

    pub fn is_empty(&self) -> bool {
        let root = self.root.load();
        root.children.is_empty() && !root.terminal
    }
}
