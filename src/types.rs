//! Core data model shared across the pipeline.
//!
//! A domain is just a normalized `String`; the types here cover the verdict
//! enum, the per-domain decision record, and normalization helpers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Verdict a filter emits for a single domain.
///
/// The ordering is the combination priority: when several filters disagree,
/// the highest verdict wins. `Store` deliberately outranks `Drop` so a filter
/// asserting "retain for analysis" overrides another filter's block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FilterAction {
    /// Forward the domain for analysis without recording anything.
    Pass = 0,
    /// Discard the domain.
    Drop = 1,
    /// Forward the domain and record the per-filter verdicts alongside it.
    Store = 2,
}

impl From<FilterAction> for u8 {
    fn from(action: FilterAction) -> Self {
        action as u8
    }
}

impl TryFrom<u8> for FilterAction {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FilterAction::Pass),
            1 => Ok(FilterAction::Drop),
            2 => Ok(FilterAction::Store),
            other => Err(format!("invalid filter action {other}, expected 0..=2")),
        }
    }
}

impl std::fmt::Display for FilterAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterAction::Pass => write!(f, "PASS"),
            FilterAction::Drop => write!(f, "DROP"),
            FilterAction::Store => write!(f, "STORE"),
        }
    }
}

/// Per-filter verdict record attached to a forwarded domain.
///
/// `BTreeMap` keeps the serialized form deterministic.
pub type EvidenceMap = BTreeMap<String, FilterAction>;

/// A domain that survived filtering, together with its evidence.
///
/// `evidence` is empty when the resolved verdict was `Pass` and carries one
/// entry per responding filter when it was `Store`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardedDomain {
    pub domain: String,
    #[serde(default)]
    pub evidence: EvidenceMap,
}

impl ForwardedDomain {
    pub fn passed(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            evidence: EvidenceMap::new(),
        }
    }

    pub fn stored(domain: impl Into<String>, evidence: impl Into<EvidenceMap>) -> Self {
        Self {
            domain: domain.into(),
            evidence: evidence.into(),
        }
    }
}

/// Normalize a raw domain string: trim surrounding whitespace and case-fold.
///
/// This is the identity key used for per-tick de-duplication.
pub fn normalize_domain(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
