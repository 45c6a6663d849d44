//! JSON-lines file sink.

use std::io::Write;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::{Output, OutputError};
use crate::types::{EvidenceMap, ForwardedDomain};

/// On-disk record: the forwarded domain plus the time it was written.
#[derive(Serialize)]
struct FileRecord<'a> {
    domain: &'a str,
    evidence: &'a EvidenceMap,
    #[serde(rename = "observedAt")]
    observed_at: DateTime<Utc>,
}

/// Appends each forwarded domain as one JSON object per line.
///
/// The file is opened per batch so external rotation or truncation between
/// ticks is picked up without restarting the pipeline.
pub struct FileOutput {
    name: String,
    path: String,
}

impl FileOutput {
    pub fn new(path: &str) -> Result<Self, OutputError> {
        // Probe writability up front so a bad path fails the unit at build
        // time instead of silently dropping every batch.
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| OutputError::FileOpen {
                path: path.to_string(),
                source,
            })?;

        info!(path = %path, "Output file ready");

        Ok(Self {
            name: format!("file:{path}"),
            path: path.to_string(),
        })
    }

    fn append_batch(&self, domains: &[ForwardedDomain]) -> std::io::Result<()> {
        let now = Utc::now();
        let mut buffer = Vec::new();
        for forwarded in domains {
            let record = FileRecord {
                domain: &forwarded.domain,
                evidence: &forwarded.evidence,
                observed_at: now,
            };
            serde_json::to_writer(&mut buffer, &record)?;
            buffer.push(b'\n');
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&buffer)
    }
}

#[async_trait]
impl Output for FileOutput {
    fn name(&self) -> &str {
        &self.name
    }

    async fn output(&mut self, domains: &[ForwardedDomain]) -> Vec<String> {
        if domains.is_empty() {
            return Vec::new();
        }

        match self.append_batch(domains) {
            Ok(()) => domains.iter().map(|f| f.domain.clone()).collect(),
            Err(e) => {
                warn!(output = %self.name, error = %e, "Failed to append batch, dropping it");
                Vec::new()
            }
        }
    }
}
