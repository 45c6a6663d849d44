//! Whole-file source: the complete list, every tick.

use async_trait::async_trait;
use tracing::info;

use super::{Source, SourceError};

/// Reads a domain file once at construction and returns the full list on
/// every poll. Downstream de-duplication is expected to absorb the repeats.
pub struct StaticFileSource {
    name: String,
    domains: Vec<String>,
}

impl StaticFileSource {
    pub fn new(path: &str) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path).map_err(|source| SourceError::FileRead {
            path: path.to_string(),
            source,
        })?;

        let domains: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();

        info!(path = %path, domains = domains.len(), "Domain file loaded");

        Ok(Self {
            name: format!("file:{path}"),
            domains,
        })
    }
}

#[async_trait]
impl Source for StaticFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn collect(&mut self) -> Result<Vec<String>, SourceError> {
        Ok(self.domains.clone())
    }
}
