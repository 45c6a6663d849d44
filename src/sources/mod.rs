//! Source units: pollable producers of raw domain names.

mod file;
mod streaming;

pub use file::StaticFileSource;
pub use streaming::StreamingFileSource;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::SourceSpec;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read domain file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Capability contract for one source stage.
///
/// `collect` is polled on the source's own cadence and returns whatever the
/// source has produced since the previous call, possibly nothing. Transient
/// emptiness is not an error.
#[async_trait]
pub trait Source: Send + 'static {
    fn name(&self) -> &str;

    /// How often the worker should poll `collect`.
    fn poll_interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn collect(&mut self) -> Result<Vec<String>, SourceError>;
}

/// Construct a source from its validated spec.
pub async fn build_source(spec: &SourceSpec) -> Result<Box<dyn Source>, SourceError> {
    match spec {
        SourceSpec::File { path } => Ok(Box::new(StaticFileSource::new(path)?)),
        SourceSpec::StreamingFile {
            path,
            delay_ms,
            jitter_ms,
            entries_per_produce,
            entries_per_produce_jitter,
            repeat,
        } => Ok(Box::new(StreamingFileSource::open(
            path,
            Duration::from_millis(*delay_ms),
            Duration::from_millis(*jitter_ms),
            *entries_per_produce,
            *entries_per_produce_jitter,
            *repeat,
        )?)),
    }
}
