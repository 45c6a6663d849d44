//! Output units: sinks for forwarded domains.

mod file;
mod stdout;

pub use file::FileOutput;
pub use stdout::StdOutput;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::OutputSpec;
use crate::types::ForwardedDomain;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to open output file '{path}': {source}")]
    FileOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Capability contract for one output stage.
///
/// `output` returns the domains it actually emitted, which may be a subset
/// when the sink de-duplicates. Write failures are logged and swallowed; an
/// output never takes the pipeline down.
#[async_trait]
pub trait Output: Send + 'static {
    fn name(&self) -> &str;

    async fn output(&mut self, domains: &[ForwardedDomain]) -> Vec<String>;
}

/// Construct an output from its validated spec.
pub fn build_output(spec: &OutputSpec) -> Result<Box<dyn Output>, OutputError> {
    match spec {
        OutputSpec::Stdout => Ok(Box::new(StdOutput::new())),
        OutputSpec::File { path } => Ok(Box::new(FileOutput::new(path)?)),
    }
}
