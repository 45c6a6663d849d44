//! Control plane: the bus abstraction, the in-process bus, the configuration
//! sync protocol, and the local change-request file watcher.

mod memory;
mod sync;
mod watcher;

pub use memory::MemoryBus;
pub use sync::ConfigSync;
pub use watcher::run_request_watcher;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ConfigError;

/// One record on a bus channel: an optional routing key and a raw payload.
#[derive(Debug, Clone)]
pub struct BusRecord {
    pub key: Option<String>,
    pub value: Vec<u8>,
}

impl BusRecord {
    pub fn new(key: impl Into<String>, value: Vec<u8>) -> Self {
        Self {
            key: Some(key.into()),
            value,
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("control bus failure: {0}")]
    Bus(String),

    #[error("failed to decode record: {0}")]
    Decode(String),

    #[error(transparent)]
    Validation(#[from] ConfigError),
}

/// Transport seam for the configuration sync protocol.
///
/// Two logical channels: a compacted *state* channel carrying configuration
/// acknowledgements, and a *request* channel carrying change requests. The
/// in-process [`MemoryBus`] implements both; an external broker-backed bus
/// would slot in behind the same trait.
#[async_trait]
pub trait ControlBus: Send + Sync {
    /// Read the state channel from the earliest retained record.
    async fn scan_state(&self) -> Result<Vec<BusRecord>, SyncError>;

    /// Append an acknowledgement to the state channel.
    async fn publish_state(&self, key: &str, value: Vec<u8>) -> Result<(), SyncError>;

    /// Consume change requests published since the previous poll.
    async fn poll_requests(&self) -> Result<Vec<BusRecord>, SyncError>;

    /// Publish a change request.
    async fn submit_request(&self, key: &str, value: Vec<u8>) -> Result<(), SyncError>;
}
