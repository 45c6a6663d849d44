//! In-process control bus.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BusRecord, ControlBus, SyncError};

#[derive(Default)]
struct BusInner {
    state: Vec<BusRecord>,
    requests: Vec<BusRecord>,
    consumed: usize,
}

/// Single-process bus used when no external broker is configured.
///
/// The state channel retains everything published to it; the request channel
/// has a single consumer tracked by an offset, so each request is delivered
/// exactly once to the sync loop.
#[derive(Default)]
pub struct MemoryBus {
    inner: Mutex<BusInner>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ControlBus for MemoryBus {
    async fn scan_state(&self) -> Result<Vec<BusRecord>, SyncError> {
        Ok(self.inner.lock().await.state.clone())
    }

    async fn publish_state(&self, key: &str, value: Vec<u8>) -> Result<(), SyncError> {
        self.inner.lock().await.state.push(BusRecord::new(key, value));
        Ok(())
    }

    async fn poll_requests(&self) -> Result<Vec<BusRecord>, SyncError> {
        let mut inner = self.inner.lock().await;
        let fresh = inner.requests[inner.consumed..].to_vec();
        inner.consumed = inner.requests.len();
        Ok(fresh)
    }

    async fn submit_request(&self, key: &str, value: Vec<u8>) -> Result<(), SyncError> {
        self.inner
            .lock()
            .await
            .requests
            .push(BusRecord::new(key, value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn requests_are_delivered_once() {
        let bus = MemoryBus::new();
        bus.submit_request("loader", b"one".to_vec()).await.unwrap();
        bus.submit_request("loader", b"two".to_vec()).await.unwrap();

        let first = bus.poll_requests().await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(bus.poll_requests().await.unwrap().is_empty());

        bus.submit_request("loader", b"three".to_vec()).await.unwrap();
        let next = bus.poll_requests().await.unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].value, b"three");
    }

    #[tokio::test]
    async fn state_scan_returns_the_full_history() {
        let bus = MemoryBus::new();
        bus.publish_state("loader", b"a".to_vec()).await.unwrap();
        bus.publish_state("loader", b"b".to_vec()).await.unwrap();

        let records = bus.scan_state().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].value, b"b");
        // Scans are non-destructive.
        assert_eq!(bus.scan_state().await.unwrap().len(), 2);
    }
}
