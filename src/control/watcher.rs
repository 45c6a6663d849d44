//! Local change-request file watcher.
//!
//! Bridges a configuration file on disk onto the request channel: the file
//! content is submitted once at startup and again whenever its modification
//! time changes. Useful for single-host deployments without an external
//! control plane.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ControlBus;

const POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEBOUNCE: Duration = Duration::from_millis(500);

pub async fn run_request_watcher(
    bus: Arc<dyn ControlBus>,
    component_id: String,
    path: PathBuf,
    cancel: CancellationToken,
) {
    info!(path = %path.display(), "Watching change-request file");

    let mut last_mtime = modified(&path);
    submit(&*bus, &component_id, &path).await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                debug!(path = %path.display(), "Request watcher stopping");
                return;
            }
            () = sleep(POLL_INTERVAL) => {}
        }

        let mtime = modified(&path);
        if mtime == last_mtime {
            continue;
        }

        // Let the writer finish before reading.
        sleep(DEBOUNCE).await;
        last_mtime = modified(&path);

        info!(path = %path.display(), "Change-request file modified, submitting");
        submit(&*bus, &component_id, &path).await;
    }
}

async fn submit(bus: &dyn ControlBus, component_id: &str, path: &Path) {
    let content = match std::fs::read(path) {
        Ok(c) => c,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read change-request file");
            return;
        }
    };
    if let Err(e) = bus.submit_request(component_id, content).await {
        warn!(path = %path.display(), error = %e, "Failed to submit change request");
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::MemoryBus;
    use std::io::Write;

    #[tokio::test]
    async fn initial_content_is_submitted_immediately() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"sources":[],"filters":[],"outputs":[]}}"#).unwrap();

        let bus = Arc::new(MemoryBus::new());
        let cancel = CancellationToken::new();
        let watcher = tokio::spawn(run_request_watcher(
            bus.clone(),
            "loader".to_string(),
            file.path().to_path_buf(),
            cancel.clone(),
        ));

        // The initial submit happens before the first poll sleep.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let requests = bus.poll_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].key.as_deref(), Some("loader"));

        cancel.cancel();
        watcher.await.unwrap();
    }
}
