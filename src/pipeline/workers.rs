//! Per-unit worker tasks.
//!
//! Each source, filter, and output runs in its own task for the lifetime of
//! one configuration generation. Workers hold their unit exclusively and talk
//! to the supervisor over channels; cancellation tears a generation down
//! without draining, so an in-flight batch is simply abandoned.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::filters::DomainFilter;
use crate::outputs::Output;
use crate::sources::Source;
use crate::types::{FilterAction, ForwardedDomain};

/// One tick's work order for a filter worker.
pub struct FilterRequest {
    pub batch: Arc<Vec<String>>,
    pub reply: oneshot::Sender<Vec<FilterAction>>,
}

/// Poll the source on its own cadence and push batches to the supervisor.
///
/// A full channel drops the batch rather than blocking the poll cadence; the
/// supervisor drains faster than sources produce under normal load.
pub async fn source_worker(
    mut source: Box<dyn Source>,
    tx: mpsc::Sender<Vec<String>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(source.poll_interval()) => {}
        }

        match source.collect().await {
            Ok(batch) => {
                if batch.is_empty() {
                    continue;
                }
                match tx.try_send(batch) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(batch)) => {
                        warn!(
                            source = %source.name(),
                            dropped = batch.len(),
                            "Source channel full, dropping batch"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => return,
                }
            }
            Err(e) => {
                warn!(source = %source.name(), error = %e, "Source collection failed");
            }
        }
    }
}

/// Serve filter requests until cancelled.
pub async fn filter_worker(
    mut filter: Box<dyn DomainFilter>,
    mut rx: mpsc::Receiver<FilterRequest>,
    cancel: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            () = cancel.cancelled() => return,
            request = rx.recv() => match request {
                Some(r) => r,
                None => return,
            }
        };

        let verdicts = filter.filter(&request.batch).await;
        // The supervisor may have timed this tick out already.
        if request.reply.send(verdicts).is_err() {
            debug!(filter = %filter.name(), "Reply arrived after the gather deadline");
        }
    }
}

/// Forward resolved batches into the sink until cancelled.
pub async fn output_worker(
    mut output: Box<dyn Output>,
    mut rx: mpsc::Receiver<Arc<Vec<ForwardedDomain>>>,
    cancel: CancellationToken,
) {
    loop {
        let batch = tokio::select! {
            () = cancel.cancelled() => return,
            batch = rx.recv() => match batch {
                Some(b) => b,
                None => return,
            }
        };

        let emitted = output.output(&batch).await;
        debug!(output = %output.name(), offered = batch.len(), emitted = emitted.len(), "Batch delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::PatternFilter;

    #[tokio::test]
    async fn filter_worker_replies_per_request() {
        let filter = Box::new(PatternFilter::new("stars".to_string(), FilterAction::Drop));
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let worker = tokio::spawn(filter_worker(filter, rx, cancel.clone()));

        let batch = Arc::new(vec!["*.bad.com".to_string(), "fine.org".to_string()]);
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(FilterRequest {
            batch,
            reply: reply_tx,
        })
        .await
        .unwrap();

        let verdicts = reply_rx.await.unwrap();
        assert_eq!(verdicts, vec![FilterAction::Drop, FilterAction::Pass]);

        cancel.cancel();
        worker.await.unwrap();
    }
}
