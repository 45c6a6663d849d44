//! Generation-based supervision of the worker pipeline.
//!
//! A *generation* is one set of worker tasks built from one configuration.
//! Every tick the supervisor drains collected domains, fans them out to the
//! filters with a gather deadline, resolves the verdicts, and dispatches the
//! survivors. An accepted configuration change tears the whole generation
//! down without draining and builds a fresh one; a batch in flight at that
//! moment is lost, which keeps delivery at-most-once.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::workers::{filter_worker, output_worker, source_worker, FilterRequest};
use crate::config::ResolvedConfig;
use crate::control::ConfigSync;
use crate::filters::build_filter;
use crate::outputs::build_output;
use crate::resolver::{resolve, FilterResponse};
use crate::sources::build_source;
use crate::types::{normalize_domain, ForwardedDomain};

const SOURCE_CHANNEL_CAPACITY: usize = 64;
const FILTER_CHANNEL_CAPACITY: usize = 8;
const OUTPUT_CHANNEL_CAPACITY: usize = 8;

/// Tick loop timing knobs.
#[derive(Debug, Clone)]
pub struct TickSettings {
    pub tick_interval: Duration,
    /// Gather deadline for filter replies within one tick.
    pub filter_timeout: Duration,
    /// Cap on batches drained per source per tick.
    pub max_batches_per_source: usize,
}

impl Default for TickSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            filter_timeout: Duration::from_millis(5000),
            max_batches_per_source: 64,
        }
    }
}

struct SourceHandle {
    name: String,
    rx: mpsc::Receiver<Vec<String>>,
}

struct FilterHandle {
    name: String,
    tx: mpsc::Sender<FilterRequest>,
}

struct OutputHandle {
    name: String,
    tx: mpsc::Sender<Arc<Vec<ForwardedDomain>>>,
}

/// One configuration's worth of running workers.
struct Generation {
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    sources: Vec<SourceHandle>,
    filters: Vec<FilterHandle>,
    outputs: Vec<OutputHandle>,
}

impl Generation {
    /// Spawn workers for every unit in the configuration.
    ///
    /// A unit whose constructor fails (missing file, bad path) is skipped
    /// with a warning; the rest of the generation still comes up.
    async fn build(config: &ResolvedConfig, parent: &CancellationToken) -> Self {
        let cancel = parent.child_token();
        let mut tasks = JoinSet::new();

        let mut sources = Vec::new();
        for spec in &config.sources {
            match build_source(spec).await {
                Ok(source) => {
                    let (tx, rx) = mpsc::channel(SOURCE_CHANNEL_CAPACITY);
                    let name = source.name().to_string();
                    tasks.spawn(source_worker(source, tx, cancel.clone()));
                    sources.push(SourceHandle { name, rx });
                }
                Err(e) => warn!(error = %e, "Skipping source that failed to initialize"),
            }
        }

        let mut filters = Vec::new();
        for spec in &config.filters {
            match build_filter(spec).await {
                Ok(filter) => {
                    let (tx, rx) = mpsc::channel(FILTER_CHANNEL_CAPACITY);
                    let name = filter.name().to_string();
                    tasks.spawn(filter_worker(filter, rx, cancel.clone()));
                    filters.push(FilterHandle { name, tx });
                }
                Err(e) => warn!(error = %e, "Skipping filter that failed to initialize"),
            }
        }

        let mut outputs = Vec::new();
        for spec in &config.outputs {
            match build_output(spec) {
                Ok(output) => {
                    let (tx, rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
                    let name = output.name().to_string();
                    tasks.spawn(output_worker(output, rx, cancel.clone()));
                    outputs.push(OutputHandle { name, tx });
                }
                Err(e) => warn!(error = %e, "Skipping output that failed to initialize"),
            }
        }

        Self {
            cancel,
            tasks,
            sources,
            filters,
            outputs,
        }
    }

    /// Drain pending source batches into one normalized, de-duplicated list.
    ///
    /// Order of first appearance is preserved so filter verdict rows stay
    /// meaningful in logs.
    fn collect(&mut self, max_batches_per_source: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut batch = Vec::new();
        for source in &mut self.sources {
            for _ in 0..max_batches_per_source {
                let Ok(domains) = source.rx.try_recv() else {
                    break;
                };
                for raw in domains {
                    let domain = normalize_domain(&raw);
                    if !domain.is_empty() && seen.insert(domain.clone()) {
                        batch.push(domain);
                    }
                }
            }
        }
        batch
    }

    /// Fan the batch out to every filter and gather replies under a deadline.
    ///
    /// Filters that miss the deadline, or whose channel is unavailable, just
    /// contribute nothing this tick.
    async fn run_filters(
        &self,
        batch: Arc<Vec<String>>,
        deadline: Duration,
    ) -> Vec<FilterResponse> {
        let mut pending = Vec::with_capacity(self.filters.len());
        for filter in &self.filters {
            let (reply_tx, reply_rx) = oneshot::channel();
            let request = FilterRequest {
                batch: batch.clone(),
                reply: reply_tx,
            };
            match filter.tx.try_send(request) {
                Ok(()) => pending.push((filter.name.clone(), reply_rx)),
                Err(_) => {
                    warn!(filter = %filter.name, "Filter busy or gone, skipping it this tick");
                }
            }
        }

        let gathered = futures::future::join_all(pending.into_iter().map(
            |(name, reply_rx)| async move {
                match tokio::time::timeout(deadline, reply_rx).await {
                    Ok(Ok(verdicts)) => Some((name, verdicts)),
                    Ok(Err(_)) => {
                        warn!(filter = %name, "Filter went away mid-tick");
                        None
                    }
                    Err(_) => {
                        warn!(filter = %name, timeout_ms = deadline.as_millis() as u64, "Filter missed the gather deadline");
                        None
                    }
                }
            },
        ))
        .await;

        gathered.into_iter().flatten().collect()
    }

    /// Hand the survivors to every output.
    fn dispatch(&self, forwarded: Vec<ForwardedDomain>) {
        if forwarded.is_empty() {
            return;
        }
        let shared = Arc::new(forwarded);
        for output in &self.outputs {
            if output.tx.try_send(shared.clone()).is_err() {
                warn!(output = %output.name, "Output busy or gone, dropping batch for it");
            }
        }
    }

    /// Hard stop: cancel and abort every worker without draining.
    fn teardown(mut self) {
        self.cancel.cancel();
        self.tasks.abort_all();
    }
}

/// Owns the tick loop: configuration changes, collection, filtering,
/// resolution, dispatch.
pub struct Supervisor {
    sync: ConfigSync,
    settings: TickSettings,
    cancel: CancellationToken,
}

impl Supervisor {
    pub fn new(sync: ConfigSync, settings: TickSettings, cancel: CancellationToken) -> Self {
        Self {
            sync,
            settings,
            cancel,
        }
    }

    /// Run until cancelled. `initial` is the configuration recovered at
    /// bootstrap. Nothing in the tick loop is fatal: a control bus failure
    /// is logged and the current generation keeps serving.
    pub async fn run(mut self, initial: ResolvedConfig) {
        let mut config = initial;
        loop {
            info!(
                sources = config.sources.len(),
                filters = config.filters.len(),
                outputs = config.outputs.len(),
                "Building pipeline generation"
            );
            let mut generation = Generation::build(&config, &self.cancel).await;
            info!(
                sources = generation.sources.len(),
                filters = generation.filters.len(),
                outputs = generation.outputs.len(),
                "Pipeline running"
            );

            config = loop {
                tokio::select! {
                    () = self.cancel.cancelled() => {
                        info!("Shutdown requested, stopping pipeline");
                        generation.teardown();
                        return;
                    }
                    () = tokio::time::sleep(self.settings.tick_interval) => {}
                }

                match self.sync.poll().await {
                    Ok(Some(next)) => {
                        info!("Replacing pipeline generation");
                        break next;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "Control bus poll failed, keeping current configuration");
                    }
                }

                let batch = generation.collect(self.settings.max_batches_per_source);
                if batch.is_empty() {
                    continue;
                }

                let batch = Arc::new(batch);
                let responses = generation
                    .run_filters(batch.clone(), self.settings.filter_timeout)
                    .await;
                let forwarded = resolve(&batch, &responses);
                info!(
                    collected = batch.len(),
                    forwarded = forwarded.len(),
                    dropped = batch.len() - forwarded.len(),
                    "Tick complete"
                );
                debug!(responses = responses.len(), "Filter responses gathered");
                generation.dispatch(forwarded);
            };

            generation.teardown();
        }
    }
}
