use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use domain_prefilter::control::{run_request_watcher, ConfigSync, ControlBus, MemoryBus};
use domain_prefilter::pipeline::{Supervisor, TickSettings};

#[derive(Parser, Debug)]
#[command(name = "domain-prefilter", about = "Domain pre-filter pipeline", version)]
struct CliArgs {
    /// Change-request file to watch. Its content is submitted on startup and
    /// whenever the file changes.
    #[arg(long, env = "PREFILTER_CONFIG")]
    config: Option<PathBuf>,

    /// Component key on the control bus.
    #[arg(long, env = "PREFILTER_COMPONENT_ID", default_value = "loader")]
    component_id: String,

    /// Tick interval in milliseconds.
    #[arg(long, default_value_t = 500)]
    tick_ms: u64,

    /// Gather deadline for filter replies in milliseconds.
    #[arg(long, default_value_t = 5000)]
    filter_timeout_ms: u64,

    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, env = "PREFILTER_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    // Logs go to stderr so the stdout output unit stays machine-readable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    info!(component = %args.component_id, "Starting domain pre-filter");

    let bus: Arc<dyn ControlBus> = Arc::new(MemoryBus::new());
    let cancel = CancellationToken::new();

    if let Some(path) = args.config.clone() {
        tokio::spawn(run_request_watcher(
            bus.clone(),
            args.component_id.clone(),
            path,
            cancel.clone(),
        ));
    }

    let (sync, initial) = bootstrap_with_retry(bus, &args.component_id, &cancel).await?;

    let settings = TickSettings {
        tick_interval: Duration::from_millis(args.tick_ms),
        filter_timeout: Duration::from_millis(args.filter_timeout_ms),
        ..TickSettings::default()
    };
    let supervisor = Supervisor::new(sync, settings, cancel.clone());

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    supervisor.run(initial).await;

    info!("Shutdown complete");
    Ok(())
}

/// Bootstrap against the control bus, retrying with capped backoff while the
/// bus is unavailable.
async fn bootstrap_with_retry(
    bus: Arc<dyn ControlBus>,
    component_id: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<(ConfigSync, domain_prefilter::ResolvedConfig)> {
    let mut backoff = Duration::from_secs(1);
    loop {
        match ConfigSync::bootstrap(bus.clone(), component_id).await {
            Ok(ready) => return Ok(ready),
            Err(e) => {
                warn!(error = %e, retry_in_s = backoff.as_secs(), "Bootstrap failed, retrying");
                tokio::select! {
                    () = cancel.cancelled() => anyhow::bail!("shutdown during bootstrap"),
                    () = tokio::time::sleep(backoff) => {}
                }
                backoff = (backoff * 2).min(Duration::from_secs(30));
            }
        }
    }
}
