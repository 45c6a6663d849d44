//! Whole-pipeline runs: sources through filters to a file output.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use async_trait::async_trait;
use domain_prefilter::config::ControlMessage;
use domain_prefilter::control::{BusRecord, ConfigSync, ControlBus, MemoryBus, SyncError};
use domain_prefilter::pipeline::{Supervisor, TickSettings};
use domain_prefilter::types::{FilterAction, ForwardedDomain};

const COMPONENT: &str = "loader";
const DEADLINE: Duration = Duration::from_secs(10);

fn write_file(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path.to_str().unwrap().to_string()
}

async fn seed_state(bus: &MemoryBus, config: serde_json::Value) {
    let message = ControlMessage {
        success: true,
        message: None,
        current_config: serde_json::from_value(config).unwrap(),
    };
    bus.publish_state(COMPONENT, serde_json::to_vec(&message).unwrap())
        .await
        .unwrap();
}

fn fast_ticks() -> TickSettings {
    TickSettings {
        tick_interval: Duration::from_millis(50),
        ..TickSettings::default()
    }
}

/// Poll the output file until `predicate` holds or the deadline passes.
async fn wait_for_output<F>(path: &str, predicate: F) -> Vec<ForwardedDomain>
where
    F: Fn(&[ForwardedDomain]) -> bool,
{
    let started = std::time::Instant::now();
    loop {
        let lines: Vec<ForwardedDomain> = std::fs::read_to_string(path)
            .unwrap_or_default()
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        if predicate(&lines) {
            return lines;
        }
        assert!(
            started.elapsed() < DEADLINE,
            "output file never reached the expected state, saw: {lines:?}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn blocked_domains_are_dropped_and_the_rest_forwarded() {
    let dir = tempfile::tempdir().unwrap();
    let domains = write_file(dir.path(), "domains.txt", "EVIL.com\ngood.org\nevil.com\n");
    let blocklist = write_file(dir.path(), "blocklist.txt", "evil.com\n");
    let out = dir.path().join("out.jsonl").to_str().unwrap().to_string();

    let bus = Arc::new(MemoryBus::new());
    seed_state(
        &bus,
        json!({
            "sources": [
                {"type": "file", "args": [], "kwargs": {"filename": domains}}
            ],
            "filters": [
                {"type": "suffix_list", "args": [], "kwargs": {
                    "filter_name": "block",
                    "filename": blocklist,
                    "filter_result_action": 1
                }}
            ],
            "outputs": [
                {"type": "file", "args": [], "kwargs": {"filename": out}}
            ]
        }),
    )
    .await;

    let (sync, initial) = ConfigSync::bootstrap(bus.clone(), COMPONENT).await.unwrap();
    assert_eq!(initial.sources.len(), 1);
    assert_eq!(initial.filters.len(), 1);
    assert_eq!(initial.outputs.len(), 1);

    let cancel = CancellationToken::new();
    let supervisor = Supervisor::new(sync, fast_ticks(), cancel.clone());
    let handle = tokio::spawn(supervisor.run(initial));

    let lines = wait_for_output(&out, |lines| {
        lines.iter().any(|f| f.domain == "good.org")
    })
    .await;

    let good = lines.iter().find(|f| f.domain == "good.org").unwrap();
    assert!(good.evidence.is_empty());
    // Both casings of the blocked domain normalize to the same key and drop.
    assert!(lines.iter().all(|f| f.domain != "evil.com"));

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn store_verdict_overrides_drop_and_attaches_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let domains = write_file(dir.path(), "domains.txt", "ads.example.com\n");
    let drop_list = write_file(dir.path(), "drop.txt", "ads.example.com\n");
    let store_list = write_file(dir.path(), "store.txt", "example.com\n");
    let out = dir.path().join("out.jsonl").to_str().unwrap().to_string();

    let bus = Arc::new(MemoryBus::new());
    seed_state(
        &bus,
        json!({
            "sources": [
                {"type": "file", "args": [], "kwargs": {"filename": domains}}
            ],
            "filters": [
                {"type": "suffix_list", "args": [], "kwargs": {
                    "filter_name": "A",
                    "filename": drop_list,
                    "filter_result_action": 1
                }},
                {"type": "suffix_list", "args": [], "kwargs": {
                    "filter_name": "B",
                    "filename": store_list,
                    "filter_result_action": 2
                }}
            ],
            "outputs": [
                {"type": "file", "args": [], "kwargs": {"filename": out}}
            ]
        }),
    )
    .await;

    let (sync, initial) = ConfigSync::bootstrap(bus.clone(), COMPONENT).await.unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Supervisor::new(sync, fast_ticks(), cancel.clone()).run(initial));

    let lines = wait_for_output(&out, |lines| !lines.is_empty()).await;

    let stored = &lines[0];
    assert_eq!(stored.domain, "ads.example.com");
    assert_eq!(stored.evidence.len(), 2);
    assert_eq!(stored.evidence["A"], FilterAction::Drop);
    assert_eq!(stored.evidence["B"], FilterAction::Store);

    cancel.cancel();
    handle.await.unwrap();
}

/// Bus with a healthy state channel but a request channel that always fails.
struct UnreliableBus {
    inner: MemoryBus,
}

#[async_trait]
impl ControlBus for UnreliableBus {
    async fn scan_state(&self) -> Result<Vec<BusRecord>, SyncError> {
        self.inner.scan_state().await
    }

    async fn publish_state(&self, key: &str, value: Vec<u8>) -> Result<(), SyncError> {
        self.inner.publish_state(key, value).await
    }

    async fn poll_requests(&self) -> Result<Vec<BusRecord>, SyncError> {
        Err(SyncError::Bus("request channel unavailable".to_string()))
    }

    async fn submit_request(&self, key: &str, value: Vec<u8>) -> Result<(), SyncError> {
        self.inner.submit_request(key, value).await
    }
}

#[tokio::test]
async fn bus_poll_failures_do_not_stop_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let domains = write_file(dir.path(), "domains.txt", "steady.example.org\n");
    let out = dir.path().join("out.jsonl").to_str().unwrap().to_string();

    let inner = MemoryBus::new();
    seed_state(
        &inner,
        json!({
            "sources": [
                {"type": "file", "args": [], "kwargs": {"filename": domains}}
            ],
            "filters": [],
            "outputs": [
                {"type": "file", "args": [], "kwargs": {"filename": out}}
            ]
        }),
    )
    .await;

    let bus = Arc::new(UnreliableBus { inner });
    let (sync, initial) = ConfigSync::bootstrap(bus.clone(), COMPONENT).await.unwrap();
    assert_eq!(initial.sources.len(), 1);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Supervisor::new(sync, fast_ticks(), cancel.clone()).run(initial));

    // Many ticks (and so many failed polls) happen before the source's first
    // batch; output only appears if the loop survives every one of them.
    let lines = wait_for_output(&out, |lines| !lines.is_empty()).await;
    assert_eq!(lines[0].domain, "steady.example.org");

    cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn live_reconfiguration_replaces_an_empty_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let domains = write_file(dir.path(), "domains.txt", "fresh.example.net\n");
    let out = dir.path().join("out.jsonl").to_str().unwrap().to_string();

    // Start from the published empty default.
    let bus = Arc::new(MemoryBus::new());
    let (sync, initial) = ConfigSync::bootstrap(bus.clone(), COMPONENT).await.unwrap();
    assert!(initial.sources.is_empty());

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(Supervisor::new(sync, fast_ticks(), cancel.clone()).run(initial));

    let request = json!({
        "sources": [
            {"type": "file", "args": [], "kwargs": {"filename": domains}}
        ],
        "filters": [],
        "outputs": [
            {"type": "file", "args": [], "kwargs": {"filename": out}}
        ]
    });
    bus.submit_request(COMPONENT, request.to_string().into_bytes())
        .await
        .unwrap();

    let lines = wait_for_output(&out, |lines| !lines.is_empty()).await;
    assert_eq!(lines[0].domain, "fresh.example.net");
    assert!(lines[0].evidence.is_empty());

    // The applied change was acknowledged on the state channel.
    let records = bus.scan_state().await.unwrap();
    let ack: ControlMessage = serde_json::from_slice(&records.last().unwrap().value).unwrap();
    assert!(ack.success);
    assert_eq!(ack.current_config.sources.len(), 1);

    cancel.cancel();
    handle.await.unwrap();
}
