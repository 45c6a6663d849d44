//! Configuration sync protocol.
//!
//! Two phases. *Bootstrap*: scan the state channel from the earliest record
//! and adopt the most recent successful acknowledgement for this component;
//! if none exists, publish an empty default so the channel always carries a
//! recoverable state. *Running*: consume change requests, validate each one,
//! and acknowledge every decodable request on the state channel, echoing the
//! configuration that is active after handling it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{BusRecord, ControlBus, SyncError};
use crate::config::{
    mask_credentials, resolve_config, validate_structure, ControlMessage, PipelineConfig,
    ResolvedConfig,
};

/// Debug-log every configured unit with secret kwargs masked.
fn log_units(component_id: &str, config: &PipelineConfig) {
    for (section, specs) in [
        ("source", &config.sources),
        ("filter", &config.filters),
        ("output", &config.outputs),
    ] {
        for spec in specs {
            debug!(
                component = %component_id,
                unit = section,
                unit_type = %spec.type_tag,
                kwargs = %serde_json::Value::Object(mask_credentials(&spec.kwargs)),
                "Unit configured"
            );
        }
    }
}

pub struct ConfigSync {
    bus: Arc<dyn ControlBus>,
    component_id: String,
    current: PipelineConfig,
}

impl ConfigSync {
    /// Recover the active configuration from the state channel.
    pub async fn bootstrap(
        bus: Arc<dyn ControlBus>,
        component_id: impl Into<String>,
    ) -> Result<(Self, ResolvedConfig), SyncError> {
        let component_id = component_id.into();
        let records = bus.scan_state().await?;

        let mut recovered: Option<PipelineConfig> = None;
        for record in &records {
            if record.key.as_deref() != Some(component_id.as_str()) {
                continue;
            }
            match serde_json::from_slice::<ControlMessage>(&record.value) {
                Ok(message) if message.success => recovered = Some(message.current_config),
                Ok(_) => {}
                Err(e) => {
                    debug!(component = %component_id, error = %e, "Skipping undecodable state record");
                }
            }
        }

        if let Some(config) = recovered {
            match resolve_config(&config) {
                Ok(resolved) => {
                    info!(
                        component = %component_id,
                        sources = resolved.sources.len(),
                        filters = resolved.filters.len(),
                        outputs = resolved.outputs.len(),
                        "Configuration restored from state channel"
                    );
                    log_units(&component_id, &config);
                    let sync = Self {
                        bus,
                        component_id,
                        current: config,
                    };
                    return Ok((sync, resolved));
                }
                Err(e) => {
                    warn!(
                        component = %component_id,
                        error = %e,
                        "Recovered configuration no longer validates, starting empty"
                    );
                }
            }
        }

        info!(component = %component_id, "No usable state record, publishing empty default");
        let sync = Self {
            bus,
            component_id,
            current: PipelineConfig::default(),
        };
        sync.acknowledge(true, None).await;
        Ok((sync, ResolvedConfig::default()))
    }

    /// The active wire-format configuration.
    pub fn current(&self) -> &PipelineConfig {
        &self.current
    }

    /// Handle pending change requests.
    ///
    /// Every decodable request addressed to this component is acknowledged on
    /// the state channel, success or not. Requests carrying another key are
    /// skipped without acknowledgement. Returns the newly resolved
    /// configuration when at least one request was applied.
    pub async fn poll(&mut self) -> Result<Option<ResolvedConfig>, SyncError> {
        let records = self.bus.poll_requests().await?;

        let mut applied = None;
        for record in records {
            if let Some(resolved) = self.handle_request(record).await {
                applied = Some(resolved);
            }
        }
        Ok(applied)
    }

    async fn handle_request(&mut self, record: BusRecord) -> Option<ResolvedConfig> {
        if record.key.as_deref() != Some(self.component_id.as_str()) {
            debug!(
                component = %self.component_id,
                key = ?record.key,
                "Ignoring change request for another component"
            );
            return None;
        }

        let value: serde_json::Value = match serde_json::from_slice(&record.value) {
            Ok(v) => v,
            Err(e) => {
                warn!(component = %self.component_id, error = %e, "Rejecting undecodable change request");
                self.acknowledge(false, Some(format!("failed to decode request: {e}")))
                    .await;
                return None;
            }
        };

        if let Err(e) = validate_structure(&value) {
            warn!(component = %self.component_id, error = %e, "Rejecting malformed change request");
            self.acknowledge(false, Some(e.to_string())).await;
            return None;
        }

        // Structural validation guarantees this deserializes.
        let config: PipelineConfig = match serde_json::from_value(value) {
            Ok(c) => c,
            Err(e) => {
                self.acknowledge(false, Some(format!("failed to decode request: {e}")))
                    .await;
                return None;
            }
        };

        match resolve_config(&config) {
            Ok(resolved) => {
                info!(
                    component = %self.component_id,
                    sources = resolved.sources.len(),
                    filters = resolved.filters.len(),
                    outputs = resolved.outputs.len(),
                    "Configuration change accepted"
                );
                log_units(&self.component_id, &config);
                self.current = config;
                self.acknowledge(true, None).await;
                Some(resolved)
            }
            Err(e) => {
                warn!(component = %self.component_id, error = %e, "Rejecting invalid change request");
                self.acknowledge(false, Some(e.to_string())).await;
                None
            }
        }
    }

    /// Publish an acknowledgement echoing the active configuration.
    async fn acknowledge(&self, success: bool, message: Option<String>) {
        let ack = ControlMessage {
            success,
            message,
            current_config: self.current.clone(),
        };
        let payload = match serde_json::to_vec(&ack) {
            Ok(p) => p,
            Err(e) => {
                warn!(component = %self.component_id, error = %e, "Failed to encode acknowledgement");
                return;
            }
        };
        if let Err(e) = self.bus.publish_state(&self.component_id, payload).await {
            warn!(component = %self.component_id, error = %e, "Failed to publish acknowledgement");
        }
    }
}
