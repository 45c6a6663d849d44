//! Domain pre-filter pipeline.
//!
//! Collects candidate domain names from pluggable sources, runs them through
//! a chain of filters that each emit a per-domain verdict, combines the
//! verdicts into a single decision, and forwards the survivors to pluggable
//! outputs. The whole pipeline is reconfigurable at runtime through a control
//! bus; configuration state survives restarts via the bus's state channel.

pub mod config;
pub mod control;
pub mod filters;
pub mod matcher;
pub mod outputs;
pub mod pipeline;
pub mod resolver;
pub mod sources;
pub mod types;

pub use config::{PipelineConfig, ResolvedConfig};
pub use control::{ConfigSync, ControlBus, MemoryBus};
pub use pipeline::{Supervisor, TickSettings};
pub use types::{FilterAction, ForwardedDomain};
