//! Worker tasks and the supervising tick loop.

mod supervisor;
mod workers;

pub use supervisor::{Supervisor, TickSettings};
pub use workers::FilterRequest;
