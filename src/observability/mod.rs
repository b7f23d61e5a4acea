//! Observability: logging, metrics, and the structured event stream.

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{EventEmitter, JsonlEventLog};
pub use logging::{init_logging, LogFormat};
pub use metrics::init_metrics;
