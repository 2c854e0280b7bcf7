//! Observability for stablecoin ingestion: logging, metrics and audit samples.

pub mod audit;
pub mod logging;
pub mod metrics;

pub use audit::AuditLog;
pub use logging::{init_logging, LogFormat};
pub use metrics::Metrics;
