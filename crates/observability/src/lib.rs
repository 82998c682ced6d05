//! # chatvault-observability
//!
//! Observability-Crate fuer chatvault:
//! - Prometheus-Metriken der Verschluesselungsschicht
//! - Structured Logging (Text oder JSON) via tracing-subscriber

pub mod logging;
pub mod metrics;

pub use logging::logging_initialisieren;
pub use metrics::{CryptoMetrics, FehlerGrund};
