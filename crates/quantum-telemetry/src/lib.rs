//! # Quantum Telemetry
//!
//! Observability for the Quantum-Chain BLS verification pool.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` fmt layer, plain or JSON, filtered by `EnvFilter`
//! - **Metrics**: the Prometheus metric set of a verification pool
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quantum_telemetry::{init_logging, BlsPoolMetrics, TelemetryConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging(&TelemetryConfig::from_env())?;
//!
//!     let registry = prometheus::Registry::new();
//!     let metrics = BlsPoolMetrics::new(&registry)?;
//!     // hand `metrics` to the pool, serve `encode_metrics(&registry)`
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUST_LOG` | unset | Filter directive, overrides `QC_BLS_LOG_LEVEL` |
//! | `QC_BLS_LOG_LEVEL` | `info` | Log level filter |
//! | `QC_BLS_JSON_LOGS` | `false` | JSON formatted logs |

mod config;
mod logging;
mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{encode_metrics, BlsPoolMetrics, HistogramTimer};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
