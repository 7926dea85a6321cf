//! Training-log parsing and cross-variant comparison for the nine VWW experiment variants.
//!
//! - `parse`: per-epoch loss / accuracy / time series from a raw log.
//! - `variants`: file naming per variant and loading of every log that exists.
//! - `report`: mean epoch-time ranking and metric series, as text or JSON.

pub mod error;
pub mod parse;
pub mod report;
pub mod variants;

pub use error::{LogError, LogResult};
pub use parse::{mean, Metric, TrainingLog};
pub use report::{
    epoch_times, metric_series, render_epoch_times, render_series, EpochTimeRow, MetricSeries,
    OutputFormat,
};
pub use variants::{LogLayout, VariantLog};

/// Installs the `fmt` subscriber on stderr, filtered by `RUST_LOG` (default `warn`).
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
