//! Air-quality monitoring core.
//!
//! Normalization, classification, aggregation and tiered resolution for a
//! network of air-quality stations, serving the dashboards' summary,
//! trend-chart and alert views.
//!
//! The pipeline, outside in:
//! - [`ingest`] fetches loosely-shaped records from the REST data service
//!   and normalizes them into the strict types of [`model`];
//! - [`registry`] resolves variable identity (display names to canonical
//!   codes) and holds the default limits table;
//! - [`classify`] and [`analysis`] turn normalized records into statuses,
//!   summary statistics and chartable series;
//! - [`alert`] computes and merges the threshold-exceedance feed;
//! - [`resolve`] ties it together behind the three-tier fallback strategy
//!   (report endpoint, local recomputation, last known good).

pub mod alert;
pub mod analysis;
pub mod classify;
pub mod config;
pub mod ingest;
pub mod model;
pub mod registry;
pub mod resolve;

pub use classify::classify;
pub use config::Config;
pub use ingest::{DataService, HttpDataService, MeasurementQuery};
pub use model::{
    AlertRecord, CanonicalCode, MeasurementRecord, SeriesPoint, ServiceError, Status, SummaryStat,
};
pub use registry::{StationDirectory, VariableRegistry};
pub use resolve::{Debouncer, FallbackStatistic, Resolver, StatisticsRow};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initializes the global tracing subscriber, filtered by `RUST_LOG`.
/// Safe to call more than once; only the first call installs it.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_target(true)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .compact()
            .init();
    });
}
