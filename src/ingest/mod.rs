/// Data ingestion for the air-quality monitoring core.
///
/// Submodules:
/// - `client` — the `DataService` abstraction and its HTTP implementation.
/// - `raw` — tolerant parsing and normalization of loosely-shaped records.

pub mod client;
pub mod raw;

pub use client::{DataService, HttpDataService, MeasurementQuery};
