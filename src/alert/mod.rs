/// Threshold-exceedance alerting.
///
/// Submodules:
/// - `merge` — local alert computation from measurements, plus merging
///   and deduplication of the external and computed feeds.

pub mod merge;

pub use merge::{compute_alerts, merge_alerts};
