/// Statistical analysis for the air-quality monitoring core.
///
/// Submodules:
/// - `aggregate` — per-variable avg/max/min/compliance, per-code
///   reductions, and the re-bucketing fallback series.
/// - `window` — time-window presets and the series sanitation boundary.

pub mod aggregate;
pub mod window;
