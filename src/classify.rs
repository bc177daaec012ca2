//! Threshold-based status classification.
//!
//! A measured value is classified purely by its ratio to the applicable
//! limit; no other input affects the result. Severity bands, ascending:
//!
//!   value <  0.5·limit          → good
//!   0.5·limit <= value < 0.8·limit → moderate
//!   0.8·limit <= value < limit  → unhealthy
//!   value >= limit              → critical

use crate::model::Status;

/// Classifies a value against a positive limit.
///
/// Total and deterministic for `limit > 0`; monotonic non-decreasing in
/// `value`. A zero or negative limit is a caller error — limits must be
/// resolved (and unresolvable variables rejected as unclassifiable)
/// before calling, not handled here.
pub fn classify(value: f64, limit: f64) -> Status {
    debug_assert!(limit > 0.0, "classify requires a positive limit, got {limit}");
    let ratio = value / limit;
    if ratio >= 1.0 {
        Status::Critical
    } else if ratio >= 0.8 {
        Status::Unhealthy
    } else if ratio >= 0.5 {
        Status::Moderate
    } else {
        Status::Good
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
