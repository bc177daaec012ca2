/// Core data types for the air-quality monitoring core.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no I/O and no lookup logic — only types and the error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Canonical variable codes
// ---------------------------------------------------------------------------

/// Normalized pollutant/variable identifier used as the join key across
/// independently-fetched collections (variables, measurements, limits).
///
/// Derived from a variable's display name by [`crate::registry::canonicalize`].
/// The regulated pollutants and comfort variables form a closed set; any
/// other normalized name lands in `Other`. Spanish display names
/// ("Temperatura", "Humedad", "VelocidadViento") map to the same variants
/// as their English counterparts, so the limits table needs one entry each.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanonicalCode {
    Pm25,
    Pm10,
    O3,
    No2,
    So2,
    Co,
    Temperature,
    Humidity,
    WindSpeed,
    /// Any normalized name outside the closed set, including the empty
    /// string produced by a missing display name. Never matches an entry
    /// in the default limits table.
    Other(String),
}

impl CanonicalCode {
    /// The normalized string form, e.g. `PM25` or `WINDSPEED`.
    pub fn as_str(&self) -> &str {
        match self {
            CanonicalCode::Pm25 => "PM25",
            CanonicalCode::Pm10 => "PM10",
            CanonicalCode::O3 => "O3",
            CanonicalCode::No2 => "NO2",
            CanonicalCode::So2 => "SO2",
            CanonicalCode::Co => "CO",
            CanonicalCode::Temperature => "TEMPERATURE",
            CanonicalCode::Humidity => "HUMIDITY",
            CanonicalCode::WindSpeed => "WINDSPEED",
            CanonicalCode::Other(s) => s,
        }
    }

    /// Whether this code belongs to the regulated pollutant set (as opposed
    /// to a comfort variable or an unrecognized name).
    pub fn is_pollutant(&self) -> bool {
        matches!(
            self,
            CanonicalCode::Pm25
                | CanonicalCode::Pm10
                | CanonicalCode::O3
                | CanonicalCode::No2
                | CanonicalCode::So2
                | CanonicalCode::Co
        )
    }
}

impl std::fmt::Display for CanonicalCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Classification status
// ---------------------------------------------------------------------------

/// Air-quality status, in ascending order of severity.
///
/// Totally determined by the `value / limit` ratio — never stored
/// independently, always recomputed from `(value, limit)` by
/// [`crate::classify::classify`]. The most severe state was named both
/// "very-unhealthy" and "critical" in older dashboards; they are the same
/// terminal state and only `Critical` exists here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Good,
    Moderate,
    Unhealthy,
    Critical,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Good => write!(f, "good"),
            Status::Moderate => write!(f, "moderate"),
            Status::Unhealthy => write!(f, "unhealthy"),
            Status::Critical => write!(f, "critical"),
        }
    }
}

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

/// A raw variable descriptor as served by the variable catalog endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub id: String,
    pub name: String,
    pub unit: String,
    pub code: CanonicalCode,
}

/// A single normalized measurement.
///
/// Produced by `ingest::raw::normalize_measurement` from a loosely-shaped
/// record (the variable may arrive as a nested object, a bare id, or a bare
/// code; the station may be nested under a sensor object or present as an
/// id). `value` is always finite — records failing that check are dropped
/// at normalization and never propagated. `timestamp` is `None` when the
/// source omitted a date or it failed to parse; windowing and latest-value
/// paths skip such records. `limit` is the per-record threshold some
/// sources attach; when present it takes precedence over the default
/// limits table for alert computation.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub station: String,
    pub variable_code: CanonicalCode,
    pub value: f64,
    pub unit: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub limit: Option<f64>,
}

/// One per-variable summary entry, the atomic unit returned by both the
/// trusted summary path and all fallback paths. Consumers must treat the
/// pathways as interchangeable.
///
/// A variable whose canonical code has no entry in the default limits table
/// is *unclassifiable*: `limit` and `status` are both `None`. This replaces
/// the older `limit = value * 2` placeholder, which silently classified
/// every unknown variable as moderate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStat {
    pub code: CanonicalCode,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub limit: Option<f64>,
    pub status: Option<Status>,
}

/// A threshold-exceedance alert, either served by the alerts endpoint or
/// computed locally from measurements at or above their applicable limit.
///
/// Identity key for deduplication: `(station, datetime, code, value)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub station: String,
    pub datetime: Option<DateTime<Utc>>,
    pub variable_code: CanonicalCode,
    pub value: f64,
    pub limit: f64,
}

/// A cleaned, chart-ready series point.
///
/// `timestamp` is `None` only for points that passed through an unbounded
/// (`all`) window with an unparseable date — bounded windows drop them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: Option<DateTime<Utc>>,
    pub value: f64,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise when calling the remote data service.
///
/// Only transport-level and response-level failures surface as errors;
/// per-record shape and data-quality problems are handled by omission at
/// the point of detection and never reach a `Result`.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Non-2xx HTTP response from the data service.
    #[error("HTTP error: {0}")]
    Http(u16),
    /// Network or timeout failure before a response was received.
    #[error("transport error: {0}")]
    Transport(String),
    /// The response body could not be deserialized into any usable shape.
    #[error("malformed response: {0}")]
    Shape(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            ServiceError::Http(status.as_u16())
        } else if err.is_decode() {
            ServiceError::Shape(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_ordering_ascends_with_severity() {
        assert!(Status::Good < Status::Moderate);
        assert!(Status::Moderate < Status::Unhealthy);
        assert!(Status::Unhealthy < Status::Critical);
    }

    #[test]
    fn test_status_serializes_to_lowercase_names() {
        assert_eq!(serde_json::to_string(&Status::Critical).unwrap(), "\"critical\"");
        assert_eq!(serde_json::to_string(&Status::Good).unwrap(), "\"good\"");
    }

    #[test]
    fn test_canonical_code_display_matches_join_key_form() {
        assert_eq!(CanonicalCode::Pm25.to_string(), "PM25");
        assert_eq!(CanonicalCode::WindSpeed.to_string(), "WINDSPEED");
        assert_eq!(CanonicalCode::Other("RADON".into()).to_string(), "RADON");
    }

    #[test]
    fn test_pollutant_set_excludes_comfort_variables() {
        assert!(CanonicalCode::Pm10.is_pollutant());
        assert!(CanonicalCode::O3.is_pollutant());
        assert!(!CanonicalCode::Humidity.is_pollutant());
        assert!(!CanonicalCode::Other("PM25X".into()).is_pollutant());
    }
}
