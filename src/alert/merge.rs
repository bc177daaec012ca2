/// Alert computation, merging and deduplication.
///
/// The alert feed combines two sources: alerts served by the external
/// alerts endpoint, and alerts computed locally by scanning measurements
/// at or above their applicable limit. External alerts are authoritative —
/// their identity keys are registered first, and a locally computed
/// duplicate is never allowed to displace one.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::model::{AlertRecord, CanonicalCode, MeasurementRecord};
use crate::registry::default_limit;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Deduplication key: `(station, datetime, code, value)`. The value enters
/// by bit pattern so two alerts are identical only when their floats are.
type AlertKey = (String, Option<DateTime<Utc>>, CanonicalCode, u64);

fn alert_key(alert: &AlertRecord) -> AlertKey {
    (
        alert.station.clone(),
        alert.datetime,
        alert.variable_code.clone(),
        alert.value.to_bits(),
    )
}

// ---------------------------------------------------------------------------
// Computed alerts
// ---------------------------------------------------------------------------

/// Scans measurements and emits one alert per record whose value is at or
/// above its limit (`>=` — a value exactly at the limit already alerts).
/// The limit is the record's own when the source supplied one, else the
/// default for its code; records with neither are skipped.
pub fn compute_alerts(records: &[MeasurementRecord]) -> Vec<AlertRecord> {
    records
        .iter()
        .filter_map(|r| {
            let limit = r
                .limit
                .or_else(|| default_limit(&r.variable_code).map(|l| l.limit))?;
            if r.value < limit {
                return None;
            }
            Some(AlertRecord {
                station: r.station.clone(),
                datetime: r.timestamp,
                variable_code: r.variable_code.clone(),
                value: r.value,
                limit,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merges external and computed alerts into one deduplicated feed:
///
/// 1. external alerts are kept (first occurrence of each identity key);
/// 2. computed alerts are appended only when their key is new;
/// 3. alerts for excluded codes are removed (pollutant-only views exclude
///    the comfort variables);
/// 4. the result is sorted by datetime descending, with missing datetimes
///    explicitly last.
pub fn merge_alerts(
    external: Vec<AlertRecord>,
    computed: Vec<AlertRecord>,
    exclude: &[CanonicalCode],
) -> Vec<AlertRecord> {
    let mut seen: HashSet<AlertKey> = HashSet::new();
    let mut merged = Vec::with_capacity(external.len() + computed.len());
    for alert in external.into_iter().chain(computed) {
        if exclude.contains(&alert.variable_code) {
            continue;
        }
        if seen.insert(alert_key(&alert)) {
            merged.push(alert);
        }
    }
    merged.sort_by(|a, b| match (a.datetime, b.datetime) {
        (Some(ta), Some(tb)) => tb.cmp(&ta),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    merged
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
