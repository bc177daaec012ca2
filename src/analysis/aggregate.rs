/// Statistical aggregation over normalized measurement records.
///
/// All functions here are pure over their input slices: nothing is mutated
/// and repeated calls with overlapping windows are safe. Empty input always
/// yields "unavailable" (`None`), never a zero — callers must be able to
/// distinguish "no data" from "the value is 0".

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};

use crate::analysis::window::{TimeWindow, WindowKind};
use crate::model::{CanonicalCode, MeasurementRecord, SeriesPoint};

// ---------------------------------------------------------------------------
// Per-variable statistics
// ---------------------------------------------------------------------------

/// An extreme value together with the timestamp it was observed at, when
/// the source record carried one.
#[derive(Debug, Clone, PartialEq)]
pub struct Extreme {
    pub value: f64,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Summary statistics for one variable over one window.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableStats {
    pub avg: f64,
    pub max: Extreme,
    pub min: Extreme,
    /// Percentage of measurements at or below the limit, rounded half-up.
    /// `None` when no limit applies to the variable.
    pub compliance_pct: Option<u32>,
    pub samples: usize,
}

/// Computes avg/max/min/compliance over records already filtered to one
/// variable code and window. Returns `None` on empty input.
pub fn aggregate(records: &[MeasurementRecord], limit: Option<f64>) -> Option<VariableStats> {
    let first = records.first()?;
    let mut sum = first.value;
    let mut max = Extreme { value: first.value, timestamp: first.timestamp };
    let mut min = max.clone();
    for r in &records[1..] {
        sum += r.value;
        if r.value > max.value {
            max = Extreme { value: r.value, timestamp: r.timestamp };
        }
        if r.value < min.value {
            min = Extreme { value: r.value, timestamp: r.timestamp };
        }
    }
    let samples = records.len();
    let compliance_pct = limit.map(|limit| {
        let under = records.iter().filter(|r| r.value <= limit).count();
        // round half-up via f64::round (half away from zero; counts are
        // non-negative so the two coincide)
        ((under as f64 / samples as f64) * 100.0).round() as u32
    });
    Some(VariableStats {
        avg: sum / samples as f64,
        max,
        min,
        compliance_pct,
        samples,
    })
}

// ---------------------------------------------------------------------------
// Per-code reductions (fallback statistics)
// ---------------------------------------------------------------------------

/// Mean value per canonical code. Serves the trend/statistical fallback:
/// smoothing matters more than recency there.
pub fn mean_by_code(records: &[MeasurementRecord]) -> HashMap<CanonicalCode, f64> {
    let mut sums: HashMap<CanonicalCode, (f64, usize)> = HashMap::new();
    for r in records {
        let entry = sums.entry(r.variable_code.clone()).or_insert((0.0, 0));
        entry.0 += r.value;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(code, (sum, count))| (code, sum / count as f64))
        .collect()
}

/// Most recent record per canonical code, by timestamp. Serves the
/// current-state fallback: recency matters more than smoothing there.
/// Records without a timestamp cannot compete and are skipped.
pub fn latest_by_code(records: &[MeasurementRecord]) -> HashMap<CanonicalCode, MeasurementRecord> {
    let mut latest: HashMap<CanonicalCode, MeasurementRecord> = HashMap::new();
    for r in records {
        let Some(ts) = r.timestamp else { continue };
        match latest.get(&r.variable_code) {
            Some(current) if current.timestamp.is_some_and(|cur| cur >= ts) => {}
            _ => {
                latest.insert(r.variable_code.clone(), r.clone());
            }
        }
    }
    latest
}

// ---------------------------------------------------------------------------
// Re-bucketing
// ---------------------------------------------------------------------------

/// Buckets measurements by hour (24h windows) or day (anything else) and
/// averages within each bucket, producing a coarser but non-empty series
/// when the trend endpoint returned nothing usable. Output is
/// chronological; records without a timestamp or outside the window are
/// skipped.
pub fn bucket_mean_series(records: &[MeasurementRecord], window: &TimeWindow) -> Vec<SeriesPoint> {
    let mut buckets: BTreeMap<DateTime<Utc>, (f64, usize)> = BTreeMap::new();
    for r in records {
        let Some(ts) = r.timestamp else { continue };
        if !window.contains(ts) {
            continue;
        }
        let Some(bucket) = truncate_to_bucket(ts, window.kind) else { continue };
        let entry = buckets.entry(bucket).or_insert((0.0, 0));
        entry.0 += r.value;
        entry.1 += 1;
    }
    buckets
        .into_iter()
        .map(|(bucket, (sum, count))| SeriesPoint {
            timestamp: Some(bucket),
            value: sum / count as f64,
        })
        .collect()
}

fn truncate_to_bucket(ts: DateTime<Utc>, kind: WindowKind) -> Option<DateTime<Utc>> {
    let hour = match kind {
        WindowKind::Last24h => ts.hour(),
        _ => 0,
    };
    Utc.with_ymd_and_hms(ts.year(), ts.month(), ts.day(), hour, 0, 0)
        .single()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 10, h, m, 0).unwrap()
    }

    fn rec(value: f64, ts: Option<DateTime<Utc>>) -> MeasurementRecord {
        MeasurementRecord {
            station: "Centro".to_string(),
            variable_code: CanonicalCode::Pm25,
            value,
            unit: "µg/m3".to_string(),
            timestamp: ts,
            limit: None,
        }
    }

    #[test]
    fn test_empty_input_is_unavailable_not_zero() {
        assert!(aggregate(&[], Some(35.0)).is_none());
    }

    #[test]
    fn test_min_avg_max_ordering() {
        let records = vec![
            rec(10.0, Some(at(1, 0))),
            rec(40.0, Some(at(2, 0))),
            rec(25.0, Some(at(3, 0))),
        ];
        let stats = aggregate(&records, Some(35.0)).unwrap();
        assert!(stats.min.value <= stats.avg && stats.avg <= stats.max.value);
        assert_eq!(stats.min.value, 10.0);
        assert_eq!(stats.max.value, 40.0);
        assert_eq!(stats.avg, 25.0);
        assert_eq!(stats.samples, 3);
    }

    #[test]
    fn test_extremes_carry_their_timestamps() {
        let records = vec![
            rec(10.0, Some(at(1, 0))),
            rec(40.0, Some(at(2, 0))),
            rec(25.0, Some(at(3, 0))),
        ];
        let stats = aggregate(&records, None).unwrap();
        assert_eq!(stats.max.timestamp, Some(at(2, 0)));
        assert_eq!(stats.min.timestamp, Some(at(1, 0)));
        assert_eq!(stats.compliance_pct, None);
    }

    #[test]
    fn test_compliance_counts_values_at_limit_as_compliant() {
        let records = vec![rec(35.0, None), rec(36.0, None)];
        let stats = aggregate(&records, Some(35.0)).unwrap();
        // one of two at/below limit -> 50%
        assert_eq!(stats.compliance_pct, Some(50));
    }

    #[test]
    fn test_compliance_rounds_half_up() {
        // 1 of 3 compliant -> 33.33 -> 33; 2 of 3 -> 66.67 -> 67
        let records = vec![rec(30.0, None), rec(40.0, None), rec(50.0, None)];
        assert_eq!(aggregate(&records, Some(35.0)).unwrap().compliance_pct, Some(33));
        let records = vec![rec(30.0, None), rec(31.0, None), rec(50.0, None)];
        assert_eq!(aggregate(&records, Some(35.0)).unwrap().compliance_pct, Some(67));
        // exact half rounds up: 1 of 8 -> 12.5 -> 13
        let mut records = vec![rec(30.0, None)];
        records.extend(std::iter::repeat_with(|| rec(50.0, None)).take(7));
        assert_eq!(aggregate(&records, Some(35.0)).unwrap().compliance_pct, Some(13));
    }

    #[test]
    fn test_single_record_is_its_own_extremes() {
        let stats = aggregate(&[rec(12.5, Some(at(4, 0)))], Some(35.0)).unwrap();
        assert_eq!(stats.avg, 12.5);
        assert_eq!(stats.max.value, 12.5);
        assert_eq!(stats.min.value, 12.5);
        assert_eq!(stats.compliance_pct, Some(100));
    }

    #[test]
    fn test_mean_by_code_groups_independently() {
        let mut records = vec![rec(10.0, None), rec(20.0, None)];
        let mut o3 = rec(0.030, None);
        o3.variable_code = CanonicalCode::O3;
        records.push(o3);
        let means = mean_by_code(&records);
        assert_eq!(means[&CanonicalCode::Pm25], 15.0);
        assert_eq!(means[&CanonicalCode::O3], 0.030);
    }

    #[test]
    fn test_latest_by_code_prefers_recency_over_position() {
        let records = vec![
            rec(10.0, Some(at(3, 0))),
            rec(99.0, Some(at(1, 0))), // older, listed later
            rec(20.0, None),           // no timestamp, cannot win
        ];
        let latest = latest_by_code(&records);
        assert_eq!(latest[&CanonicalCode::Pm25].value, 10.0);
    }

    #[test]
    fn test_latest_by_code_skips_untimestamped_only_records() {
        let latest = latest_by_code(&[rec(20.0, None)]);
        assert!(latest.is_empty());
    }

    #[test]
    fn test_bucket_mean_series_hourly_for_24h_window() {
        let window = TimeWindow::ending_at(WindowKind::Last24h, at(12, 0));
        let records = vec![
            rec(10.0, Some(at(9, 5))),
            rec(20.0, Some(at(9, 40))),
            rec(30.0, Some(at(11, 15))),
        ];
        let series = bucket_mean_series(&records, &window);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].timestamp, Some(at(9, 0)));
        assert_eq!(series[0].value, 15.0);
        assert_eq!(series[1].timestamp, Some(at(11, 0)));
        assert_eq!(series[1].value, 30.0);
    }

    #[test]
    fn test_bucket_mean_series_daily_for_wider_windows() {
        let window = TimeWindow::ending_at(WindowKind::Last7d, at(12, 0));
        let records = vec![
            rec(10.0, Some(Utc.with_ymd_and_hms(2024, 11, 8, 3, 0, 0).unwrap())),
            rec(30.0, Some(Utc.with_ymd_and_hms(2024, 11, 8, 21, 0, 0).unwrap())),
            rec(50.0, Some(Utc.with_ymd_and_hms(2024, 11, 9, 12, 0, 0).unwrap())),
        ];
        let series = bucket_mean_series(&records, &window);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].value, 20.0);
        assert_eq!(series[1].value, 50.0);
    }

    #[test]
    fn test_bucket_mean_series_respects_window_bounds() {
        let window = TimeWindow::ending_at(WindowKind::Last24h, at(12, 0));
        let records = vec![rec(10.0, Some(Utc.with_ymd_and_hms(2024, 11, 8, 3, 0, 0).unwrap()))];
        assert!(bucket_mean_series(&records, &window).is_empty());
    }
}
