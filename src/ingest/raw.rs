/// Normalization of loosely-shaped remote records.
///
/// The data service grew organically and its responses are not uniform: a
/// measurement may embed its variable as a nested object, a bare id, or a
/// bare code; the station may be nested under a sensor object or present
/// only as an id; numbers sometimes arrive as strings; dates come in ISO
/// 8601 or a space-delimited variant. All of that shape-sniffing lives
/// here, in one normalization function per record type — the rest of the
/// crate only ever sees the strict types from `model`.
///
/// Failure policy is omission: a record that cannot be resolved to a
/// variable, or whose value is not a finite number, is dropped (logged at
/// debug), never propagated and never fatal.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::model::{AlertRecord, MeasurementRecord};
use crate::registry::{code_for_name, default_limit, StationDirectory, VariableRegistry};

// ---------------------------------------------------------------------------
// Field extraction helpers
// ---------------------------------------------------------------------------

/// First present key rendered as a string. Accepts JSON strings and
/// numbers; numeric ids are common in this backend.
fn string_field(record: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match record.get(*key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// First present key parsed as a finite number. Accepts JSON numbers and
/// numeric strings; anything else (including NaN/infinite) is `None`.
fn numeric_field(record: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        let parsed = match record.get(*key) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        if let Some(v) = parsed {
            if v.is_finite() {
                return Some(v);
            }
        }
    }
    None
}

/// Unwraps either a bare JSON array or the `{ "results": [...] }`
/// pagination envelope into a list of records.
pub fn results_array(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Date parsing
// ---------------------------------------------------------------------------

/// Parses the date formats observed in the wild: RFC 3339 / ISO 8601 with
/// or without offset, the space-delimited `YYYY-MM-DD HH:MM[:SS]` variant
/// (normalized by substituting `T` for the space), and bare dates.
/// Offset-free timestamps are taken as UTC.
pub fn parse_flexible_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let normalized = raw.replacen(' ', "T", 1);
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0)?;
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    None
}

// ---------------------------------------------------------------------------
// Catalog records
// ---------------------------------------------------------------------------

/// `(id, name, unit)` from a raw variable descriptor. Descriptors without
/// an id are unusable as lookup entries and yield `None`; a missing name
/// or unit is kept as empty (an empty name canonicalizes to the empty
/// code, which matches no limit).
pub fn parse_variable_descriptor(record: &Value) -> Option<(String, String, String)> {
    let id = string_field(record, &["v_id", "id", "variable_id"])?;
    let name = string_field(record, &["v_name", "name"]).unwrap_or_default();
    let unit = string_field(record, &["v_unit", "unit"]).unwrap_or_default();
    Some((id, name, unit))
}

/// `(station_id, display name)` from a raw station record.
pub fn parse_station_entry(record: &Value) -> Option<(String, String)> {
    let id = string_field(record, &["station_id", "id"])?;
    let name = string_field(record, &["s_name", "name"]).unwrap_or_else(|| id.clone());
    Some((id, name))
}

/// `(sensor_id, station_id)` from a raw sensor record.
pub fn parse_sensor_link(record: &Value) -> Option<(String, String)> {
    let sensor_id = string_field(record, &["sensor_id", "id"])?;
    let station_id = string_field(record, &["station", "station_id"]).unwrap_or_default();
    Some((sensor_id, station_id))
}

// ---------------------------------------------------------------------------
// Variable and station references inside measurement-like records
// ---------------------------------------------------------------------------

/// How a record referred to its variable: by catalog id, or by a bare
/// name/code string the registry does not know.
#[derive(Debug)]
struct VariableRef {
    id: Option<String>,
    inline_name: Option<String>,
    inline_unit: Option<String>,
}

fn variable_ref(record: &Value) -> Option<VariableRef> {
    match record.get("variable") {
        Some(obj @ Value::Object(_)) => Some(VariableRef {
            id: string_field(obj, &["v_id", "id", "variable_id"]),
            inline_name: string_field(obj, &["v_name", "name"]),
            inline_unit: string_field(obj, &["v_unit", "unit"]),
        }),
        Some(Value::Number(n)) => Some(VariableRef {
            id: Some(n.to_string()),
            inline_name: None,
            inline_unit: None,
        }),
        Some(Value::String(s)) if !s.is_empty() => Some(VariableRef {
            // A bare string may be an id or a code; the caller resolves
            // against the registry first and falls back to name
            // canonicalization.
            id: Some(s.clone()),
            inline_name: Some(s.clone()),
            inline_unit: None,
        }),
        _ => string_field(record, &["variable_id"]).map(|id| VariableRef {
            id: Some(id),
            inline_name: None,
            inline_unit: None,
        }),
    }
}

/// Resolves the station display name for a measurement-like record,
/// preferring explicit name fields, then the nested sensor object, then
/// directory lookups by sensor id and station id, then the raw ids.
fn resolve_station_name(record: &Value, directory: &StationDirectory) -> String {
    if let Some(name) = string_field(record, &["station_name"]) {
        return name;
    }
    if let Some(Value::String(s)) = record.get("station") {
        if !s.is_empty() && directory.station_name(s).is_none() {
            // a non-id string is already a display name
            if s.parse::<u64>().is_err() {
                return s.clone();
            }
        }
    }
    let mut sensor_id = None;
    match record.get("sensor") {
        Some(obj @ Value::Object(_)) => {
            if let Some(name) = string_field(obj, &["station_name"]) {
                return name;
            }
            if let Some(station_id) = string_field(obj, &["station", "station_id"]) {
                if let Some(name) = directory.station_name(&station_id) {
                    return name.to_string();
                }
            }
            sensor_id = string_field(obj, &["sensor_id", "id"]);
        }
        Some(Value::String(s)) if !s.is_empty() => sensor_id = Some(s.clone()),
        Some(Value::Number(n)) => sensor_id = Some(n.to_string()),
        _ => {}
    }
    if sensor_id.is_none() {
        sensor_id = string_field(record, &["sensor_id"]);
    }
    if let Some(ref sid) = sensor_id {
        if let Some(name) = directory.station_for_sensor(sid) {
            return name.to_string();
        }
    }
    let station_id = string_field(record, &["station", "station_id"]);
    if let Some(ref id) = station_id {
        if let Some(name) = directory.station_name(id) {
            return name.to_string();
        }
    }
    sensor_id
        .or(station_id)
        .unwrap_or_else(|| "—".to_string())
}

// ---------------------------------------------------------------------------
// Measurement normalization
// ---------------------------------------------------------------------------

/// Normalizes one raw measurement record, or drops it.
///
/// Dropped when: no variable reference of any shape, or no finite value.
/// A missing/unparseable date is tolerated (`timestamp: None`).
pub fn normalize_measurement(
    record: &Value,
    registry: &VariableRegistry,
    directory: &StationDirectory,
) -> Option<MeasurementRecord> {
    let Some(var) = variable_ref(record) else {
        tracing::debug!("dropping measurement without variable reference");
        return None;
    };
    let Some(value) = numeric_field(record, &["m_value", "value", "v_value"]) else {
        tracing::debug!("dropping measurement without finite value");
        return None;
    };

    let by_id = var.id.as_deref().and_then(|id| registry.get(id));
    let variable_code = match by_id {
        Some(def) => def.code.clone(),
        None => code_for_name(var.inline_name.as_deref().unwrap_or("")),
    };
    let unit = var
        .inline_unit
        .or_else(|| by_id.map(|def| def.unit.clone()))
        .unwrap_or_default();

    let timestamp = string_field(record, &["m_date", "date", "datetime"])
        .as_deref()
        .and_then(parse_flexible_datetime);

    Some(MeasurementRecord {
        station: resolve_station_name(record, directory),
        variable_code,
        value,
        unit,
        timestamp,
        limit: numeric_field(record, &["limit", "threshold"]),
    })
}

// ---------------------------------------------------------------------------
// Alert normalization
// ---------------------------------------------------------------------------

/// Normalizes one externally supplied alert record, or drops it.
///
/// Dropped when the value is not finite or no limit can be resolved
/// (explicit `limit`/`threshold` field, else the default for the code).
pub fn normalize_alert(
    record: &Value,
    registry: &VariableRegistry,
    directory: &StationDirectory,
) -> Option<AlertRecord> {
    let value = numeric_field(record, &["value", "m_value", "v_value"])?;

    let variable_code = match variable_ref(record) {
        Some(var) => match var.id.as_deref().and_then(|id| registry.code_for(id)) {
            Some(code) => code.clone(),
            None => code_for_name(var.inline_name.as_deref().unwrap_or("")),
        },
        None => code_for_name(&string_field(record, &["variable_name"]).unwrap_or_default()),
    };

    let limit = numeric_field(record, &["limit", "threshold"])
        .or_else(|| default_limit(&variable_code).map(|l| l.limit));
    let Some(limit) = limit else {
        tracing::debug!(code = %variable_code, "dropping alert with no resolvable limit");
        return None;
    };

    let datetime = string_field(record, &["datetime", "m_date", "date", "time"])
        .as_deref()
        .and_then(parse_flexible_datetime);

    Some(AlertRecord {
        station: resolve_station_name(record, directory),
        datetime,
        variable_code,
        value,
        limit,
    })
}

// ---------------------------------------------------------------------------
// Series and summary entries
// ---------------------------------------------------------------------------

/// Extracts the date-like and value fields of a trend-series point without
/// validating them — validation belongs to the windower.
pub fn parse_series_point(record: &Value) -> crate::analysis::window::RawPoint {
    crate::analysis::window::RawPoint {
        time: string_field(record, &["time", "datetime", "date", "day", "t"]),
        value: numeric_field(record, &["value", "avg", "v_value"]),
    }
}

/// One entry of the aggregate-summary endpoint, identity not yet resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryEntry {
    pub variable_id: String,
    pub name: Option<String>,
    pub unit: Option<String>,
    pub value: f64,
    /// Limit supplied by the endpoint itself, preferred over the default.
    pub limit: Option<f64>,
}

/// Parses one summary entry; entries without a variable reference or a
/// finite value are dropped.
pub fn parse_summary_entry(record: &Value) -> Option<SummaryEntry> {
    let variable_id =
        string_field(record, &["variable__v_id", "variable_id", "variable"])?;
    let value = numeric_field(record, &["avg", "value", "v_value"])?;
    Some(SummaryEntry {
        variable_id,
        name: string_field(record, &["variable__v_name", "variable_name", "v_name"]),
        unit: string_field(record, &["variable__v_unit", "variable_unit", "v_unit"]),
        value,
        limit: numeric_field(record, &["limit", "threshold"]),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CanonicalCode;
    use chrono::TimeZone;
    use serde_json::json;

    fn registry() -> VariableRegistry {
        VariableRegistry::from_descriptors(vec![
            ("1".to_string(), "PM 2,5".to_string(), "µg/m3".to_string()),
            ("2".to_string(), "Temperatura".to_string(), "°C".to_string()),
        ])
    }

    fn directory() -> StationDirectory {
        StationDirectory::new(
            vec![("10".to_string(), "Centro".to_string())],
            vec![("5".to_string(), "10".to_string())],
        )
    }

    // --- Date parsing -------------------------------------------------------

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let parsed = parse_flexible_datetime("2024-11-10T12:00:00-05:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 11, 10, 17, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_offsetless_iso_as_utc() {
        let parsed = parse_flexible_datetime("2024-11-10T12:00:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 11, 10, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_space_delimited_variants() {
        let with_seconds = parse_flexible_datetime("2024-11-10 12:00:00").unwrap();
        assert_eq!(with_seconds, Utc.with_ymd_and_hms(2024, 11, 10, 12, 0, 0).unwrap());
        // trend buckets come without seconds
        let without_seconds = parse_flexible_datetime("2024-11-10 12:00").unwrap();
        assert_eq!(without_seconds, with_seconds);
    }

    #[test]
    fn test_parse_bare_date_as_midnight() {
        let parsed = parse_flexible_datetime("2024-11-10").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 11, 10, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_garbage_dates_fail() {
        assert!(parse_flexible_datetime("").is_none());
        assert!(parse_flexible_datetime("not-a-date").is_none());
        assert!(parse_flexible_datetime("10/11/2024").is_none());
    }

    // --- Envelope handling --------------------------------------------------

    #[test]
    fn test_results_array_accepts_both_envelopes() {
        assert_eq!(results_array(json!([1, 2])).len(), 2);
        assert_eq!(results_array(json!({"results": [1, 2, 3]})).len(), 3);
        assert!(results_array(json!({"other": []})).is_empty());
        assert!(results_array(json!("oops")).is_empty());
    }

    // --- Measurement shapes -------------------------------------------------

    #[test]
    fn test_measurement_with_nested_variable_object() {
        let record = json!({
            "variable": {"v_id": 1, "v_name": "PM 2,5", "v_unit": "µg/m3"},
            "m_value": 40.0,
            "m_date": "2024-11-10T12:00:00",
            "sensor": {"sensor_id": 5}
        });
        let m = normalize_measurement(&record, &registry(), &directory()).unwrap();
        assert_eq!(m.variable_code, CanonicalCode::Pm25);
        assert_eq!(m.value, 40.0);
        assert_eq!(m.unit, "µg/m3");
        assert_eq!(m.station, "Centro");
        assert_eq!(m.timestamp, Some(Utc.with_ymd_and_hms(2024, 11, 10, 12, 0, 0).unwrap()));
    }

    #[test]
    fn test_measurement_with_bare_variable_id() {
        let record = json!({"variable": 2, "m_value": "21.5", "m_date": "2024-11-10 08:00"});
        let m = normalize_measurement(&record, &registry(), &directory()).unwrap();
        assert_eq!(m.variable_code, CanonicalCode::Temperature);
        assert_eq!(m.value, 21.5);
        // unit comes from the registry when the record has none
        assert_eq!(m.unit, "°C");
    }

    #[test]
    fn test_measurement_with_bare_code_string() {
        // not a registry id -> the string itself is canonicalized
        let record = json!({"variable": "O3", "value": 0.05});
        let m = normalize_measurement(&record, &registry(), &directory()).unwrap();
        assert_eq!(m.variable_code, CanonicalCode::O3);
        assert_eq!(m.timestamp, None);
    }

    #[test]
    fn test_measurement_without_variable_is_dropped() {
        let record = json!({"m_value": 12.0, "m_date": "2024-11-10T12:00:00"});
        assert!(normalize_measurement(&record, &registry(), &directory()).is_none());
    }

    #[test]
    fn test_non_finite_values_are_dropped() {
        for bad in ["NaN", "inf", ""] {
            let record = json!({"variable": 1, "m_value": bad});
            assert!(
                normalize_measurement(&record, &registry(), &directory()).is_none(),
                "value '{}' must be dropped",
                bad
            );
        }
        let record = json!({"variable": 1});
        assert!(normalize_measurement(&record, &registry(), &directory()).is_none());
    }

    #[test]
    fn test_station_resolution_prefers_explicit_name() {
        let record = json!({
            "variable": 1, "m_value": 1.0,
            "station_name": "Norte", "sensor": {"sensor_id": 5}
        });
        let m = normalize_measurement(&record, &registry(), &directory()).unwrap();
        assert_eq!(m.station, "Norte");
    }

    #[test]
    fn test_station_resolution_via_station_id() {
        let record = json!({"variable": 1, "m_value": 1.0, "station": "10"});
        let m = normalize_measurement(&record, &registry(), &directory()).unwrap();
        assert_eq!(m.station, "Centro");
    }

    #[test]
    fn test_station_resolution_falls_back_to_raw_id_then_placeholder() {
        let record = json!({"variable": 1, "m_value": 1.0, "sensor": "99"});
        let m = normalize_measurement(&record, &registry(), &directory()).unwrap();
        assert_eq!(m.station, "99");

        let record = json!({"variable": 1, "m_value": 1.0});
        let m = normalize_measurement(&record, &registry(), &directory()).unwrap();
        assert_eq!(m.station, "—");
    }

    // --- Alerts -------------------------------------------------------------

    #[test]
    fn test_alert_uses_explicit_limit_over_default() {
        let record = json!({
            "station": "Centro", "variable": 1, "value": 40.0,
            "limit": 50.0, "datetime": "2024-11-10T12:00:00"
        });
        let a = normalize_alert(&record, &registry(), &directory()).unwrap();
        assert_eq!(a.limit, 50.0);
        assert_eq!(a.variable_code, CanonicalCode::Pm25);
    }

    #[test]
    fn test_alert_falls_back_to_default_limit() {
        let record = json!({"variable": 1, "value": 40.0});
        let a = normalize_alert(&record, &registry(), &directory()).unwrap();
        assert_eq!(a.limit, 35.0);
        assert_eq!(a.datetime, None);
    }

    #[test]
    fn test_alert_with_no_resolvable_limit_is_dropped() {
        let record = json!({"variable": "RADON", "value": 40.0});
        assert!(normalize_alert(&record, &registry(), &directory()).is_none());
    }

    // --- Summary and series entries -----------------------------------------

    #[test]
    fn test_summary_entry_parses_orm_style_keys() {
        let record = json!({
            "variable__v_id": 1, "variable__v_name": "PM 2,5",
            "variable__v_unit": "µg/m3", "avg": 22.5
        });
        let e = parse_summary_entry(&record).unwrap();
        assert_eq!(e.variable_id, "1");
        assert_eq!(e.name.as_deref(), Some("PM 2,5"));
        assert_eq!(e.value, 22.5);
        assert_eq!(e.limit, None);
    }

    #[test]
    fn test_summary_entry_without_value_is_dropped() {
        assert!(parse_summary_entry(&json!({"variable_id": 1})).is_none());
    }

    #[test]
    fn test_series_point_extraction_tolerates_missing_fields() {
        let p = parse_series_point(&json!({"time": "2024-11-10 11:00", "value": 3.5}));
        assert_eq!(p.time.as_deref(), Some("2024-11-10 11:00"));
        assert_eq!(p.value, Some(3.5));

        let p = parse_series_point(&json!({"label": "x"}));
        assert_eq!(p.time, None);
        assert_eq!(p.value, None);
    }
}
