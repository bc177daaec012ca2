/// Variable identity resolution for the air-quality monitoring core.
///
/// Defines the canonical limits table for regulated pollutants and comfort
/// variables, the display-name canonicalization that produces the join key
/// used across independently-fetched collections, and the per-session
/// lookup tables built from the remote variable catalog and station list.
/// This is the single source of truth for limits — all other modules should
/// resolve thresholds from here rather than hardcoding values.

use std::collections::HashMap;

use crate::model::{CanonicalCode, VariableDefinition};

// ---------------------------------------------------------------------------
// Canonicalization
// ---------------------------------------------------------------------------

/// Normalizes a variable display name into its canonical string form:
/// strip all whitespace, strip periods and commas, uppercase.
///
/// Total, deterministic and idempotent — the same name always yields the
/// same code, and re-normalizing a normalized name is a no-op. Both decimal
/// spellings of fine particulate matter ("PM2.5", "PM2,5") collapse to
/// `PM25` because the separator characters are stripped.
pub fn canonicalize(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '.' && *c != ',')
        .flat_map(char::to_uppercase)
        .collect()
}

/// Resolves a display name to its [`CanonicalCode`].
///
/// An empty or missing name yields `Other("")`, which never matches a
/// limits entry — downstream classification for it is explicitly
/// unclassifiable rather than silently defaulted.
pub fn code_for_name(name: &str) -> CanonicalCode {
    match canonicalize(name).as_str() {
        "PM25" => CanonicalCode::Pm25,
        "PM10" => CanonicalCode::Pm10,
        "O3" => CanonicalCode::O3,
        "NO2" => CanonicalCode::No2,
        "SO2" => CanonicalCode::So2,
        "CO" => CanonicalCode::Co,
        "TEMPERATURE" | "TEMPERATURA" => CanonicalCode::Temperature,
        "HUMIDITY" | "HUMEDAD" => CanonicalCode::Humidity,
        "WINDSPEED" | "VELOCIDADVIENTO" => CanonicalCode::WindSpeed,
        other => CanonicalCode::Other(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Default limits
// ---------------------------------------------------------------------------

/// A regulatory (or comfort) threshold for one canonical variable.
#[derive(Debug, Clone)]
pub struct VariableLimit {
    pub code: CanonicalCode,
    /// Threshold above which a value is considered critical. Always positive.
    pub limit: f64,
    /// Unit the limit is expressed in, used when the upstream service
    /// omits a unit for the variable.
    pub unit: &'static str,
}

/// Default short-term reference limits per variable, used whenever the
/// upstream service does not supply a threshold of its own.
///
/// Sources:
///   - Pollutants: common 24h/short-term reference values (EPA/WHO style)
///   - Comfort variables: dashboard comfort thresholds
pub static DEFAULT_LIMITS: &[VariableLimit] = &[
    VariableLimit { code: CanonicalCode::Pm25, limit: 35.0, unit: "µg/m3" },
    VariableLimit { code: CanonicalCode::Pm10, limit: 150.0, unit: "µg/m3" },
    VariableLimit { code: CanonicalCode::O3, limit: 0.070, unit: "ppm" },
    VariableLimit { code: CanonicalCode::No2, limit: 0.053, unit: "ppm" },
    VariableLimit { code: CanonicalCode::So2, limit: 0.075, unit: "ppm" },
    VariableLimit { code: CanonicalCode::Co, limit: 9.0, unit: "ppm" },
    VariableLimit { code: CanonicalCode::Temperature, limit: 35.0, unit: "°C" },
    VariableLimit { code: CanonicalCode::Humidity, limit: 70.0, unit: "%" },
    VariableLimit { code: CanonicalCode::WindSpeed, limit: 15.0, unit: "m/s" },
];

/// Looks up the default limit for a code. Returns `None` for `Other(_)`
/// codes — callers must treat those as unclassifiable, not default them.
pub fn default_limit(code: &CanonicalCode) -> Option<&'static VariableLimit> {
    DEFAULT_LIMITS.iter().find(|l| &l.code == code)
}

/// Display precision appropriate for a unit (or, failing that, the default
/// unit of a code): ppm concentrations need three decimals, percentages
/// none, most physical quantities one.
pub fn decimals_for(unit: &str, code: &CanonicalCode) -> u32 {
    let unit = if unit.is_empty() {
        default_limit(code).map(|l| l.unit).unwrap_or("")
    } else {
        unit
    };
    let u = unit.to_lowercase();
    if u.is_empty() {
        1
    } else if u.contains("ppm") {
        3
    } else if u.contains("µg") || u.contains("ug") {
        1
    } else if u.contains('%') {
        0
    } else if u.contains('°') || u.contains('c') {
        1
    } else if u.contains("m/s") {
        1
    } else {
        2
    }
}

// ---------------------------------------------------------------------------
// Variable registry
// ---------------------------------------------------------------------------

/// Per-session lookup tables resolving raw variable ids to display names,
/// units and canonical codes.
///
/// Loaded once from the external variable catalog and read-only thereafter.
/// Constructed explicitly and passed by reference to every component that
/// needs it — there is no global registry, and callers must not operate on
/// an empty one (see `resolve::Resolver`, which loads it before serving any
/// request).
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    by_id: HashMap<String, VariableDefinition>,
}

impl VariableRegistry {
    /// Builds the registry from `(id, name, unit)` descriptors. Descriptors
    /// with an empty id are skipped; a duplicate id keeps the last entry.
    pub fn from_descriptors<I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = (String, String, String)>,
    {
        let mut by_id = HashMap::new();
        for (id, name, unit) in descriptors {
            if id.is_empty() {
                continue;
            }
            let code = code_for_name(&name);
            by_id.insert(id.clone(), VariableDefinition { id, name, unit, code });
        }
        VariableRegistry { by_id }
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn get(&self, id: &str) -> Option<&VariableDefinition> {
        self.by_id.get(id)
    }

    pub fn name_for(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(|v| v.name.as_str())
    }

    pub fn unit_for(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(|v| v.unit.as_str())
    }

    pub fn code_for(&self, id: &str) -> Option<&CanonicalCode> {
        self.by_id.get(id).map(|v| &v.code)
    }

    /// Reverse lookup: the catalog id of the first variable carrying this
    /// code. Used to translate a code-based filter (e.g. `PM25`) into the
    /// id-based filter the measurement endpoint understands.
    pub fn id_for_code(&self, code: &CanonicalCode) -> Option<&str> {
        self.by_id
            .values()
            .find(|v| &v.code == code)
            .map(|v| v.id.as_str())
    }

    /// Codes actually present in the loaded catalog, deduplicated. The
    /// dashboards use this to offer only variables the backend can serve.
    pub fn present_codes(&self) -> Vec<CanonicalCode> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for v in self.by_id.values() {
            if seen.insert(v.code.clone()) {
                out.push(v.code.clone());
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Station directory
// ---------------------------------------------------------------------------

/// Lookup tables resolving station and sensor ids to station display names.
///
/// Measurements may reference their station directly, or indirectly through
/// a sensor id; the directory carries both mappings so normalization can
/// follow either path.
#[derive(Debug, Clone, Default)]
pub struct StationDirectory {
    station_names: HashMap<String, String>,
    sensor_station: HashMap<String, String>,
}

impl StationDirectory {
    /// Builds the directory from `(station_id, name)` pairs and
    /// `(sensor_id, station_id)` links. A sensor pointing at an unknown
    /// station falls back to the raw station id as its display name.
    pub fn new<S, L>(stations: S, sensor_links: L) -> Self
    where
        S: IntoIterator<Item = (String, String)>,
        L: IntoIterator<Item = (String, String)>,
    {
        let station_names: HashMap<String, String> = stations
            .into_iter()
            .filter(|(id, _)| !id.is_empty())
            .collect();
        let sensor_station = sensor_links
            .into_iter()
            .filter(|(sensor_id, _)| !sensor_id.is_empty())
            .map(|(sensor_id, station_id)| {
                let name = station_names
                    .get(&station_id)
                    .cloned()
                    .unwrap_or(station_id);
                (sensor_id, name)
            })
            .collect();
        StationDirectory { station_names, sensor_station }
    }

    pub fn station_name(&self, station_id: &str) -> Option<&str> {
        self.station_names.get(station_id).map(String::as_str)
    }

    pub fn station_for_sensor(&self, sensor_id: &str) -> Option<&str> {
        self.sensor_station.get(sensor_id).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_strips_whitespace_periods_commas_and_uppercases() {
        assert_eq!(canonicalize("PM 2,5"), "PM25");
        assert_eq!(canonicalize("PM2.5"), "PM25");
        assert_eq!(canonicalize("pm 10"), "PM10");
        assert_eq!(canonicalize("  o3 "), "O3");
        assert_eq!(canonicalize("Velocidad Viento"), "VELOCIDADVIENTO");
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        for name in ["PM 2,5", "pm2.5", "Temperatura", "weird. name, x", ""] {
            let once = canonicalize(name);
            assert_eq!(
                canonicalize(&once),
                once,
                "canonicalize must be idempotent for '{}'",
                name
            );
        }
    }

    #[test]
    fn test_code_for_name_maps_both_pm25_spellings() {
        assert_eq!(code_for_name("PM 2,5"), CanonicalCode::Pm25);
        assert_eq!(code_for_name("PM2.5"), CanonicalCode::Pm25);
        assert_eq!(code_for_name("PM25"), CanonicalCode::Pm25);
    }

    #[test]
    fn test_code_for_name_maps_spanish_aliases_to_shared_variants() {
        assert_eq!(code_for_name("Temperatura"), CanonicalCode::Temperature);
        assert_eq!(code_for_name("Temperature"), CanonicalCode::Temperature);
        assert_eq!(code_for_name("Humedad"), CanonicalCode::Humidity);
        assert_eq!(code_for_name("Velocidad Viento"), CanonicalCode::WindSpeed);
    }

    #[test]
    fn test_empty_name_yields_code_with_no_limit() {
        let code = code_for_name("");
        assert_eq!(code, CanonicalCode::Other(String::new()));
        assert!(default_limit(&code).is_none());
    }

    #[test]
    fn test_every_limit_entry_is_positive_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for entry in DEFAULT_LIMITS {
            assert!(
                entry.limit > 0.0,
                "limit for {} must be positive, got {}",
                entry.code,
                entry.limit
            );
            assert!(
                seen.insert(entry.code.clone()),
                "duplicate limits entry for {}",
                entry.code
            );
        }
    }

    #[test]
    fn test_limits_cover_all_regulated_pollutants() {
        for code in [
            CanonicalCode::Pm25,
            CanonicalCode::Pm10,
            CanonicalCode::O3,
            CanonicalCode::No2,
            CanonicalCode::So2,
            CanonicalCode::Co,
        ] {
            assert!(default_limit(&code).is_some(), "missing limit for {}", code);
        }
    }

    #[test]
    fn test_pm25_limit_matches_reference_value() {
        let entry = default_limit(&CanonicalCode::Pm25).unwrap();
        assert_eq!(entry.limit, 35.0);
        assert_eq!(entry.unit, "µg/m3");
    }

    #[test]
    fn test_decimals_for_known_units() {
        assert_eq!(decimals_for("ppm", &CanonicalCode::O3), 3);
        assert_eq!(decimals_for("µg/m3", &CanonicalCode::Pm25), 1);
        assert_eq!(decimals_for("%", &CanonicalCode::Humidity), 0);
        // empty unit falls back to the code's default unit (ppm for O3)
        assert_eq!(decimals_for("", &CanonicalCode::O3), 3);
        assert_eq!(decimals_for("", &CanonicalCode::Other("X".into())), 1);
    }

    #[test]
    fn test_registry_lookup_tables() {
        let reg = VariableRegistry::from_descriptors(vec![
            ("1".to_string(), "PM 2,5".to_string(), "µg/m3".to_string()),
            ("2".to_string(), "Temperatura".to_string(), "°C".to_string()),
        ]);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.name_for("1"), Some("PM 2,5"));
        assert_eq!(reg.unit_for("1"), Some("µg/m3"));
        assert_eq!(reg.code_for("1"), Some(&CanonicalCode::Pm25));
        assert_eq!(reg.code_for("2"), Some(&CanonicalCode::Temperature));
        assert_eq!(reg.id_for_code(&CanonicalCode::Pm25), Some("1"));
        assert!(reg.code_for("99").is_none());
    }

    #[test]
    fn test_registry_skips_empty_ids_and_keeps_last_duplicate() {
        let reg = VariableRegistry::from_descriptors(vec![
            ("".to_string(), "PM 2,5".to_string(), String::new()),
            ("7".to_string(), "O3".to_string(), "ppm".to_string()),
            ("7".to_string(), "Ozono O3".to_string(), "ppm".to_string()),
        ]);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.name_for("7"), Some("Ozono O3"));
    }

    #[test]
    fn test_present_codes_deduplicates() {
        let reg = VariableRegistry::from_descriptors(vec![
            ("1".to_string(), "PM2.5".to_string(), String::new()),
            ("2".to_string(), "PM 2,5".to_string(), String::new()),
            ("3".to_string(), "O3".to_string(), String::new()),
        ]);
        let mut codes = reg.present_codes();
        codes.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        assert_eq!(codes, vec![CanonicalCode::O3, CanonicalCode::Pm25]);
    }

    #[test]
    fn test_station_directory_resolves_through_sensor() {
        let dir = StationDirectory::new(
            vec![("st-1".to_string(), "Centro".to_string())],
            vec![
                ("sen-1".to_string(), "st-1".to_string()),
                ("sen-2".to_string(), "st-missing".to_string()),
            ],
        );
        assert_eq!(dir.station_name("st-1"), Some("Centro"));
        assert_eq!(dir.station_for_sensor("sen-1"), Some("Centro"));
        // unknown station id falls back to the raw id
        assert_eq!(dir.station_for_sensor("sen-2"), Some("st-missing"));
        assert!(dir.station_for_sensor("sen-9").is_none());
    }
}
