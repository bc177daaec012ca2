/// Tiered resolution of the summary, series, alert and statistics views.
///
/// Every public view resolves through up to three tiers:
///
/// 1. the precomputed report endpoint (trusted when it returns anything);
/// 2. a local recomputation from raw measurements;
/// 3. the last result this resolver successfully produced for the same view.
///
/// Tier 3 means a flapping backend degrades to stale-but-plausible data
/// instead of an empty dashboard. Results from superseded requests never
/// enter the cache: each request takes a generation token and only the
/// newest generation is allowed to publish.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::alert::{compute_alerts, merge_alerts};
use crate::analysis::aggregate::{
    aggregate, bucket_mean_series, latest_by_code, mean_by_code, VariableStats,
};
use crate::analysis::window::{window_series, TimeWindow};
use crate::classify::classify;
use crate::ingest::client::{DataService, MeasurementQuery};
use crate::ingest::raw;
use crate::model::{
    AlertRecord, CanonicalCode, MeasurementRecord, SeriesPoint, ServiceError, SummaryStat,
};
use crate::registry::{code_for_name, default_limit, StationDirectory, VariableRegistry};

// ---------------------------------------------------------------------------
// Fallback statistic
// ---------------------------------------------------------------------------

/// Which reduction tier 2 applies when recomputing a summary from raw
/// measurements. The current-conditions view wants the newest reading per
/// variable; statistical report views want the window mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStatistic {
    Mean,
    Latest,
}

/// One row of the per-variable statistics table: identity plus the full
/// aggregate over the window's measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsRow {
    pub code: CanonicalCode,
    pub name: String,
    pub unit: String,
    pub limit: Option<f64>,
    pub stats: VariableStats,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Catalog tables loaded once per resolver from the remote service.
struct Catalogs {
    registry: VariableRegistry,
    directory: StationDirectory,
}

/// The resolution engine. One instance per data service; cheap to share
/// behind an `Arc`, all interior state is synchronized.
pub struct Resolver {
    service: Arc<dyn DataService>,
    catalogs: OnceCell<Catalogs>,
    // one generation counter per view, so a summary request racing a
    // series request never invalidates it
    summary_generation: AtomicU64,
    series_generation: AtomicU64,
    alert_generation: AtomicU64,
    summary_cache: Mutex<HashMap<String, Vec<SummaryStat>>>,
    series_cache: Mutex<HashMap<String, Vec<SeriesPoint>>>,
    alert_cache: Mutex<HashMap<String, Vec<AlertRecord>>>,
}

impl Resolver {
    pub fn new(service: Arc<dyn DataService>) -> Self {
        Resolver {
            service,
            catalogs: OnceCell::new(),
            summary_generation: AtomicU64::new(0),
            series_generation: AtomicU64::new(0),
            alert_generation: AtomicU64::new(0),
            summary_cache: Mutex::new(HashMap::new()),
            series_cache: Mutex::new(HashMap::new()),
            alert_cache: Mutex::new(HashMap::new()),
        }
    }

    // --- Generation tokens --------------------------------------------------

    /// Marks the start of a request on one view's counter and returns its
    /// token. Any request started later on the same view invalidates this
    /// one for cache-publishing purposes.
    fn begin_request(counter: &AtomicU64) -> u64 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(counter: &AtomicU64, token: u64) -> bool {
        counter.load(Ordering::SeqCst) == token
    }

    // --- Catalog loading ----------------------------------------------------

    /// Loads the variable registry and station directory on first use.
    /// A failed load is not cached; the next request retries.
    async fn catalogs(&self) -> Result<&Catalogs, ServiceError> {
        self.catalogs
            .get_or_try_init(|| async {
                let variables = self.service.fetch_variables().await?;
                let registry = VariableRegistry::from_descriptors(
                    variables.iter().filter_map(raw::parse_variable_descriptor),
                );
                let stations = self.service.fetch_stations().await?;
                let sensors = self.service.fetch_sensors().await?;
                let directory = StationDirectory::new(
                    stations.iter().filter_map(raw::parse_station_entry),
                    sensors.iter().filter_map(raw::parse_sensor_link),
                );
                debug!(
                    variables = registry.len(),
                    "loaded catalog tables"
                );
                Ok(Catalogs { registry, directory })
            })
            .await
    }

    /// Fetches and normalizes raw measurements, then re-filters them to
    /// the window client-side. The backend is not trusted to honor its
    /// query parameters: for bounded windows, undated and out-of-window
    /// records are discarded here no matter what the service returned.
    async fn fetch_normalized_measurements(
        &self,
        query: &MeasurementQuery,
        window: &TimeWindow,
    ) -> Result<Vec<MeasurementRecord>, ServiceError> {
        let catalogs = self.catalogs().await?;
        let records = self.service.fetch_measurements(query).await?;
        let mut records: Vec<MeasurementRecord> = records
            .iter()
            .filter_map(|r| raw::normalize_measurement(r, &catalogs.registry, &catalogs.directory))
            .collect();
        if window.is_bounded() {
            records.retain(|r| r.timestamp.is_some_and(|ts| window.contains(ts)));
        }
        Ok(records)
    }

    // --- Summary resolution -------------------------------------------------

    /// Resolves the per-variable summary for a station and window.
    ///
    /// Tier 1 trusts the summary report endpoint whenever it returns at
    /// least one parseable entry. Tier 2 recomputes from raw measurements
    /// using `fallback`. Tier 3 serves the last published result for the
    /// same station/window; with no cache either, an empty tier-2 result
    /// stays empty and a fetch error propagates.
    pub async fn resolve_summary(
        &self,
        station_id: Option<&str>,
        window: &TimeWindow,
        fallback: FallbackStatistic,
    ) -> Result<Vec<SummaryStat>, ServiceError> {
        let token = Self::begin_request(&self.summary_generation);
        let key = view_key(station_id, window);
        let fresh = self.summary_fresh(station_id, window, fallback).await;
        match fresh {
            Ok(stats) if !stats.is_empty() => {
                if Self::is_current(&self.summary_generation, token) {
                    self.summary_cache.lock().await.insert(key, stats.clone());
                } else {
                    debug!("discarding superseded summary result");
                }
                Ok(stats)
            }
            other => {
                if let Some(cached) = self.summary_cache.lock().await.get(&key) {
                    warn!(view = %key, "serving last known summary");
                    return Ok(cached.clone());
                }
                other
            }
        }
    }

    async fn summary_fresh(
        &self,
        station_id: Option<&str>,
        window: &TimeWindow,
        fallback: FallbackStatistic,
    ) -> Result<Vec<SummaryStat>, ServiceError> {
        let catalogs = self.catalogs().await?;
        let query = window_query(station_id, window);

        let entries = self.service.fetch_summary(&query).await?;
        let entries: Vec<_> = entries.iter().filter_map(raw::parse_summary_entry).collect();
        if !entries.is_empty() {
            let mut stats: Vec<SummaryStat> = entries
                .into_iter()
                .map(|e| summary_stat_from_entry(e, &catalogs.registry))
                .collect();
            sort_stats(&mut stats);
            return Ok(stats);
        }

        debug!("summary report empty, recomputing from measurements");
        let records = self.fetch_normalized_measurements(&query, window).await?;
        let mut stats: Vec<SummaryStat> = match fallback {
            FallbackStatistic::Mean => mean_by_code(&records)
                .into_iter()
                .map(|(code, value)| summary_stat_from_code(code, value, None, &catalogs.registry))
                .collect(),
            FallbackStatistic::Latest => latest_by_code(&records)
                .into_iter()
                .map(|(code, r)| {
                    let unit = (!r.unit.is_empty()).then(|| r.unit.clone());
                    summary_stat_from_code(code, r.value, unit, &catalogs.registry)
                })
                .collect(),
        };
        sort_stats(&mut stats);
        Ok(stats)
    }

    // --- Series resolution --------------------------------------------------

    /// Resolves the chart series for one variable at one station.
    ///
    /// Tier 1 sanitizes the trend report through the windower. Tier 2
    /// re-buckets raw measurements into hourly or daily means. Tier 3 is
    /// the last published series for the same view.
    pub async fn resolve_series(
        &self,
        station_id: Option<&str>,
        variable_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<SeriesPoint>, ServiceError> {
        let token = Self::begin_request(&self.series_generation);
        let key = format!("{}/{}", view_key(station_id, window), variable_id);
        let fresh = self.series_fresh(station_id, variable_id, window).await;
        match fresh {
            Ok(series) if !series.is_empty() => {
                if Self::is_current(&self.series_generation, token) {
                    self.series_cache.lock().await.insert(key, series.clone());
                } else {
                    debug!("discarding superseded series result");
                }
                Ok(series)
            }
            other => {
                if let Some(cached) = self.series_cache.lock().await.get(&key) {
                    warn!(view = %key, "serving last known series");
                    return Ok(cached.clone());
                }
                other
            }
        }
    }

    async fn series_fresh(
        &self,
        station_id: Option<&str>,
        variable_id: &str,
        window: &TimeWindow,
    ) -> Result<Vec<SeriesPoint>, ServiceError> {
        let mut query = window_query(station_id, window);
        query.variable_id = Some(variable_id.to_string());

        let points = self.service.fetch_trend_series(&query).await?;
        let points: Vec<_> = points.iter().map(raw::parse_series_point).collect();
        let series = window_series(&points, window);
        if !series.is_empty() {
            return Ok(series);
        }

        debug!("trend report unusable, re-bucketing raw measurements");
        let catalogs = self.catalogs().await?;
        // the re-bucketed series must stay single-variable even when the
        // backend ignores the variable filter
        let target = catalogs
            .registry
            .code_for(variable_id)
            .cloned()
            .unwrap_or_else(|| code_for_name(variable_id));
        let mut records = self.fetch_normalized_measurements(&query, window).await?;
        records.retain(|r| r.variable_code == target);
        Ok(bucket_mean_series(&records, window))
    }

    // --- Alert resolution ---------------------------------------------------

    /// Resolves the merged alert feed for a station and window: external
    /// alerts from the alerts report plus alerts computed from
    /// measurements, with `exclude`d codes removed. The external feed is
    /// authoritative on duplicates. All sources failing serves the last
    /// published feed for the same station/window/exclusions.
    pub async fn resolve_alerts(
        &self,
        station_id: Option<&str>,
        window: &TimeWindow,
        exclude: &[CanonicalCode],
    ) -> Result<Vec<AlertRecord>, ServiceError> {
        let token = Self::begin_request(&self.alert_generation);
        let key = alert_view_key(station_id, window, exclude);
        let fresh = self.alerts_fresh(station_id, window, exclude).await;
        match fresh {
            Ok(alerts) => {
                if Self::is_current(&self.alert_generation, token) {
                    self.alert_cache.lock().await.insert(key, alerts.clone());
                } else {
                    debug!("discarding superseded alert result");
                }
                Ok(alerts)
            }
            Err(err) => {
                if let Some(cached) = self.alert_cache.lock().await.get(&key) {
                    warn!(error = %err, "serving last known alerts");
                    return Ok(cached.clone());
                }
                Err(err)
            }
        }
    }

    async fn alerts_fresh(
        &self,
        station_id: Option<&str>,
        window: &TimeWindow,
        exclude: &[CanonicalCode],
    ) -> Result<Vec<AlertRecord>, ServiceError> {
        let catalogs = self.catalogs().await?;
        let query = window_query(station_id, window);

        let external = self.service.fetch_alerts(&query).await?;
        let external: Vec<AlertRecord> = external
            .iter()
            .filter_map(|r| raw::normalize_alert(r, &catalogs.registry, &catalogs.directory))
            .collect();

        // A failing measurements endpoint does not cost us the external
        // feed; the computed half just comes up empty.
        let computed = match self.fetch_normalized_measurements(&query, window).await {
            Ok(records) => compute_alerts(&records),
            Err(err) => {
                warn!(error = %err, "measurements unavailable for alert computation");
                Vec::new()
            }
        };

        Ok(merge_alerts(external, computed, exclude))
    }

    // --- Statistics resolution ----------------------------------------------

    /// Resolves the per-variable statistics table (mean, extremes with
    /// their timestamps, compliance percentage) from raw measurements in
    /// the window. Variables without a single in-window record produce no
    /// row; an empty table means no data, never zeros.
    pub async fn resolve_statistics(
        &self,
        station_id: Option<&str>,
        window: &TimeWindow,
    ) -> Result<Vec<StatisticsRow>, ServiceError> {
        let catalogs = self.catalogs().await?;
        let records = self
            .fetch_normalized_measurements(&window_query(station_id, window), window)
            .await?;

        let mut by_code: HashMap<CanonicalCode, Vec<MeasurementRecord>> = HashMap::new();
        for r in records {
            by_code.entry(r.variable_code.clone()).or_default().push(r);
        }

        let mut rows: Vec<StatisticsRow> = by_code
            .into_iter()
            .filter_map(|(code, records)| {
                let limit = default_limit(&code).map(|l| l.limit);
                let stats = aggregate(&records, limit)?;
                let definition = catalogs
                    .registry
                    .id_for_code(&code)
                    .and_then(|id| catalogs.registry.get(id));
                let name = definition
                    .map(|d| d.name.clone())
                    .unwrap_or_else(|| code.as_str().to_string());
                let unit = definition
                    .map(|d| d.unit.clone())
                    .filter(|u| !u.is_empty())
                    .or_else(|| default_limit(&code).map(|l| l.unit.to_string()))
                    .unwrap_or_default();
                Some(StatisticsRow { code, name, unit, limit, stats })
            })
            .collect();
        rows.sort_by(|a, b| {
            code_rank(&a.code)
                .cmp(&code_rank(&b.code))
                .then_with(|| a.code.as_str().cmp(b.code.as_str()))
        });
        Ok(rows)
    }
}

// ---------------------------------------------------------------------------
// Summary assembly
// ---------------------------------------------------------------------------

fn window_query(station_id: Option<&str>, window: &TimeWindow) -> MeasurementQuery {
    MeasurementQuery {
        station_id: station_id.map(str::to_string),
        variable_id: None,
        start: window.start,
        end: Some(window.end),
    }
}

fn view_key(station_id: Option<&str>, window: &TimeWindow) -> String {
    format!("{}@{:?}", station_id.unwrap_or("all"), window.kind)
}

/// Alert cache key. The exclusion set participates so a feed computed
/// without exclusions is never served for a pollutant-only view.
fn alert_view_key(
    station_id: Option<&str>,
    window: &TimeWindow,
    exclude: &[CanonicalCode],
) -> String {
    let mut codes: Vec<&str> = exclude.iter().map(CanonicalCode::as_str).collect();
    codes.sort_unstable();
    format!("{}!{}", view_key(station_id, window), codes.join("+"))
}

/// Builds the summary row for a tier-1 entry, resolving identity through
/// the registry first and name canonicalization second.
fn summary_stat_from_entry(entry: raw::SummaryEntry, registry: &VariableRegistry) -> SummaryStat {
    let definition = registry.get(&entry.variable_id);
    let code = match definition {
        Some(def) => def.code.clone(),
        None => code_for_name(entry.name.as_deref().unwrap_or("")),
    };
    let name = entry
        .name
        .or_else(|| definition.map(|d| d.name.clone()))
        .unwrap_or_else(|| code.as_str().to_string());
    let unit = entry
        .unit
        .or_else(|| definition.map(|d| d.unit.clone()).filter(|u| !u.is_empty()))
        .or_else(|| default_limit(&code).map(|l| l.unit.to_string()))
        .unwrap_or_default();
    let limit = entry.limit.or_else(|| default_limit(&code).map(|l| l.limit));
    SummaryStat {
        status: limit.map(|limit| classify(entry.value, limit)),
        code,
        name,
        value: entry.value,
        unit,
        limit,
    }
}

/// Builds the summary row for a tier-2 reduction, where only the code and
/// value are known up front.
fn summary_stat_from_code(
    code: CanonicalCode,
    value: f64,
    unit: Option<String>,
    registry: &VariableRegistry,
) -> SummaryStat {
    let definition = registry.id_for_code(&code).and_then(|id| registry.get(id));
    let name = definition
        .map(|d| d.name.clone())
        .unwrap_or_else(|| code.as_str().to_string());
    let unit = unit
        .or_else(|| definition.map(|d| d.unit.clone()).filter(|u| !u.is_empty()))
        .or_else(|| default_limit(&code).map(|l| l.unit.to_string()))
        .unwrap_or_default();
    let limit = default_limit(&code).map(|l| l.limit);
    SummaryStat {
        status: limit.map(|limit| classify(value, limit)),
        code,
        name,
        value,
        unit,
        limit,
    }
}

/// Deterministic row order: pollutants first, then comfort variables, then
/// unknowns, alphabetically within each group. The per-code reductions
/// iterate hash maps, so without this the fallback order would jitter.
fn code_rank(code: &CanonicalCode) -> u8 {
    match (code, code.is_pollutant()) {
        (_, true) => 0,
        (CanonicalCode::Other(_), _) => 2,
        _ => 1,
    }
}

fn sort_stats(stats: &mut [SummaryStat]) {
    stats.sort_by(|a, b| {
        code_rank(&a.code)
            .cmp(&code_rank(&b.code))
            .then_with(|| a.code.as_str().cmp(b.code.as_str()))
    });
}

// ---------------------------------------------------------------------------
// Debouncing
// ---------------------------------------------------------------------------

/// Collapses bursts of refresh triggers into one: callers await
/// [`Debouncer::settle`] and proceed only when it returns `true`, which
/// happens for the newest trigger once the quiet period has elapsed.
pub struct Debouncer {
    delay: std::time::Duration,
    epoch: AtomicU64,
}

impl Debouncer {
    /// Quiet period matching the dashboard's input debounce.
    pub const DEFAULT_DELAY_MS: u64 = 450;

    pub fn new(delay: std::time::Duration) -> Self {
        Debouncer { delay, epoch: AtomicU64::new(0) }
    }

    /// Registers a trigger, waits out the quiet period, and reports
    /// whether this trigger is still the newest. `false` means a later
    /// trigger superseded this one and the caller should do nothing.
    pub async fn settle(&self) -> bool {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        self.epoch.load(Ordering::SeqCst) == epoch
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Debouncer::new(std::time::Duration::from_millis(Self::DEFAULT_DELAY_MS))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
