/// Monitoring data service API client.
///
/// Talks to the REST backend that serves the station network: entity
/// catalogs under `/api/{stations,sensors,variables,measurements}/` and
/// precomputed reports under `/api/reports/`. Every fetch returns the raw
/// `serde_json::Value` records; interpretation belongs to `ingest::raw`
/// so one normalization path serves both this client and any test double.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::debug;

use crate::ingest::raw::results_array;
use crate::model::ServiceError;

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Filter parameters shared by the measurements, summary and trends
/// endpoints. Unset fields are omitted from the request entirely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementQuery {
    pub station_id: Option<String>,
    pub variable_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl MeasurementQuery {
    pub fn for_station(station_id: impl Into<String>) -> Self {
        MeasurementQuery {
            station_id: Some(station_id.into()),
            ..Default::default()
        }
    }

    pub fn with_variable(mut self, variable_id: impl Into<String>) -> Self {
        self.variable_id = Some(variable_id.into());
        self
    }

    pub fn with_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    /// Serialized query pairs, dates in the `YYYY-MM-DD` form the backend
    /// filters on.
    fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(ref station) = self.station_id {
            pairs.push(("station_id", station.clone()));
        }
        if let Some(ref variable) = self.variable_id {
            pairs.push(("variable", variable.clone()));
        }
        if let Some(start) = self.start {
            pairs.push(("start_date", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = self.end {
            pairs.push(("end_date", end.format("%Y-%m-%d").to_string()));
        }
        pairs
    }
}

// ---------------------------------------------------------------------------
// Service abstraction
// ---------------------------------------------------------------------------

/// The remote data service as the rest of the crate sees it.
///
/// The resolver depends on this trait rather than on a concrete HTTP
/// client, so tests can substitute scripted responses and failures.
#[async_trait]
pub trait DataService: Send + Sync {
    async fn fetch_stations(&self) -> Result<Vec<Value>, ServiceError>;
    async fn fetch_sensors(&self) -> Result<Vec<Value>, ServiceError>;
    async fn fetch_variables(&self) -> Result<Vec<Value>, ServiceError>;
    async fn fetch_measurements(&self, query: &MeasurementQuery) -> Result<Vec<Value>, ServiceError>;
    /// Per-variable summary rows from the precomputed air-quality report.
    async fn fetch_summary(&self, query: &MeasurementQuery) -> Result<Vec<Value>, ServiceError>;
    /// Time/value rows from the precomputed trends report.
    async fn fetch_trend_series(&self, query: &MeasurementQuery)
        -> Result<Vec<Value>, ServiceError>;
    async fn fetch_alerts(&self, query: &MeasurementQuery) -> Result<Vec<Value>, ServiceError>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// `DataService` over HTTP via `reqwest`.
pub struct HttpDataService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDataService {
    /// Builds the client with the given timeout. Fails if the underlying
    /// TLS/client setup fails; a client without the configured timeout is
    /// worse than no client.
    pub fn new(
        base_url: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpDataService {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(
        &self,
        path: &str,
        pairs: &[(&'static str, String)],
    ) -> Result<Value, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, params = pairs.len(), "fetching");
        let response = self.client.get(&url).query(pairs).send().await?;
        let response = response.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }

    /// Fetches a report endpoint and pulls out the named payload key,
    /// tolerating the envelope-less shape older backends serve.
    async fn get_report(
        &self,
        path: &str,
        key: &str,
        pairs: &[(&'static str, String)],
    ) -> Result<Vec<Value>, ServiceError> {
        let mut body = self.get_json(path, pairs).await?;
        if let Some(payload) = body.get_mut(key) {
            return Ok(results_array(payload.take()));
        }
        Ok(results_array(body))
    }
}

#[async_trait]
impl DataService for HttpDataService {
    async fn fetch_stations(&self) -> Result<Vec<Value>, ServiceError> {
        Ok(results_array(self.get_json("/api/stations/", &[]).await?))
    }

    async fn fetch_sensors(&self) -> Result<Vec<Value>, ServiceError> {
        Ok(results_array(self.get_json("/api/sensors/", &[]).await?))
    }

    async fn fetch_variables(&self) -> Result<Vec<Value>, ServiceError> {
        Ok(results_array(self.get_json("/api/variables/", &[]).await?))
    }

    async fn fetch_measurements(&self, query: &MeasurementQuery) -> Result<Vec<Value>, ServiceError> {
        let body = self.get_json("/api/measurements/", &query.to_pairs()).await?;
        Ok(results_array(body))
    }

    async fn fetch_summary(&self, query: &MeasurementQuery) -> Result<Vec<Value>, ServiceError> {
        self.get_report("/api/reports/air_quality/", "summary", &query.to_pairs())
            .await
    }

    async fn fetch_trend_series(
        &self,
        query: &MeasurementQuery,
    ) -> Result<Vec<Value>, ServiceError> {
        self.get_report("/api/reports/trends/", "series", &query.to_pairs())
            .await
    }

    async fn fetch_alerts(&self, query: &MeasurementQuery) -> Result<Vec<Value>, ServiceError> {
        self.get_report("/api/reports/alerts/", "alerts", &query.to_pairs())
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
