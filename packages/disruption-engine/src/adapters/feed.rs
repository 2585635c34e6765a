//! Record feeds - where adapters get their raw rows from.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{EngineError, Result};
use crate::types::external::{DateRange, RawRecord};

/// Supplier of raw rows for one dataset.
#[async_trait]
pub trait RecordFeed: Send + Sync {
    /// Load rows for the window. Feeds that cannot filter by date return
    /// everything; blocking discards out-of-window rows later.
    async fn load(&self, range: &DateRange) -> Result<Vec<RawRecord>>;

    /// Where the rows come from, for logs.
    fn describe(&self) -> String;
}

#[async_trait]
impl RecordFeed for Box<dyn RecordFeed> {
    async fn load(&self, range: &DateRange) -> Result<Vec<RawRecord>> {
        (**self).load(range).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Decode a feed payload into rows.
///
/// Accepts a JSON array, an object wrapping the array under `data`,
/// `results` or `events`, a GeoJSON `FeatureCollection`, or JSON Lines.
/// Non-object entries are kept under `_raw` so they surface as malformed
/// rows instead of vanishing.
pub fn parse_records(body: &str) -> Result<Vec<RawRecord>> {
    let body = body.trim_start_matches('\u{feff}').trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Value>(body) {
        Ok(value) => Ok(records_from_value(value)),
        Err(whole) => {
            // JSON Lines
            let mut records = Vec::new();
            for (n, line) in body.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let value: Value = serde_json::from_str(line).map_err(|e| {
                    debug!(line = n + 1, error = %whole, "Payload is neither JSON nor JSON Lines");
                    EngineError::JsonParse(e)
                })?;
                records.push(record_or_raw(value));
            }
            Ok(records)
        }
    }
}

fn records_from_value(value: Value) -> Vec<RawRecord> {
    match value {
        Value::Array(items) => items.into_iter().map(record_or_raw).collect(),
        Value::Object(mut map) => {
            if let Some(Value::Array(features)) = map.remove("features") {
                return features.into_iter().map(flatten_feature).collect();
            }
            for key in ["data", "results", "events"] {
                if let Some(Value::Array(items)) = map.remove(key) {
                    return items.into_iter().map(record_or_raw).collect();
                }
            }
            vec![RawRecord { fields: map }]
        }
        other => vec![record_or_raw(other)],
    }
}

fn record_or_raw(value: Value) -> RawRecord {
    match value {
        Value::Object(fields) => RawRecord { fields },
        other => RawRecord::default().with("_raw", other.to_string()),
    }
}

/// GeoJSON feature: properties plus point geometry as `lat`/`lon`.
fn flatten_feature(feature: Value) -> RawRecord {
    let Value::Object(mut feature) = feature else {
        return record_or_raw(feature);
    };

    let mut record = match feature.remove("properties") {
        Some(Value::Object(props)) => RawRecord { fields: props },
        _ => RawRecord::default(),
    };

    let point = feature
        .get("geometry")
        .and_then(|g| g.get("coordinates"))
        .and_then(|c| c.as_array())
        .filter(|c| c.len() >= 2)
        .and_then(|c| Some((c[0].as_f64()?, c[1].as_f64()?)));

    if let Some((lon, lat)) = point {
        record.fields.entry("lat").or_insert(lat.into());
        record.fields.entry("lon").or_insert(lon.into());
    }
    record
}

/// Rows from a cached download on disk.
pub struct JsonFileFeed {
    path: PathBuf,
}

impl JsonFileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordFeed for JsonFileFeed {
    async fn load(&self, _range: &DateRange) -> Result<Vec<RawRecord>> {
        let body = tokio::fs::read_to_string(&self.path).await?;
        parse_records(&body)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Rows from a live JSON API, with the date window passed as query
/// parameters.
///
/// # Example
///
/// ```rust,ignore
/// let feed = HttpJsonFeed::new("https://api.acleddata.com/acled/read")?
///     .with_query("event_date_where", "BETWEEN")
///     .with_window_param("event_date", "|");
/// ```
pub struct HttpJsonFeed {
    client: reqwest::Client,
    url: Url,
    query: Vec<(String, String)>,
    window: WindowParams,
}

enum WindowParams {
    None,
    /// Separate start and end parameters
    Split { start: String, end: String },
    /// One parameter holding `start<sep>end`
    Joined { name: String, separator: String },
}

impl HttpJsonFeed {
    /// Create a feed for `url`.
    pub fn new(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| EngineError::Config(Box::new(e)))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| EngineError::Config(Box::new(e)))?;
        Ok(Self {
            client,
            url,
            query: Vec::new(),
            window: WindowParams::None,
        })
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Add a fixed query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Send the window as `start_param=YYYY-MM-DD&end_param=YYYY-MM-DD`.
    pub fn with_window_params(mut self, start_param: impl Into<String>, end_param: impl Into<String>) -> Self {
        self.window = WindowParams::Split {
            start: start_param.into(),
            end: end_param.into(),
        };
        self
    }

    /// Send the window as one parameter, `name=start<separator>end`.
    pub fn with_window_param(mut self, name: impl Into<String>, separator: impl Into<String>) -> Self {
        self.window = WindowParams::Joined {
            name: name.into(),
            separator: separator.into(),
        };
        self
    }

    /// Full request URL for a window.
    pub fn request_url(&self, range: &DateRange) -> Url {
        let mut url = self.url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &self.query {
                pairs.append_pair(k, v);
            }
            let (start, end) = (range.start.to_string(), range.end.to_string());
            match &self.window {
                WindowParams::None => {}
                WindowParams::Split { start: s, end: e } => {
                    pairs.append_pair(s, &start);
                    pairs.append_pair(e, &end);
                }
                WindowParams::Joined { name, separator } => {
                    pairs.append_pair(name, &format!("{start}{separator}{end}"));
                }
            }
        }
        url
    }
}

#[async_trait]
impl RecordFeed for HttpJsonFeed {
    async fn load(&self, range: &DateRange) -> Result<Vec<RawRecord>> {
        let url = self.request_url(range);
        debug!(host = ?url.host_str(), "Fetching external records");

        let response = self.client.get(url.clone()).send().await.map_err(|e| {
            warn!(host = ?url.host_str(), error = %e, "Record feed request failed");
            EngineError::TransientUpstream(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::TransientUpstream(format!(
                "HTTP {} from {}",
                status,
                url.host_str().unwrap_or("feed")
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| EngineError::TransientUpstream(e.to_string()))?;
        parse_records(&body)
    }

    fn describe(&self) -> String {
        // Query strings may carry API keys
        format!(
            "{}://{}{}",
            self.url.scheme(),
            self.url.host_str().unwrap_or_default(),
            self.url.path()
        )
    }
}

/// Fixed rows, for tests and fixtures.
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    records: Vec<RawRecord>,
}

impl StaticFeed {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }

    pub fn with_record(mut self, record: RawRecord) -> Self {
        self.records.push(record);
        self
    }
}

#[async_trait]
impl RecordFeed for StaticFeed {
    async fn load(&self, _range: &DateRange) -> Result<Vec<RawRecord>> {
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        format!("static ({} records)", self.records.len())
    }
}
