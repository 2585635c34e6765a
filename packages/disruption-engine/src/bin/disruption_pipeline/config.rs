use std::env;
use std::path::Path;

use anyhow::{bail, Context, Result};
use disruption_engine::adapters::{
    AcledAdapter, GdacsAdapter, HttpJsonFeed, JsonFileFeed, MaritimeAdapter, PoliticalEventAdapter, RecordFeed,
};
use disruption_engine::security::GeneratorCredentials;
use disruption_engine::{DatasetAdapter, ExtractionConfig, ValidationConfig};
use dotenvy::dotenv;
use serde::Deserialize;

const DEFAULT_MODEL: &str = "gpt-4o";

/// Tuning loaded from an optional JSON file.
///
/// Both sections fall back to library defaults when absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub extraction: ExtractionConfig,
    pub validation: ValidationConfig,
}

impl PipelineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&body).with_context(|| format!("Invalid config file {}", path.display()))
    }
}

/// Generator credentials from the environment.
pub fn credentials_from_env() -> Result<GeneratorCredentials> {
    // Load .env file if present (development)
    let _ = dotenv();

    GeneratorCredentials::resolve(
        env::var("OPENAI_API_KEY").ok(),
        env::var("OPENAI_MODEL").ok(),
        env::var("OPENAI_BASE_URL").ok(),
        DEFAULT_MODEL,
    )
    .context("OPENAI_API_KEY must be set")
}

/// Parse a `KIND=SOURCE` dataset argument into an adapter.
///
/// `SOURCE` is a local JSON download or an http(s) URL. `KIND` names the
/// adapter: acled, gdacs, maritime or political.
pub fn dataset_adapter(spec: &str) -> Result<Box<dyn DatasetAdapter>> {
    let Some((kind, source)) = spec.split_once('=') else {
        bail!("Dataset must be given as KIND=SOURCE, got {spec:?}");
    };

    let adapter: Box<dyn DatasetAdapter> = match kind.trim() {
        "acled" => Box::new(AcledAdapter::new(feed(source, Some(("event_date", "|")))?)),
        "gdacs" => Box::new(GdacsAdapter::new(feed(source, None)?)),
        "maritime" => Box::new(MaritimeAdapter::new(feed(source, None)?)),
        "political" => Box::new(PoliticalEventAdapter::new(feed(source, None)?)),
        other => bail!("Unknown dataset kind {other:?} (expected acled, gdacs, maritime or political)"),
    };
    Ok(adapter)
}

/// A feed over a path or URL.
///
/// ACLED's API takes its date window as one joined parameter; the other
/// feeds are fetched whole and filtered by blocking.
fn feed(source: &str, joined_window: Option<(&str, &str)>) -> Result<Box<dyn RecordFeed>> {
    let source = source.trim();
    if source.starts_with("http://") || source.starts_with("https://") {
        let mut http = HttpJsonFeed::new(source).with_context(|| format!("Invalid dataset URL {source}"))?;
        if let Some((name, separator)) = joined_window {
            http = http.with_window_param(name, separator);
        }
        Ok(Box::new(http))
    } else {
        Ok(Box::new(JsonFileFeed::new(source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_argument_parsing() {
        let adapter = dataset_adapter("gdacs=./gdacs.json").unwrap();
        assert_eq!(adapter.name(), "gdacs");

        assert!(dataset_adapter("gdacs").is_err());
        assert!(dataset_adapter("weather=./w.json").is_err());
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let config = PipelineConfig::load(None).unwrap();
        assert_eq!(config.extraction.max_attempts, 3);
        assert_eq!(config.validation.date_tolerance_days, 3);
    }
}
