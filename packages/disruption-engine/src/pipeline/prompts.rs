//! Prompts for schema-constrained event extraction.
//!
//! The templates and the response schema together determine what the
//! generator is asked for, so both feed the prompt hash that keys the
//! response cache.

use std::sync::LazyLock;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::SchemaViolation;
use crate::pipeline::extract::ExtractionResponse;
use crate::traits::generator::Prompt;
use crate::types::article::Article;
use crate::types::event::EventType;

/// Frames the task.
pub const SYSTEM_PROMPT: &str = r#"You are an information extraction engine for supply chain disruptions.

Read a news article and extract every REAL physical or socio-political event that disrupts the production or movement of goods.

You MUST output a single JSON object and NOTHING else."#;

/// Article-specific request.
pub const EXTRACT_PROMPT: &str = r#"Extract each distinct supply chain disruption event the article reports.

If there is no qualifying disruption, return:
{"events": []}

Allowed event_type values:
{allowed_types}

Schema:
{
  "events": [
    {
      "event_type": "one of the allowed values",
      "country": "country name or ISO code",
      "admin1": "state, province or region, or null",
      "lat": number or null,
      "lon": number or null,
      "start_date": "YYYY-MM-DD or null",
      "end_date": "YYYY-MM-DD or null",
      "actors": ["organisations or groups involved"],
      "description": "one sentence describing the disruption",
      "confidence": 0.0 to 1.0
    }
  ]
}

Rules:
- Stay faithful to the text. Do not infer or fabricate values.
- Ignore metaphorical disruptions (e.g. "a flood of criticism").
- Report the same event only once, even if the article repeats it.
- Dates must be YYYY-MM-DD. Resolve relative dates ("on Friday") against the publication date.
- If unsure, leave fields null and lower confidence.
- Output JSON only.

Publication date: {published_at}

URL:
{url}

TITLE:
{title}

TEXT:
{text}"#;

/// Appended on retry, naming what was wrong with the previous output.
pub const CORRECTIVE_PROMPT: &str = r#"

Your previous output was rejected: {violation}
Return ONLY a JSON object that matches the schema above."#;

/// JSON schema of [`ExtractionResponse`].
pub static RESPONSE_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    let schema = schemars::schema_for!(ExtractionResponse);
    serde_json::to_value(&schema).unwrap_or(Value::Null)
});

/// Generate a hash of the extraction prompt for cache invalidation.
pub fn extract_prompt_hash() -> String {
    let mut hasher = Sha256::new();
    hasher.update(SYSTEM_PROMPT.as_bytes());
    hasher.update(EXTRACT_PROMPT.as_bytes());
    hasher.update(CORRECTIVE_PROMPT.as_bytes());
    hasher.update(RESPONSE_SCHEMA.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn allowed_types() -> String {
    EventType::ALL
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format the extract prompt for an article.
pub fn format_extract_prompt(article: &Article) -> String {
    EXTRACT_PROMPT
        .replace("{allowed_types}", &allowed_types())
        .replace("{published_at}", &article.published_at.to_string())
        .replace("{url}", &article.source_url)
        .replace("{title}", article.title.as_deref().unwrap_or(""))
        .replace("{text}", &article.text)
}

/// Format the corrective suffix for a rejected output.
pub fn format_corrective_prompt(violation: &SchemaViolation) -> String {
    CORRECTIVE_PROMPT.replace("{violation}", &violation.to_string())
}

/// Build the request for one attempt.
pub fn build_prompt(article: &Article, attempt: u32, last_violation: Option<&SchemaViolation>) -> Prompt {
    let mut user = format_extract_prompt(article);
    if let Some(violation) = last_violation {
        user.push_str(&format_corrective_prompt(violation));
    }

    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
        schema: RESPONSE_SCHEMA.clone(),
        article_id: article.id.clone(),
        attempt,
    }
}
