//! Article type - the unit of input to extraction.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A candidate news article, already filtered for topical relevance.
///
/// Articles are immutable once ingested. The engine borrows them and never
/// writes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Stable identifier assigned by the article source
    pub id: String,

    /// Article body text
    pub text: String,

    /// Publication date
    pub published_at: NaiveDate,

    /// Where the article was retrieved from
    pub source_url: String,

    /// Country suggested by source metadata, used when the model omits one
    #[serde(default)]
    pub country_hint: Option<String>,

    /// Headline if known
    #[serde(default)]
    pub title: Option<String>,
}

impl Article {
    /// Create a new article.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        published_at: NaiveDate,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            published_at,
            source_url: source_url.into(),
            country_hint: None,
            title: None,
        }
    }

    /// Set the country hint.
    pub fn with_country_hint(mut self, country: impl Into<String>) -> Self {
        self.country_hint = Some(country.into());
        self
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// SHA-256 of title and text, used to key cached model responses.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_deref().unwrap_or_default().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// True when there is nothing to extract from.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
