//! JSON Lines article input.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::Result;
use crate::traits::source::ArticleSource;
use crate::types::article::Article;

/// Articles read from a JSONL file, one [`Article`] per line.
///
/// Blank lines are ignored. A line that does not decode is logged with its
/// line number and skipped, unless the source is strict.
pub struct JsonlArticleSource {
    path: PathBuf,
    strict: bool,
}

impl JsonlArticleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            strict: false,
        }
    }

    /// Fail the whole read on the first undecodable line.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

#[async_trait]
impl ArticleSource for JsonlArticleSource {
    async fn articles(&self) -> Result<Vec<Article>> {
        let body = tokio::fs::read_to_string(&self.path).await?;
        let articles = parse_articles(&body, self.strict)?;
        debug!(path = %self.path.display(), articles = articles.len(), "Loaded articles");
        Ok(articles)
    }
}

/// Decode JSONL text into articles.
pub fn parse_articles(body: &str, strict: bool) -> Result<Vec<Article>> {
    let mut articles = Vec::new();
    for (i, line) in body.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Article>(line) {
            Ok(article) => articles.push(article),
            Err(e) if strict => return Err(e.into()),
            Err(e) => warn!(line = i + 1, error = %e, "Skipping undecodable article line"),
        }
    }
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BODY: &str = r#"{"id": "a1", "text": "Port closed.", "published_at": "2024-03-01", "source_url": "https://x/1"}

{"id": "a2", "text": "Strike.", "published_at": "2024-03-02", "source_url": "https://x/2", "country_hint": "Chile", "title": "Strike"}
{"id": "broken"
"#;

    #[test]
    fn test_lenient_parse_skips_bad_lines() {
        let articles = parse_articles(BODY, false).unwrap();
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[1].country_hint.as_deref(), Some("Chile"));
        assert_eq!(articles[1].title.as_deref(), Some("Strike"));
    }

    #[test]
    fn test_strict_parse_fails() {
        assert!(parse_articles(BODY, true).is_err());
    }

    #[tokio::test]
    async fn test_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BODY.as_bytes()).unwrap();

        let articles = JsonlArticleSource::new(file.path()).articles().await.unwrap();
        assert_eq!(articles[0].id, "a1");
    }
}
