//! Article source trait.
//!
//! Acquisition and relevance filtering happen upstream; a source hands the
//! engine one run's worth of already-filtered articles.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::article::Article;

/// Supplier of candidate articles for one run.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Return the finite set of articles for this run.
    async fn articles(&self) -> Result<Vec<Article>>;
}
