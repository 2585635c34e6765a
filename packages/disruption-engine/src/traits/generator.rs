//! Generator trait for the generative model behind extraction.
//!
//! The generator is treated as an untrusted structured-output producer:
//! it turns a prompt into raw text and nothing more. Schema validation,
//! repair, retries and timeouts all live in the extraction pipeline, so
//! implementations stay thin and are trivially swapped for mocks.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A schema-constrained generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    /// Instructions that frame the task
    pub system: String,

    /// Article-specific request, including any corrective instruction
    pub user: String,

    /// JSON schema the output must satisfy
    pub schema: Value,

    /// Article the request belongs to (for logging and test routing)
    pub article_id: String,

    /// 1-based attempt number
    pub attempt: u32,
}

/// Capability interface over a generative model.
///
/// Implementations should map rate limits, overload and transport errors to
/// [`crate::EngineError::TransientUpstream`] so the engine retries them.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce raw text for the prompt.
    async fn generate(&self, prompt: &Prompt) -> Result<String>;

    /// Model identifier, recorded in logs.
    fn model(&self) -> &str {
        "unspecified"
    }
}

#[async_trait]
impl<G: Generator + ?Sized> Generator for std::sync::Arc<G> {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        (**self).generate(prompt).await
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}
