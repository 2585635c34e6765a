//! Generator API keys, kept out of logs and debug output.

use secrecy::{ExposeSecret, SecretBox};
use std::fmt;

use crate::error::{EngineError, Result};

/// An API key for a hosted generator.
///
/// Debug output is redacted. The key is only readable through
/// [`ApiKey::expose`], which the HTTP client calls when it builds the
/// `Authorization` header.
pub struct ApiKey(SecretBox<str>);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretBox::new(key.into().into_boxed_str()))
    }

    /// Key from an environment value; blank or missing means no key.
    pub fn from_env_value(value: Option<String>) -> Option<Self> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(Self::new)
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for ApiKey {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Credentials for a hosted generator, with the key kept secret.
#[derive(Clone, Debug)]
pub struct GeneratorCredentials {
    pub api_key: ApiKey,

    /// Model identifier
    pub model: String,

    /// API base URL (optional)
    pub base_url: Option<String>,
}

impl GeneratorCredentials {
    /// Create new generator credentials.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: ApiKey::new(api_key),
            model: model.into(),
            base_url: None,
        }
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Build from optional values, as read from the environment.
    ///
    /// Blank values count as missing; the key is required.
    pub fn resolve(
        api_key: Option<String>,
        model: Option<String>,
        base_url: Option<String>,
        default_model: &str,
    ) -> Result<Self> {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        let api_key = ApiKey::from_env_value(api_key).ok_or_else(|| EngineError::Config("API key not set".into()))?;
        Ok(Self {
            api_key,
            model: present(model).unwrap_or_else(|| default_model.to_string()),
            base_url: present(base_url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_not_in_debug() {
        let key = ApiKey::new("sk-super-secret-key");
        let debug = format!("{:?}", key);
        assert!(!debug.contains("sk-super"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(key.clone().expose(), "sk-super-secret-key");
    }

    #[test]
    fn test_env_value_is_trimmed() {
        assert_eq!(ApiKey::from_env_value(Some("  sk-1\n".into())).unwrap().expose(), "sk-1");
        assert!(ApiKey::from_env_value(Some("   ".into())).is_none());
        assert!(ApiKey::from_env_value(None).is_none());
    }

    #[test]
    fn test_credentials_debug_redacts_key() {
        let creds = GeneratorCredentials::new("sk-secret", "gpt-4o");
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("gpt-4o"));
    }

    #[test]
    fn test_resolve_requires_key_and_defaults_model() {
        assert!(GeneratorCredentials::resolve(None, None, None, "gpt-4o").is_err());
        assert!(GeneratorCredentials::resolve(Some("  ".into()), None, None, "gpt-4o").is_err());

        let creds =
            GeneratorCredentials::resolve(Some("sk-1".into()), Some(String::new()), None, "gpt-4o").unwrap();
        assert_eq!(creds.model, "gpt-4o");
        assert_eq!(creds.api_key.expose(), "sk-1");
        assert_eq!(creds.base_url, None);
    }
}
