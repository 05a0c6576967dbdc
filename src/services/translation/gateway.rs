use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::config::Config;
use crate::core::errors::{TranslationError, TranslationResult};

/// Seam for translation providers so the pipeline can be exercised with a
/// scripted fake in tests.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into `target_lang`.
    ///
    /// Returns `None` when no translation is available for any reason
    /// (missing configuration, transport failure, non-2xx response, malformed
    /// body). Never returns an error: callers substitute the original text.
    async fn translate(&self, text: &str, target_lang: &str) -> Option<String>;
}

/// Translation gateway over the remote HTTP API.
///
/// Request shape: POST `<endpoint>?auth_key=..&text=..&target_lang=..`
/// Response shape: `{ "translations": [ { "detected_source_language", "text" } ] }`
/// with `translations[0].text` used as the result.
pub struct TranslationGateway {
    config: Arc<Config>,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TranslationResponse {
    translations: Vec<TranslationEntry>,
}

#[derive(Debug, Deserialize)]
struct TranslationEntry {
    #[allow(dead_code)]
    detected_source_language: Option<String>,
    text: String,
}

impl TranslationGateway {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let timeout = Duration::from_secs(config.translation.request_timeout_secs);

        // HTTP client with timeout and connection pooling
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        if config.translation.endpoint.is_none() || config.translation.api_key.is_none() {
            warn!("Translation endpoint/API key not configured; all translations will fall back to the original text");
        }

        Ok(Self {
            config,
            http_client,
        })
    }

    async fn request_translation(&self, text: &str, target_lang: &str) -> TranslationResult<String> {
        let endpoint = self
            .config
            .translation
            .endpoint
            .as_deref()
            .ok_or(TranslationError::NotConfigured)?;
        let auth_key = self
            .config
            .translation
            .api_key
            .as_deref()
            .ok_or(TranslationError::NotConfigured)?;

        let response = self
            .http_client
            .post(endpoint)
            .query(&[
                ("auth_key", auth_key),
                ("text", text),
                ("target_lang", target_lang),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TranslationError::BadStatus(response.status()));
        }

        let body: TranslationResponse = response.json().await?;
        body.translations
            .into_iter()
            .next()
            .map(|entry| entry.text)
            .ok_or(TranslationError::EmptyResponse)
    }
}

#[async_trait]
impl Translator for TranslationGateway {
    async fn translate(&self, text: &str, target_lang: &str) -> Option<String> {
        match self.request_translation(text, target_lang).await {
            Ok(translated) => {
                debug!(text, translated = %translated, "Translation succeeded");
                Some(translated)
            }
            Err(e) => {
                warn!(text, error = %e, "Translation unavailable, caller will fall back to original text");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_body_parsing() {
        let body = r#"{
            "translations": [
                { "detected_source_language": "EN", "text": "perro" }
            ]
        }"#;
        let parsed: TranslationResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.translations[0].text, "perro");
    }

    #[test]
    fn test_response_without_source_language_still_parses() {
        let body = r#"{ "translations": [ { "text": "gato" } ] }"#;
        let parsed: TranslationResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.translations[0].text, "gato");
    }
}
