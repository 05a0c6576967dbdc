use crate::core::errors::ConfigError;
use std::env;
use tracing::Level;

/// Forbidden words used when FORBIDDEN_WORDS is unset.
const DEFAULT_FORBIDDEN_WORDS: &[&str] = &["cat", "coffee", "sun", "apple", "horse"];

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub log_level: Level,
}

/// Translation gateway configuration
///
/// `api_key` / `endpoint` may be absent: the gateway then degrades every call
/// to "translation unavailable" instead of failing at startup.
#[derive(Debug, Clone)]
pub struct TranslationConfig {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub target_lang: String,
    /// Fixed artificial delay before each translation call (simulated latency)
    pub artificial_delay_ms: u64,
    pub request_timeout_secs: u64,
}

/// Classifier configuration (only read by the ONNX backend)
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub model_path: String,
    pub labels_path: String,
    pub top_k: usize,
    pub input_size: u32,
}

/// Content moderation configuration
#[derive(Debug, Clone)]
pub struct ModerationConfig {
    pub forbidden_words: Vec<String>,
}

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub translation: TranslationConfig,
    pub classifier: ClassifierConfig,
    pub moderation: ModerationConfig,
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let config = Self::load_from_env();
        config.validate()?;
        Ok(config)
    }

    fn load_from_env() -> Self {
        // Parse log level
        let log_level = env::var("LOG_LEVEL")
            .ok()
            .and_then(|s| match s.to_lowercase().as_str() {
                "trace" => Some(Level::TRACE),
                "debug" => Some(Level::DEBUG),
                "info" => Some(Level::INFO),
                "warn" | "warning" => Some(Level::WARN),
                "error" => Some(Level::ERROR),
                _ => None,
            })
            .unwrap_or(Level::INFO);

        // Comma-separated forbidden words, falling back to the built-in list
        let forbidden_words = env::var("FORBIDDEN_WORDS")
            .ok()
            .map(|words| {
                words
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| {
                DEFAULT_FORBIDDEN_WORDS
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });

        Self {
            server: ServerConfig {
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1420),
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                log_level,
            },
            translation: TranslationConfig {
                api_key: env::var("TRANSLATE_API_KEY")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
                endpoint: env::var("TRANSLATE_ENDPOINT")
                    .ok()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
                target_lang: env::var("TARGET_LANG").unwrap_or_else(|_| "ES".to_string()),
                artificial_delay_ms: env::var("TRANSLATION_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
                request_timeout_secs: env::var("TRANSLATE_TIMEOUT_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            classifier: ClassifierConfig {
                model_path: env::var("CLASSIFIER_MODEL_PATH")
                    .unwrap_or_else(|_| "models/classifier.onnx".to_string()),
                labels_path: env::var("CLASSIFIER_LABELS_PATH")
                    .unwrap_or_else(|_| "models/labels.txt".to_string()),
                top_k: env::var("CLASSIFIER_TOP_K")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3),
                input_size: env::var("CLASSIFIER_INPUT_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(224),
            },
            moderation: ModerationConfig { forbidden_words },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.translation.target_lang.trim().is_empty() {
            return Err(ConfigError::EmptyTargetLang);
        }

        if self.translation.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }

        if self.classifier.top_k == 0 {
            return Err(ConfigError::InvalidTopK(self.classifier.top_k));
        }

        if !(32..=1024).contains(&self.classifier.input_size) {
            return Err(ConfigError::InvalidInputSize(self.classifier.input_size));
        }

        Ok(())
    }

    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    pub fn log_level(&self) -> Level {
        self.server.log_level
    }

    pub fn target_lang(&self) -> &str {
        &self.translation.target_lang
    }

    pub fn forbidden_words(&self) -> &[String] {
        &self.moderation.forbidden_words
    }
}

// Note: No Default implementation because Config::new() can fail
// Users should explicitly call Config::new()? and handle errors

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server: ServerConfig {
                port: 1420,
                host: "127.0.0.1".into(),
                log_level: Level::INFO,
            },
            translation: TranslationConfig {
                api_key: None,
                endpoint: None,
                target_lang: "ES".into(),
                artificial_delay_ms: 0,
                request_timeout_secs: 30,
            },
            classifier: ClassifierConfig {
                model_path: "models/classifier.onnx".into(),
                labels_path: "models/labels.txt".into(),
                top_k: 3,
                input_size: 224,
            },
            moderation: ModerationConfig {
                forbidden_words: vec!["cat".into()],
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_empty_target_lang_rejected() {
        let mut config = base_config();
        config.translation.target_lang = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::EmptyTargetLang)
        ));
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let mut config = base_config();
        config.classifier.top_k = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTopK(0))));
    }
}
