//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix and `__` as the section separator)
//! - Default values (built into the code)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: Serialization/deserialization library for converting between Rust structs and data formats
//! - **derive macros**: Automatically generate code for common traits (Debug, Clone, Serialize, Deserialize)
//! - **Duration helpers**: Timeouts are stored as plain seconds and converted on demand
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Special environment variables (HOST, PORT, OPENROUTER_API_KEY, HUGGINGFACE_API_KEY)
//! 2. Prefixed environment variables (APP_SERVER__PORT, APP_AUDIO__ARTIFACT_DIR, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;              // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML, JSON, etc.
use std::env;                    // For reading environment variables
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Each component (translation, audio, dialog) reads only its own section,
/// which keeps constructor signatures small and makes the TOML file readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub translation: TranslationConfig,
    pub audio: AudioConfig,
    pub dialog: DialogConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,  // u16 = unsigned 16-bit integer (0-65535), perfect for port numbers
}

/// External model endpoints and the model identifiers sent to them.
///
/// ## Fields:
/// - `text_base_url`: OpenAI-compatible chat completions API (OpenRouter by default)
/// - `quiz_model` / `dialog_model`: Model ids used for quiz generation and conversation practice
/// - `speech_base_url`: Speech service exposing transcription and synthesis
/// - `similarity_base_url`: Hugging Face inference API used for sentence similarity
/// - `request_timeout_secs`: Timeout applied to every call against these endpoints
/// - `device`: Compute device for local translation models ("auto", "cpu", "cuda", "metal")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub text_base_url: String,
    pub text_api_key: Option<String>,
    pub quiz_model: String,
    pub dialog_model: String,
    pub speech_base_url: String,
    pub stt_model: String,
    pub tts_vocoder: String,
    pub similarity_base_url: String,
    pub similarity_model: String,
    pub hf_api_key: Option<String>,
    pub request_timeout_secs: u64,
    pub device: String,
}

/// Translation model lookup settings.
///
/// `model_template` must contain the `{src}` and `{tgt}` placeholders; the
/// multilingual strategy substitutes `multilingual_code` for the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    pub model_template: String,
    pub multilingual_code: String,
    pub pivot_language: String,
    pub allow_reverse_model: bool,
    pub max_output_tokens: usize,
    pub call_timeout_secs: u64,
    /// Upper bound on fetching and building one model (first use downloads it)
    pub load_timeout_secs: u64,
    /// How long a pair with no route is answered from memory (0 disables)
    pub miss_ttl_secs: u64,
}

/// Audio input and artifact settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Directory where generated speech files are written and served from
    pub artifact_dir: PathBuf,
    /// Directory for temporary audio files (system temp dir when unset)
    pub temp_dir: Option<PathBuf>,
    pub download_timeout_secs: u64,
    pub max_download_bytes: usize,
    pub user_agent: String,
    pub sample_rate: u32,
    pub min_silence_ms: u32,
    pub beam_size: u32,
}

/// Conversation practice settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogConfig {
    pub max_turns: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Sessions idle for longer than this are dropped by the pruning task
    pub session_idle_secs: u64,
}

/// Performance tuning configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Number of actix worker threads (0 = one per CPU core)
    pub workers: usize,
    /// Maximum JSON body size in bytes (base64 audio payloads can be large)
    pub max_json_bytes: usize,
}

/// Provides default configuration values.
///
/// ## Why defaults matter:
/// Default values ensure the application can start even if no configuration file exists.
/// They also serve as documentation of reasonable starting values.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only (safe for development)
                port: 5000,
            },
            models: ModelsConfig {
                text_base_url: "https://openrouter.ai/api/v1".to_string(),
                text_api_key: None,
                quiz_model: "x-ai/grok-4-fast:free".to_string(),
                dialog_model: "gpt-4o".to_string(),
                speech_base_url: "http://127.0.0.1:8000".to_string(),
                stt_model: "small".to_string(),
                tts_vocoder: "microsoft/speecht5_hifigan".to_string(),
                similarity_base_url: "https://router.huggingface.co/hf-inference".to_string(),
                similarity_model: "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2".to_string(),
                hf_api_key: None,
                request_timeout_secs: 60,
                device: "auto".to_string(),
            },
            translation: TranslationConfig {
                model_template: "Helsinki-NLP/opus-mt-{src}-{tgt}".to_string(),
                multilingual_code: "mul".to_string(),
                pivot_language: "en".to_string(),
                allow_reverse_model: false,
                max_output_tokens: 128,
                call_timeout_secs: 60,
                load_timeout_secs: 300,
                miss_ttl_secs: 300,
            },
            audio: AudioConfig {
                artifact_dir: PathBuf::from("audio"),
                temp_dir: None,
                download_timeout_secs: 30,
                max_download_bytes: 25 * 1024 * 1024,  // 25MB, the usual Whisper upload cap
                user_agent: format!("learn-language-ai/{}", env!("CARGO_PKG_VERSION")),
                sample_rate: 16000,
                min_silence_ms: 500,
                beam_size: 5,
            },
            dialog: DialogConfig {
                max_turns: 10,
                max_tokens: 150,
                temperature: 0.7,
                session_idle_secs: 3600,
            },
            performance: PerformanceConfig {
                workers: 0,
                max_json_bytes: 32 * 1024 * 1024,
            },
        }
    }
}

/// Implementation block for AppConfig - adds methods to the struct.
impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST, PORT and the provider API keys
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_TRANSLATION__PIVOT_LANGUAGE=fr`: Override the bridge language
    /// - `OPENROUTER_API_KEY=...`: API key for the text-generation endpoint
    /// - `HUGGINGFACE_API_KEY=...`: API key for the similarity endpoint
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults - converts our Default impl to config format
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists) - required(false) means "don't error if missing"
            .add_source(config::File::with_name("config").required(false))
            // 3. Field names contain underscores, so sections are split on a double underscore
            .add_source(config::Environment::with_prefix("APP").prefix_separator("_").separator("__"));

        // Handle special environment variables used by deployment platforms
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        // Provider keys use the variable names the providers document
        if let Ok(key) = env::var("OPENROUTER_API_KEY") {
            settings = settings.set_override("models.text_api_key", key)?;
        }

        if let Ok(key) = env::var("HUGGINGFACE_API_KEY") {
            settings = settings.set_override("models.hf_api_key", key)?;
        }

        // Build the final configuration and convert it back to our AppConfig struct
        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Every timeout is non-zero (a zero timeout would fail every call)
    /// - The translation template has both placeholders
    /// - Base URLs are http(s)
    /// - Dialog window and sample rate are non-zero
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.models.request_timeout_secs == 0
            || self.translation.call_timeout_secs == 0
            || self.translation.load_timeout_secs == 0
            || self.audio.download_timeout_secs == 0
        {
            return Err(anyhow::anyhow!("Timeouts must be greater than 0"));
        }

        if !self.translation.model_template.contains("{src}")
            || !self.translation.model_template.contains("{tgt}")
        {
            return Err(anyhow::anyhow!(
                "Translation model template must contain {{src}} and {{tgt}}: {}",
                self.translation.model_template
            ));
        }

        for (name, url) in [
            ("models.text_base_url", &self.models.text_base_url),
            ("models.speech_base_url", &self.models.speech_base_url),
            ("models.similarity_base_url", &self.models.similarity_base_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow::anyhow!("{} must be an http(s) URL, got '{}'", name, url));
            }
        }

        if self.dialog.max_turns == 0 {
            return Err(anyhow::anyhow!("Dialog max_turns must be greater than 0"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if self.audio.max_download_bytes == 0 {
            return Err(anyhow::anyhow!("Audio max_download_bytes must be greater than 0"));
        }

        Ok(())  // All validation passed
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.models.request_timeout_secs)
    }

    pub fn translation_timeout(&self) -> Duration {
        Duration::from_secs(self.translation.call_timeout_secs)
    }

    pub fn translation_load_timeout(&self) -> Duration {
        Duration::from_secs(self.translation.load_timeout_secs)
    }

    pub fn translation_miss_ttl(&self) -> Duration {
        Duration::from_secs(self.translation.miss_ttl_secs)
    }

    /// Copy of the configuration that is safe to return from the config endpoint.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.models.text_api_key.is_some() {
            copy.models.text_api_key = Some("***".to_string());
        }
        if copy.models.hf_api_key.is_some() {
            copy.models.hf_api_key = Some("***".to_string());
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;  // Import everything from the parent module

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.dialog.max_turns, 10);
        assert_eq!(config.translation.pivot_language, "en");
        assert!(!config.translation.allow_reverse_model);
        // Ensure the default config passes validation
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;  // Invalid port
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.translation.model_template = "Helsinki-NLP/opus-mt-{src}".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.models.speech_base_url = "ftp://speech".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.audio.download_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.translation.load_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redacted_hides_keys() {
        let mut config = AppConfig::default();
        config.models.text_api_key = Some("sk-secret".to_string());
        let redacted = config.redacted();
        assert_eq!(redacted.models.text_api_key.as_deref(), Some("***"));
        assert_eq!(redacted.models.hf_api_key, None);
        // The source config is untouched
        assert_eq!(config.models.text_api_key.as_deref(), Some("sk-secret"));
    }

    #[test]
    fn test_timeouts_are_converted() {
        let config = AppConfig::default();
        assert_eq!(config.model_timeout(), Duration::from_secs(60));
        assert_eq!(config.translation_timeout(), Duration::from_secs(60));
        assert_eq!(config.translation_load_timeout(), Duration::from_secs(300));
        assert_eq!(config.translation_miss_ttl(), Duration::from_secs(300));
    }
}
