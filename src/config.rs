//! Runtime settings.
//!
//! Everything comes from the process environment (a `.env` file is loaded
//! first by `main`). Only the provider key is required.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::completion::GenerationParams;
use crate::ocr::OcrProviderKind;
use crate::prompt::Locale;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub ask: GenerationParams,
    pub summary: GenerationParams,
    pub request_timeout: Duration,
    pub default_locale: Locale,
    pub report_store_capacity: usize,
    pub session_capacity: usize,
    pub session_history_turns: usize,
    pub ocr_backend: Option<OcrProviderKind>,
    pub mistral_api_key: Option<String>,
    pub landing_ai_api_key: Option<String>,
    pub bind_addr: String,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let openai_api_key = get("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
        let model = get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let ocr_backend = match get("OCR_BACKEND") {
            Some(value) => OcrProviderKind::parse(&value).map_err(|reason| ConfigError::Invalid {
                var: "OCR_BACKEND",
                value,
                reason,
            })?,
            None => None,
        };

        Ok(Self {
            openai_api_key,
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            ask: GenerationParams {
                model: model.clone(),
                temperature: parse_or(&get, "ASK_TEMPERATURE", 0.7)?,
                max_tokens: parse_or(&get, "ASK_MAX_TOKENS", 200)?,
            },
            summary: GenerationParams {
                model,
                temperature: parse_or(&get, "SUMMARY_TEMPERATURE", 0.5)?,
                max_tokens: parse_or(&get, "SUMMARY_MAX_TOKENS", 300)?,
            },
            request_timeout: Duration::from_secs(parse_or(&get, "REQUEST_TIMEOUT_SECS", 60)?),
            default_locale: parse_or(&get, "DEFAULT_LANGUAGE", Locale::English)?,
            report_store_capacity: parse_or(&get, "REPORT_STORE_CAPACITY", 256)?,
            session_capacity: parse_or(&get, "SESSION_CAPACITY", 1024)?,
            session_history_turns: parse_or(&get, "SESSION_HISTORY_TURNS", 6)?,
            ocr_backend,
            mistral_api_key: get("MISTRAL_API_KEY"),
            landing_ai_api_key: get("LANDINGAI_API_KEY"),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            static_dir: get("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("static")),
            max_upload_bytes: parse_or(&get, "MAX_UPLOAD_BYTES", 20 * 1024 * 1024)?,
        })
    }

    /// Defaults with a dummy key, for handler and provider tests.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self::from_lookup(|key| (key == "OPENAI_API_KEY").then(|| "test-key".to_string()))
            .expect("defaults are valid")
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}
