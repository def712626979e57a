use std::path::PathBuf;
use std::str::FromStr;

use crate::normalize::ImageSettings;
use crate::prompt::{FallbackPolicy, PromptMode};
use crate::vision::OpenAiConfig;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which callers may reach the API from a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPolicy {
    Any,
    AllowList(Vec<String>),
}

impl OriginPolicy {
    /// Requests without an `Origin` header (curl, server-to-server) are always allowed.
    pub fn permits(&self, origin: Option<&str>) -> bool {
        match (self, origin) {
            (OriginPolicy::Any, _) | (_, None) => true,
            (OriginPolicy::AllowList(list), Some(origin)) => list.iter().any(|o| o == origin),
        }
    }
}

impl FromStr for OriginPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let origins: Vec<String> = s
            .split(',')
            .map(|o| o.trim().trim_end_matches('/'))
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        if origins.is_empty() || origins.iter().any(|o| o == "*") {
            return Ok(OriginPolicy::Any);
        }
        Ok(OriginPolicy::AllowList(origins))
    }
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub upload_dir: PathBuf,
    pub static_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub origins: OriginPolicy,
    pub prompt_mode: PromptMode,
    pub fallback: FallbackPolicy,
    pub image: ImageSettings,
    pub openai: OpenAiConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENAI_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        let image_defaults = ImageSettings::default();
        let image = ImageSettings {
            resize: parse_bool(&lookup, "RESIZE_IMAGES", image_defaults.resize)?,
            max_width: parse_or(&lookup, "MAX_IMAGE_WIDTH", image_defaults.max_width)?,
            jpeg_quality: parse_or(&lookup, "JPEG_QUALITY", image_defaults.jpeg_quality)?,
        };
        if image.max_width == 0 {
            return Err(invalid("MAX_IMAGE_WIDTH", "0", "must be positive"));
        }
        if !(1..=100).contains(&image.jpeg_quality) {
            return Err(invalid(
                "JPEG_QUALITY",
                &image.jpeg_quality.to_string(),
                "must be between 1 and 100",
            ));
        }

        let openai_defaults = OpenAiConfig::default();
        let openai = OpenAiConfig {
            base_url: lookup("OPENAI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(openai_defaults.base_url),
            api_key,
            model: lookup("OPENAI_MODEL").unwrap_or(openai_defaults.model),
            max_tokens: parse_or(&lookup, "OPENAI_MAX_TOKENS", openai_defaults.max_tokens)?,
            timeout_secs: match lookup("OPENAI_TIMEOUT_SECS") {
                Some(raw) => Some(
                    raw.trim()
                        .parse()
                        .map_err(|_| invalid("OPENAI_TIMEOUT_SECS", &raw, "expected seconds"))?,
                ),
                None => None,
            },
        };

        Ok(Config {
            port: parse_or(&lookup, "PORT", DEFAULT_PORT)?,
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            static_dir: lookup("STATIC_DIR")
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            origins: parse_or(&lookup, "ALLOWED_ORIGINS", OriginPolicy::Any)?,
            prompt_mode: parse_or(&lookup, "PROMPT_MODE", PromptMode::default())?,
            fallback: parse_or(&lookup, "FALLBACK_POLICY", FallbackPolicy::default())?,
            image,
            openai,
        })
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: ToString,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &raw, &e.to_string())),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, &raw, "expected true or false")),
    }
}
