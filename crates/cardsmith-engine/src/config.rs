//! Startup configuration, read once from the environment and passed down
//! explicitly.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::PipelineError;
use crate::poller::{PollPolicy, DEFAULT_POLL_MAX_ATTEMPTS};

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_REPLICATE_API_BASE: &str = "https://api.replicate.com/v1";
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o";
pub const DEFAULT_CHAT_IMAGE_MODEL: &str = "google/gemini-2.5-flash-image-preview";
pub const DEFAULT_PREDICTION_MODEL: &str = "reve/remix";
pub const DEFAULT_ASPECT_RATIO: &str = "3:2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSettings {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    /// Model used for portrait descriptions; must accept image input.
    pub vision_model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatImageSettings {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub http_referer: Option<String>,
    pub x_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionSettings {
    pub api_token: String,
    pub api_base: String,
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Chat,
    Prediction,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Chat => "chat",
            ProviderKind::Prediction => "prediction",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub content_dir: PathBuf,
    pub public_prefix: String,
    pub artifact_prefix: String,
    pub aspect_ratio: String,
    pub text: Option<TextSettings>,
    pub chat_image: Option<ChatImageSettings>,
    pub prediction: Option<PredictionSettings>,
    /// Image tiers in the order they are tried. Empty means fallback only.
    pub provider_order: Vec<ProviderKind>,
    pub poll: PollPolicy,
    pub request_timeout: Duration,
    pub seed: Option<u64>,
    pub describe_portraits: bool,
    pub events_path: Option<PathBuf>,
    pub receipts_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    /// No providers, default paths: every card takes the fallback path.
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("uploads"),
            public_prefix: "/uploads".to_string(),
            artifact_prefix: crate::store::DEFAULT_FILE_PREFIX.to_string(),
            aspect_ratio: DEFAULT_ASPECT_RATIO.to_string(),
            text: None,
            chat_image: None,
            prediction: None,
            provider_order: Vec::new(),
            poll: PollPolicy::default(),
            request_timeout: Duration::from_secs(90),
            seed: None,
            describe_portraits: false,
            events_path: None,
            receipts_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Values are trimmed
    /// and empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let base = |key: &str, default: &str| {
            get(key)
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| default.to_string())
        };
        let defaults = Self::default();

        let openrouter_key = get("OPENROUTER_API_KEY");
        let openrouter_base = base("OPENROUTER_API_BASE", DEFAULT_OPENROUTER_API_BASE);

        let text = match get("OPENAI_API_KEY") {
            Some(api_key) => Some((api_key, base("OPENAI_BASE_URL", DEFAULT_OPENAI_API_BASE))),
            None => openrouter_key
                .clone()
                .map(|api_key| (api_key, openrouter_base.clone())),
        }
        .map(|(api_key, api_base)| TextSettings {
            api_key,
            api_base,
            model: get("CARDSMITH_TEXT_MODEL").unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            vision_model: get("CARDSMITH_VISION_MODEL")
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
        });

        let chat_image = openrouter_key.map(|api_key| ChatImageSettings {
            api_key,
            api_base: openrouter_base,
            model: get("CARDSMITH_CHAT_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_CHAT_IMAGE_MODEL.to_string()),
            http_referer: get("OPENROUTER_HTTP_REFERER"),
            x_title: get("OPENROUTER_X_TITLE"),
        });

        let prediction = get("REPLICATE_API_TOKEN")
            .or_else(|| get("REPLICATE_API_KEY"))
            .map(|api_token| PredictionSettings {
                api_token,
                api_base: base("REPLICATE_API_BASE", DEFAULT_REPLICATE_API_BASE),
                model: get("CARDSMITH_PREDICTION_MODEL")
                    .unwrap_or_else(|| DEFAULT_PREDICTION_MODEL.to_string()),
            });

        let provider_order = parse_provider_order(
            get("CARDSMITH_IMAGE_PROVIDERS")
                .as_deref()
                .unwrap_or("chat,prediction"),
        )?;

        let interval_ms: u64 = parse_or(
            "CARDSMITH_POLL_INTERVAL_MS",
            get("CARDSMITH_POLL_INTERVAL_MS"),
            2000,
        )?;
        let max_attempts: u32 = parse_or(
            "CARDSMITH_POLL_MAX_ATTEMPTS",
            get("CARDSMITH_POLL_MAX_ATTEMPTS"),
            DEFAULT_POLL_MAX_ATTEMPTS,
        )?;
        if max_attempts == 0 {
            return Err(PipelineError::Config(
                "CARDSMITH_POLL_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        let timeout_s: u64 = parse_or(
            "CARDSMITH_REQUEST_TIMEOUT_S",
            get("CARDSMITH_REQUEST_TIMEOUT_S"),
            90,
        )?;
        let seed = get("CARDSMITH_SEED")
            .map(|raw| parse_value::<u64>("CARDSMITH_SEED", &raw))
            .transpose()?;
        let describe_portraits = get("CARDSMITH_DESCRIBE_PORTRAITS")
            .map(|raw| parse_bool("CARDSMITH_DESCRIBE_PORTRAITS", &raw))
            .transpose()?
            .unwrap_or(false);

        Ok(Self {
            content_dir: get("CARDSMITH_CONTENT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.content_dir),
            public_prefix: get("CARDSMITH_PUBLIC_PREFIX").unwrap_or(defaults.public_prefix),
            artifact_prefix: get("CARDSMITH_ARTIFACT_PREFIX").unwrap_or(defaults.artifact_prefix),
            aspect_ratio: get("CARDSMITH_ASPECT_RATIO").unwrap_or(defaults.aspect_ratio),
            text,
            chat_image,
            prediction,
            provider_order,
            poll: PollPolicy::new(Duration::from_millis(interval_ms), max_attempts),
            request_timeout: Duration::from_secs(timeout_s.max(1)),
            seed,
            describe_portraits,
            events_path: get("CARDSMITH_EVENTS_PATH").map(PathBuf::from),
            receipts_dir: get("CARDSMITH_RECEIPTS_DIR").map(PathBuf::from),
        })
    }
}

/// `chat`, `prediction` in any order, or `none` for fallback only.
pub fn parse_provider_order(raw: &str) -> Result<Vec<ProviderKind>, PipelineError> {
    let mut order = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|token| !token.is_empty()) {
        let kind = match token.to_ascii_lowercase().as_str() {
            "none" => return Ok(Vec::new()),
            "chat" | "openrouter" => ProviderKind::Chat,
            "prediction" | "replicate" => ProviderKind::Prediction,
            other => {
                return Err(PipelineError::Config(format!(
                    "unknown image provider '{other}' in CARDSMITH_IMAGE_PROVIDERS"
                )))
            }
        };
        if !order.contains(&kind) {
            order.push(kind);
        }
    }
    Ok(order)
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, PipelineError> {
    raw.parse::<T>()
        .map_err(|_| PipelineError::Config(format!("{key} has invalid value '{raw}'")))
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, PipelineError> {
    match raw {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, PipelineError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PipelineError::Config(format!(
            "{key} has invalid value '{raw}'"
        ))),
    }
}
