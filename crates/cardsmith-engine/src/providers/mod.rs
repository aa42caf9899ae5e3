//! Image generation providers. Each variant turns an [`ImagePrompt`] into
//! raw image bytes or a recoverable [`PipelineError`].

pub mod chat;
pub mod prediction;

use reqwest::blocking::Client as HttpClient;
use tracing::{debug, warn};

use crate::codec::{data_url_mime, decode_payload, EncodedImage};
use crate::config::{PipelineConfig, ProviderKind};
use crate::error::PipelineError;
use crate::poller::PredictionPoller;
use crate::transport::{download_image, looks_like_http_url, ImageBytes};

pub use self::chat::ChatImageProvider;
pub use self::prediction::PredictionImageProvider;

/// Everything a provider needs for one generation call.
#[derive(Debug, Clone)]
pub struct ImagePrompt {
    pub text: String,
    pub aspect_ratio: String,
    /// Sender photo first, recipient photo second.
    pub images: Vec<EncodedImage>,
}

pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, prompt: &ImagePrompt) -> Result<ImageBytes, PipelineError>;
}

/// Instantiates the configured tiers in order. Tiers without credentials
/// are skipped.
pub fn build_providers(config: &PipelineConfig) -> Vec<Box<dyn ImageProvider>> {
    let mut providers: Vec<Box<dyn ImageProvider>> = Vec::new();
    for kind in &config.provider_order {
        debug!(tier = kind.as_str(), position = providers.len(), "configuring image tier");
        match kind {
            ProviderKind::Chat => match &config.chat_image {
                Some(settings) => providers.push(Box::new(ChatImageProvider::new(
                    settings.clone(),
                    config.request_timeout,
                ))),
                None => warn!("chat image provider skipped: OPENROUTER_API_KEY not set"),
            },
            ProviderKind::Prediction => match &config.prediction {
                Some(settings) => providers.push(Box::new(PredictionImageProvider::new(
                    settings.clone(),
                    PredictionPoller::new(config.poll),
                    config.request_timeout,
                ))),
                None => warn!("prediction image provider skipped: REPLICATE_API_TOKEN not set"),
            },
        }
    }
    providers
}

/// Resolves an image reference returned by a provider: remote URLs are
/// downloaded, anything else is treated as (data URL wrapped) base64.
pub fn resolve_image_reference(
    http: &HttpClient,
    provider: &str,
    reference: &str,
) -> Result<ImageBytes, PipelineError> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::decode(provider, "empty image reference"));
    }
    if looks_like_http_url(trimmed) {
        return download_image(http, provider, trimmed);
    }
    decode_inline_image(provider, trimmed)
}

pub fn decode_inline_image(provider: &str, raw: &str) -> Result<ImageBytes, PipelineError> {
    let bytes = decode_payload(raw)
        .map_err(|err| PipelineError::decode(provider, format!("invalid base64 image: {err}")))?;
    if bytes.is_empty() {
        return Err(PipelineError::decode(provider, "image payload decoded to zero bytes"));
    }
    Ok(ImageBytes {
        bytes,
        mime_type: data_url_mime(raw).map(str::to_string),
    })
}
