use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use crate::codec::EncodedImage;
use crate::composer::{TextProvider, TextRequest};

const DESCRIBE_MAX_TOKENS: u32 = 250;

/// Asks a vision-capable text model for a likeness description of one
/// portrait, so image prompts can carry explicit appearance details.
#[derive(Clone, Default)]
pub struct PortraitDescriber {
    provider: Option<Arc<dyn TextProvider>>,
}

impl PortraitDescriber {
    pub fn new(provider: Option<Arc<dyn TextProvider>>) -> Self {
        Self { provider }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Never fails; returns `a person ({role})` when no description is
    /// available.
    pub fn describe(&self, portrait: &EncodedImage, role: &str) -> String {
        let fallback = || generic_description(role);
        let Some(provider) = &self.provider else {
            return fallback();
        };
        let request = TextRequest {
            messages: vec![json!({
                "role": "user",
                "content": [
                    { "type": "text", "text": describe_instruction(role) },
                    { "type": "image_url", "image_url": { "url": portrait.data_url() } },
                ],
            })],
            max_tokens: DESCRIBE_MAX_TOKENS,
            temperature: None,
            vision: true,
        };
        match provider.complete(&request) {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => fallback(),
            Err(err) => {
                warn!(role, error = %err, "portrait description failed");
                fallback()
            }
        }
    }
}

pub fn generic_description(role: &str) -> String {
    format!("a person ({role})")
}

fn describe_instruction(role: &str) -> String {
    format!(
        "You are describing a photo so an image model can draw this person recognisably. \
         Be precise about: skin tone; hair colour, style and length; face shape and notable \
         facial features; eye colour if visible; approximate age range; accessories such as \
         glasses or facial hair. Answer in one short paragraph. This is the {role}."
    )
}
