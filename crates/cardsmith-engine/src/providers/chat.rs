use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use serde_json::{json, Value};

use super::{decode_inline_image, resolve_image_reference, ImageProvider, ImagePrompt};
use crate::codec::strip_data_url_prefix;
use crate::config::ChatImageSettings;
use crate::error::PipelineError;
use crate::transport::{
    http_client, looks_like_http_url, response_json_or_error, send, ImageBytes,
};

const PROVIDER: &str = "chat";

/// Image found in a chat completion, before any download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatImage {
    Remote(String),
    Inline(String),
}

/// Synchronous image generation through an OpenAI-compatible
/// `chat/completions` endpoint that can answer with image parts.
pub struct ChatImageProvider {
    settings: ChatImageSettings,
    http: HttpClient,
}

impl ChatImageProvider {
    pub fn new(settings: ChatImageSettings, timeout: Duration) -> Self {
        Self {
            settings,
            http: http_client(timeout),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.api_base)
    }

    /// One user message: the prompt text followed by each photo as a data URL.
    pub fn build_payload(&self, prompt: &ImagePrompt) -> Value {
        let mut content = vec![json!({ "type": "text", "text": prompt.text })];
        for image in &prompt.images {
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": image.data_url() },
            }));
        }
        json!({
            "model": self.settings.model,
            "messages": [{ "role": "user", "content": content }],
            "modalities": ["image", "text"],
            "image_config": { "aspect_ratio": prompt.aspect_ratio },
        })
    }

    fn apply_headers(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(referer) = &self.settings.http_referer {
            request = request.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.settings.x_title {
            request = request.header("X-Title", title);
        }
        request
    }
}

impl ImageProvider for ChatImageProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn generate(&self, prompt: &ImagePrompt) -> Result<ImageBytes, PipelineError> {
        let request = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&self.build_payload(prompt));
        let response = send(PROVIDER, self.apply_headers(request))?;
        let payload = response_json_or_error(PROVIDER, response)?;
        match decode_chat_image(&payload)? {
            ChatImage::Remote(url) => resolve_image_reference(&self.http, PROVIDER, &url),
            ChatImage::Inline(raw) => decode_inline_image(PROVIDER, &raw),
        }
    }
}

/// Locates the generated image in `choices[0].message`. Accepted shapes, in
/// priority order:
///
/// 1. `message.images[]`, entries either strings or `{image_url: {url}}`
/// 2. `message.content[]` with a part whose `type` names an image
/// 3. `message.content` as a bare base64 or data URL string
///
/// Anything else is a decode failure.
pub fn decode_chat_image(payload: &Value) -> Result<ChatImage, PipelineError> {
    let message = payload
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| PipelineError::decode(PROVIDER, "response has no choices[0].message"))?;

    if let Some(reference) = message
        .get("images")
        .and_then(Value::as_array)
        .and_then(|images| images.iter().find_map(image_part_reference))
    {
        return Ok(classify(reference));
    }

    match message.get("content") {
        Some(Value::Array(parts)) => {
            let reference = parts
                .iter()
                .filter(|part| is_image_part(part))
                .find_map(image_part_reference)
                .ok_or_else(|| {
                    PipelineError::decode(PROVIDER, "content array has no image part")
                })?;
            Ok(classify(reference))
        }
        Some(Value::String(raw)) if !raw.trim().is_empty() => {
            let trimmed = raw.trim();
            if looks_like_http_url(trimmed) {
                return Ok(ChatImage::Remote(trimmed.to_string()));
            }
            Ok(ChatImage::Inline(strip_data_url_prefix(trimmed).to_string()))
        }
        Some(other) => Err(PipelineError::decode(
            PROVIDER,
            format!("unrecognised message content shape: {}", shape_name(other)),
        )),
        None => Err(PipelineError::decode(PROVIDER, "message carries no image")),
    }
}

fn is_image_part(part: &Value) -> bool {
    part.get("type")
        .and_then(Value::as_str)
        .map(|kind| {
            matches!(
                kind.trim().to_ascii_lowercase().as_str(),
                "image_url" | "image" | "output_image" | "input_image"
            )
        })
        .unwrap_or(false)
}

fn image_part_reference(part: &Value) -> Option<&str> {
    let candidate = match part {
        Value::String(raw) => Some(raw.as_str()),
        Value::Object(obj) => obj
            .get("image_url")
            .and_then(|value| value.get("url").or(Some(value)))
            .and_then(Value::as_str)
            .or_else(|| {
                ["url", "b64_json", "image_base64", "data"]
                    .iter()
                    .find_map(|key| obj.get(*key).and_then(Value::as_str))
            }),
        _ => None,
    };
    candidate.map(str::trim).filter(|value| !value.is_empty())
}

fn classify(reference: &str) -> ChatImage {
    if looks_like_http_url(reference) {
        ChatImage::Remote(reference.to_string())
    } else {
        ChatImage::Inline(reference.to_string())
    }
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "empty string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::{decode_chat_image, ChatImage, ChatImageProvider};
    use crate::codec::EncodedImage;
    use crate::config::ChatImageSettings;
    use crate::providers::{ImagePrompt, ImageProvider};
    use crate::test_support::{png_bytes, Reply, StubServer};

    fn completion(message: serde_json::Value) -> serde_json::Value {
        json!({ "choices": [{ "message": message, "finish_reason": "stop" }] })
    }

    fn stub_provider(server: &StubServer) -> ChatImageProvider {
        ChatImageProvider::new(
            ChatImageSettings {
                api_key: "sk-or-test".to_string(),
                api_base: server.url("/api/v1"),
                model: "google/gemini-2.5-flash-image-preview".to_string(),
                http_referer: Some("https://cards.example".to_string()),
                x_title: Some("Cardsmith".to_string()),
            },
            Duration::from_secs(5),
        )
    }

    fn two_photo_prompt() -> ImagePrompt {
        ImagePrompt {
            text: "Ice skating".to_string(),
            aspect_ratio: "3:2".to_string(),
            images: vec![
                EncodedImage::from_bytes(b"a", "image/jpeg"),
                EncodedImage::from_bytes(b"b", "image/png"),
            ],
        }
    }

    #[test]
    fn inline_image_from_live_completion() -> anyhow::Result<()> {
        use base64::Engine as _;

        let png = png_bytes();
        let data_url = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
        let server = StubServer::start(vec![Reply::json(
            200,
            completion(json!({ "images": [{ "image_url": { "url": data_url } }] })),
        )])?;
        let image = stub_provider(&server).generate(&two_photo_prompt())?;
        assert_eq!(image.bytes, png);

        let requests = server.requests();
        let request = &requests[0];
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/api/v1/chat/completions");
        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some("Bearer sk-or-test")
        );
        assert_eq!(
            request.headers.get("http-referer").map(String::as_str),
            Some("https://cards.example")
        );
        assert_eq!(request.headers.get("x-title").map(String::as_str), Some("Cardsmith"));
        let body = request.json();
        assert_eq!(body["modalities"], json!(["image", "text"]));
        assert_eq!(body["messages"][0]["content"].as_array().map(Vec::len), Some(3));
        Ok(())
    }

    #[test]
    fn remote_image_is_downloaded_from_the_returned_url() -> anyhow::Result<()> {
        let png = png_bytes();
        let server = StubServer::start_with(|base| {
            vec![
                Reply::json(
                    200,
                    completion(json!({ "images": [format!("{base}/generated/card.png")] })),
                ),
                Reply::bytes("image/png", png.clone()),
            ]
        })?;
        let image = stub_provider(&server).generate(&two_photo_prompt())?;
        assert_eq!(image.bytes, png);
        assert_eq!(server.requests()[1].path, "/generated/card.png");
        Ok(())
    }

    #[test]
    fn upstream_error_status_is_a_transport_error() -> anyhow::Result<()> {
        let server = StubServer::start(vec![Reply::json(
            502,
            json!({ "error": { "message": "provider returned error" } }),
        )])?;
        let err = stub_provider(&server)
            .generate(&two_photo_prompt())
            .expect_err("502 must fail");
        assert_eq!(err.kind(), "provider_transport_error");
        assert!(err.to_string().contains("(502)"));
        Ok(())
    }

    #[test]
    fn images_array_wins_over_content() -> anyhow::Result<()> {
        let inline = "data:image/png;base64,iVBORw0KGgo=";
        let payload = completion(json!({
            "content": "Here is your card",
            "images": [{ "type": "image_url", "image_url": { "url": inline } }],
        }));
        assert_eq!(decode_chat_image(&payload)?, ChatImage::Inline(inline.to_string()));
        Ok(())
    }

    #[test]
    fn structured_content_image_part_is_found() -> anyhow::Result<()> {
        let payload = completion(json!({
            "content": [
                { "type": "text", "text": "Merry Christmas" },
                { "type": "image_url", "image_url": { "url": "https://cdn.example/card.png" } },
            ],
        }));
        assert_eq!(
            decode_chat_image(&payload)?,
            ChatImage::Remote("https://cdn.example/card.png".to_string())
        );
        Ok(())
    }

    #[test]
    fn bare_string_content_is_stripped_of_data_url_prefix() -> anyhow::Result<()> {
        let payload = completion(json!({ "content": "data:image/jpeg;base64,/9j/4AAQ" }));
        assert_eq!(
            decode_chat_image(&payload)?,
            ChatImage::Inline("/9j/4AAQ".to_string())
        );
        let raw = completion(json!({ "content": "  /9j/4AAQ  " }));
        assert_eq!(decode_chat_image(&raw)?, ChatImage::Inline("/9j/4AAQ".to_string()));
        Ok(())
    }

    #[test]
    fn other_shapes_are_decode_errors() {
        for payload in [
            completion(json!({ "content": 42 })),
            completion(json!({ "content": [{ "type": "text", "text": "no picture" }] })),
            completion(json!({ "content": "" })),
            completion(json!({ "role": "assistant" })),
            json!({ "choices": [] }),
            json!({ "error": "overloaded" }),
        ] {
            let err = decode_chat_image(&payload).expect_err("shape must be rejected");
            assert_eq!(err.kind(), "decode_error", "{payload}");
        }
    }

    #[test]
    fn payload_carries_text_then_both_photos() {
        let provider = ChatImageProvider::new(
            ChatImageSettings {
                api_key: "sk-or".to_string(),
                api_base: "https://openrouter.ai/api/v1".to_string(),
                model: "google/gemini-2.5-flash-image-preview".to_string(),
                http_referer: None,
                x_title: Some("Cardsmith".to_string()),
            },
            Duration::from_secs(5),
        );
        let prompt = ImagePrompt {
            text: "Two friends decorating a tree".to_string(),
            aspect_ratio: "3:2".to_string(),
            images: vec![
                EncodedImage::from_bytes(b"left", "image/jpeg"),
                EncodedImage::from_bytes(b"right", "image/png"),
            ],
        };
        let payload = provider.build_payload(&prompt);
        let content = &payload["messages"][0]["content"];
        assert_eq!(content[0]["text"], "Two friends decorating a tree");
        assert_eq!(content[1]["image_url"]["url"], "data:image/jpeg;base64,bGVmdA==");
        assert_eq!(content[2]["image_url"]["url"], "data:image/png;base64,cmlnaHQ=");
        assert_eq!(payload["image_config"]["aspect_ratio"], "3:2");
        assert_eq!(payload["model"], "google/gemini-2.5-flash-image-preview");
    }
}
