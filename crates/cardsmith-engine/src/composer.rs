//! Greeting text for the card: generated by a text provider when one is
//! configured, otherwise (or on any failure) a fixed sentence template.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::TextSettings;
use crate::error::PipelineError;
use crate::transport::{http_client, response_json_or_error, send};

const MESSAGE_MAX_TOKENS: u32 = 200;
const MESSAGE_TEMPERATURE: f64 = 0.8;

const SYSTEM_INSTRUCTION: &str = "You are a warm and festive Christmas card message writer. \
Write positive, heartfelt messages that weave the sender's personal message together with the \
recipient's special word. Rules: use the exact names you are given and never write placeholders \
such as [Name] or [Recipient's Name]; do not write a greeting line (like \"Dear ...\") or a \
closing/signature line (like \"Warm regards\"), because the card adds those itself; write 2-3 \
sentences; keep the tone festive and positive.";

/// One chat-completions call. `messages` are OpenAI-style role/content
/// objects.
#[derive(Debug, Clone)]
pub struct TextRequest {
    pub messages: Vec<Value>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    /// Route to the image-capable model instead of the default text model.
    pub vision: bool,
}

pub trait TextProvider: Send + Sync {
    fn name(&self) -> &str;
    fn complete(&self, request: &TextRequest) -> Result<String, PipelineError>;
}

/// OpenAI-compatible `chat/completions` client (OpenAI or OpenRouter).
pub struct ChatCompletionsClient {
    settings: TextSettings,
    http: HttpClient,
}

impl ChatCompletionsClient {
    pub fn new(settings: TextSettings, timeout: Duration) -> Self {
        Self {
            settings,
            http: http_client(timeout),
        }
    }
}

impl TextProvider for ChatCompletionsClient {
    fn name(&self) -> &str {
        "text"
    }

    fn complete(&self, request: &TextRequest) -> Result<String, PipelineError> {
        let model = if request.vision {
            &self.settings.vision_model
        } else {
            &self.settings.model
        };
        let mut payload = json!({
            "model": model,
            "messages": request.messages,
            "max_tokens": request.max_tokens,
        });
        if let (Some(temperature), Some(obj)) = (request.temperature, payload.as_object_mut()) {
            obj.insert("temperature".to_string(), json!(temperature));
        }
        let endpoint = format!("{}/chat/completions", self.settings.api_base);
        let response = send(
            self.name(),
            self.http
                .post(endpoint)
                .bearer_auth(&self.settings.api_key)
                .json(&payload),
        )?;
        let parsed = response_json_or_error(self.name(), response)?;
        extract_message_text(&parsed)
            .ok_or_else(|| PipelineError::decode(self.name(), "completion has no message content"))
    }
}

/// `choices[0].message.content` as text; content arrays contribute their
/// text parts. Blank content counts as missing.
pub fn extract_message_text(payload: &Value) -> Option<String> {
    let content = payload
        .get("choices")?
        .as_array()?
        .first()?
        .get("message")?
        .get("content")?;
    let text = match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => return None,
    };
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[derive(Debug, Clone, Copy)]
pub struct MessageInputs<'a> {
    pub personal_message: &'a str,
    pub recipient_word: &'a str,
    pub sender_name: &'a str,
    pub recipient_name: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub text: String,
    pub used_fallback: bool,
}

pub fn fallback_message(personal_message: &str, recipient_word: &str) -> String {
    format!(
        "{personal_message} Wishing you a wonderful holiday season filled with {recipient_word}!"
    )
}

#[derive(Clone, Default)]
pub struct MessageComposer {
    provider: Option<Arc<dyn TextProvider>>,
}

impl MessageComposer {
    pub fn new(provider: Option<Arc<dyn TextProvider>>) -> Self {
        Self { provider }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Never fails: provider errors and unusable output both produce the
    /// template message.
    pub fn compose(&self, inputs: &MessageInputs<'_>) -> ComposedMessage {
        let fallback = || ComposedMessage {
            text: fallback_message(inputs.personal_message, inputs.recipient_word),
            used_fallback: true,
        };
        let Some(provider) = &self.provider else {
            return fallback();
        };

        let request = TextRequest {
            messages: vec![
                json!({ "role": "system", "content": SYSTEM_INSTRUCTION }),
                json!({ "role": "user", "content": user_prompt(inputs) }),
            ],
            max_tokens: MESSAGE_MAX_TOKENS,
            temperature: Some(MESSAGE_TEMPERATURE),
            vision: false,
        };
        match provider.complete(&request) {
            Ok(raw) => match clean_generated_message(&raw, inputs) {
                Some(text) => ComposedMessage {
                    text,
                    used_fallback: false,
                },
                None => {
                    warn!(provider = provider.name(), "generated message unusable; using template");
                    debug!(raw = %raw, "rejected message");
                    fallback()
                }
            },
            Err(err) => {
                warn!(
                    provider = provider.name(),
                    error = %err,
                    "message generation failed; using template"
                );
                fallback()
            }
        }
    }
}

fn user_prompt(inputs: &MessageInputs<'_>) -> String {
    format!(
        "Write a warm Christmas card message from {sender} to {recipient} that incorporates:\n\
         - {sender}'s personal message: \"{message}\"\n\
         - {recipient}'s special word: \"{word}\"\n\n\
         Make it festive, positive and heartfelt. Keep it to 2-3 sentences.",
        sender = inputs.sender_name.trim(),
        recipient = inputs.recipient_name.trim(),
        message = inputs.personal_message.trim(),
        word = inputs.recipient_word.trim(),
    )
}

const GREETING_OPENERS: [&str; 6] = ["dear ", "hi ", "hello ", "hey ", "to ", "merry christmas, "];
const CLOSING_OPENERS: [&str; 12] = [
    "warm regards",
    "warmest regards",
    "kind regards",
    "best regards",
    "regards",
    "best wishes",
    "warm wishes",
    "sincerely",
    "with love",
    "love,",
    "cheers",
    "yours",
];

/// Substitutes known name placeholders, drops greeting and signature lines
/// (or clauses, when the model ran them into the body) and unwraps quotes.
/// Returns `None` when nothing usable remains or an unknown `[placeholder]`
/// or `{placeholder}` survives.
pub fn clean_generated_message(raw: &str, inputs: &MessageInputs<'_>) -> Option<String> {
    let substituted = replace_placeholders(
        raw,
        inputs.sender_name.trim(),
        inputs.recipient_name.trim(),
    );
    let sender = inputs.sender_name.trim().to_ascii_lowercase();

    let kept: Vec<&str> = substituted
        .lines()
        .map(|line| line.trim().trim_matches('"').trim())
        .filter(|line| !line.is_empty())
        .filter(|line| !is_greeting(line))
        .filter(|line| !is_closing(line, &sender))
        .collect();
    let text = kept.join(" ");
    let text = strip_leading_greeting(text.trim().trim_matches('"').trim());
    let text = strip_trailing_closing(text, &sender);
    let text = text.trim().trim_matches('"').trim();
    if text.is_empty() || has_placeholder(text) {
        return None;
    }
    Some(capitalize_first(text))
}

fn has_placeholder(text: &str) -> bool {
    [('[', ']'), ('{', '}')].iter().any(|(open, close)| {
        text.find(*open)
            .is_some_and(|start| text[start..].contains(*close))
    })
}

const INLINE_GREETINGS: [&str; 5] = ["dear ", "hi ", "hello ", "hey ", "greetings "];

/// "Dear Lee, thank you..." becomes "thank you...". Only short openers
/// ending in `,`, `!` or `:` count as a greeting clause.
fn strip_leading_greeting(text: &str) -> &str {
    let lowered = text.to_ascii_lowercase();
    if !INLINE_GREETINGS
        .iter()
        .any(|opener| lowered.starts_with(opener))
    {
        return text;
    }
    let Some(end) = text.find([',', '!', ':']) else {
        return text;
    };
    if text[..end].split_whitespace().count() > 4 {
        return text;
    }
    text[end + 1..].trim_start()
}

/// Cuts a trailing sign-off such as "Warm regards, Dana" or a bare sender
/// name that follows the last sentence.
fn strip_trailing_closing<'a>(text: &'a str, sender: &str) -> &'a str {
    let lowered = text.to_ascii_lowercase();
    let starts_clause = |index: usize| {
        index == 0 || text[..index].trim_end().ends_with(['.', '!', '?'])
    };

    let cut = CLOSING_OPENERS
        .iter()
        .filter_map(|opener| lowered.rfind(opener))
        .filter(|&index| starts_clause(index) && text[index..].chars().count() <= 60)
        .min();
    let text = match cut {
        Some(index) => text[..index].trim_end(),
        None => text,
    };

    if sender.is_empty() {
        return text;
    }
    let lowered = text.to_ascii_lowercase();
    let body_end = lowered.trim_end_matches(['.', '!', ',', ' ']).len();
    let Some(index) = lowered[..body_end].rfind(sender) else {
        return text;
    };
    let signed = index + sender.len() == body_end
        && text[..index].trim_end_matches(['-', '~', ' ']).ends_with(['.', '!', '?']);
    if signed {
        text[..index].trim_end_matches(['-', '~', ' '])
    } else {
        text
    }
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_greeting(line: &str) -> bool {
    let lowered = line.to_ascii_lowercase();
    if line.chars().count() > 40 {
        return false;
    }
    let opens_like_greeting = GREETING_OPENERS
        .iter()
        .any(|opener| lowered.starts_with(opener));
    line.ends_with(',') || (opens_like_greeting && line.ends_with(['!', ':']))
}

fn is_closing(line: &str, sender: &str) -> bool {
    let lowered = line.to_ascii_lowercase();
    let bare = lowered.trim_start_matches(['-', '~', ' ']).trim_end_matches(['.', '!', ',']);
    if !sender.is_empty() && bare == sender {
        return true;
    }
    line.chars().count() <= 40 && CLOSING_OPENERS.iter().any(|opener| lowered.starts_with(opener))
}

fn replace_placeholders(raw: &str, sender: &str, recipient: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find(['[', '{']) {
        let close = if rest[start..].starts_with('[') { ']' } else { '}' };
        let Some(len) = rest[start + 1..].find(close) else {
            break;
        };
        let inner = &rest[start + 1..start + 1 + len];
        out.push_str(&rest[..start]);
        match placeholder_target(inner) {
            Some(Target::Sender) => out.push_str(sender),
            Some(Target::Recipient) => out.push_str(recipient),
            None => out.push_str(&rest[start..start + len + 2]),
        }
        rest = &rest[start + len + 2..];
    }
    out.push_str(rest);
    out
}

enum Target {
    Sender,
    Recipient,
}

fn placeholder_target(inner: &str) -> Option<Target> {
    let key = inner.trim().to_ascii_lowercase().replace(['_', '\''], " ");
    let key = key.split_whitespace().collect::<Vec<_>>().join(" ");
    if key.contains("recipient")
        || matches!(key.as_str(), "name" | "their name" | "friend s name" | "friend name")
    {
        return Some(Target::Recipient);
    }
    if key.contains("sender")
        || key.contains("ceo")
        || matches!(key.as_str(), "your name" | "my name")
    {
        return Some(Target::Sender);
    }
    None
}
