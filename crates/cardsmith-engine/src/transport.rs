use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response as HttpResponse};
use serde_json::Value;

use crate::error::PipelineError;

/// Downloaded image body plus the server's declared content type.
#[derive(Debug, Clone)]
pub struct ImageBytes {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

pub fn http_client(timeout: Duration) -> HttpClient {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

pub fn send(provider: &str, request: RequestBuilder) -> Result<HttpResponse, PipelineError> {
    request
        .send()
        .map_err(|err| PipelineError::transport(provider, describe_reqwest_error(&err)))
}

/// Non-2xx is a transport failure carrying a truncated body; a body that is
/// not JSON is a decode failure.
pub fn response_json_or_error(
    provider: &str,
    response: HttpResponse,
) -> Result<Value, PipelineError> {
    let status = response.status();
    let code = status.as_u16();
    let body = response.text().map_err(|err| {
        PipelineError::transport(provider, format!("response body read failed: {err}"))
    })?;
    if !status.is_success() {
        return Err(PipelineError::transport(
            provider,
            format!("request failed ({code}): {}", truncate_text(&body, 512)),
        ));
    }
    serde_json::from_str(&body)
        .map_err(|err| PipelineError::decode(provider, format!("invalid JSON payload: {err}")))
}

pub fn download_image(
    http: &HttpClient,
    provider: &str,
    url: &str,
) -> Result<ImageBytes, PipelineError> {
    let response = send(provider, http.get(url))?;
    if !response.status().is_success() {
        let code = response.status().as_u16();
        let body = response.text().unwrap_or_default();
        return Err(PipelineError::transport(
            provider,
            format!("image download failed ({code}): {}", truncate_text(&body, 512)),
        ));
    }
    let mime_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = response
        .bytes()
        .map_err(|err| {
            PipelineError::transport(provider, format!("image bytes read failed: {err}"))
        })?
        .to_vec();
    Ok(ImageBytes { bytes, mime_type })
}

pub fn describe_reqwest_error(err: &reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connect"
    } else if err.is_request() {
        "request"
    } else {
        "http"
    };
    format!("{kind} error: {err}")
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub fn looks_like_http_url(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.starts_with("http://") || trimmed.starts_with("https://")
}
