use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Everything one card needs. Photo refs are file paths resolved by the
/// caller; nothing in the pipeline mutates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub sender_photo: PathBuf,
    pub recipient_photo: PathBuf,
    pub sender_name: String,
    pub recipient_name: String,
    pub personal_message: String,
    pub recipient_word: String,
}

impl GenerationRequest {
    /// Names of the text fields that are blank after trimming.
    pub fn blank_fields(&self) -> Vec<&'static str> {
        [
            ("sender_name", &self.sender_name),
            ("recipient_name", &self.recipient_name),
            ("personal_message", &self.personal_message),
            ("recipient_word", &self.recipient_word),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Outcome of image generation. An empty `image_path` is the only
/// total-failure signal; when it is set, the file exists in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub image_path: String,
    pub used_fallback: bool,
}

impl GenerationResult {
    pub fn generated(image_path: impl Into<String>) -> Self {
        Self {
            image_path: image_path.into(),
            used_fallback: false,
        }
    }

    pub fn fallback(image_path: impl Into<String>) -> Self {
        Self {
            image_path: image_path.into(),
            used_fallback: true,
        }
    }

    pub fn unavailable() -> Self {
        Self::fallback(String::new())
    }

    pub fn has_image(&self) -> bool {
        !self.image_path.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{GenerationRequest, GenerationResult};

    fn request() -> GenerationRequest {
        GenerationRequest {
            sender_photo: "/tmp/sender.jpg".into(),
            recipient_photo: "/tmp/recipient.png".into(),
            sender_name: "Mara".to_string(),
            recipient_name: "Jonas".to_string(),
            personal_message: "Thank you for everything".to_string(),
            recipient_word: "gratitude".to_string(),
        }
    }

    #[test]
    fn complete_request_has_no_blank_fields() {
        assert!(request().blank_fields().is_empty());
    }

    #[test]
    fn whitespace_only_fields_are_reported() {
        let mut req = request();
        req.recipient_word = "   ".to_string();
        req.sender_name = String::new();
        assert_eq!(req.blank_fields(), vec!["sender_name", "recipient_word"]);
    }

    #[test]
    fn unavailable_result_is_fallback_without_image() {
        let result = GenerationResult::unavailable();
        assert!(result.used_fallback);
        assert!(!result.has_image());
        assert!(GenerationResult::generated("/uploads/a.png").has_image());
    }

    #[test]
    fn result_serializes_with_snake_case_fields() -> anyhow::Result<()> {
        let value = serde_json::to_value(GenerationResult::fallback("/uploads/x.jpg"))?;
        assert_eq!(value["image_path"], "/uploads/x.jpg");
        assert_eq!(value["used_fallback"], true);
        Ok(())
    }
}
