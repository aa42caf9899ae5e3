use std::fs;
use std::io;
use std::path::Path;

use base64::engine::general_purpose::{STANDARD as BASE64, STANDARD_NO_PAD as BASE64_NO_PAD};
use base64::Engine as _;
use image::ImageFormat;

use crate::error::PipelineError;

/// A photo ready to be embedded in a provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: &'static str,
    pub base64: String,
}

impl EncodedImage {
    pub fn from_bytes(bytes: &[u8], mime_type: &'static str) -> Self {
        Self {
            mime_type,
            base64: BASE64.encode(bytes),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

/// `.png` is PNG; every other extension is sent as JPEG.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    if ext == "png" {
        "image/png"
    } else {
        "image/jpeg"
    }
}

/// Reads a photo and base64-encodes it. Files that exist but are not a
/// raster image the `image` crate recognises are read errors too.
pub fn encode_file(path: &Path) -> Result<EncodedImage, PipelineError> {
    let bytes = fs::read(path).map_err(|source| PipelineError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if image::guess_format(&bytes).is_err() {
        return Err(PipelineError::Read {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidData, "not a recognised raster image"),
        });
    }
    Ok(EncodedImage::from_bytes(&bytes, mime_for_path(path)))
}

/// Drops a leading `data:<mime>;base64,` if present.
pub fn strip_data_url_prefix(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("data:") {
        return trimmed;
    }
    match trimmed.split_once(',') {
        Some((meta, payload)) if meta.ends_with(";base64") => payload.trim(),
        _ => trimmed,
    }
}

pub fn data_url_mime(raw: &str) -> Option<&str> {
    raw.trim()
        .strip_prefix("data:")
        .and_then(|rest| rest.split([';', ',']).next())
        .map(str::trim)
        .filter(|mime| !mime.is_empty())
}

pub fn decode_payload(raw: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = strip_data_url_prefix(raw)
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    BASE64
        .decode(compact.as_bytes())
        .or_else(|_| BASE64_NO_PAD.decode(compact.trim_end_matches('=').as_bytes()))
}

/// File extension for bytes that really are an image, by magic number.
pub fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("png"),
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::WebP => Some("webp"),
        ImageFormat::Gif => Some("gif"),
        ImageFormat::Bmp => Some("bmp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use image::{Rgb, RgbImage};

    use super::*;

    fn png_bytes() -> anyhow::Result<Vec<u8>> {
        let image = RgbImage::from_pixel(4, 4, Rgb([10, 200, 30]));
        let mut bytes = Vec::new();
        image.write_to(&mut io::Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_for_path(Path::new("a/b/photo.PNG")), "image/png");
        assert_eq!(mime_for_path(Path::new("photo.jpg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("photo.webp")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("photo")), "image/jpeg");
    }

    #[test]
    fn encode_file_builds_data_url() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("portrait.png");
        let bytes = png_bytes()?;
        fs::write(&path, &bytes)?;

        let encoded = encode_file(&path)?;
        assert_eq!(encoded.mime_type, "image/png");
        assert!(encoded.data_url().starts_with("data:image/png;base64,"));
        assert_eq!(decode_payload(&encoded.data_url())?, bytes);
        Ok(())
    }

    #[test]
    fn missing_or_non_image_files_are_read_errors() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let missing = encode_file(&temp.path().join("nope.jpg"));
        assert!(matches!(missing, Err(PipelineError::Read { .. })));

        let text = temp.path().join("notes.jpg");
        fs::write(&text, b"hello, not a photo")?;
        assert!(matches!(encode_file(&text), Err(PipelineError::Read { .. })));
        Ok(())
    }

    #[test]
    fn data_url_prefix_is_stripped_and_mime_read() {
        assert_eq!(strip_data_url_prefix("data:image/webp;base64,QUJD"), "QUJD");
        assert_eq!(strip_data_url_prefix("  QUJD "), "QUJD");
        assert_eq!(data_url_mime("data:image/webp;base64,QUJD"), Some("image/webp"));
        assert_eq!(data_url_mime("QUJD"), None);
    }

    #[test]
    fn decode_tolerates_whitespace_and_missing_padding() -> anyhow::Result<()> {
        assert_eq!(decode_payload("QUJD\nREVG")?, b"ABCDEF");
        assert_eq!(decode_payload("QUI")?, b"AB");
        assert!(decode_payload("not base64 at all!").is_err());
        Ok(())
    }

    #[test]
    fn sniff_extension_uses_magic_bytes() -> anyhow::Result<()> {
        assert_eq!(sniff_extension(&png_bytes()?), Some("png"));
        assert_eq!(sniff_extension(b"plain text"), None);
        Ok(())
    }
}
