use std::fs::{self, OpenOptions};
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::warn;

use crate::error::PipelineError;

pub const DEFAULT_FILE_PREFIX: &str = "festive-card";
const PORTRAIT_SIZE: u32 = 500;
const PORTRAIT_JPEG_QUALITY: u8 = 85;

/// A file written by the store: where it is on disk and the path callers
/// hand out (`{public_prefix}/{filename}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub file_path: PathBuf,
    pub public_path: String,
}

/// Append-only content directory served under a static prefix. Every write
/// goes to a fresh file, so concurrent requests never contend.
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    public_prefix: String,
    file_prefix: String,
    sequence: AtomicU64,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: &str) -> Self {
        let trimmed = public_prefix.trim().trim_end_matches('/');
        let public_prefix = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        Self {
            root: root.into(),
            public_prefix,
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn with_file_prefix(mut self, prefix: &str) -> Self {
        let prefix = prefix.trim();
        if !prefix.is_empty() {
            self.file_prefix = prefix.to_string();
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn public_prefix(&self) -> &str {
        &self.public_prefix
    }

    /// Writes `bytes` under `{file_prefix}-{millis}-{seq}.{ext}`.
    pub fn write(&self, bytes: &[u8], extension: &str) -> Result<StoredArtifact, PipelineError> {
        self.write_named(&self.file_prefix, bytes, extension)
    }

    /// Normalises an uploaded profile photo to a 500x500 cover-fit JPEG.
    pub fn store_portrait(
        &self,
        bytes: &[u8],
        owner: &str,
    ) -> Result<StoredArtifact, PipelineError> {
        let invalid = |message: String| PipelineError::InvalidRequest(message);
        let image = image::load_from_memory(bytes)
            .map_err(|err| invalid(format!("portrait is not a readable image: {err}")))?;
        let square = image
            .resize_to_fill(PORTRAIT_SIZE, PORTRAIT_SIZE, FilterType::Lanczos3)
            .to_rgb8();
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(Cursor::new(&mut encoded), PORTRAIT_JPEG_QUALITY)
            .encode_image(&DynamicImage::ImageRgb8(square))
            .map_err(|err| invalid(format!("portrait encode failed: {err}")))?;

        let owner: String = owner
            .trim()
            .chars()
            .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
            .collect();
        if owner.is_empty() {
            return Err(invalid("portrait owner id is empty".to_string()));
        }
        self.write_named(&format!("user-{owner}"), &encoded, "jpg")
    }

    /// Maps a public path back to a file inside the store. Anything outside
    /// the prefix, or trying to climb out of the root, is rejected.
    pub fn resolve(&self, public_path: &str) -> Option<PathBuf> {
        let rest = public_path.trim().strip_prefix(&self.public_prefix)?;
        let name = rest.strip_prefix('/')?;
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return None;
        }
        Some(self.root.join(name))
    }

    fn write_named(
        &self,
        stem: &str,
        bytes: &[u8],
        extension: &str,
    ) -> Result<StoredArtifact, PipelineError> {
        fs::create_dir_all(&self.root).map_err(|source| PipelineError::Store {
            path: self.root.clone(),
            source,
        })?;
        let ext = normalize_extension(extension);
        let stamp = chrono::Utc::now().timestamp_millis();

        loop {
            let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
            let filename = format!("{stem}-{stamp}-{seq:04}.{ext}");
            let file_path = self.root.join(&filename);
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&file_path);
            let file = match file {
                Ok(file) => file,
                // Another store instance shares the directory; take the next number.
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(PipelineError::Store { path: file_path, source }),
            };
            fill_or_remove(&file_path, file, bytes, |file| file.sync_all())?;
            return Ok(StoredArtifact {
                file_path,
                public_path: format!("{}/{}", self.public_prefix, filename),
            });
        }
    }
}

/// Writes `bytes` through `sink` and runs `finish` on it. A failure at either
/// step removes the partial file at `path`.
fn fill_or_remove<W: Write>(
    path: &Path,
    mut sink: W,
    bytes: &[u8],
    finish: impl FnOnce(W) -> io::Result<()>,
) -> Result<(), PipelineError> {
    let written = sink.write_all(bytes).and_then(|_| finish(sink));
    written.map_err(|source| {
        if let Err(err) = fs::remove_file(path) {
            warn!(path = %path.display(), error = %err, "partial artifact left behind");
        }
        PipelineError::Store {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn normalize_extension(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('.')
        .to_ascii_lowercase()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .collect();
    match cleaned.as_str() {
        "" => "png".to_string(),
        "jpeg" => "jpg".to_string(),
        _ => cleaned,
    }
}
