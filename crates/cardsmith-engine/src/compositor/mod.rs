//! AI-free fallback artwork: two circular portraits framed by wreaths on a
//! festive background.

pub mod artwork;

use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage, RgbaImage};
use resvg::tiny_skia::{FillRule, Mask, PathBuilder, Transform};

use crate::error::PipelineError;
use crate::store::{ArtifactStore, StoredArtifact};

/// Fixed geometry of the fallback card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeLayout {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub portrait_size: u32,
    /// Extra space the wreath takes on every side of a portrait.
    pub wreath_margin: u32,
    pub left_origin: (u32, u32),
    pub right_origin: (u32, u32),
    pub jpeg_quality: u8,
}

impl CompositeLayout {
    pub const STANDARD: CompositeLayout = CompositeLayout {
        canvas_width: 1200,
        canvas_height: 800,
        portrait_size: 350,
        wreath_margin: 30,
        left_origin: (200, 250),
        right_origin: (650, 250),
        jpeg_quality: 95,
    };

    pub fn mask_radius(&self) -> f32 {
        self.portrait_size as f32 / 2.0
    }

    pub fn wreath_size(&self) -> u32 {
        self.portrait_size + self.wreath_margin * 2
    }

    /// Top-left corner of the wreath framing the portrait at `origin`.
    pub fn wreath_origin(&self, origin: (u32, u32)) -> (i64, i64) {
        (
            i64::from(origin.0) - i64::from(self.wreath_margin),
            i64::from(origin.1) - i64::from(self.wreath_margin),
        )
    }

    pub fn portrait_center(&self, origin: (u32, u32)) -> (f32, f32) {
        (
            origin.0 as f32 + self.mask_radius(),
            origin.1 as f32 + self.mask_radius(),
        )
    }
}

impl Default for CompositeLayout {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Builds the fallback card. The background and wreath layers depend only on
/// the layout, so they are rendered once per compositor and reused.
#[derive(Debug, Default)]
pub struct DeterministicCompositor {
    layout: CompositeLayout,
    background: OnceLock<RgbaImage>,
    wreath: OnceLock<RgbaImage>,
}

impl DeterministicCompositor {
    pub fn new(layout: CompositeLayout) -> Self {
        Self {
            layout,
            background: OnceLock::new(),
            wreath: OnceLock::new(),
        }
    }

    pub fn layout(&self) -> &CompositeLayout {
        &self.layout
    }

    /// Cover-fit crop of the photo at `path` with everything outside the
    /// inscribed circle made transparent.
    pub fn circular_portrait(&self, path: &Path) -> Result<RgbaImage, PipelineError> {
        let bytes = fs::read(path).map_err(|err| {
            PipelineError::composite("loading portrait", format!("{}: {err}", path.display()))
        })?;
        let decoded = image::load_from_memory(&bytes).map_err(|err| {
            PipelineError::composite("decoding portrait", format!("{}: {err}", path.display()))
        })?;
        let size = self.layout.portrait_size;
        let mut portrait = decoded
            .resize_to_fill(size, size, FilterType::Lanczos3)
            .to_rgba8();
        apply_circular_mask(&mut portrait, self.layout.mask_radius())?;
        Ok(portrait)
    }

    pub fn background(&self) -> Result<&RgbaImage, PipelineError> {
        if let Some(layer) = self.background.get() {
            return Ok(layer);
        }
        let layer = artwork::rasterize(
            &artwork::background_svg(&self.layout),
            self.layout.canvas_width,
            self.layout.canvas_height,
            "rendering background",
        )?;
        Ok(self.background.get_or_init(|| layer))
    }

    pub fn wreath(&self) -> Result<&RgbaImage, PipelineError> {
        if let Some(layer) = self.wreath.get() {
            return Ok(layer);
        }
        let size = self.layout.wreath_size();
        let layer = artwork::rasterize(
            &artwork::wreath_svg(&self.layout),
            size,
            size,
            "rendering wreath",
        )?;
        Ok(self.wreath.get_or_init(|| layer))
    }

    /// Layers background, portraits and wreaths, then flattens to RGB.
    pub fn compose(&self, left: &Path, right: &Path) -> Result<RgbImage, PipelineError> {
        let left_portrait = self.circular_portrait(left)?;
        let right_portrait = self.circular_portrait(right)?;

        let wreath = self.wreath()?;
        let mut canvas = self.background()?.clone();
        for (portrait, origin) in [
            (&left_portrait, self.layout.left_origin),
            (&right_portrait, self.layout.right_origin),
        ] {
            imageops::overlay(
                &mut canvas,
                portrait,
                i64::from(origin.0),
                i64::from(origin.1),
            );
            let (wreath_x, wreath_y) = self.layout.wreath_origin(origin);
            imageops::overlay(&mut canvas, wreath, wreath_x, wreath_y);
        }
        Ok(flatten(&canvas))
    }

    pub fn encode_jpeg(&self, image: &RgbImage) -> Result<Vec<u8>, PipelineError> {
        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, self.layout.jpeg_quality);
        encoder
            .encode_image(image)
            .map_err(|err| PipelineError::composite("encoding jpeg", err))?;
        Ok(bytes)
    }

    /// Full fallback path: compose, encode and persist.
    pub fn compose_to_store(
        &self,
        left: &Path,
        right: &Path,
        store: &ArtifactStore,
    ) -> Result<StoredArtifact, PipelineError> {
        let card = self.compose(left, right)?;
        let bytes = self.encode_jpeg(&card)?;
        store
            .write(&bytes, "jpg")
            .map_err(|err| PipelineError::composite("persisting card", err))
    }
}

/// Keeps only the inscribed circle of radius `radius`, anti-aliased.
pub fn apply_circular_mask(image: &mut RgbaImage, radius: f32) -> Result<(), PipelineError> {
    let (width, height) = image.dimensions();
    let circle = PathBuilder::from_circle(width as f32 / 2.0, height as f32 / 2.0, radius)
        .ok_or_else(|| PipelineError::composite("masking portrait", "degenerate circle"))?;
    let mut mask = Mask::new(width, height)
        .ok_or_else(|| PipelineError::composite("masking portrait", "empty portrait"))?;
    mask.fill_path(&circle, FillRule::Winding, true, Transform::identity());

    for (pixel, coverage) in image.pixels_mut().zip(mask.data()) {
        pixel[3] = ((u16::from(pixel[3]) * u16::from(*coverage) + 127) / 255) as u8;
    }
    Ok(())
}

/// Composites over white and drops alpha.
fn flatten(canvas: &RgbaImage) -> RgbImage {
    let mut flattened = RgbImage::new(canvas.width(), canvas.height());
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
        };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use anyhow::Result;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    use super::{apply_circular_mask, CompositeLayout, DeterministicCompositor};
    use crate::store::ArtifactStore;

    fn solid_photo(dir: &Path, name: &str, color: [u8; 3], size: (u32, u32)) -> Result<PathBuf> {
        let path = dir.join(name);
        RgbImage::from_pixel(size.0, size.1, Rgb(color)).save(&path)?;
        Ok(path)
    }

    fn close(actual: &Rgb<u8>, expected: [u8; 3], tolerance: i16) -> bool {
        actual
            .0
            .iter()
            .zip(expected)
            .all(|(a, e)| (i16::from(*a) - i16::from(e)).abs() <= tolerance)
    }

    fn inside_any_wreath(layout: &CompositeLayout, x: u32, y: u32) -> bool {
        [layout.left_origin, layout.right_origin].iter().any(|origin| {
            let (wx, wy) = layout.wreath_origin(*origin);
            let size = i64::from(layout.wreath_size());
            let (x, y) = (i64::from(x), i64::from(y));
            x >= wx && x < wx + size && y >= wy && y < wy + size
        })
    }

    #[test]
    fn composite_has_fixed_canvas_and_photo_centres() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let left = solid_photo(temp.path(), "left.jpg", [220, 40, 40], (640, 480))?;
        let right = solid_photo(temp.path(), "right.png", [40, 60, 220], (300, 300))?;
        let compositor = DeterministicCompositor::default();
        let card = compositor.compose(&left, &right)?;

        assert_eq!(card.dimensions(), (1200, 800));
        assert!(close(card.get_pixel(375, 425), [220, 40, 40], 12));
        assert!(close(card.get_pixel(825, 425), [40, 60, 220], 12));
        Ok(())
    }

    #[test]
    fn portrait_corners_show_background() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let photo = solid_photo(temp.path(), "face.png", [250, 250, 0], (400, 400))?;
        let compositor = DeterministicCompositor::default();
        let card = compositor.compose(&photo, &photo)?;
        let background = compositor.background()?;

        let bg = background.get_pixel(202, 252);
        assert_eq!(card.get_pixel(202, 252).0, [bg[0], bg[1], bg[2]]);
        Ok(())
    }

    #[test]
    fn wreath_rings_frame_each_portrait() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let photo = solid_photo(temp.path(), "face.png", [0, 0, 0], (400, 400))?;
        let compositor = DeterministicCompositor::default();
        let card = compositor.compose(&photo, &photo)?;

        for offset in [0, 450] {
            let gold = card.get_pixel(516 + offset, 283);
            assert!(gold[0] > 180 && gold[1] > 140 && gold[2] < 110, "{gold:?}");
            let green = card.get_pixel(505 + offset, 294);
            assert!(green[1] > green[0] && green[1] > green[2], "{green:?}");
        }
        Ok(())
    }

    #[test]
    fn decoration_layout_is_independent_of_photos() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let a = solid_photo(temp.path(), "a.png", [255, 0, 0], (200, 200))?;
        let b = solid_photo(temp.path(), "b.png", [0, 255, 0], (500, 250))?;
        let layout = CompositeLayout::STANDARD;
        let first = DeterministicCompositor::new(layout).compose(&a, &a)?;
        let second = DeterministicCompositor::new(layout).compose(&b, &b)?;

        assert_eq!(first.dimensions(), second.dimensions());
        for (x, y, pixel) in first.enumerate_pixels() {
            if !inside_any_wreath(&layout, x, y) {
                assert_eq!(pixel, second.get_pixel(x, y), "differs at ({x}, {y})");
            }
        }
        Ok(())
    }

    #[test]
    fn stored_card_is_a_jpeg_with_canvas_dimensions() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let photo = solid_photo(temp.path(), "face.jpg", [120, 90, 60], (350, 350))?;
        let store = ArtifactStore::new(temp.path().join("uploads"), "/uploads");
        let stored = DeterministicCompositor::default().compose_to_store(&photo, &photo, &store)?;

        assert!(stored.public_path.starts_with("/uploads/festive-card-"));
        assert!(stored.public_path.ends_with(".jpg"));
        let decoded = image::open(&stored.file_path)?;
        assert_eq!((decoded.width(), decoded.height()), (1200, 800));
        Ok(())
    }

    #[test]
    fn circular_mask_clears_corners_and_keeps_centre() -> Result<()> {
        let mut portrait = RgbaImage::from_pixel(100, 100, Rgba([10, 20, 30, 255]));
        apply_circular_mask(&mut portrait, 50.0)?;

        assert_eq!(portrait.get_pixel(0, 0)[3], 0);
        assert_eq!(portrait.get_pixel(99, 99)[3], 0);
        assert_eq!(portrait.get_pixel(50, 50)[3], 255);
        assert_eq!(portrait.get_pixel(50, 50).0[..3], [10, 20, 30]);
        Ok(())
    }

    #[test]
    fn unreadable_photo_is_a_composite_error() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let missing = temp.path().join("missing.jpg");
        let err = DeterministicCompositor::default()
            .compose(&missing, &missing)
            .expect_err("missing photo must fail");
        assert_eq!(err.kind(), "composite_error");
        Ok(())
    }
}
