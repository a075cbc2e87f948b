//! Round-trip verification of normalized boxes.
//!
//! Two checks are provided: a numeric one that de-normalizes every stored box
//! and compares it with the source region, and a visual one that draws the
//! de-normalized boxes over the source image so an operator can eyeball them.

use ab_glyph::FontVec;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use log::{debug, info};
use std::path::{Path, PathBuf};

use crate::error::EtlError;
use crate::normalize::{clamp_to_image, denormalize, PRECISION};
use crate::types::{PixelBox, SourceItem, UnifiedRecord};
use crate::utils::ensure_parent_dir;

const BBOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

const TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

const LABEL_BACKGROUND: Rgb<u8> = Rgb([0, 255, 0]);

const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/System/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Outcome of comparing de-normalized boxes against their source regions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundTripReport {
    pub boxes_checked: usize,
    /// Largest absolute difference, in pixels, over all box coordinates.
    pub max_error_px: f64,
    /// Error allowed by rounding to [`PRECISION`] decimals.
    pub tolerance_px: f64,
}

impl RoundTripReport {
    pub fn is_lossless(&self) -> bool {
        self.max_error_px <= self.tolerance_px
    }
}

/// Pixel error allowed by rounding for an image of the given size: half a unit
/// in the last kept decimal, scaled by the larger side.
pub fn round_trip_tolerance(width: u32, height: u32) -> f64 {
    // float slack for coordinates that sit exactly on a rounding midpoint
    0.5 * 10f64.powi(-PRECISION) * width.max(height) as f64 + 1e-9
}

/// De-normalize every annotation of `record` using its stored image size and
/// compare it with the matching region of `item`, clamped to the image.
pub fn check_round_trip(item: &SourceItem, record: &UnifiedRecord) -> RoundTripReport {
    let [width, height] = record.media.image_size;
    let (w, h) = (width as f64, height as f64);

    let max_error_px = item
        .regions
        .iter()
        .zip(&record.spatial_annotations)
        .map(|(region, annotation)| {
            let expected = clamp_to_image(region.bbox, w, h);
            let restored = denormalize(&annotation.bbox_2d, w, h);
            box_error(&expected, &restored)
        })
        .fold(0.0, f64::max);

    RoundTripReport {
        boxes_checked: record.spatial_annotations.len(),
        max_error_px,
        tolerance_px: round_trip_tolerance(width, height),
    }
}

// Compares edges rather than extents so errors do not add up across x and w
fn box_error(a: &PixelBox, b: &PixelBox) -> f64 {
    [
        (a.x - b.x).abs(),
        (a.y - b.y).abs(),
        ((a.x + a.width) - (b.x + b.width)).abs(),
        ((a.y + a.height) - (b.y + b.height)).abs(),
    ]
    .into_iter()
    .fold(0.0, f64::max)
}

/// Diagnostic endpoint that turns a record back into a picture.
pub trait Renderer {
    fn render(&self, image: &RgbImage, record: &UnifiedRecord) -> Result<(), EtlError>;
}

/// Draws de-normalized boxes and their captions over the source image and
/// saves the result as a single image file.
pub struct OverlayRenderer {
    pub output_path: PathBuf,

    /// Font used for captions. If None, only boxes are drawn.
    pub font: Option<FontVec>,

    pub font_scale: f32,

    pub bbox_thickness: i32,
}

impl OverlayRenderer {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            font: None,
            font_scale: 16.0,
            bbox_thickness: 2,
        }
    }

    /// Use the font at `font_path` for captions.
    pub fn with_font_path(mut self, font_path: &Path) -> Result<Self, EtlError> {
        let font_data = std::fs::read(font_path).map_err(|e| {
            EtlError::render_unavailable(format!(
                "failed to read font file {}: {}",
                font_path.display(),
                e
            ))
        })?;
        let font = FontVec::try_from_vec(font_data).map_err(|_| {
            EtlError::render_unavailable(format!(
                "failed to parse font file: {}",
                font_path.display()
            ))
        })?;
        self.font = Some(font);
        Ok(self)
    }

    /// Try the usual system font locations; keep rendering box-only if none loads.
    pub fn with_system_font(mut self) -> Self {
        for path in SYSTEM_FONT_PATHS {
            let Ok(font_data) = std::fs::read(path) else {
                continue;
            };
            if let Ok(font) = FontVec::try_from_vec(font_data) {
                info!("Loaded system font: {}", path);
                self.font = Some(font);
                return self;
            }
        }
        debug!("No system font found, captions will be skipped");
        self
    }

    /// Draw the overlay for `record` onto a copy of `image`.
    pub fn draw(&self, image: &RgbImage, record: &UnifiedRecord) -> RgbImage {
        let mut canvas = image.clone();
        let [width, height] = record.media.image_size;

        for annotation in &record.spatial_annotations {
            let pixels = denormalize(&annotation.bbox_2d, width as f64, height as f64);
            let Some(rect) = pixel_box_to_rect(&pixels) else {
                continue;
            };
            self.draw_box(&mut canvas, rect);
            self.draw_caption(&mut canvas, rect, &annotation.text);
        }

        canvas
    }

    fn draw_box(&self, canvas: &mut RgbImage, rect: Rect) {
        for thickness in 0..self.bbox_thickness {
            let inner_w = rect.width() as i32 - 2 * thickness;
            let inner_h = rect.height() as i32 - 2 * thickness;
            if inner_w <= 0 || inner_h <= 0 {
                break;
            }
            let inner = Rect::at(rect.left() + thickness, rect.top() + thickness)
                .of_size(inner_w as u32, inner_h as u32);
            draw_hollow_rect_mut(canvas, inner, BBOX_COLOR);
        }
    }

    fn draw_caption(&self, canvas: &mut RgbImage, rect: Rect, text: &str) {
        let Some(ref font) = self.font else { return };
        if text.is_empty() {
            return;
        }

        let line_height = self.font_scale.ceil() as i32 + 2;
        // Put the caption above the box, or inside it when the box touches the top edge
        let top = if rect.top() >= line_height {
            rect.top() - line_height
        } else {
            rect.top()
        };
        let label_width = (text.chars().count() as f32 * self.font_scale * 0.6).ceil() as u32;
        let background = Rect::at(rect.left(), top).of_size(label_width.max(1), line_height as u32);
        draw_filled_rect_mut(canvas, background, LABEL_BACKGROUND);
        draw_text_mut(
            canvas,
            TEXT_COLOR,
            rect.left() + 1,
            top + 1,
            self.font_scale,
            font,
            text,
        );
    }
}

impl Renderer for OverlayRenderer {
    fn render(&self, image: &RgbImage, record: &UnifiedRecord) -> Result<(), EtlError> {
        let canvas = self.draw(image, record);
        ensure_parent_dir(&self.output_path)
            .map_err(|e| EtlError::render_unavailable(e.to_string()))?;
        canvas.save(&self.output_path).map_err(|e| {
            EtlError::render_unavailable(format!(
                "cannot write {}: {}",
                self.output_path.display(),
                e
            ))
        })?;
        info!(
            "Verification image written to {}",
            self.output_path.display()
        );
        Ok(())
    }
}

// Zero-area boxes have nothing to draw
fn pixel_box_to_rect(bbox: &PixelBox) -> Option<Rect> {
    let width = bbox.width.round() as i64;
    let height = bbox.height.round() as i64;
    if width < 1 || height < 1 {
        return None;
    }
    Some(Rect::at(bbox.x.round() as i32, bbox.y.round() as i32).of_size(width as u32, height as u32))
}
