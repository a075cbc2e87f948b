use crate::error::EtlError;
use crate::types::{NormalizedBox, PixelBox};

/// Number of decimal places kept in normalized coordinates
pub const PRECISION: i32 = 4;

/// Round a coordinate to [`PRECISION`] decimal places
pub fn round_coord(value: f64) -> f64 {
    let scale = 10f64.powi(PRECISION);
    (value * scale).round() / scale
}

/// Convert a pixel-space `(x, y, w, h)` box into a normalized
/// `(x_min, y_min, x_max, y_max)` box for an image of the given size.
///
/// Boxes that overflow the image are clamped to its edges instead of being
/// rejected. A box lying entirely outside the image, or one with a zero or
/// negative extent, comes out as a zero-area box on the clamped edge.
pub fn normalize(bbox: PixelBox, width: f64, height: f64) -> Result<NormalizedBox, EtlError> {
    check_dimensions(width, height)?;

    let (x_min, y_min, x_max, y_max) = clamped_edges(bbox, width, height);

    Ok(NormalizedBox {
        x_min: round_coord(x_min / width),
        y_min: round_coord(y_min / height),
        x_max: round_coord(x_max / width),
        y_max: round_coord(y_max / height),
    })
}

/// Map a normalized box back to pixel space as `(x, y, w, h)`.
pub fn denormalize(bbox: &NormalizedBox, width: f64, height: f64) -> PixelBox {
    PixelBox {
        x: bbox.x_min * width,
        y: bbox.y_min * height,
        width: (bbox.x_max - bbox.x_min) * width,
        height: (bbox.y_max - bbox.y_min) * height,
    }
}

/// The part of `bbox` that lies inside a `width` x `height` image, in pixels.
///
/// This is what a lossless normalize/denormalize round trip has to reproduce.
pub fn clamp_to_image(bbox: PixelBox, width: f64, height: f64) -> PixelBox {
    let (x_min, y_min, x_max, y_max) = clamped_edges(bbox, width, height);
    PixelBox::new(x_min, y_min, x_max - x_min, y_max - y_min)
}

/// Normalize a single `(x, y)` pixel point, clamped into the image.
pub fn normalize_point(point: (f64, f64), width: f64, height: f64) -> Result<[f64; 2], EtlError> {
    check_dimensions(width, height)?;
    Ok(scale_point(point, width, height))
}

/// Normalize every point of a pixel-space trajectory, keeping their order.
///
/// Points outside the image are clamped onto its border one by one; an empty
/// trajectory stays empty.
pub fn normalize_trajectory(
    points: &[(f64, f64)],
    width: f64,
    height: f64,
) -> Result<Vec<[f64; 2]>, EtlError> {
    check_dimensions(width, height)?;
    Ok(points
        .iter()
        .map(|&point| scale_point(point, width, height))
        .collect())
}

fn check_dimensions(width: f64, height: f64) -> Result<(), EtlError> {
    if width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0 {
        Ok(())
    } else {
        Err(EtlError::InvalidDimension { width, height })
    }
}

fn scale_point((x, y): (f64, f64), width: f64, height: f64) -> [f64; 2] {
    [
        round_coord(clamp_coord(x, width) / width),
        round_coord(clamp_coord(y, height) / height),
    ]
}

// NaN lands on the origin edge
fn clamp_coord(value: f64, limit: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, limit)
    }
}

// Box edges clamped into the image; a negative or undefined extent collapses onto the min edge
fn clamped_edges(bbox: PixelBox, width: f64, height: f64) -> (f64, f64, f64, f64) {
    let x_min = clamp_coord(bbox.x, width);
    let y_min = clamp_coord(bbox.y, height);
    let x_max = clamp_coord(bbox.x + bbox.width, width).max(x_min);
    let y_max = clamp_coord(bbox.y + bbox.height, height).max(y_min);
    (x_min, y_min, x_max, y_max)
}
