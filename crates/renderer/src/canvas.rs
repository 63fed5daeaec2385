//! CPU-side canvas helpers for assembling tiles into images.

use image::{imageops, Rgba, RgbaImage};

/// Padded tile outline drawn when seams are marked.
pub const SEAM_COLOR: Rgba<u8> = Rgba([0, 255, 255, 255]);
/// Crop region outline drawn when seams are marked.
pub const CROP_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const OVERLAY_THICKNESS: u32 = 2;

/// A square canvas cleared to transparent black.
pub fn blank_canvas(size: u32) -> RgbaImage {
    RgbaImage::new(size, size)
}

/// Draws `tile` over `canvas` with its top-left corner at (`x`, `y`), clipped
/// to the canvas.
pub fn composite(canvas: &mut RgbaImage, tile: &RgbaImage, x: u32, y: u32) {
    imageops::overlay(canvas, tile, i64::from(x), i64::from(y));
}

/// Copies a `width` x `height` region of `source` into `target`, clipping
/// against both images.
#[allow(clippy::too_many_arguments)]
pub fn copy_region(
    target: &mut RgbaImage,
    source: &RgbaImage,
    source_x: u32,
    source_y: u32,
    width: u32,
    height: u32,
    target_x: u32,
    target_y: u32,
) {
    let region = imageops::crop_imm(source, source_x, source_y, width, height).to_image();
    imageops::replace(target, &region, i64::from(target_x), i64::from(target_y));
}

/// Crops away fully transparent rows and columns around the content.
///
/// An image with no visible pixel is returned unchanged.
pub fn trim_transparent(image: &RgbaImage) -> RgbaImage {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel[3] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    match bounds {
        Some((x0, y0, x1, y1)) => {
            imageops::crop_imm(image, x0, y0, x1 - x0 + 1, y1 - y0 + 1).to_image()
        }
        None => image.clone(),
    }
}

/// Outlines a rectangle with bands of `thickness` drawn inside its edges.
pub fn stroke_rect(
    canvas: &mut RgbaImage,
    (x, y): (u32, u32),
    (width, height): (u32, u32),
    thickness: u32,
    color: Rgba<u8>,
) {
    if width == 0 || height == 0 || thickness == 0 {
        return;
    }
    let band_w = thickness.min(width);
    let band_h = thickness.min(height);
    fill_rect(canvas, (x, y), (width, band_h), color);
    fill_rect(canvas, (x, y + height - band_h), (width, band_h), color);
    fill_rect(canvas, (x, y), (band_w, height), color);
    fill_rect(canvas, (x + width - band_w, y), (band_w, height), color);
}

fn fill_rect(canvas: &mut RgbaImage, (x, y): (u32, u32), (width, height): (u32, u32), color: Rgba<u8>) {
    let x_end = x.saturating_add(width).min(canvas.width());
    let y_end = y.saturating_add(height).min(canvas.height());
    for py in y..y_end {
        for px in x..x_end {
            canvas.put_pixel(px, py, color);
        }
    }
}
