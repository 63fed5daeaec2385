//! Whole-image blur in one two-pass draw, for sizes that fit a single texture.

use image::RgbaImage;
use scheduler::{SchedulerError, MAX_BLUR_RADIUS};

use crate::blur::{BlurParams, BlurPipeline, TileWindow};
use crate::error::RenderError;
use crate::surface::GpuSurface;
use crate::types::KernelRadiusSource;

/// Padding the single-pass blur uses for `resolution` at `blur_strength`.
pub fn single_pass_radius(resolution: u32, blur_strength: f32) -> u32 {
    let radius = (f64::from(blur_strength) * f64::from(resolution) * 0.1).floor();
    (radius.max(0.0) as u32).min(MAX_BLUR_RADIUS)
}

/// Blurs `source` in one go on `surface`, which is resized to the image.
///
/// The kernel comes from the blur strength while the sampling radius comes
/// from [`single_pass_radius`]. Resources are released before returning.
pub fn render_single_pass<S: GpuSurface + ?Sized>(
    surface: &mut S,
    source: &RgbaImage,
    mask: &RgbaImage,
    blur_strength: f32,
    with_mask: bool,
) -> Result<RgbaImage, RenderError> {
    if !(0.0..=1.0).contains(&blur_strength) {
        return Err(SchedulerError::BlurStrengthOutOfRange(blur_strength).into());
    }
    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(SchedulerError::ZeroResolution.into());
    }
    surface.resize(width, height)?;

    let mut pipeline = BlurPipeline::new();
    pipeline.load(surface, source, mask)?;
    let params = BlurParams {
        radius: single_pass_radius(width.max(height), blur_strength),
        ..BlurParams::new(0, blur_strength, KernelRadiusSource::BlurStrength)
    };
    tracing::debug!(width, height, radius = params.radius, "single-pass blur");
    let result = pipeline.render_tile(surface, &params, TileWindow::FULL, with_mask);
    pipeline.release(surface);
    result
}
