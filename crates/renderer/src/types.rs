use std::time::Duration;

use scheduler::DEFAULT_MAX_TILE_SIZE;

/// Where the Gaussian kernel radius comes from when a blur pass is planned.
///
/// `Padding` sizes the kernel to the tile padding so the blur footprint never
/// reaches past the bleed region. `BlurStrength` feeds the raw strength value
/// through the kernel generator, which yields a short, nearly flat kernel that
/// the shader stretches across the padding radius.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KernelRadiusSource {
    #[default]
    Padding,
    BlurStrength,
}

/// Adapter selection hint for the headless wgpu surface.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

/// Static parameters the tiled renderer is built with.
#[derive(Clone, Debug, PartialEq)]
pub struct TiledRendererConfig {
    pub resolution: u32,
    pub blur_strength: f32,
    pub max_tile_size: u32,
    pub kernel_radius_source: KernelRadiusSource,
}

impl TiledRendererConfig {
    pub fn new(resolution: u32, blur_strength: f32) -> Self {
        Self {
            resolution,
            blur_strength,
            max_tile_size: DEFAULT_MAX_TILE_SIZE,
            kernel_radius_source: KernelRadiusSource::default(),
        }
    }

    pub fn with_max_tile_size(mut self, max_tile_size: u32) -> Self {
        self.max_tile_size = max_tile_size;
        self
    }

    pub fn with_kernel_radius_source(mut self, source: KernelRadiusSource) -> Self {
        self.kernel_radius_source = source;
        self
    }
}

/// Per-run switches for [`TiledRenderer::render_all`](crate::TiledRenderer::render_all).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderOptions {
    /// Modulate the blur by the influence mask; when off a white mask is bound.
    pub with_mask: bool,
    /// Outline padded tiles (cyan) and crop regions (red) on the stitched canvas.
    pub mark_seams: bool,
    /// Pause between tiles so progressive display stays visible.
    pub inter_tile_delay: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            with_mask: true,
            mark_seams: false,
            inter_tile_delay: Duration::ZERO,
        }
    }
}
