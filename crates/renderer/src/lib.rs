//! Tiled two-pass Gaussian blur on the GPU.
//!
//! Images too large for one render target are split into padded tiles. Each
//! tile is blurred horizontally then vertically through a pair of ping-pong
//! render targets, read back, and composited onto a stitched canvas. The
//! padding is finally cropped away and the tile interiors packed into the
//! output image.
//!
//! ```text
//!   TileScheduler ──▶ TileGrid ──▶ TiledRenderer::render_all
//!                                        │ per tile
//!                                        ▼
//!                    BlurPipeline ──▶ GpuSurface (A ⇄ B) ──▶ read_pixels
//!                                        │
//!                     stitched canvas ◀──┘──▶ Cropper::stitch ──▶ output
//! ```
//!
//! Drawing goes through the [`GpuSurface`] trait. [`WgpuSurface`] is the
//! headless wgpu implementation.

mod blur;
mod cancel;
pub mod canvas;
mod compile;
mod cropper;
mod display;
mod error;
mod gpu;
mod kernel;
mod single;
mod source;
mod surface;
#[cfg(test)]
mod testing;
mod tiled;
mod types;

pub use blur::{BlurDirection, BlurParams, BlurPipeline, PingPong, PingPongRoles, TileWindow};
pub use cancel::CancellationToken;
pub use cropper::{CropCommand, Cropper};
pub use display::{DisplaySink, Frame, NullDisplay};
pub use error::RenderError;
pub use gpu::WgpuSurface;
pub use kernel::{generate_kernel, MIN_KERNEL_LEN, SIGMA_RATIO};
pub use single::{render_single_pass, single_pass_radius};
pub use source::{load_square, FileImageSource, ImageSource, LoadError, MemoryImageSource};
pub use surface::{
    annotate_source, GpuSurface, ProgramHandle, RenderTarget, SurfaceError, TextureHandle,
    TextureRef, TextureSource, UniformKind, UniformValue, TARGET_SIZE_UNIFORM, WHITE_TEXEL,
};
pub use tiled::{RenderOutcome, RendererState, TiledRenderer};
pub use types::{GpuPowerPreference, KernelRadiusSource, RenderOptions, TiledRendererConfig};

pub use scheduler::{Tile, TileGrid, TileScheduler, MAX_BLUR_RADIUS};

/// Fragment shader for both blur passes.
pub const BLUR_FRAGMENT_SHADER: &str = include_str!("shaders/blur.frag");

/// Length of the kernel array declared in [`BLUR_FRAGMENT_SHADER`].
pub const MAX_KERNEL_LEN: usize = 2 * MAX_BLUR_RADIUS as usize + 1;
