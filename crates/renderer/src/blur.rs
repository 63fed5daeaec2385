//! Two-pass separable blur over one tile.
//!
//! Pass one blurs horizontally from the source texture into one render
//! target; pass two blurs that result vertically into the other target,
//! which is then read back. The influence mask blends blurred and sharp
//! pixels in both passes.

use image::RgbaImage;

use crate::error::RenderError;
use crate::kernel::generate_kernel;
use crate::surface::{
    GpuSurface, ProgramHandle, RenderTarget, TextureHandle, TextureRef, TextureSource,
    UniformValue, WHITE_TEXEL,
};
use crate::types::KernelRadiusSource;

pub(crate) const SOURCE_UNIFORM: &str = "tex";
pub(crate) const MASK_UNIFORM: &str = "influenceMask";
pub(crate) const RADIUS_UNIFORM: &str = "uRadius";
pub(crate) const KERNEL_UNIFORM: &str = "uKernel";
pub(crate) const KERNEL_LEN_UNIFORM: &str = "uKernelLen";
pub(crate) const TILE_OFFSET_UNIFORM: &str = "uTileOffset";
pub(crate) const TILE_SIZE_UNIFORM: &str = "uTileSize";
pub(crate) const DIRECTION_UNIFORM: &str = "uDirection";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlurDirection {
    Horizontal,
    Vertical,
}

impl BlurDirection {
    fn uniform(self) -> i32 {
        match self {
            BlurDirection::Horizontal => 0,
            BlurDirection::Vertical => 1,
        }
    }
}

/// Read and write roles after a ping-pong swap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingPongRoles {
    pub read: RenderTarget,
    pub write: RenderTarget,
}

/// Tracks which render target was written last.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PingPong {
    last_written: RenderTarget,
}

impl Default for PingPong {
    fn default() -> Self {
        Self {
            last_written: RenderTarget::B,
        }
    }
}

impl PingPong {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets prior passes so the next swap writes target A.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Flips the targets: the last written one becomes the read side.
    pub fn swap(&mut self) -> PingPongRoles {
        let read = self.last_written;
        self.last_written = read.other();
        PingPongRoles {
            read,
            write: self.last_written,
        }
    }

    pub fn last_written(&self) -> RenderTarget {
        self.last_written
    }
}

/// Radius and weights shared by every tile of a render.
#[derive(Clone, Debug, PartialEq)]
pub struct BlurParams {
    pub radius: u32,
    pub kernel: Vec<f32>,
}

impl BlurParams {
    pub fn new(padding: u32, blur_strength: f32, source: KernelRadiusSource) -> Self {
        let kernel_radius = match source {
            KernelRadiusSource::Padding => padding as f32,
            KernelRadiusSource::BlurStrength => blur_strength,
        };
        Self {
            radius: padding,
            kernel: generate_kernel(kernel_radius),
        }
    }
}

/// Portion of the source image one tile samples, in normalized coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileWindow {
    pub offset: [f32; 2],
    pub footprint: f32,
}

impl TileWindow {
    /// The whole source image.
    pub const FULL: TileWindow = TileWindow {
        offset: [0.0, 0.0],
        footprint: 1.0,
    };
}

struct BlurResources {
    program: ProgramHandle,
    source: TextureHandle,
    mask: TextureHandle,
    white_mask: TextureHandle,
}

impl BlurResources {
    fn release<S: GpuSurface + ?Sized>(self, surface: &mut S) {
        surface.release_program(self.program);
        surface.release_texture(self.source);
        surface.release_texture(self.mask);
        surface.release_texture(self.white_mask);
    }
}

/// GPU resources and pass sequencing for blurring tiles.
#[derive(Default)]
pub struct BlurPipeline {
    resources: Option<BlurResources>,
    ping_pong: PingPong,
}

impl BlurPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.resources.is_some()
    }

    /// Uploads the source and mask and compiles the blur program.
    ///
    /// Anything already loaded is released first. On failure, resources
    /// created by this call are released again.
    pub fn load<S: GpuSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        source: &RgbaImage,
        mask: &RgbaImage,
    ) -> Result<(), RenderError> {
        self.release(surface);

        let mut textures = Vec::with_capacity(3);
        let result = (|| {
            let white_mask = surface.create_texture(TextureSource::Solid(WHITE_TEXEL))?;
            textures.push(white_mask);
            let source_texture = surface.create_texture(TextureSource::Image(source))?;
            textures.push(source_texture);
            let mask_texture = surface.create_texture(TextureSource::Image(mask))?;
            textures.push(mask_texture);
            let program = surface.compile_program(crate::BLUR_FRAGMENT_SHADER)?;
            Ok::<_, RenderError>(BlurResources {
                program,
                source: source_texture,
                mask: mask_texture,
                white_mask,
            })
        })();

        match result {
            Ok(resources) => {
                self.resources = Some(resources);
                Ok(())
            }
            Err(err) => {
                for texture in textures {
                    surface.release_texture(texture);
                }
                Err(err)
            }
        }
    }

    /// Blurs one tile and reads the result back.
    ///
    /// Both render targets are cleared first so nothing from the previous
    /// tile leaks in.
    pub fn render_tile<S: GpuSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        params: &BlurParams,
        window: TileWindow,
        with_mask: bool,
    ) -> Result<RgbaImage, RenderError> {
        let resources = self
            .resources
            .as_ref()
            .ok_or(RenderError::Precondition("blur pipeline has no resources loaded"))?;
        let program = resources.program;
        let mask = if with_mask {
            resources.mask
        } else {
            resources.white_mask
        };

        surface.clear_render_targets()?;
        self.ping_pong.reset();

        let shared = [
            (MASK_UNIFORM, UniformValue::Texture(TextureRef::Texture(mask))),
            (RADIUS_UNIFORM, UniformValue::Int(params.radius as i32)),
            (KERNEL_UNIFORM, UniformValue::FloatArray(params.kernel.clone())),
            (KERNEL_LEN_UNIFORM, UniformValue::Int(params.kernel.len() as i32)),
            (TILE_OFFSET_UNIFORM, UniformValue::Vec2(window.offset)),
            (TILE_SIZE_UNIFORM, UniformValue::Float(window.footprint)),
        ];
        for (name, value) in shared {
            surface.set_uniform(program, name, value)?;
        }

        let first = self.ping_pong.swap();
        self.draw_pass(
            surface,
            program,
            first.write,
            TextureRef::Texture(resources.source),
            BlurDirection::Horizontal,
        )?;

        let second = self.ping_pong.swap();
        self.draw_pass(
            surface,
            program,
            second.write,
            TextureRef::Target(second.read),
            BlurDirection::Vertical,
        )?;

        Ok(surface.read_pixels(second.write)?)
    }

    fn draw_pass<S: GpuSurface + ?Sized>(
        &self,
        surface: &mut S,
        program: ProgramHandle,
        target: RenderTarget,
        input: TextureRef,
        direction: BlurDirection,
    ) -> Result<(), RenderError> {
        surface.bind_render_target(target)?;
        surface.set_uniform(program, SOURCE_UNIFORM, UniformValue::Texture(input))?;
        surface.set_uniform(
            program,
            DIRECTION_UNIFORM,
            UniformValue::Int(direction.uniform()),
        )?;
        surface.draw_full_screen_pass(program)?;
        Ok(())
    }

    /// Releases the program and textures. Safe to call repeatedly.
    pub fn release<S: GpuSurface + ?Sized>(&mut self, surface: &mut S) {
        if let Some(resources) = self.resources.take() {
            resources.release(surface);
        }
        self.ping_pong.reset();
    }
}
