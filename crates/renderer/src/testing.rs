//! CPU stand-in for a GPU surface that records every call.

use std::collections::HashMap;

use image::{Rgba, RgbaImage};

use crate::blur::{DIRECTION_UNIFORM, MASK_UNIFORM, SOURCE_UNIFORM, TILE_OFFSET_UNIFORM};
use crate::surface::{
    GpuSurface, ProgramHandle, RenderTarget, SurfaceError, TextureHandle, TextureRef,
    TextureSource, UniformValue,
};

const MAX_DIMENSION: u32 = 16384;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    CreateTexture(TextureHandle),
    ReleaseTexture(TextureHandle),
    CompileProgram(ProgramHandle),
    ReleaseProgram(ProgramHandle),
    BindTarget(RenderTarget),
    ClearTargets,
    SetUniform(String),
    Draw(RenderTarget),
    ReadPixels(RenderTarget),
    Resize(u32, u32),
    Dispose,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DrawRecord {
    pub target: RenderTarget,
    pub direction: i32,
    pub input: Option<TextureRef>,
    pub mask: TextureHandle,
    pub tile_offset: [f32; 2],
}

/// Colour a first pass paints for a tile sampled at `offset`.
pub(crate) fn tile_colour(offset: [f32; 2]) -> Rgba<u8> {
    Rgba([
        50 + (offset[0] * 100.0).round() as u8,
        50 + (offset[1] * 100.0).round() as u8,
        0,
        255,
    ])
}

/// Paints every first pass with [`tile_colour`] and copies the read target
/// on second passes, so readback shows which tile was drawn.
pub(crate) struct RecordingSurface {
    size: (u32, u32),
    textures: Vec<Option<RgbaImage>>,
    programs: Vec<bool>,
    uniforms: HashMap<(ProgramHandle, String), UniformValue>,
    targets: [RgbaImage; 2],
    bound: Option<RenderTarget>,
    calls: Vec<Call>,
    draws: Vec<DrawRecord>,
    fail_compile: bool,
    fail_draw_at: Option<usize>,
    disposed: bool,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            textures: Vec::new(),
            programs: Vec::new(),
            uniforms: HashMap::new(),
            targets: [RgbaImage::new(width, height), RgbaImage::new(width, height)],
            bound: None,
            calls: Vec::new(),
            draws: Vec::new(),
            fail_compile: false,
            fail_draw_at: None,
            disposed: false,
        }
    }

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
        self.draws.clear();
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn fail_next_compile(&mut self) {
        self.fail_compile = true;
    }

    /// Makes the draw with this zero-based index fail.
    pub fn fail_draw_at(&mut self, index: usize) {
        self.fail_draw_at = Some(index);
    }

    pub fn live_textures(&self) -> usize {
        self.textures.iter().flatten().count()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.iter().filter(|live| **live).count()
    }

    pub fn texture_size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        self.textures
            .get(handle.0 as usize)?
            .as_ref()
            .map(|image| image.dimensions())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn live(&self) -> Result<(), SurfaceError> {
        if self.disposed {
            Err(SurfaceError::Disposed)
        } else {
            Ok(())
        }
    }

    fn uniform(&self, program: ProgramHandle, name: &str) -> Option<&UniformValue> {
        self.uniforms.get(&(program, name.to_string()))
    }
}

impl GpuSurface for RecordingSurface {
    fn target_size(&self) -> (u32, u32) {
        self.size
    }

    fn create_texture(&mut self, source: TextureSource<'_>) -> Result<TextureHandle, SurfaceError> {
        self.live()?;
        let image = match source {
            TextureSource::Image(image) => image.clone(),
            TextureSource::Solid(texel) => RgbaImage::from_pixel(1, 1, Rgba(texel)),
        };
        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(Some(image));
        self.calls.push(Call::CreateTexture(handle));
        Ok(handle)
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if let Some(slot) = self.textures.get_mut(texture.0 as usize) {
            if slot.take().is_some() {
                self.calls.push(Call::ReleaseTexture(texture));
            }
        }
    }

    fn compile_program(&mut self, _fragment_source: &str) -> Result<ProgramHandle, SurfaceError> {
        self.live()?;
        if std::mem::take(&mut self.fail_compile) {
            return Err(SurfaceError::Compile {
                stage: "fragment",
                log: "injected failure".into(),
                annotated: String::new(),
            });
        }
        let handle = ProgramHandle(self.programs.len() as u32);
        self.programs.push(true);
        self.calls.push(Call::CompileProgram(handle));
        Ok(handle)
    }

    fn release_program(&mut self, program: ProgramHandle) {
        if let Some(live) = self.programs.get_mut(program.0 as usize) {
            if std::mem::replace(live, false) {
                self.calls.push(Call::ReleaseProgram(program));
            }
        }
    }

    fn bind_render_target(&mut self, target: RenderTarget) -> Result<(), SurfaceError> {
        self.live()?;
        self.bound = Some(target);
        self.calls.push(Call::BindTarget(target));
        Ok(())
    }

    fn clear_render_targets(&mut self) -> Result<(), SurfaceError> {
        self.live()?;
        for target in &mut self.targets {
            target.pixels_mut().for_each(|pixel| *pixel = Rgba([0, 0, 0, 0]));
        }
        self.calls.push(Call::ClearTargets);
        Ok(())
    }

    fn set_uniform(
        &mut self,
        program: ProgramHandle,
        name: &str,
        value: UniformValue,
    ) -> Result<(), SurfaceError> {
        self.live()?;
        if !self.programs.get(program.0 as usize).copied().unwrap_or(false) {
            return Err(SurfaceError::UnknownProgram(program));
        }
        if let UniformValue::Texture(TextureRef::Texture(handle)) = value {
            if self.texture_size(handle).is_none() {
                return Err(SurfaceError::UnknownTexture(handle));
            }
        }
        self.uniforms.insert((program, name.to_string()), value);
        self.calls.push(Call::SetUniform(name.to_string()));
        Ok(())
    }

    fn draw_full_screen_pass(&mut self, program: ProgramHandle) -> Result<(), SurfaceError> {
        self.live()?;
        let target = self.bound.ok_or(SurfaceError::NoTargetBound)?;
        if self.fail_draw_at == Some(self.draws.len()) {
            return Err(SurfaceError::Device("injected draw failure".into()));
        }

        let input = match self.uniform(program, SOURCE_UNIFORM) {
            Some(UniformValue::Texture(texture)) => Some(*texture),
            _ => None,
        };
        let direction = match self.uniform(program, DIRECTION_UNIFORM) {
            Some(UniformValue::Int(direction)) => *direction,
            _ => -1,
        };
        let mask = match self.uniform(program, MASK_UNIFORM) {
            Some(UniformValue::Texture(TextureRef::Texture(handle))) => *handle,
            _ => TextureHandle(u32::MAX),
        };
        let tile_offset = match self.uniform(program, TILE_OFFSET_UNIFORM) {
            Some(UniformValue::Vec2(offset)) => *offset,
            _ => [0.0, 0.0],
        };

        match input {
            Some(TextureRef::Texture(_)) => {
                let colour = tile_colour(tile_offset);
                self.targets[target.index()]
                    .pixels_mut()
                    .for_each(|pixel| *pixel = colour);
            }
            Some(TextureRef::Target(read)) if read == target => {
                return Err(SurfaceError::TargetFeedback(target));
            }
            Some(TextureRef::Target(read)) => {
                self.targets[target.index()] = self.targets[read.index()].clone();
            }
            None => return Err(SurfaceError::UnboundTexture(SOURCE_UNIFORM.into())),
        }

        self.draws.push(DrawRecord {
            target,
            direction,
            input,
            mask,
            tile_offset,
        });
        self.calls.push(Call::Draw(target));
        Ok(())
    }

    fn read_pixels(&mut self, target: RenderTarget) -> Result<RgbaImage, SurfaceError> {
        self.live()?;
        self.calls.push(Call::ReadPixels(target));
        Ok(self.targets[target.index()].clone())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        self.live()?;
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(SurfaceError::TextureTooLarge {
                width,
                height,
                limit: MAX_DIMENSION,
            });
        }
        self.size = (width, height);
        self.targets = [RgbaImage::new(width, height), RgbaImage::new(width, height)];
        self.bound = None;
        self.calls.push(Call::Resize(width, height));
        Ok(())
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.textures.clear();
        self.programs.clear();
        self.uniforms.clear();
        self.disposed = true;
        self.calls.push(Call::Dispose);
    }
}
