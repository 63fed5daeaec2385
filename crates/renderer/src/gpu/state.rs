use image::RgbaImage;

use crate::compile::compile_vertex_shader;
use crate::surface::{
    GpuSurface, ProgramHandle, RenderTarget, SurfaceError, TextureHandle, TextureRef,
    TextureSource, UniformValue, TARGET_SIZE_UNIFORM,
};
use crate::types::GpuPowerPreference;

use super::context::GpuContext;
use super::pipeline::Program;
use super::readback::read_texture;
use super::textures::{self, SurfaceTexture};

/// Offscreen [`GpuSurface`] backed by wgpu.
///
/// Each draw is submitted on its own so the second blur pass sees the first
/// pass's output, and readback blocks until the GPU is idle.
pub struct WgpuSurface {
    context: GpuContext,
    vertex_module: wgpu::ShaderModule,
    sampler: wgpu::Sampler,
    textures: Vec<Option<SurfaceTexture>>,
    programs: Vec<Option<Program>>,
    targets: [SurfaceTexture; 2],
    bound: Option<RenderTarget>,
    disposed: bool,
}

impl WgpuSurface {
    pub fn new(width: u32, height: u32) -> Result<Self, SurfaceError> {
        Self::with_power_preference(width, height, GpuPowerPreference::default())
    }

    pub fn with_power_preference(
        width: u32,
        height: u32,
        gpu_power: GpuPowerPreference,
    ) -> Result<Self, SurfaceError> {
        let context = GpuContext::headless(gpu_power)?;
        context.check_dimensions(width, height)?;
        let vertex_module = compile_vertex_shader(&context.device);
        let sampler = textures::linear_sampler(&context.device);
        let targets = create_targets(&context.device, width, height);
        tracing::debug!(width, height, "created headless surface");
        Ok(Self {
            context,
            vertex_module,
            sampler,
            textures: Vec::new(),
            programs: Vec::new(),
            targets,
            bound: None,
            disposed: false,
        })
    }

    fn ensure_live(&self) -> Result<(), SurfaceError> {
        if self.disposed {
            Err(SurfaceError::Disposed)
        } else {
            Ok(())
        }
    }

    fn program_mut(&mut self, program: ProgramHandle) -> Result<&mut Program, SurfaceError> {
        self.programs
            .get_mut(program.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(SurfaceError::UnknownProgram(program))
    }

    fn check_texture_ref(&self, texture: TextureRef) -> Result<(), SurfaceError> {
        match texture {
            TextureRef::Texture(handle) => {
                texture_view(&self.textures, handle)?;
                Ok(())
            }
            TextureRef::Target(_) => Ok(()),
        }
    }

    fn clear_pass(&self, encoder: &mut wgpu::CommandEncoder, target: &SurfaceTexture) {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("clear render target"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }
}

fn create_targets(device: &wgpu::Device, width: u32, height: u32) -> [SurfaceTexture; 2] {
    [
        textures::render_target(device, width, height, "render target A"),
        textures::render_target(device, width, height, "render target B"),
    ]
}

fn texture_view(
    textures: &[Option<SurfaceTexture>],
    handle: TextureHandle,
) -> Result<&wgpu::TextureView, SurfaceError> {
    textures
        .get(handle.0 as usize)
        .and_then(Option::as_ref)
        .map(|texture| &texture.view)
        .ok_or(SurfaceError::UnknownTexture(handle))
}

impl GpuSurface for WgpuSurface {
    fn target_size(&self) -> (u32, u32) {
        (self.targets[0].width, self.targets[0].height)
    }

    fn create_texture(&mut self, source: TextureSource<'_>) -> Result<TextureHandle, SurfaceError> {
        self.ensure_live()?;
        let (width, height) = source.dimensions();
        self.context.check_dimensions(width, height)?;
        let handle = TextureHandle(self.textures.len() as u32);
        let label = format!("texture #{}", handle.0);
        let texture = match source {
            TextureSource::Image(image) => {
                textures::upload_image(&self.context.device, &self.context.queue, image, &label)
            }
            TextureSource::Solid(texel) => {
                textures::solid(&self.context.device, &self.context.queue, texel, &label)
            }
        };
        self.textures.push(Some(texture));
        Ok(handle)
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if let Some(slot) = self.textures.get_mut(texture.0 as usize) {
            if let Some(released) = slot.take() {
                released.texture.destroy();
            }
        }
    }

    fn compile_program(&mut self, fragment_source: &str) -> Result<ProgramHandle, SurfaceError> {
        self.ensure_live()?;
        let program = Program::new(&self.context.device, &self.vertex_module, fragment_source)?;
        let handle = ProgramHandle(self.programs.len() as u32);
        self.programs.push(Some(program));
        Ok(handle)
    }

    fn release_program(&mut self, program: ProgramHandle) {
        if let Some(slot) = self.programs.get_mut(program.0 as usize) {
            slot.take();
        }
    }

    fn bind_render_target(&mut self, target: RenderTarget) -> Result<(), SurfaceError> {
        self.ensure_live()?;
        self.bound = Some(target);
        Ok(())
    }

    fn clear_render_targets(&mut self) -> Result<(), SurfaceError> {
        self.ensure_live()?;
        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("clear encoder"),
                });
        for target in &self.targets {
            self.clear_pass(&mut encoder, target);
        }
        self.context.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn set_uniform(
        &mut self,
        program: ProgramHandle,
        name: &str,
        value: UniformValue,
    ) -> Result<(), SurfaceError> {
        self.ensure_live()?;
        match &value {
            UniformValue::Texture(texture) => self.check_texture_ref(*texture)?,
            UniformValue::TextureArray(textures) => {
                for texture in textures {
                    self.check_texture_ref(*texture)?;
                }
            }
            _ => {}
        }
        self.program_mut(program)?.set_uniform(name, &value)
    }

    fn draw_full_screen_pass(&mut self, program: ProgramHandle) -> Result<(), SurfaceError> {
        self.ensure_live()?;
        let bound = self.bound.ok_or(SurfaceError::NoTargetBound)?;
        let (width, height) = self.target_size();

        let entry = self.program_mut(program)?;
        if entry.declares_uniform(TARGET_SIZE_UNIFORM) {
            entry.set_uniform(
                TARGET_SIZE_UNIFORM,
                &UniformValue::Vec2([width as f32, height as f32]),
            )?;
        }
        if entry
            .bound_textures()
            .any(|texture| texture == TextureRef::Target(bound))
        {
            return Err(SurfaceError::TargetFeedback(bound));
        }

        let program = self
            .programs
            .get(program.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(SurfaceError::UnknownProgram(program))?;
        program.upload_uniforms(&self.context.queue);

        let textures = &self.textures;
        let targets = &self.targets;
        let texture_bind_group =
            program.texture_bind_group(&self.context.device, &self.sampler, |texture| {
                match texture {
                    TextureRef::Texture(handle) => texture_view(textures, handle),
                    TextureRef::Target(target) => Ok(&targets[target.index()].view),
                }
            })?;

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("full-screen pass encoder"),
                });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("full-screen pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.targets[bound.index()].view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&program.pipeline);
            if let Some(bind_group) = program.uniform_bind_group() {
                pass.set_bind_group(0, bind_group, &[]);
            }
            pass.set_bind_group(1, &texture_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.context.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn read_pixels(&mut self, target: RenderTarget) -> Result<RgbaImage, SurfaceError> {
        self.ensure_live()?;
        read_texture(
            &self.context.device,
            &self.context.queue,
            &self.targets[target.index()],
        )
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        self.ensure_live()?;
        self.context.check_dimensions(width, height)?;
        if self.target_size() == (width, height) {
            return Ok(());
        }
        for target in &self.targets {
            target.texture.destroy();
        }
        self.targets = create_targets(&self.context.device, width, height);
        self.bound = None;
        tracing::debug!(width, height, "resized render targets");
        Ok(())
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        for texture in self.textures.drain(..).flatten() {
            texture.texture.destroy();
        }
        self.programs.clear();
        for target in &self.targets {
            target.texture.destroy();
        }
        self.bound = None;
        self.disposed = true;
        tracing::debug!("disposed headless surface");
    }
}
