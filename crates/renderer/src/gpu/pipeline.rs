use std::collections::HashMap;
use std::num::NonZeroU64;

use crate::compile::{compile_fragment_shader, parse_fragment};
use crate::surface::{SurfaceError, TextureRef, UniformValue};

use super::textures::TEXTURE_FORMAT;
use super::uniforms::{ShaderInterface, UniformStaging};

/// A compiled full-screen program plus the host-side state bound to it.
pub(crate) struct Program {
    pub pipeline: wgpu::RenderPipeline,
    pub interface: ShaderInterface,
    texture_layout: wgpu::BindGroupLayout,
    uniforms: Option<ProgramUniforms>,
    textures: HashMap<u32, TextureRef>,
}

struct ProgramUniforms {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    staging: UniformStaging,
}

impl Program {
    pub(crate) fn new(
        device: &wgpu::Device,
        vertex_module: &wgpu::ShaderModule,
        source: &str,
    ) -> Result<Self, SurfaceError> {
        let module = parse_fragment(source)?;
        let interface = ShaderInterface::reflect(&module)?;
        let fragment_module = compile_fragment_shader(device, source)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let uniform_entries: Vec<_> = interface
            .block
            .iter()
            .map(|block| wgpu::BindGroupLayoutEntry {
                binding: block.binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(u64::from(block.size)),
                },
                count: None,
            })
            .collect();
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("program uniform layout"),
            entries: &uniform_entries,
        });

        let texture_entries = build_texture_layout_entries(&interface);
        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("program texture layout"),
            entries: &texture_entries,
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("program pipeline layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("full-screen program"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: vertex_module,
                entry_point: Some("main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TEXTURE_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let uniforms = interface.block.as_ref().map(|block| {
            let staging = UniformStaging::new(block.size);
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("program uniform buffer"),
                size: u64::from(block.size),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("program uniform bind group"),
                layout: &uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: block.binding,
                    resource: buffer.as_entire_binding(),
                }],
            });
            ProgramUniforms {
                buffer,
                bind_group,
                staging,
            }
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(SurfaceError::Link(err.to_string()));
        }

        tracing::debug!(
            uniform_fields = interface.block.as_ref().map_or(0, |block| block.fields.len()),
            textures = interface.textures.len(),
            "compiled program"
        );

        Ok(Self {
            pipeline,
            interface,
            texture_layout,
            uniforms,
            textures: HashMap::new(),
        })
    }

    pub(crate) fn set_uniform(&mut self, name: &str, value: &UniformValue) -> Result<(), SurfaceError> {
        match value {
            UniformValue::Texture(texture) => {
                let binding = self.require_texture(name, value)?;
                self.textures.insert(binding, *texture);
            }
            UniformValue::TextureArray(textures) => {
                let bindings = (0..textures.len())
                    .map(|index| self.require_texture(&format!("{name}{index}"), value))
                    .collect::<Result<Vec<_>, _>>()?;
                for (binding, texture) in bindings.into_iter().zip(textures) {
                    self.textures.insert(binding, *texture);
                }
            }
            _ => {
                let field = self.interface.field(name).copied().ok_or_else(|| {
                    SurfaceError::UnsupportedUniform {
                        name: name.to_string(),
                        kind: value.kind(),
                        reason: "the program declares no such uniform".into(),
                    }
                })?;
                if let Some(uniforms) = self.uniforms.as_mut() {
                    uniforms.staging.write(name, &field, value)?;
                }
            }
        }
        Ok(())
    }

    fn require_texture(&self, name: &str, value: &UniformValue) -> Result<u32, SurfaceError> {
        self.interface
            .texture_binding(name)
            .ok_or_else(|| SurfaceError::UnsupportedUniform {
                name: name.to_string(),
                kind: value.kind(),
                reason: "the program declares no such texture".into(),
            })
    }

    pub(crate) fn declares_uniform(&self, name: &str) -> bool {
        self.interface.field(name).is_some()
    }

    pub(crate) fn bound_textures(&self) -> impl Iterator<Item = TextureRef> + '_ {
        self.textures.values().copied()
    }

    /// Pushes the staged uniform bytes to the GPU buffer.
    pub(crate) fn upload_uniforms(&self, queue: &wgpu::Queue) {
        if let Some(uniforms) = &self.uniforms {
            queue.write_buffer(&uniforms.buffer, 0, uniforms.staging.bytes());
        }
    }

    pub(crate) fn uniform_bind_group(&self) -> Option<&wgpu::BindGroup> {
        self.uniforms.as_ref().map(|uniforms| &uniforms.bind_group)
    }

    /// Builds the texture bind group for the next draw from the current bindings.
    pub(crate) fn texture_bind_group<'a>(
        &self,
        device: &wgpu::Device,
        sampler: &wgpu::Sampler,
        resolve: impl Fn(TextureRef) -> Result<&'a wgpu::TextureView, SurfaceError>,
    ) -> Result<wgpu::BindGroup, SurfaceError> {
        let mut views = Vec::with_capacity(self.interface.textures.len());
        for slot in &self.interface.textures {
            let texture = self
                .textures
                .get(&slot.binding)
                .copied()
                .ok_or_else(|| SurfaceError::UnboundTexture(slot.name.clone()))?;
            views.push((slot.binding, resolve(texture)?));
        }

        let mut entries = Vec::with_capacity(views.len() + self.interface.samplers.len());
        for (binding, view) in &views {
            entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        for binding in &self.interface.samplers {
            entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }

        Ok(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("program texture bind group"),
            layout: &self.texture_layout,
            entries: &entries,
        }))
    }
}

fn build_texture_layout_entries(interface: &ShaderInterface) -> Vec<wgpu::BindGroupLayoutEntry> {
    let textures = interface.textures.iter().map(|slot| wgpu::BindGroupLayoutEntry {
        binding: slot.binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: wgpu::TextureViewDimension::D2,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    });
    let samplers = interface
        .samplers
        .iter()
        .map(|binding| wgpu::BindGroupLayoutEntry {
            binding: *binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    textures.chain(samplers).collect()
}
