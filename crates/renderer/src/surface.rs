//! Backend-neutral drawing surface the blur pipeline is written against.
//!
//! A surface owns textures, compiled programs and exactly two render targets
//! sized to the padded tile. Programs are fragment shaders drawn over a
//! full-screen triangle; their uniforms and texture bindings are addressed by
//! the names declared in the shader source.

use std::fmt;

use image::RgbaImage;

/// Uniform the surface fills in before each draw when the program declares it.
pub const TARGET_SIZE_UNIFORM: &str = "uTargetSize";

pub const WHITE_TEXEL: [u8; 4] = [255; 4];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u32);

/// One of the two ping-pong render targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    A,
    B,
}

impl RenderTarget {
    pub fn index(self) -> usize {
        match self {
            RenderTarget::A => 0,
            RenderTarget::B => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            RenderTarget::A => RenderTarget::B,
            RenderTarget::B => RenderTarget::A,
        }
    }
}

/// Anything a sampler uniform can be pointed at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureRef {
    Texture(TextureHandle),
    Target(RenderTarget),
}

/// Initial contents of a texture created on the surface.
#[derive(Clone, Copy, Debug)]
pub enum TextureSource<'a> {
    Image(&'a RgbaImage),
    /// A 1x1 texel of the given colour.
    Solid([u8; 4]),
}

impl TextureSource<'_> {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            TextureSource::Image(image) => image.dimensions(),
            TextureSource::Solid(_) => (1, 1),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Int(i32),
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Vec4Array(Vec<[f32; 4]>),
    Texture(TextureRef),
    /// Element `i` binds to the texture declared as `{name}{i}`.
    TextureArray(Vec<TextureRef>),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Float(_) => UniformKind::Float,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::FloatArray(_) => UniformKind::FloatArray,
            UniformValue::IntArray(_) => UniformKind::IntArray,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
            UniformValue::Vec4(_) => UniformKind::Vec4,
            UniformValue::Vec4Array(_) => UniformKind::Vec4Array,
            UniformValue::Texture(_) => UniformKind::Texture,
            UniformValue::TextureArray(_) => UniformKind::TextureArray,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Int,
    FloatArray,
    IntArray,
    Vec2,
    Vec3,
    Vec4,
    Vec4Array,
    Texture,
    TextureArray,
}

impl fmt::Display for UniformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UniformKind::Float => "float",
            UniformKind::Int => "int",
            UniformKind::FloatArray => "float[]",
            UniformKind::IntArray => "int[]",
            UniformKind::Vec2 => "vec2",
            UniformKind::Vec3 => "vec3",
            UniformKind::Vec4 => "vec4",
            UniformKind::Vec4Array => "vec4[]",
            UniformKind::Texture => "texture",
            UniformKind::TextureArray => "texture[]",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("failed to compile {stage} shader:\n{log}\n{annotated}")]
    Compile {
        stage: &'static str,
        log: String,
        annotated: String,
    },
    #[error("failed to link shader program: {0}")]
    Link(String),
    #[error("uniform '{name}' cannot take a {kind} value: {reason}")]
    UnsupportedUniform {
        name: String,
        kind: UniformKind,
        reason: String,
    },
    #[error("texture '{0}' has nothing bound to it")]
    UnboundTexture(String),
    #[error("unknown texture handle {0:?}")]
    UnknownTexture(TextureHandle),
    #[error("unknown program handle {0:?}")]
    UnknownProgram(ProgramHandle),
    #[error("render target {0:?} is sampled while it is bound for writing")]
    TargetFeedback(RenderTarget),
    #[error("no render target is bound")]
    NoTargetBound,
    #[error("{width}x{height} is outside the supported texture size range 1..={limit}")]
    TextureTooLarge { width: u32, height: u32, limit: u32 },
    #[error("GPU device error: {0}")]
    Device(String),
    #[error("pixel readback failed: {0}")]
    Readback(String),
    #[error("surface has been disposed")]
    Disposed,
}

/// Drawing operations the blur pipeline needs from a GPU backend.
///
/// Uniform values persist per program until overwritten. Every draw replaces
/// the full contents of the bound render target.
pub trait GpuSurface {
    /// Current size of both render targets.
    fn target_size(&self) -> (u32, u32);

    fn create_texture(&mut self, source: TextureSource<'_>) -> Result<TextureHandle, SurfaceError>;

    fn release_texture(&mut self, texture: TextureHandle);

    /// Compiles a fragment shader into a full-screen program.
    fn compile_program(&mut self, fragment_source: &str) -> Result<ProgramHandle, SurfaceError>;

    fn release_program(&mut self, program: ProgramHandle);

    fn bind_render_target(&mut self, target: RenderTarget) -> Result<(), SurfaceError>;

    /// Clears both render targets to transparent black.
    fn clear_render_targets(&mut self) -> Result<(), SurfaceError>;

    fn set_uniform(
        &mut self,
        program: ProgramHandle,
        name: &str,
        value: UniformValue,
    ) -> Result<(), SurfaceError>;

    /// Runs `program` over the whole bound render target.
    fn draw_full_screen_pass(&mut self, program: ProgramHandle) -> Result<(), SurfaceError>;

    /// Copies a render target back as tightly packed RGBA8 rows, top row first.
    fn read_pixels(&mut self, target: RenderTarget) -> Result<RgbaImage, SurfaceError>;

    /// Reallocates both render targets, discarding their contents.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError>;

    /// Frees every resource. Further calls fail with [`SurfaceError::Disposed`].
    fn dispose(&mut self);
}

impl<S: GpuSurface + ?Sized> GpuSurface for Box<S> {
    fn target_size(&self) -> (u32, u32) {
        (**self).target_size()
    }

    fn create_texture(&mut self, source: TextureSource<'_>) -> Result<TextureHandle, SurfaceError> {
        (**self).create_texture(source)
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        (**self).release_texture(texture)
    }

    fn compile_program(&mut self, fragment_source: &str) -> Result<ProgramHandle, SurfaceError> {
        (**self).compile_program(fragment_source)
    }

    fn release_program(&mut self, program: ProgramHandle) {
        (**self).release_program(program)
    }

    fn bind_render_target(&mut self, target: RenderTarget) -> Result<(), SurfaceError> {
        (**self).bind_render_target(target)
    }

    fn clear_render_targets(&mut self) -> Result<(), SurfaceError> {
        (**self).clear_render_targets()
    }

    fn set_uniform(
        &mut self,
        program: ProgramHandle,
        name: &str,
        value: UniformValue,
    ) -> Result<(), SurfaceError> {
        (**self).set_uniform(program, name, value)
    }

    fn draw_full_screen_pass(&mut self, program: ProgramHandle) -> Result<(), SurfaceError> {
        (**self).draw_full_screen_pass(program)
    }

    fn read_pixels(&mut self, target: RenderTarget) -> Result<RgbaImage, SurfaceError> {
        (**self).read_pixels(target)
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), SurfaceError> {
        (**self).resize(width, height)
    }

    fn dispose(&mut self) {
        (**self).dispose()
    }
}

/// Prefixes every line of `source` with its 1-based line number.
pub fn annotate_source(source: &str) -> String {
    let width = source.lines().count().max(1).to_string().len();
    let mut annotated = String::with_capacity(source.len() + source.len() / 8);
    for (index, line) in source.lines().enumerate() {
        annotated.push_str(&format!("{:>width$}: {line}\n", index + 1));
    }
    annotated
}
