//! Uniform layout discovered from the shader itself.
//!
//! Programs are compiled from arbitrary GLSL, so instead of a fixed `Pod`
//! struct the std140 block is reflected out of the naga module and values are
//! written into a byte image of the block by member name.

use std::collections::HashMap;

use wgpu::naga;

use crate::surface::{SurfaceError, UniformValue};

/// Bind group holding the single std140 uniform block.
pub(crate) const UNIFORM_GROUP: u32 = 0;
/// Bind group holding textures and samplers.
pub(crate) const TEXTURE_GROUP: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Scalar {
    Float,
    Int,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArrayElement {
    Scalar(Scalar),
    Vec4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FieldShape {
    Scalar(Scalar),
    /// Float vector with 2, 3 or 4 components.
    Vector(u32),
    Array {
        element: ArrayElement,
        len: u32,
        stride: u32,
    },
}

impl FieldShape {
    fn describe(&self) -> String {
        let scalar = |scalar: &Scalar| match scalar {
            Scalar::Float => "float",
            Scalar::Int => "int",
        };
        match self {
            FieldShape::Scalar(kind) => scalar(kind).to_string(),
            FieldShape::Vector(components) => format!("vec{components}"),
            FieldShape::Array { element, len, .. } => match element {
                ArrayElement::Scalar(kind) => format!("{}[{len}]", scalar(kind)),
                ArrayElement::Vec4 => format!("vec4[{len}]"),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct UniformField {
    pub offset: u32,
    pub shape: FieldShape,
}

#[derive(Clone, Debug)]
pub(crate) struct UniformBlock {
    pub binding: u32,
    pub size: u32,
    pub fields: HashMap<String, UniformField>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TextureSlot {
    pub name: String,
    pub binding: u32,
}

/// Everything a program exposes to the host.
#[derive(Clone, Debug, Default)]
pub(crate) struct ShaderInterface {
    pub block: Option<UniformBlock>,
    pub textures: Vec<TextureSlot>,
    pub samplers: Vec<u32>,
}

impl ShaderInterface {
    pub(crate) fn reflect(module: &naga::Module) -> Result<Self, SurfaceError> {
        let mut interface = ShaderInterface::default();
        for (_, global) in module.global_variables.iter() {
            let Some(binding) = global.binding.as_ref() else {
                continue;
            };
            let name = global.name.clone().unwrap_or_default();
            match global.space {
                naga::AddressSpace::Uniform => {
                    if binding.group != UNIFORM_GROUP {
                        return Err(SurfaceError::Link(format!(
                            "uniform block '{name}' must live in set {UNIFORM_GROUP}"
                        )));
                    }
                    if interface.block.is_some() {
                        return Err(SurfaceError::Link(
                            "only one uniform block per program is supported".into(),
                        ));
                    }
                    let naga::TypeInner::Struct { members, span } = &module.types[global.ty].inner
                    else {
                        return Err(SurfaceError::Link(format!(
                            "uniform '{name}' must be declared inside a block"
                        )));
                    };
                    let fields = members
                        .iter()
                        .filter_map(|member| {
                            let name = member.name.clone()?;
                            let shape = field_shape(module, member.ty)?;
                            Some((
                                name,
                                UniformField {
                                    offset: member.offset,
                                    shape,
                                },
                            ))
                        })
                        .collect();
                    interface.block = Some(UniformBlock {
                        binding: binding.binding,
                        size: *span,
                        fields,
                    });
                }
                naga::AddressSpace::Handle => {
                    if binding.group != TEXTURE_GROUP {
                        return Err(SurfaceError::Link(format!(
                            "texture or sampler '{name}' must live in set {TEXTURE_GROUP}"
                        )));
                    }
                    match module.types[global.ty].inner {
                        naga::TypeInner::Image {
                            dim: naga::ImageDimension::D2,
                            arrayed: false,
                            ..
                        } => interface.textures.push(TextureSlot {
                            name,
                            binding: binding.binding,
                        }),
                        naga::TypeInner::Sampler { comparison: false } => {
                            interface.samplers.push(binding.binding)
                        }
                        _ => {
                            return Err(SurfaceError::Link(format!(
                                "'{name}' is not a plain 2D texture or filtering sampler"
                            )))
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(interface)
    }

    pub(crate) fn field(&self, name: &str) -> Option<&UniformField> {
        self.block.as_ref()?.fields.get(name)
    }

    pub(crate) fn texture_binding(&self, name: &str) -> Option<u32> {
        self.textures
            .iter()
            .find(|slot| slot.name == name)
            .map(|slot| slot.binding)
    }
}

fn scalar_of(scalar: naga::Scalar) -> Option<Scalar> {
    match (scalar.kind, scalar.width) {
        (naga::ScalarKind::Float, 4) => Some(Scalar::Float),
        (naga::ScalarKind::Sint, 4) => Some(Scalar::Int),
        _ => None,
    }
}

fn field_shape(module: &naga::Module, ty: naga::Handle<naga::Type>) -> Option<FieldShape> {
    match module.types[ty].inner {
        naga::TypeInner::Scalar(scalar) => scalar_of(scalar).map(FieldShape::Scalar),
        naga::TypeInner::Vector { size, scalar } if scalar_of(scalar) == Some(Scalar::Float) => {
            Some(FieldShape::Vector(size as u32))
        }
        naga::TypeInner::Array {
            base,
            size: naga::ArraySize::Constant(len),
            stride,
        } => {
            let element = match module.types[base].inner {
                naga::TypeInner::Scalar(scalar) => ArrayElement::Scalar(scalar_of(scalar)?),
                naga::TypeInner::Vector {
                    size: naga::VectorSize::Quad,
                    scalar,
                } if scalar_of(scalar) == Some(Scalar::Float) => ArrayElement::Vec4,
                _ => return None,
            };
            Some(FieldShape::Array {
                element,
                len: len.get(),
                stride,
            })
        }
        _ => None,
    }
}

#[derive(Clone, Copy)]
struct ArrayLayout {
    offset: usize,
    len: usize,
    stride: usize,
}

/// CPU copy of a program's uniform block.
#[derive(Clone, Debug)]
pub(crate) struct UniformStaging {
    bytes: Vec<u8>,
}

impl UniformStaging {
    pub(crate) fn new(size: u32) -> Self {
        Self {
            bytes: vec![0; size as usize],
        }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn write(
        &mut self,
        name: &str,
        field: &UniformField,
        value: &UniformValue,
    ) -> Result<(), SurfaceError> {
        let offset = field.offset as usize;
        let mismatch = || SurfaceError::UnsupportedUniform {
            name: name.to_string(),
            kind: value.kind(),
            reason: format!("the shader declares it as {}", field.shape.describe()),
        };
        match (field.shape, value) {
            (FieldShape::Scalar(Scalar::Float), UniformValue::Float(v)) => {
                self.put(offset, bytemuck::bytes_of(v))
            }
            (FieldShape::Scalar(Scalar::Int), UniformValue::Int(v)) => {
                self.put(offset, bytemuck::bytes_of(v))
            }
            (FieldShape::Vector(2), UniformValue::Vec2(v)) => {
                self.put(offset, bytemuck::cast_slice(v))
            }
            (FieldShape::Vector(3), UniformValue::Vec3(v)) => {
                self.put(offset, bytemuck::cast_slice(v))
            }
            (FieldShape::Vector(4), UniformValue::Vec4(v)) => {
                self.put(offset, bytemuck::cast_slice(v))
            }
            (FieldShape::Array { element, len, stride }, value) => {
                let array = ArrayLayout {
                    offset,
                    len: len as usize,
                    stride: stride as usize,
                };
                match (element, value) {
                    (ArrayElement::Scalar(Scalar::Float), UniformValue::FloatArray(values)) => {
                        self.put_array(name, value, array, values)?
                    }
                    (ArrayElement::Scalar(Scalar::Int), UniformValue::IntArray(values)) => {
                        self.put_array(name, value, array, values)?
                    }
                    (ArrayElement::Vec4, UniformValue::Vec4Array(values)) => {
                        self.put_array(name, value, array, values)?
                    }
                    _ => return Err(mismatch()),
                }
            }
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    /// Writes `values` element by element and zeroes the unused tail.
    fn put_array<T: bytemuck::Pod>(
        &mut self,
        name: &str,
        value: &UniformValue,
        array: ArrayLayout,
        values: &[T],
    ) -> Result<(), SurfaceError> {
        if values.len() > array.len {
            return Err(SurfaceError::UnsupportedUniform {
                name: name.to_string(),
                kind: value.kind(),
                reason: format!(
                    "{} elements given but the shader array holds {}",
                    values.len(),
                    array.len
                ),
            });
        }
        for index in 0..array.len {
            let start = array.offset + index * array.stride;
            match values.get(index) {
                Some(element) => self.put(start, bytemuck::bytes_of(element)),
                None => self.zero(start, std::mem::size_of::<T>()),
            }
        }
        Ok(())
    }

    fn put(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }

    fn zero(&mut self, offset: usize, len: usize) {
        self.bytes[offset..offset + len].fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blur_interface() -> ShaderInterface {
        let module = crate::compile::parse_fragment(crate::BLUR_FRAGMENT_SHADER).unwrap();
        ShaderInterface::reflect(&module).unwrap()
    }

    #[test]
    fn reflects_blur_block_std140() {
        let interface = blur_interface();
        let block = interface.block.as_ref().expect("uniform block");
        assert_eq!(block.binding, 0);

        let offset = interface.field("uTileOffset").unwrap();
        assert_eq!(offset.offset, 8);
        assert_eq!(offset.shape, FieldShape::Vector(2));

        let radius = interface.field("uRadius").unwrap();
        assert_eq!(radius.offset, 20);
        assert_eq!(radius.shape, FieldShape::Scalar(Scalar::Int));

        let kernel = interface.field("uKernel").unwrap();
        assert_eq!(kernel.offset, 32);
        assert_eq!(
            kernel.shape,
            FieldShape::Array {
                element: ArrayElement::Scalar(Scalar::Float),
                len: crate::MAX_KERNEL_LEN as u32,
                stride: 16,
            }
        );
        assert!(block.size >= 32 + 16 * crate::MAX_KERNEL_LEN as u32);
    }

    #[test]
    fn reflects_texture_and_sampler_bindings() {
        let interface = blur_interface();
        assert_eq!(interface.texture_binding("tex"), Some(0));
        assert_eq!(interface.texture_binding("influenceMask"), Some(1));
        assert_eq!(interface.texture_binding("missing"), None);
        assert_eq!(interface.samplers, vec![2]);
    }

    #[test]
    fn writes_arrays_with_stride_and_zeroes_tail() {
        let interface = blur_interface();
        let block = interface.block.as_ref().unwrap();
        let field = *interface.field("uKernel").unwrap();
        let mut staging = UniformStaging::new(block.size);

        staging
            .write("uKernel", &field, &UniformValue::FloatArray(vec![1.0, 2.0, 3.0]))
            .unwrap();
        let read = |staging: &UniformStaging, at: usize| {
            f32::from_le_bytes(staging.bytes()[at..at + 4].try_into().unwrap())
        };
        assert_eq!(read(&staging, 32), 1.0);
        assert_eq!(read(&staging, 48), 2.0);
        assert_eq!(read(&staging, 64), 3.0);

        staging
            .write("uKernel", &field, &UniformValue::FloatArray(vec![5.0]))
            .unwrap();
        assert_eq!(read(&staging, 32), 5.0);
        assert_eq!(read(&staging, 48), 0.0);
    }

    #[test]
    fn rejects_mismatched_values() {
        let interface = blur_interface();
        let block = interface.block.as_ref().unwrap();
        let mut staging = UniformStaging::new(block.size);

        let radius = *interface.field("uRadius").unwrap();
        let err = staging
            .write("uRadius", &radius, &UniformValue::Float(1.0))
            .unwrap_err();
        assert!(matches!(err, SurfaceError::UnsupportedUniform { .. }));

        let kernel = *interface.field("uKernel").unwrap();
        let too_long = vec![0.0; crate::MAX_KERNEL_LEN + 1];
        let err = staging
            .write("uKernel", &kernel, &UniformValue::FloatArray(too_long))
            .unwrap_err();
        assert!(err.to_string().contains("holds 641"), "{err}");
    }
}
