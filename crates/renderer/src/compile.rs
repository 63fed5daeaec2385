use std::borrow::Cow;

use wgpu::naga::{self, ShaderStage};

use crate::surface::{annotate_source, SurfaceError};

/// Parses and validates a fragment shader on the CPU.
///
/// wgpu treats shader errors as device errors, so catching them here gives
/// callers line-numbered diagnostics instead of a lost device.
pub(crate) fn parse_fragment(source: &str) -> Result<naga::Module, SurfaceError> {
    let mut frontend = naga::front::glsl::Frontend::default();
    let module = frontend
        .parse(&naga::front::glsl::Options::from(ShaderStage::Fragment), source)
        .map_err(|errors| {
            let log = errors
                .errors
                .iter()
                .map(|error| {
                    let location = error.meta.location(source);
                    format!(
                        "line {}:{}: {}",
                        location.line_number, location.line_position, error.kind
                    )
                })
                .collect::<Vec<_>>()
                .join("\n");
            SurfaceError::Compile {
                stage: "fragment",
                log,
                annotated: annotate_source(source),
            }
        })?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .map_err(|err| SurfaceError::Compile {
        stage: "fragment",
        log: err.as_inner().to_string(),
        annotated: annotate_source(source),
    })?;

    Ok(module)
}

/// Compiles the static full-screen triangle vertex shader.
pub(crate) fn compile_vertex_shader(device: &wgpu::Device) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("fullscreen triangle vertex"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Borrowed(VERTEX_SHADER_GLSL),
            stage: ShaderStage::Vertex,
            defines: &[],
        },
    })
}

/// Hands an already validated fragment shader to wgpu.
pub(crate) fn compile_fragment_shader(
    device: &wgpu::Device,
    source: &str,
) -> Result<wgpu::ShaderModule, SurfaceError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("blur fragment"),
        source: wgpu::ShaderSource::Glsl {
            shader: Cow::Owned(source.to_owned()),
            stage: ShaderStage::Fragment,
            defines: &[],
        },
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(SurfaceError::Compile {
            stage: "fragment",
            log: err.to_string(),
            annotated: annotate_source(source),
        });
    }
    Ok(module)
}

/// Minimal full-screen triangle vertex shader.
///
/// `v_uv` runs top-down so uv (0, 0) lands on the first row of every texture
/// and render target, matching image row order on readback.
const VERTEX_SHADER_GLSL: &str = r"#version 450
layout(location = 0) out vec2 v_uv;

const vec2 positions[3] = vec2[3](
    vec2(-1.0, -3.0),
    vec2(3.0, 1.0),
    vec2(-1.0, 1.0)
);

void main() {
    uint vertex_index = uint(gl_VertexIndex);
    vec2 pos = positions[vertex_index];
    v_uv = vec2(pos.x * 0.5 + 0.5, 0.5 - pos.y * 0.5);
    gl_Position = vec4(pos, 0.0, 1.0);
}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_shader_parses_and_validates() {
        parse_fragment(crate::BLUR_FRAGMENT_SHADER).expect("blur shader should validate");
    }

    #[test]
    fn syntax_errors_report_line_numbers() {
        let source = "#version 450\nlayout(location = 0) out vec4 outColor;\nvoid main() {\n    outColor = vec4(1.0\n}\n";
        let err = parse_fragment(source).unwrap_err();
        match err {
            SurfaceError::Compile {
                stage,
                log,
                annotated,
            } => {
                assert_eq!(stage, "fragment");
                assert!(log.contains("line "), "{log}");
                assert!(annotated.contains("4:     outColor = vec4(1.0"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn vertex_shader_parses() {
        let mut frontend = naga::front::glsl::Frontend::default();
        frontend
            .parse(
                &naga::front::glsl::Options::from(ShaderStage::Vertex),
                VERTEX_SHADER_GLSL,
            )
            .expect("vertex shader should parse");
    }
}
