//! WGSL to SPIR-V shader compilation.

use crate::error::{RenderError, RenderResult};

/// Vertex entry point every material shader must declare.
pub const VERTEX_ENTRY_POINT: &str = "vs_main";
/// Fragment entry point every material shader must declare.
pub const FRAGMENT_ENTRY_POINT: &str = "fs_main";

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Per-stage SPIR-V produced from one WGSL module.
#[derive(Debug, Clone)]
pub struct CompiledShader {
    pub vertex_spirv: Vec<u32>,
    pub fragment_spirv: Vec<u32>,
}

/// Shader input accepted by material loading: WGSL compiled at load time,
/// or precompiled SPIR-V passed through after validation.
#[derive(Debug, Clone)]
pub enum ShaderSource {
    Wgsl(String),
    SpirV { vertex: Vec<u8>, fragment: Vec<u8> },
}

/// Produce per-stage SPIR-V from any accepted source form.
pub fn compile(source: &ShaderSource) -> RenderResult<CompiledShader> {
    match source {
        ShaderSource::Wgsl(text) => compile_wgsl(text),
        ShaderSource::SpirV { vertex, fragment } => Ok(CompiledShader {
            vertex_spirv: from_spirv_bytes(vertex)?,
            fragment_spirv: from_spirv_bytes(fragment)?,
        }),
    }
}

/// Compile a WGSL module with `vs_main` and `fs_main` entry points into
/// per-stage SPIR-V.
pub fn compile_wgsl(source: &str) -> RenderResult<CompiledShader> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| RenderError::ShaderCompilationFailed(format!("WGSL parse error: {e}")))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator
        .validate(&module)
        .map_err(|e| RenderError::ShaderCompilationFailed(format!("validation error: {e}")))?;

    let vertex_spirv = write_stage(
        &module,
        &info,
        naga::ShaderStage::Vertex,
        VERTEX_ENTRY_POINT,
    )?;
    let fragment_spirv = write_stage(
        &module,
        &info,
        naga::ShaderStage::Fragment,
        FRAGMENT_ENTRY_POINT,
    )?;
    log::debug!(
        "compiled WGSL module ({} + {} words)",
        vertex_spirv.len(),
        fragment_spirv.len()
    );
    Ok(CompiledShader {
        vertex_spirv,
        fragment_spirv,
    })
}

fn write_stage(
    module: &naga::Module,
    info: &naga::valid::ModuleInfo,
    stage: naga::ShaderStage,
    entry_point: &str,
) -> RenderResult<Vec<u32>> {
    module
        .entry_points
        .iter()
        .position(|ep| ep.name == entry_point && ep.stage == stage)
        .ok_or_else(|| {
            RenderError::ShaderCompilationFailed(format!(
                "entry point '{}' not found for stage {:?}",
                entry_point, stage
            ))
        })?;

    let options = naga::back::spv::Options {
        lang_version: (1, 3),
        flags: naga::back::spv::WriterFlags::empty(),
        capabilities: None,
        bounds_check_policies: naga::proc::BoundsCheckPolicies::default(),
        binding_map: Default::default(),
        debug_info: None,
        zero_initialize_workgroup_memory: naga::back::spv::ZeroInitializeWorkgroupMemoryMode::None,
    };
    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: stage,
        entry_point: entry_point.to_string(),
    };

    naga::back::spv::write_vec(module, info, &options, Some(&pipeline_options))
        .map_err(|e| RenderError::ShaderCompilationFailed(format!("SPIR-V generation error: {e}")))
}

/// Reinterpret precompiled SPIR-V bytes as words, checking alignment and
/// the module magic number.
pub fn from_spirv_bytes(bytes: &[u8]) -> RenderResult<Vec<u32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(RenderError::ShaderCompilationFailed(format!(
            "SPIR-V byte length {} is not a positive multiple of 4",
            bytes.len()
        )));
    }
    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if words[0] != SPIRV_MAGIC {
        return Err(RenderError::ShaderCompilationFailed(format!(
            "bad SPIR-V magic number {:#010x}",
            words[0]
        )));
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_SHADER: &str = r#"
        @vertex
        fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
            return vec4<f32>(position, 1.0);
        }

        @fragment
        fn fs_main() -> @location(0) vec4<f32> {
            return vec4<f32>(1.0, 0.0, 1.0, 1.0);
        }
    "#;

    #[test]
    fn minimal_module_compiles_for_both_stages() {
        let compiled = compile_wgsl(MINIMAL_SHADER).unwrap();
        assert_eq!(compiled.vertex_spirv[0], SPIRV_MAGIC);
        assert_eq!(compiled.fragment_spirv[0], SPIRV_MAGIC);
    }

    #[test]
    fn parse_errors_surface_as_shader_compilation_failures() {
        let err = compile_wgsl("fn broken(").unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompilationFailed(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn missing_entry_point_is_rejected() {
        let source = r#"
            @vertex
            fn vertex_only() -> @builtin(position) vec4<f32> {
                return vec4<f32>(0.0, 0.0, 0.0, 1.0);
            }
        "#;
        let err = compile_wgsl(source).unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompilationFailed(_)));
    }

    #[test]
    fn spirv_bytes_are_validated() {
        assert!(from_spirv_bytes(&[]).is_err());
        assert!(from_spirv_bytes(&[1, 2, 3]).is_err());
        assert!(from_spirv_bytes(&[0xff; 8]).is_err());

        let mut good = Vec::new();
        good.extend_from_slice(&SPIRV_MAGIC.to_le_bytes());
        good.extend_from_slice(&0x0001_0300u32.to_le_bytes());
        let words = from_spirv_bytes(&good).unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn precompiled_spirv_round_trips_through_compile() {
        let wgsl = compile_wgsl(MINIMAL_SHADER).unwrap();
        let to_bytes =
            |words: &[u32]| -> Vec<u8> { words.iter().flat_map(|w| w.to_le_bytes()).collect() };

        let recompiled = compile(&ShaderSource::SpirV {
            vertex: to_bytes(&wgsl.vertex_spirv),
            fragment: to_bytes(&wgsl.fragment_spirv),
        })
        .unwrap();
        assert_eq!(recompiled.vertex_spirv, wgsl.vertex_spirv);
        assert_eq!(recompiled.fragment_spirv, wgsl.fragment_spirv);
    }
}
