//! Material definitions: shader source plus pipeline state.

use crate::backend::{PipelineHandle, ShaderHandle};
use crate::shader::ShaderSource;

/// Forward shader with a per-frame scene uniform, a per-object model
/// matrix in push constants, and one directional light.
const LIT_SHADER: &str = r#"
struct SceneUniform {
    view_proj: mat4x4<f32>,
};
@group(0) @binding(0) var<uniform> scene: SceneUniform;

struct PushConstants {
    model: mat4x4<f32>,
};
var<push_constant> pc: PushConstants;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) color: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) normal: vec3<f32>,
    @location(1) color: vec3<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = scene.view_proj * pc.model * vec4<f32>(in.position, 1.0);
    out.normal = (pc.model * vec4<f32>(in.normal, 0.0)).xyz;
    out.color = in.color;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let light_dir = normalize(vec3<f32>(0.4, 0.8, 0.6));
    let diffuse = max(dot(normalize(in.normal), light_dir), 0.0);
    return vec4<f32>(in.color * (0.25 + diffuse * 0.75), 1.0);
}
"#;

/// Same interface as the lit shader, vertex color passed through.
const UNLIT_SHADER: &str = r#"
struct SceneUniform {
    view_proj: mat4x4<f32>,
};
@group(0) @binding(0) var<uniform> scene: SceneUniform;

struct PushConstants {
    model: mat4x4<f32>,
};
var<push_constant> pc: PushConstants;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) color: vec3<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
};

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = scene.view_proj * pc.model * vec4<f32>(in.position, 1.0);
    out.color = in.color;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color, 1.0);
}
"#;

/// How to build a material: a shader (WGSL with entry points `vs_main`
/// and `fs_main`, or precompiled SPIR-V) plus fixed pipeline state.
#[derive(Debug, Clone)]
pub struct MaterialDescriptor {
    pub name: String,
    pub shader: ShaderSource,
    pub depth_test: bool,
}

impl MaterialDescriptor {
    pub fn new(name: &str, wgsl: &str) -> Self {
        Self {
            name: name.to_string(),
            shader: ShaderSource::Wgsl(wgsl.to_string()),
            depth_test: true,
        }
    }

    /// Material from precompiled per-stage SPIR-V blobs.
    pub fn from_spirv(name: &str, vertex: Vec<u8>, fragment: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            shader: ShaderSource::SpirV { vertex, fragment },
            depth_test: true,
        }
    }

    pub fn with_depth_test(mut self, depth_test: bool) -> Self {
        self.depth_test = depth_test;
        self
    }

    // Preset materials

    pub fn lit(name: &str) -> Self {
        Self::new(name, LIT_SHADER)
    }

    pub fn unlit(name: &str) -> Self {
        Self::new(name, UNLIT_SHADER)
    }
}

/// Device-side material: compiled shader modules and their pipeline.
#[derive(Debug, Clone, Copy)]
pub struct GpuMaterial {
    pub vertex_shader: ShaderHandle,
    pub fragment_shader: ShaderHandle,
    pub pipeline: PipelineHandle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_defaults_to_depth_tested() {
        let descriptor = MaterialDescriptor::lit("opaque");
        assert!(descriptor.depth_test);
        assert!(!MaterialDescriptor::lit("ui").with_depth_test(false).depth_test);
    }

    #[test]
    fn presets_declare_both_entry_points() {
        for descriptor in [MaterialDescriptor::lit("a"), MaterialDescriptor::unlit("b")] {
            let ShaderSource::Wgsl(source) = &descriptor.shader else {
                panic!("presets carry WGSL");
            };
            assert!(source.contains("fn vs_main"));
            assert!(source.contains("fn fs_main"));
        }
    }
}
