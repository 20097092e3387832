//! GLSL front end shared by both backends.
//!
//! Sources are parsed and validated with naga. The Vulkan backend lowers the
//! validated module to SPIR-V; the immediate backend hands the checked source
//! to wgpu. Errors carry naga's rendered diagnostics, the equivalent of a
//! compiler info log.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use naga::{
    Binding, Module, TypeInner,
    back::spv,
    front::glsl,
    valid::{Capabilities, ModuleInfo, ValidationFlags, Validator},
};

use crate::{
    data_structures::shader::{Shader, ShaderStage},
    error::{RenderError, Result, ShaderPhase},
    resources::load_string,
};

pub const ENTRY_POINT: &str = "main";

#[derive(Debug)]
pub struct CompiledShader {
    pub path: PathBuf,
    pub stage: ShaderStage,
    pub source: String,
    pub module: Module,
    pub info: ModuleInfo,
}

fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

fn compile_error(path: &Path, diagnostics: String) -> RenderError {
    RenderError::Shader {
        path: path.to_path_buf(),
        phase: ShaderPhase::Compile,
        diagnostics,
    }
}

/// Parses and validates GLSL `source` written for `stage`.
pub fn compile_glsl(path: &Path, stage: ShaderStage, source: &str) -> Result<CompiledShader> {
    let mut frontend = glsl::Frontend::default();
    let module = frontend
        .parse(&glsl::Options::from(naga_stage(stage)), source)
        .map_err(|errors| compile_error(path, errors.emit_to_string(source)))?;

    let info = Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|error| compile_error(path, error.emit_to_string(source)))?;

    if !module
        .entry_points
        .iter()
        .any(|ep| ep.stage == naga_stage(stage) && ep.name == ENTRY_POINT)
    {
        return Err(compile_error(
            path,
            format!("no {stage} entry point named `{ENTRY_POINT}`"),
        ));
    }

    Ok(CompiledShader {
        path: path.to_path_buf(),
        stage,
        source: source.to_string(),
        module,
        info,
    })
}

/// Reads the shader's source from disk and compiles it.
pub fn load_and_compile(shader: &Shader) -> Result<CompiledShader> {
    let source = load_string(&shader.path)?;
    compile_glsl(&shader.path, shader.stage, &source)
}

fn push_location(
    module: &Module,
    ty: naga::Handle<naga::Type>,
    binding: Option<&Binding>,
    out: &mut BTreeSet<u32>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => {
            out.insert(*location);
        }
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    push_location(module, member.ty, member.binding.as_ref(), out);
                }
            }
        }
    }
}

/// The locations a stage exchanges with its neighbour: outputs for a vertex
/// shader, inputs for a fragment shader.
///
/// Backends keep this next to their compiled module so objects that reuse an
/// already compiled shader can still be link-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub path: PathBuf,
    pub stage: ShaderStage,
    pub locations: BTreeSet<u32>,
}

impl CompiledShader {
    pub fn interface(&self) -> Interface {
        let locations = match self.stage {
            ShaderStage::Vertex => vertex_outputs(self),
            ShaderStage::Fragment => fragment_inputs(self),
        };
        Interface {
            path: self.path.clone(),
            stage: self.stage,
            locations,
        }
    }
}

/// Locations the vertex stage writes.
pub fn vertex_outputs(shader: &CompiledShader) -> BTreeSet<u32> {
    let mut out = BTreeSet::new();
    for ep in shader.module.entry_points.iter().filter(|ep| ep.name == ENTRY_POINT) {
        if let Some(result) = &ep.function.result {
            push_location(&shader.module, result.ty, result.binding.as_ref(), &mut out);
        }
    }
    out
}

/// Locations the fragment stage reads.
pub fn fragment_inputs(shader: &CompiledShader) -> BTreeSet<u32> {
    let mut out = BTreeSet::new();
    for ep in shader.module.entry_points.iter().filter(|ep| ep.name == ENTRY_POINT) {
        for arg in &ep.function.arguments {
            push_location(&shader.module, arg.ty, arg.binding.as_ref(), &mut out);
        }
    }
    out
}

/// Checks that the two stages fit together into one program.
pub fn link(vertex: &Interface, fragment: &Interface) -> Result<()> {
    let link_error = |diagnostics: String| RenderError::Shader {
        path: fragment.path.clone(),
        phase: ShaderPhase::Link,
        diagnostics,
    };
    if vertex.stage != ShaderStage::Vertex {
        return Err(link_error(format!(
            "{} is a {} shader, expected a vertex shader",
            vertex.path.display(),
            vertex.stage
        )));
    }
    if fragment.stage != ShaderStage::Fragment {
        return Err(link_error(format!(
            "{} is a {} shader, expected a fragment shader",
            fragment.path.display(),
            fragment.stage
        )));
    }

    let missing: Vec<String> = fragment
        .locations
        .difference(&vertex.locations)
        .map(u32::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(link_error(format!(
            "fragment input location(s) {} not written by {}",
            missing.join(", "),
            vertex.path.display()
        )));
    }
    Ok(())
}

/// Lowers a validated module to SPIR-V words.
pub fn to_spirv(shader: &CompiledShader) -> Result<Vec<u32>> {
    let mut options = spv::Options::default();
    // clip space is already corrected on the CPU side
    options
        .flags
        .remove(spv::WriterFlags::ADJUST_COORDINATE_SPACE);
    let pipeline_options = spv::PipelineOptions {
        shader_stage: naga_stage(shader.stage),
        entry_point: ENTRY_POINT.to_string(),
    };
    spv::write_vec(&shader.module, &shader.info, &options, Some(&pipeline_options))
        .map_err(|error| compile_error(&shader.path, error.to_string()))
}
