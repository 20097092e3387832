use std::{collections::BTreeSet, path::Path};

use dual_render::{
    RenderError,
    data_structures::shader::{Shader, ShaderStage},
    error::ShaderPhase,
    resources::shader::{compile_glsl, link, load_and_compile, to_spirv},
};

const SPIRV_MAGIC: u32 = 0x0723_0203;

const STRAY_INPUT_FRAG: &str = r#"#version 450

layout(location = 0) in vec3 v_world_position;
layout(location = 2) in vec2 v_uv;

layout(location = 0) out vec4 f_colour;

void main() {
    f_colour = vec4(v_world_position + vec3(v_uv, 0.0), 1.0);
}
"#;

#[test]
fn bundled_shaders_compile_and_link() {
    let vertex = load_and_compile(&Shader::vertex("shaders/phong.vert")).unwrap();
    let fragment = load_and_compile(&Shader::fragment("shaders/phong.frag")).unwrap();

    let vertex_interface = vertex.interface();
    let fragment_interface = fragment.interface();
    assert_eq!(vertex_interface.stage, ShaderStage::Vertex);
    assert_eq!(vertex_interface.locations, BTreeSet::from([0, 1]));
    assert_eq!(fragment_interface.locations, BTreeSet::from([0, 1]));

    link(&vertex_interface, &fragment_interface).unwrap();
}

#[test]
fn bundled_shaders_lower_to_spirv() {
    for shader in [
        Shader::vertex("shaders/phong.vert"),
        Shader::fragment("shaders/phong.frag"),
    ] {
        let compiled = load_and_compile(&shader).unwrap();
        let words = to_spirv(&compiled).unwrap();
        assert!(words.len() > 5, "{} produced no code", shader.path.display());
        assert_eq!(words[0], SPIRV_MAGIC);
    }
}

#[test]
fn syntax_errors_carry_diagnostics() {
    let source = "#version 450\nvoid main() { this_is_not_defined(1.0); }\n";
    let err = compile_glsl(Path::new("broken.frag"), ShaderStage::Fragment, source).unwrap_err();
    match err {
        RenderError::Shader {
            path,
            phase,
            diagnostics,
        } => {
            assert_eq!(path, Path::new("broken.frag"));
            assert_eq!(phase, ShaderPhase::Compile);
            assert!(!diagnostics.is_empty());
        }
        other => panic!("expected a shader error, got {other:?}"),
    }
}

#[test]
fn unproduced_fragment_inputs_fail_to_link() {
    let vertex = load_and_compile(&Shader::vertex("shaders/phong.vert")).unwrap();
    let fragment =
        compile_glsl(Path::new("stray.frag"), ShaderStage::Fragment, STRAY_INPUT_FRAG).unwrap();

    let err = link(&vertex.interface(), &fragment.interface()).unwrap_err();
    match &err {
        RenderError::Shader {
            phase, diagnostics, ..
        } => {
            assert_eq!(*phase, ShaderPhase::Link);
            assert!(diagnostics.contains('2'), "{diagnostics}");
        }
        other => panic!("expected a link error, got {other:?}"),
    }
    assert!(err.to_string().contains("failed to link"));
}

#[test]
fn stages_must_be_in_order() {
    let vertex = load_and_compile(&Shader::vertex("shaders/phong.vert")).unwrap();
    let fragment = load_and_compile(&Shader::fragment("shaders/phong.frag")).unwrap();
    let err = link(&fragment.interface(), &vertex.interface()).unwrap_err();
    assert!(matches!(
        err,
        RenderError::Shader {
            phase: ShaderPhase::Link,
            ..
        }
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_compile(&Shader::vertex("shaders/does_not_exist.vert")).unwrap_err();
    assert!(matches!(err, RenderError::Io { .. }), "{err:?}");
}
