#![cfg(feature = "integration-tests")]

use dual_render::{
    Backend, Renderer, RendererConfig, RendererState,
    flow,
    immediate::{ImmediateModelData, ImmediateObjectData, ImmediateRenderer},
    renderer::ResourceCounts,
};

use crate::common::test_utils::{shared_model_scene, with_window};
mod common;

#[test]
fn shared_model_is_uploaded_once_and_every_slot_is_emptied() {
    flow::init_logging();
    with_window(|window| {
        let mut scene = shared_model_scene(Backend::Immediate);
        let mut renderer = ImmediateRenderer::new(RendererConfig::default());
        renderer.initialize(window).unwrap();
        assert!(renderer.context().is_some());

        renderer.bind_scene_resources(&mut scene).unwrap();
        assert_eq!(
            renderer.resource_counts(),
            ResourceCounts {
                objects: 3,
                models: 2,
                shaders: 2,
            }
        );
        for object in &scene.objects {
            assert!(object.backend_data.holds::<ImmediateObjectData>());
            assert!(object.model.backend_data.borrow().holds::<ImmediateModelData>());
        }

        renderer.render_frame(&scene).unwrap();
        renderer.render_frame(&scene).unwrap();
        assert_eq!(renderer.frames_presented(), 2);

        renderer.release_resources(&mut scene).unwrap();
        assert_eq!(renderer.state(), RendererState::Released);
        assert_eq!(renderer.resource_counts(), ResourceCounts::default());
        assert!(renderer.context().is_none());
        for object in &scene.objects {
            assert!(object.backend_data.is_empty());
            assert!(!object.model.is_uploaded());
            assert!(!object.vertex_shader.is_compiled());
            assert!(!object.fragment_shader.is_compiled());
        }
    });
}
