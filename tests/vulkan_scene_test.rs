#![cfg(feature = "integration-tests")]

use std::rc::Rc;

use ash::vk;
use dual_render::{
    Backend, Renderer, RendererConfig, RendererState,
    flow,
    renderer::ResourceCounts,
    vulkan::{VulkanModelData, VulkanObjectData, VulkanRenderer},
};

use crate::common::test_utils::{shared_model_scene, with_window};
mod common;

#[test]
fn shared_model_is_uploaded_once_and_every_slot_is_emptied() {
    flow::init_logging();
    with_window(|window| {
        let mut scene = shared_model_scene(Backend::Vulkan);
        let mut renderer = VulkanRenderer::new(RendererConfig::default());
        renderer.initialize(window).unwrap();

        let image_count = {
            let env = renderer.environment().unwrap();
            let scratch = env
                .create_image(
                    "scratch image",
                    env.extent,
                    vk::Format::R8G8B8A8_UNORM,
                    vk::ImageUsageFlags::COLOR_ATTACHMENT,
                    vk::ImageAspectFlags::COLOR,
                )
                .unwrap();
            assert_ne!(scratch.view, vk::ImageView::null());
            env.destroy_image(&scratch);
            env.framebuffers.len()
        };
        assert!(image_count > 0);

        renderer.bind_scene_resources(&mut scene).unwrap();
        assert_eq!(
            renderer.resource_counts(),
            ResourceCounts {
                objects: 3,
                models: 2,
                shaders: 2,
            }
        );

        let positions = |index: usize| {
            scene.objects[index]
                .model
                .backend_data
                .borrow()
                .get::<Rc<VulkanModelData>>()
                .unwrap()
                .positions
                .buffer
        };
        assert_eq!(positions(0), positions(1));
        assert_ne!(positions(0), positions(2));
        for object in &scene.objects {
            let data = object.backend_data.get::<Rc<VulkanObjectData>>().unwrap();
            assert_eq!(data.command_buffers.len(), image_count);
            assert_ne!(data.pipeline, vk::Pipeline::null());
        }

        renderer.render_frame(&scene).unwrap();
        assert_eq!(renderer.frames_presented(), 1);

        renderer.release_resources(&mut scene).unwrap();
        assert_eq!(renderer.state(), RendererState::Released);
        assert_eq!(renderer.resource_counts(), ResourceCounts::default());
        assert!(renderer.environment().is_none());
        for object in &scene.objects {
            assert!(object.backend_data.is_empty());
            assert!(!object.model.is_uploaded());
            assert!(!object.vertex_shader.is_compiled());
            assert!(!object.fragment_shader.is_compiled());
        }
    });
}
