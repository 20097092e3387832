use dual_render::{
    Backend, RenderError, Renderer, RendererConfig, RendererState, create_renderer,
    data_structures::scene::Scene,
    renderer::{Operation, ResourceCounts, upload_once},
};

use crate::common::test_utils::{
    FakeModelData, FakeObjectData, FakeShaderData, RecordingRenderer, shared_model_scene,
};
mod common;

#[test]
fn state_machine_table() {
    use Operation::*;
    use RendererState::*;

    let allowed = [
        (Uninitialized, Initialize, Some(Initialized)),
        (Uninitialized, BindScene, None),
        (Uninitialized, RenderFrame, None),
        (Uninitialized, Release, Some(Uninitialized)),
        (Initialized, Initialize, None),
        (Initialized, BindScene, Some(SceneBound)),
        (Initialized, RenderFrame, None),
        (Initialized, Release, Some(Released)),
        (SceneBound, Initialize, None),
        (SceneBound, BindScene, None),
        (SceneBound, RenderFrame, Some(Rendering)),
        (SceneBound, Release, Some(Released)),
        (Rendering, BindScene, None),
        (Rendering, RenderFrame, Some(Rendering)),
        (Rendering, Release, Some(Released)),
        (Released, Initialize, None),
        (Released, BindScene, None),
        (Released, RenderFrame, None),
        (Released, Release, Some(Released)),
    ];

    for (state, op, expected) in allowed {
        match (state.check(op), expected) {
            (Ok(()), Some(next)) => assert_eq!(state.after(op), next, "{state} -> {op}"),
            (Err(RenderError::InvalidState { operation, state: s }), None) => {
                assert_eq!(operation, op);
                assert_eq!(s, state);
            }
            (result, expected) => panic!("{state} -> {op}: got {result:?}, expected {expected:?}"),
        }
    }
}

#[test]
fn release_before_initialize_is_a_no_op() {
    let mut scene = Scene::default();
    for backend in [Backend::Vulkan, Backend::Immediate] {
        let mut renderer = create_renderer(backend, RendererConfig::default());
        assert_eq!(renderer.state(), RendererState::Uninitialized);
        renderer.release_resources(&mut scene).unwrap();
        assert_eq!(renderer.state(), RendererState::Uninitialized);
        assert_eq!(renderer.frames_presented(), 0);
    }
}

#[test]
fn rendering_an_unbound_renderer_is_rejected() {
    let scene = Scene::default();
    let mut renderer = create_renderer(Backend::Immediate, RendererConfig::default());
    let err = renderer.render_frame(&scene).unwrap_err();
    assert!(matches!(
        err,
        RenderError::InvalidState {
            operation: Operation::RenderFrame,
            state: RendererState::Uninitialized,
        }
    ));
    assert!(err.to_string().contains("uninitialized"), "{err}");
}

#[test]
fn binding_before_initialize_is_rejected() {
    let mut scene = shared_model_scene(Backend::Immediate);
    let mut renderer = create_renderer(Backend::Vulkan, RendererConfig::default());
    assert!(renderer.bind_scene_resources(&mut scene).is_err());
    assert!(scene.objects.iter().all(|o| o.backend_data.is_empty()));
}

#[test]
fn upload_once_runs_only_for_an_empty_slot() {
    let scene = shared_model_scene(Backend::Immediate);
    let mut calls = 0;
    for object in &scene.objects {
        upload_once(&object.model.backend_data, || {
            calls += 1;
            Ok(FakeModelData(object.model.name.clone()))
        })
        .unwrap();
    }
    // three objects, two distinct models
    assert_eq!(calls, 2);
}

#[test]
fn failed_upload_leaves_the_slot_empty() {
    let scene = shared_model_scene(Backend::Immediate);
    let slot = &scene.objects[0].model.backend_data;
    let result = upload_once::<FakeModelData, _>(slot, || {
        Err(RenderError::ResourceCreation {
            resource: "vertex buffer",
            reason: "out of memory".to_string(),
        })
    });
    assert!(result.is_err());
    assert!(slot.borrow().is_empty());
}

#[test]
fn shared_models_and_shaders_are_processed_once() {
    let mut scene = shared_model_scene(Backend::Immediate);
    let mut renderer = RecordingRenderer::new();
    renderer.initialize_headless().unwrap();
    renderer.bind_scene_resources(&mut scene).unwrap();

    assert_eq!(renderer.state(), RendererState::SceneBound);
    assert_eq!(
        renderer.resource_counts(),
        ResourceCounts {
            objects: 3,
            models: 2,
            shaders: 2,
        }
    );
    for (index, object) in scene.objects.iter().enumerate() {
        assert_eq!(object.backend_data.get::<FakeObjectData>(), Ok(&FakeObjectData(index)));
        assert!(object.model.is_uploaded());
        assert!(object.vertex_shader.is_compiled());
    }
}

#[test]
fn release_frees_objects_then_models_then_shaders() {
    let mut scene = shared_model_scene(Backend::Immediate);
    let mut renderer = RecordingRenderer::new();
    renderer.initialize_headless().unwrap();
    renderer.bind_scene_resources(&mut scene).unwrap();
    renderer.render_frame(&scene).unwrap();
    renderer.render_frame(&scene).unwrap();
    assert_eq!(renderer.frames_presented(), 2);

    renderer.release_resources(&mut scene).unwrap();
    assert_eq!(renderer.state(), RendererState::Released);

    let events = renderer.events();
    let released: Vec<&str> = events
        .iter()
        .map(String::as_str)
        .skip_while(|e| *e != "wait idle")
        .collect();
    assert_eq!(
        released,
        [
            "wait idle",
            "free object 2",
            "free object 1",
            "free object 0",
            "free model other",
            "free model quad",
            "free shader shaders/phong.frag",
            "free shader shaders/phong.vert",
            "drop context",
        ]
    );
    assert!(scene.objects.iter().all(|o| o.backend_data.is_empty()));
    assert!(scene.objects.iter().all(|o| !o.model.is_uploaded()));
    assert_eq!(renderer.resource_counts(), ResourceCounts::default());

    // a second release does nothing
    renderer.release_resources(&mut scene).unwrap();
    assert_eq!(renderer.events().len(), events.len());
}

#[test]
fn partial_bind_failure_releases_what_was_built() {
    let mut scene = shared_model_scene(Backend::Immediate);
    let mut renderer = RecordingRenderer::new();
    renderer.fail_at_object = Some(2);
    renderer.initialize_headless().unwrap();

    let err = renderer.bind_scene_resources(&mut scene).unwrap_err();
    assert!(matches!(err, RenderError::ResourceCreation { .. }));
    assert_eq!(renderer.state(), RendererState::Initialized);
    assert!(scene.objects.iter().all(|o| o.backend_data.is_empty()));
    assert!(scene.objects.iter().all(|o| !o.model.is_uploaded()));
    assert!(renderer.render_frame(&scene).is_err());

    renderer.release_resources(&mut scene).unwrap();
    assert_eq!(renderer.events().last().map(String::as_str), Some("drop context"));
}

#[test]
fn failed_idle_wait_still_releases_everything_and_is_reported() {
    let mut scene = shared_model_scene(Backend::Immediate);
    let mut renderer = RecordingRenderer::new();
    renderer.initialize_headless().unwrap();
    renderer.bind_scene_resources(&mut scene).unwrap();
    renderer.fail_wait = true;

    let err = renderer.release_resources(&mut scene).unwrap_err();
    assert!(matches!(err, RenderError::Synchronization { .. }), "{err}");
    assert_eq!(renderer.state(), RendererState::Released);
    assert_eq!(renderer.resource_counts(), ResourceCounts::default());
    assert!(scene.objects.iter().all(|o| o.backend_data.is_empty()));
    assert!(scene.objects.iter().all(|o| !o.model.is_uploaded()));
    assert!(scene.objects.iter().all(|o| !o.vertex_shader.is_compiled()));
    assert_eq!(renderer.events().last().map(String::as_str), Some("drop context"));

    // nothing left to report the second time
    renderer.release_resources(&mut scene).unwrap();
}

#[test]
fn release_walk_skips_slots_of_another_type() {
    let mut scene = shared_model_scene(Backend::Immediate);
    scene.objects[1].backend_data.set(FakeObjectData(1));
    scene.objects[0].backend_data.set(7_u32);

    let mut freed = Vec::new();
    dual_render::renderer::release_scene_slots(
        &mut scene,
        || Ok(()),
        |index, FakeObjectData(tag): FakeObjectData| freed.push((index, tag)),
        |_, _: FakeModelData| {},
        |_, _: FakeShaderData| {},
    )
    .unwrap();

    assert_eq!(freed, [(1, 1)]);
    assert_eq!(scene.objects[0].backend_data.get::<u32>(), Ok(&7));
}
