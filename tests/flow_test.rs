use dual_render::{
    Backend, RendererConfig,
    flow::{FPS_INTERVAL, FpsCounter, RunOptions, demo_scene},
};
use instant::{Duration, Instant};

#[test]
fn fps_is_reported_once_per_interval() {
    let start = Instant::now();
    let mut fps = FpsCounter::new(Duration::from_secs(5), start);

    for i in 1..100 {
        assert_eq!(fps.frame(start + Duration::from_millis(i * 40)), None);
    }
    let (frames, rate) = fps.frame(start + Duration::from_secs(5)).unwrap();
    assert_eq!(frames, 100);
    assert!((rate - 20.0).abs() < 1e-9);

    // the next window starts from scratch
    assert_eq!(fps.frame(start + Duration::from_secs(6)), None);
    let (frames, _) = fps.frame(start + Duration::from_secs(10)).unwrap();
    assert_eq!(frames, 2);
}

#[test]
fn run_options_default_to_an_unbounded_loop() {
    let options = RunOptions::new(Backend::Vulkan);
    assert_eq!(options.frame_limit, None);
    assert_eq!(options.config.window_size, [800, 800]);
    assert_eq!(FPS_INTERVAL, Duration::from_secs(5));
}

#[test]
fn demo_scene_shares_one_shader_pair() {
    let config = RendererConfig::default();
    let scene = demo_scene(Backend::Immediate, &config).unwrap();
    assert_eq!(scene.objects.len(), 2);

    let [cube, floor] = [&scene.objects[0], &scene.objects[1]];
    assert!(std::rc::Rc::ptr_eq(&cube.vertex_shader, &floor.vertex_shader));
    assert!(std::rc::Rc::ptr_eq(&cube.fragment_shader, &floor.fragment_shader));
    assert_eq!(cube.model.name, "cube");
    assert_eq!(cube.transform.w.y, -5.0);
    assert_eq!(scene.eye.x, 20.0);
    assert!(scene.objects.iter().all(|o| o.backend_data.is_empty()));
}

#[test]
fn demo_scene_projection_depends_on_the_backend() {
    let config = RendererConfig::default();
    let vulkan = demo_scene(Backend::Vulkan, &config).unwrap();
    let immediate = demo_scene(Backend::Immediate, &config).unwrap();
    assert_eq!(vulkan.view, immediate.view);
    assert_eq!(vulkan.projection.y.y, -immediate.projection.y.y);
}
