//! Application event loop.
//!
//! [`run`] opens the window, hands it to the selected backend, binds the scene
//! once and then draws on every `RedrawRequested` until the window is closed,
//! Escape is released or the optional frame limit is hit. Resources are
//! released before `run` returns, on success and on failure alike.
//!
//! # Lifecycle
//!
//! 1. `resumed`: create the window, build the scene, `initialize`, `bind_scene_resources`
//! 2. `RedrawRequested`: `render_frame`, count it, request the next redraw
//! 3. `exiting`: `release_resources`

use std::{rc::Rc, sync::Arc};

use anyhow::{Context as _, anyhow};
use cgmath::{Deg, Point3, Vector3};
use instant::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use crate::{
    config::RendererConfig,
    data_structures::{
        light::Light,
        model::Model,
        object::{Material, Object},
        scene::Scene,
        shader::Shader,
    },
    renderer::{Backend, Renderer, RendererState, create_renderer},
    resources,
};

/// How often the loop reports its frame rate.
pub const FPS_INTERVAL: Duration = Duration::from_secs(5);

/// Sets up `env_logger` once, honouring `RUST_LOG` and defaulting to `info`.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");
    if let Err(e) = env_logger::Builder::from_env(env).try_init() {
        eprintln!("Warning: Could not initialize logger: {}", e);
    }
}

/// What [`run`] should do.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub backend: Backend,
    pub config: RendererConfig,
    /// Stop after this many presented frames.
    pub frame_limit: Option<u64>,
}

impl RunOptions {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            config: RendererConfig::default(),
            frame_limit: None,
        }
    }
}

/// Returned by [`run`] once the loop has stopped and everything was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub backend: Backend,
    pub frames_presented: u64,
}

/// Counts frames and yields the average rate once per interval.
#[derive(Debug)]
pub struct FpsCounter {
    interval: Duration,
    window_start: Instant,
    frames: u64,
}

impl FpsCounter {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            frames: 0,
        }
    }

    /// Records one frame at `now`. Returns `(frames, fps)` for the elapsed
    /// window when at least `interval` has passed, then starts a new window.
    pub fn frame(&mut self, now: Instant) -> Option<(u64, f64)> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }
        let report = (self.frames, self.frames as f64 / elapsed.as_secs_f64());
        self.window_start = now;
        self.frames = 0;
        Some(report)
    }
}

/// The sample scene: a cube hovering over a floor quad, lit by one point light
/// above it, seen from a corner.
pub fn demo_scene(backend: Backend, config: &RendererConfig) -> crate::error::Result<Scene> {
    let [width, height] = config.window_size;
    let aspect = width as f32 / height.max(1) as f32;

    let mut scene = Scene::new(
        Scene::look_at(
            Point3::new(15.0, 15.0, 15.0),
            Point3::new(0.0, 0.0, 0.0),
            Vector3::unit_y(),
        ),
        backend.clip_correction() * Scene::perspective(Deg(70.0), aspect, 0.1, 1000.0),
        Point3::new(20.0, 20.0, 20.0),
    );
    scene.lights.point = Light::point(Vector3::new(0.0, 20.0, 0.0));

    let vertex = Rc::new(Shader::vertex("shaders/phong.vert"));
    let fragment = Rc::new(Shader::fragment("shaders/phong.frag"));

    let cube = Rc::new(resources::load_model("models/cube.obj")?);
    scene
        .add_object(Object::new(cube, vertex.clone(), fragment.clone()))
        .translate(Vector3::new(0.0, -5.0, 0.0))
        .scale(Vector3::new(5.0, 5.0, 5.0));

    let floor = Rc::new(Model::double_sided_quad());
    scene
        .add_object(
            Object::new(floor, vertex, fragment).with_material(Material {
                ambient: [0.3, 0.3, 0.35, 1.0],
                diffuse: [0.6, 0.6, 0.7, 1.0],
                specular: [0.1, 0.1, 0.1, 1.0],
                hardness: 2.0,
            }),
        )
        .translate(Vector3::new(0.0, -8.0, 0.0))
        .scale(Vector3::new(30.0, 1.0, 30.0));

    Ok(scene)
}

type SceneBuilder = Box<dyn FnOnce(Backend, &RendererConfig) -> crate::error::Result<Scene>>;

struct App {
    options: RunOptions,
    build_scene: Option<SceneBuilder>,
    renderer: Box<dyn Renderer>,
    scene: Scene,
    window: Option<Arc<Window>>,
    fps: FpsCounter,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(options: RunOptions, build_scene: SceneBuilder) -> Self {
        let renderer = create_renderer(options.backend, options.config.clone());
        Self {
            options,
            build_scene: Some(build_scene),
            renderer,
            scene: Scene::default(),
            window: None,
            fps: FpsCounter::new(FPS_INTERVAL, Instant::now()),
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    fn setup(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let [width, height] = self.options.config.window_size;
        let attributes = Window::default_attributes()
            .with_title(self.options.config.window_title.clone())
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(false);
        let window = Arc::new(event_loop.create_window(attributes)?);
        self.window = Some(window.clone());

        let build_scene = self
            .build_scene
            .take()
            .ok_or_else(|| anyhow!("scene was already built"))?;
        self.scene = build_scene(self.options.backend, &self.options.config)
            .context("Failed to build the scene")?;

        let started = Instant::now();
        self.renderer
            .initialize(window.clone())
            .with_context(|| format!("Failed to initialize the {} backend", self.renderer.name()))?;
        self.renderer
            .bind_scene_resources(&mut self.scene)
            .context("Failed to bind the scene")?;
        log::info!(
            "{} backend ready in {:.3}s holding {}",
            self.renderer.name(),
            started.elapsed().as_secs_f64(),
            self.renderer.resource_counts()
        );

        self.fps = FpsCounter::new(FPS_INTERVAL, Instant::now());
        window.request_redraw();
        Ok(())
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        if self.renderer.state() != RendererState::SceneBound
            && self.renderer.state() != RendererState::Rendering
        {
            return Ok(());
        }
        self.renderer.render_frame(&self.scene)?;

        if let Some((frames, fps)) = self.fps.frame(Instant::now()) {
            log::info!("{} frames, {:.1} FPS", frames, fps);
        }

        let presented = self.renderer.frames_presented();
        if self.options.frame_limit.is_some_and(|limit| presented >= limit) {
            log::info!("Frame limit reached after {} frame(s)", presented);
            event_loop.exit();
        } else if let Some(window) = &self.window {
            window.request_redraw();
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Err(e) = self.renderer.release_resources(&mut self.scene) {
            log::error!("Releasing the {} backend failed: {}", self.renderer.name(), e);
            if self.error.is_none() {
                self.error = Some(e.into());
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.setup(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Released,
                        ..
                    },
                ..
            } => event_loop.exit(),
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw(event_loop) {
                    self.fail(event_loop, e.context("Failed to render a frame"));
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.release();
    }
}

/// Runs the loop until the window closes and returns how many frames were
/// shown. `build_scene` is called once the window exists.
pub fn run<F>(options: RunOptions, build_scene: F) -> anyhow::Result<RunSummary>
where
    F: FnOnce(Backend, &RendererConfig) -> crate::error::Result<Scene> + 'static,
{
    log::info!("Starting with the {} backend", options.backend);

    #[cfg(all(feature = "integration-tests", target_os = "linux"))]
    let event_loop = {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoop::builder().with_any_thread(true).build()?
    };
    #[cfg(not(all(feature = "integration-tests", target_os = "linux")))]
    let event_loop = EventLoop::new()?;

    let mut app = App::new(options, Box::new(build_scene));
    event_loop.run_app(&mut app)?;

    // covers loops that stopped before `exiting` was delivered
    app.release();

    if let Some(error) = app.error.take() {
        return Err(error);
    }
    Ok(RunSummary {
        backend: app.options.backend,
        frames_presented: app.renderer.frames_presented(),
    })
}
