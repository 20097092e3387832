use std::{
    any::Any,
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    rc::Rc,
    sync::Arc,
};

use cgmath::{Deg, Point3, Vector3};
use dual_render::{
    Backend, RenderError, Renderer, RendererState, Result,
    data_structures::{
        light::Light,
        model::Model,
        object::Object,
        scene::Scene,
        shader::Shader,
    },
    renderer::{
        Operation, ResourceCounter, ResourceCounts, ResourceKind, release_scene_slots,
        upload_once,
    },
};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FakeModelData(pub String);

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FakeShaderData(pub PathBuf);

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FakeObjectData(pub usize);

/// A renderer that touches no GPU and writes down what it would have done.
///
/// It follows the same state machine and shares the upload and release
/// helpers with the real backends, so ordering rules can be checked headless.
pub(crate) struct RecordingRenderer {
    state: RendererState,
    events: Rc<RefCell<Vec<String>>>,
    /// Makes `bind_scene_resources` fail on this object.
    pub fail_at_object: Option<usize>,
    /// Makes the idle wait before a release fail.
    pub fail_wait: bool,
    counts: ResourceCounter,
    frames: u64,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self {
            state: RendererState::Uninitialized,
            events: Rc::new(RefCell::new(Vec::new())),
            fail_at_object: None,
            fail_wait: false,
            counts: ResourceCounter::default(),
            frames: 0,
        }
    }

    /// `initialize` without a window.
    pub fn initialize_headless(&mut self) -> Result<()> {
        self.state.check(Operation::Initialize)?;
        self.record("initialize".to_string());
        self.state = self.state.after(Operation::Initialize);
        Ok(())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    fn record(&self, event: String) {
        self.events.borrow_mut().push(event);
    }

    fn prepare_shader(&mut self, shader: &Shader) -> Result<()> {
        let compiled = upload_once(&shader.backend_data, || {
            Ok(FakeShaderData(shader.path.clone()))
        })?;
        if compiled {
            self.counts.created(ResourceKind::Shader);
            self.record(format!("compile {}", shader.path.display()));
        }
        Ok(())
    }

    fn release_scene(&self, scene: &mut Scene) -> Result<()> {
        release_scene_slots(
            scene,
            || {
                self.record("wait idle".to_string());
                if self.fail_wait {
                    return Err(RenderError::Synchronization {
                        operation: "waiting for the device to idle",
                        reason: "device lost".to_string(),
                    });
                }
                Ok(())
            },
            |_, FakeObjectData(index): FakeObjectData| {
                self.counts.freed(ResourceKind::Object);
                self.record(format!("free object {index}"));
            },
            |_, FakeModelData(name): FakeModelData| {
                self.counts.freed(ResourceKind::Model);
                self.record(format!("free model {name}"));
            },
            |_, FakeShaderData(path): FakeShaderData| {
                self.counts.freed(ResourceKind::Shader);
                self.record(format!("free shader {}", path.display()));
            },
        )
    }
}

impl Default for RecordingRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for RecordingRenderer {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn state(&self) -> RendererState {
        self.state
    }

    fn initialize(&mut self, _window: Arc<Window>) -> Result<()> {
        self.initialize_headless()
    }

    fn bind_scene_resources(&mut self, scene: &mut Scene) -> Result<()> {
        self.state.check(Operation::BindScene)?;
        for index in 0..scene.objects.len() {
            if self.fail_at_object == Some(index) {
                self.release_scene(scene)?;
                return Err(RenderError::ResourceCreation {
                    resource: "pipeline",
                    reason: format!("object {index} refused"),
                });
            }
            let object = &scene.objects[index];
            let (vertex, fragment) = (object.vertex_shader.clone(), object.fragment_shader.clone());
            self.prepare_shader(&vertex)?;
            self.prepare_shader(&fragment)?;

            let model = object.model.clone();
            if upload_once(&model.backend_data, || Ok(FakeModelData(model.name.clone())))? {
                self.counts.created(ResourceKind::Model);
                self.record(format!("upload model {}", model.name));
            }
            scene.objects[index].backend_data.set(FakeObjectData(index));
            self.counts.created(ResourceKind::Object);
            self.record(format!("build object {index}"));
        }
        self.state = self.state.after(Operation::BindScene);
        Ok(())
    }

    fn render_frame(&mut self, scene: &Scene) -> Result<()> {
        self.state.check(Operation::RenderFrame)?;
        for object in &scene.objects {
            object.backend_data.get::<FakeObjectData>()?;
        }
        self.frames += 1;
        self.state = self.state.after(Operation::RenderFrame);
        Ok(())
    }

    fn release_resources(&mut self, scene: &mut Scene) -> Result<()> {
        self.state.check(Operation::Release)?;
        let mut outcome = Ok(());
        if self.state.holds_scene() {
            outcome = self.release_scene(scene);
        }
        if self.state.holds_resources() {
            self.record("drop context".to_string());
        }
        self.state = self.state.after(Operation::Release);
        outcome
    }

    fn frames_presented(&self) -> u64 {
        self.frames
    }

    fn resource_counts(&self) -> ResourceCounts {
        self.counts.get()
    }
}

pub(crate) fn phong_shaders() -> (Rc<Shader>, Rc<Shader>) {
    (
        Rc::new(Shader::vertex("shaders/phong.vert")),
        Rc::new(Shader::fragment("shaders/phong.frag")),
    )
}

/// An empty scene seen from a corner, lit by a single point light.
pub(crate) fn lit_scene(backend: Backend) -> Scene {
    let mut scene = Scene::new(
        Scene::look_at(
            Point3::new(15.0, 15.0, 15.0),
            Point3::new(0.0, 0.0, 0.0),
            Vector3::unit_y(),
        ),
        backend.clip_correction() * Scene::perspective(Deg(70.0), 1.0, 0.1, 1000.0),
        Point3::new(20.0, 20.0, 20.0),
    );
    scene.lights.point = Light::point(Vector3::new(0.0, 20.0, 0.0));
    scene
}

/// One double-sided quad below the camera.
pub(crate) fn quad_scene(backend: Backend) -> Scene {
    let mut scene = lit_scene(backend);
    let (vertex, fragment) = phong_shaders();
    scene
        .add_object(Object::new(Rc::new(Model::double_sided_quad()), vertex, fragment))
        .translate(Vector3::new(0.0, -5.0, 0.0))
        .scale(Vector3::new(10.0, 1.0, 10.0));
    scene
}

/// Two objects sharing one model and one pair of shaders, plus a third with its own model.
pub(crate) fn shared_model_scene(backend: Backend) -> Scene {
    let mut scene = lit_scene(backend);
    let (vertex, fragment) = phong_shaders();
    let shared = Rc::new(Model::double_sided_quad());
    let mut other = Model::double_sided_quad();
    other.name = "other".to_string();
    let other = Rc::new(other);

    scene.add_object(Object::new(shared.clone(), vertex.clone(), fragment.clone()));
    scene
        .add_object(Object::new(shared, vertex.clone(), fragment.clone()))
        .translate(Vector3::new(2.0, 0.0, 0.0));
    scene.add_object(Object::new(other, vertex, fragment));
    scene
}

struct WindowHarness<F> {
    test: Option<F>,
    failure: Option<Box<dyn Any + Send>>,
}

impl<F: FnOnce(Arc<Window>)> ApplicationHandler for WindowHarness<F> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(test) = self.test.take() else {
            return;
        };
        let attributes = Window::default_attributes()
            .with_title("dual-render test")
            .with_inner_size(PhysicalSize::new(320, 320))
            .with_resizable(false);
        let outcome = match event_loop.create_window(attributes) {
            Ok(window) => panic::catch_unwind(AssertUnwindSafe(|| test(Arc::new(window)))),
            Err(err) => Err(Box::new(format!("creating the test window: {err}")) as Box<dyn Any + Send>),
        };
        if let Err(payload) = outcome {
            self.failure = Some(payload);
        }
        event_loop.exit();
    }

    fn window_event(&mut self, _: &ActiveEventLoop, _: WindowId, _: WindowEvent) {}
}

#[cfg(target_os = "linux")]
fn test_event_loop() -> EventLoop<()> {
    use winit::platform::wayland::EventLoopBuilderExtWayland;
    EventLoop::builder().with_any_thread(true).build().unwrap()
}

#[cfg(not(target_os = "linux"))]
fn test_event_loop() -> EventLoop<()> {
    EventLoop::new().unwrap()
}

/// Opens a window, runs `test` with it and closes it again. Panics in `test`
/// are re-raised once the event loop has stopped.
///
/// winit allows one event loop per process, so a test binary calls this once.
pub(crate) fn with_window<F>(test: F)
where
    F: FnOnce(Arc<Window>) + 'static,
{
    let mut harness = WindowHarness {
        test: Some(test),
        failure: None,
    };
    test_event_loop().run_app(&mut harness).unwrap();
    if let Some(payload) = harness.failure {
        panic::resume_unwind(payload);
    }
}
