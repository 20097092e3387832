//! The renderer contract both backends implement.
//!
//! A renderer walks through a fixed lifecycle:
//!
//! ```text
//! Uninitialized --initialize--> Initialized --bind_scene_resources--> SceneBound
//!   SceneBound --render_frame--> Rendering --render_frame--> Rendering
//!   SceneBound | Rendering --release_resources--> Released
//! ```
//!
//! [`RendererState::check`] rejects every other call with
//! [`RenderError::InvalidState`], except `release_resources`, which is a
//! harmless no-op when there is nothing to release.

use std::{
    any::Any,
    cell::{Cell, RefCell},
    fmt,
    sync::Arc,
};

use cgmath::Matrix4;
use winit::window::Window;

use crate::{
    config::RendererConfig,
    data_structures::{
        any::AnySlot,
        model::Model,
        scene::{OPENGL_TO_VULKAN_MATRIX, OPENGL_TO_WGPU_MATRIX, Scene},
        shader::Shader,
    },
    error::{RenderError, Result},
    immediate::ImmediateRenderer,
    vulkan::VulkanRenderer,
};

/// The four lifecycle calls of a [`Renderer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Initialize,
    BindScene,
    RenderFrame,
    Release,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Initialize => f.write_str("initialize"),
            Operation::BindScene => f.write_str("bind scene resources for"),
            Operation::RenderFrame => f.write_str("render a frame with"),
            Operation::Release => f.write_str("release"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RendererState {
    #[default]
    Uninitialized,
    Initialized,
    SceneBound,
    Rendering,
    Released,
}

impl fmt::Display for RendererState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RendererState::Uninitialized => f.write_str("uninitialized"),
            RendererState::Initialized => f.write_str("initialized"),
            RendererState::SceneBound => f.write_str("bound to a scene"),
            RendererState::Rendering => f.write_str("rendering"),
            RendererState::Released => f.write_str("released"),
        }
    }
}

impl RendererState {
    /// Fails if `op` is not allowed in this state.
    pub fn check(self, op: Operation) -> Result<()> {
        use RendererState::*;
        let allowed = match op {
            Operation::Initialize => self == Uninitialized,
            Operation::BindScene => self == Initialized,
            Operation::RenderFrame => matches!(self, SceneBound | Rendering),
            Operation::Release => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(RenderError::InvalidState {
                operation: op,
                state: self,
            })
        }
    }

    /// State after `op` completed successfully.
    pub fn after(self, op: Operation) -> RendererState {
        use RendererState::*;
        match (self, op) {
            (Uninitialized, Operation::Initialize) => Initialized,
            (Initialized, Operation::BindScene) => SceneBound,
            (SceneBound | Rendering, Operation::RenderFrame) => Rendering,
            (Uninitialized, Operation::Release) => Uninitialized,
            (_, Operation::Release) => Released,
            (state, _) => state,
        }
    }

    /// Whether a release from this state has anything to free.
    pub fn holds_resources(self) -> bool {
        matches!(
            self,
            RendererState::Initialized | RendererState::SceneBound | RendererState::Rendering
        )
    }

    pub fn holds_scene(self) -> bool {
        matches!(self, RendererState::SceneBound | RendererState::Rendering)
    }
}

/// A rendering backend.
///
/// The application talks to backends only through this trait, so swapping
/// one for the other never touches scene code.
pub trait Renderer {
    /// Short human readable backend name.
    fn name(&self) -> &'static str;

    fn state(&self) -> RendererState;

    /// Sets up whatever device and surface context the backend needs for `window`.
    fn initialize(&mut self, window: Arc<Window>) -> Result<()>;

    /// Compiles shaders, uploads geometry and builds per-object state for every
    /// object in `scene`. Runs once; objects added afterwards are never drawn.
    fn bind_scene_resources(&mut self, scene: &mut Scene) -> Result<()>;

    /// Draws and presents one frame. Does not change the scene.
    fn render_frame(&mut self, scene: &Scene) -> Result<()>;

    /// Waits for the GPU and frees everything `bind_scene_resources` and
    /// `initialize` created, newest first.
    fn release_resources(&mut self, scene: &mut Scene) -> Result<()>;

    /// Number of frames handed to the presentation engine so far.
    fn frames_presented(&self) -> u64;

    /// Object, model and shader bundles currently alive on the GPU.
    fn resource_counts(&self) -> ResourceCounts;
}

/// Selects one of the two backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Vulkan,
    Immediate,
}

impl Backend {
    /// Matrix to multiply on the left of an OpenGL-style projection so it
    /// lands in this backend's clip space.
    pub fn clip_correction(self) -> Matrix4<f32> {
        match self {
            Backend::Vulkan => OPENGL_TO_VULKAN_MATRIX,
            Backend::Immediate => OPENGL_TO_WGPU_MATRIX,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Vulkan => f.write_str("vulkan"),
            Backend::Immediate => f.write_str("immediate"),
        }
    }
}

pub fn create_renderer(backend: Backend, config: RendererConfig) -> Box<dyn Renderer> {
    match backend {
        Backend::Vulkan => Box::new(VulkanRenderer::new(config)),
        Backend::Immediate => Box::new(ImmediateRenderer::new(config)),
    }
}

/// Runs `upload` only if `slot` is still empty and stores its result there.
///
/// Returns `true` when the upload ran. Models and shaders are shared between
/// objects through `Rc`, and this is what keeps each of them from being
/// uploaded or compiled twice.
pub fn upload_once<T, F>(slot: &RefCell<AnySlot>, upload: F) -> Result<bool>
where
    T: Any + Clone,
    F: FnOnce() -> Result<T>,
{
    if !slot.borrow().is_empty() {
        return Ok(false);
    }
    let value = upload()?;
    slot.borrow_mut().set(value);
    Ok(true)
}

/// Which kind of backend bundle a [`ResourceCounter`] entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Object,
    Model,
    Shader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceCounts {
    pub objects: usize,
    pub models: usize,
    pub shaders: usize,
}

impl fmt::Display for ResourceCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} object(s), {} model(s), {} shader(s)",
            self.objects, self.models, self.shaders
        )
    }
}

/// Running tally of live bundles, bumped on upload and dropped on release.
#[derive(Debug, Default)]
pub struct ResourceCounter(Cell<ResourceCounts>);

impl ResourceCounter {
    pub fn get(&self) -> ResourceCounts {
        self.0.get()
    }

    pub fn created(&self, kind: ResourceKind) {
        let mut counts = self.0.get();
        *counts.entry(kind) += 1;
        self.0.set(counts);
    }

    pub fn freed(&self, kind: ResourceKind) {
        let mut counts = self.0.get();
        let entry = counts.entry(kind);
        *entry = entry.saturating_sub(1);
        self.0.set(counts);
    }
}

impl ResourceCounts {
    fn entry(&mut self, kind: ResourceKind) -> &mut usize {
        match kind {
            ResourceKind::Object => &mut self.objects,
            ResourceKind::Model => &mut self.models,
            ResourceKind::Shader => &mut self.shaders,
        }
    }
}

/// Empties every backend slot of `scene` that holds one of the given types.
///
/// `wait` runs first. Objects are freed newest first, then each model, then
/// each shader; a model or shader shared by several objects sits in one slot,
/// so it is handed out once. Slots holding some other type are left alone.
/// The walk always completes, and a failed `wait` is reported afterwards.
pub fn release_scene_slots<O, M, S>(
    scene: &mut Scene,
    wait: impl FnOnce() -> Result<()>,
    mut free_object: impl FnMut(usize, O),
    mut free_model: impl FnMut(&Model, M),
    mut free_shader: impl FnMut(&Shader, S),
) -> Result<()>
where
    O: Any,
    M: Any,
    S: Any,
{
    let waited = wait();
    if let Err(err) = &waited {
        log::error!("Releasing anyway after: {err}");
    }

    for (index, object) in scene.objects.iter_mut().enumerate().rev() {
        if let Ok(data) = object.backend_data.take::<O>() {
            free_object(index, data);
        }
    }

    for object in scene.objects.iter().rev() {
        let taken = object.model.backend_data.borrow_mut().take::<M>();
        if let Ok(data) = taken {
            log::trace!("Releasing model {}", object.model.name);
            free_model(&object.model, data);
        }
    }

    for object in scene.objects.iter().rev() {
        for shader in [&object.fragment_shader, &object.vertex_shader] {
            let taken = shader.backend_data.borrow_mut().take::<S>();
            if let Ok(data) = taken {
                free_shader(shader, data);
            }
        }
    }

    waited
}
