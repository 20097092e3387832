//! dual-render
//!
//! A small real-time 3D renderer that draws one lit scene through either of
//! two interchangeable backends: an explicit Vulkan backend built on `ash`,
//! and an immediate-mode backend that drives `wgpu` (GL by default) with
//! direct binds and draws every frame. Scene code never changes between them.
//!
//! High-level modules
//! - `config`: knobs shared by both backends
//! - `context`: wgpu device, queue and surface for the immediate backend
//! - `data_structures`: scene data (models, shaders, objects, lights) and the type-erased slot
//! - `error`: the error type every fallible operation returns
//! - `flow`: window and event loop driving a renderer
//! - `immediate`: the immediate-mode backend
//! - `pipelines`: pipeline construction and the uniform block both backends share
//! - `renderer`: the backend trait and its lifecycle state machine
//! - `resources`: OBJ and GLSL loading
//! - `vulkan`: the explicit backend and its environment manager
//!

pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod flow;
pub mod immediate;
pub mod pipelines;
pub mod renderer;
pub mod resources;
pub mod vulkan;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use config::RendererConfig;
pub use error::{RenderError, Result};
pub use renderer::{Backend, Renderer, RendererState, create_renderer};
