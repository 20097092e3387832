//! Backend-agnostic scene data.
//!
//! - `any` is the type-erased slot backends use to hang their own data on entities
//! - `model` holds shared triangle geometry
//! - `shader` references a GLSL source file and its compiled module
//! - `object` places a model in the world with a material and shaders
//! - `light` describes the fixed light rig
//! - `scene` bundles camera matrices, lights and objects
//! - `texture` is the depth attachment used by the immediate backend

pub mod any;
pub mod light;
pub mod model;
pub mod object;
pub mod scene;
pub mod shader;
pub mod texture;
