//! Pipeline construction for both backends plus the uniform block they share.
//!
//! Both backends feed the same GLSL shaders, so the per-object uniform block
//! is laid out once here. Every member is a `vec4` or `mat4`, which keeps the
//! `#[repr(C)]` layout identical to std140 without padding fields.

use cgmath::{Matrix4, Vector3};

use crate::data_structures::{
    light::Light,
    object::{Material, Object},
    scene::Scene,
};

pub mod immediate;
pub mod vulkan;

/// Binding of positions in the vertex input.
pub const POSITION_LOCATION: u32 = 0;
/// Binding of normals in the vertex input.
pub const NORMAL_LOCATION: u32 = 1;
/// Size in bytes of one position or normal.
pub const VEC3_STRIDE: u64 = std::mem::size_of::<[f32; 3]>() as u64;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    /// Only `x` is used.
    pub hardness: [f32; 4],
}

impl From<&Material> for MaterialUniform {
    fn from(material: &Material) -> Self {
        Self {
            ambient: material.ambient,
            diffuse: material.diffuse,
            specular: material.specular,
            hardness: [material.hardness, 0.0, 0.0, 0.0],
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    pub position: [f32; 4],
    /// `w` holds the cosine of the spot cone half-angle.
    pub direction: [f32; 4],
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    /// Constant, linear, quadratic. `w` is 1 when the light is switched on.
    pub attenuation: [f32; 4],
}

impl LightUniform {
    /// A switched off light. Shaders skip it entirely.
    pub fn disabled() -> Self {
        bytemuck::Zeroable::zeroed()
    }

    pub fn is_enabled(&self) -> bool {
        self.attenuation[3] > 0.5
    }
}

impl From<&Light> for LightUniform {
    fn from(light: &Light) -> Self {
        let cos_cutoff = cgmath::Rad::from(light.angle).0.cos();
        Self {
            position: extend(light.position, 1.0),
            direction: extend(light.direction, cos_cutoff),
            ambient: light.ambient,
            diffuse: light.diffuse,
            specular: light.specular,
            attenuation: [
                light.attenuation[0],
                light.attenuation[1],
                light.attenuation[2],
                1.0,
            ],
        }
    }
}

fn extend(v: Vector3<f32>, w: f32) -> [f32; 4] {
    [v.x, v.y, v.z, w]
}

/// Everything one draw call needs, bound at set 0 binding 0.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectUniform {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub eye: [f32; 4],
    pub material: MaterialUniform,
    pub point: LightUniform,
    pub sun: LightUniform,
    pub spot: LightUniform,
}

impl ObjectUniform {
    pub fn new(scene: &Scene, object: &Object) -> Self {
        let lights = &scene.lights;
        Self {
            model: mat(object.transform),
            view: mat(scene.view),
            proj: mat(scene.projection),
            eye: [scene.eye.x, scene.eye.y, scene.eye.z, 1.0],
            material: MaterialUniform::from(&object.material),
            point: LightUniform::from(&lights.point),
            sun: lights
                .sun
                .as_ref()
                .map_or_else(LightUniform::disabled, LightUniform::from),
            spot: lights
                .spot
                .as_ref()
                .map_or_else(LightUniform::disabled, LightUniform::from),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

fn mat(m: Matrix4<f32>) -> [[f32; 4]; 4] {
    m.into()
}

pub const OBJECT_UNIFORM_SIZE: u64 = std::mem::size_of::<ObjectUniform>() as u64;
