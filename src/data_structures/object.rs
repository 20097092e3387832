//! Renderable objects: a model placed in the world with a material and shaders.

use std::rc::Rc;

use cgmath::{InnerSpace, Matrix4, Rad, SquareMatrix, Vector3};

use crate::data_structures::{any::AnySlot, model::Model, shader::Shader};

/// Phong material parameters. Colours are RGBA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    /// Specular exponent.
    pub hardness: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: [1.0; 4],
            diffuse: [1.0; 4],
            specular: [1.0; 4],
            hardness: 5.0,
        }
    }
}

/// One entry of a [`Scene`](super::scene::Scene).
///
/// `backend_data` belongs to this object alone; it holds whatever the active
/// backend built for it (pipeline, uniform buffer, command buffers, ...).
#[derive(Debug)]
pub struct Object {
    pub model: Rc<Model>,
    pub transform: Matrix4<f32>,
    pub vertex_shader: Rc<Shader>,
    pub fragment_shader: Rc<Shader>,
    pub material: Material,
    pub backend_data: AnySlot,
}

impl Object {
    pub fn new(model: Rc<Model>, vertex_shader: Rc<Shader>, fragment_shader: Rc<Shader>) -> Self {
        Self {
            model,
            transform: Matrix4::identity(),
            vertex_shader,
            fragment_shader,
            material: Material::default(),
            backend_data: AnySlot::new(),
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    // The three transform helpers compose onto the right of the current matrix,
    // so the last call is applied to the vertices first.

    pub fn translate(&mut self, offset: Vector3<f32>) -> &mut Self {
        self.transform = self.transform * Matrix4::from_translation(offset);
        self
    }

    pub fn rotate(&mut self, angle: impl Into<Rad<f32>>, axis: Vector3<f32>) -> &mut Self {
        self.transform = self.transform * Matrix4::from_axis_angle(axis.normalize(), angle);
        self
    }

    pub fn scale(&mut self, factors: Vector3<f32>) -> &mut Self {
        self.transform =
            self.transform * Matrix4::from_nonuniform_scale(factors.x, factors.y, factors.z);
        self
    }
}
