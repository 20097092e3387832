use cgmath::{Matrix4, Point3, Rad, SquareMatrix, Vector3};

use crate::data_structures::{any::AnySlot, light::LightSet, object::Object};

/// Maps cgmath's OpenGL clip space (depth in `[-1, 1]`) to a `[0, 1]` depth range.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Same depth remap as [`OPENGL_TO_WGPU_MATRIX`] plus a Y flip, since Vulkan's
/// clip space points Y down.
#[rustfmt::skip]
pub const OPENGL_TO_VULKAN_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, -1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Everything a backend draws in one frame.
///
/// Objects are drawn in the order they appear in `objects`. The topology is
/// fixed once the scene has been bound to a renderer.
#[derive(Debug)]
pub struct Scene {
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub eye: Point3<f32>,
    pub lights: LightSet,
    pub objects: Vec<Object>,
    /// Scene-wide backend state, e.g. command buffers shared by all objects.
    pub backend_data: AnySlot,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
            eye: Point3::new(0.0, 0.0, 0.0),
            lights: LightSet::default(),
            objects: Vec::new(),
            backend_data: AnySlot::new(),
        }
    }
}

impl Scene {
    pub fn new(view: Matrix4<f32>, projection: Matrix4<f32>, eye: Point3<f32>) -> Self {
        Self {
            view,
            projection,
            eye,
            ..Default::default()
        }
    }

    /// Right-handed view matrix looking from `eye` at `target`.
    pub fn look_at(eye: Point3<f32>, target: Point3<f32>, up: Vector3<f32>) -> Matrix4<f32> {
        Matrix4::look_at_rh(eye, target, up)
    }

    /// OpenGL-style perspective projection. Multiply a backend's clip
    /// correction on the left before handing it to a renderer.
    pub fn perspective(fovy: impl Into<Rad<f32>>, aspect: f32, near: f32, far: f32) -> Matrix4<f32> {
        cgmath::perspective(fovy, aspect, near, far)
    }

    pub fn add_object(&mut self, object: Object) -> &mut Object {
        self.objects.push(object);
        let last = self.objects.len() - 1;
        &mut self.objects[last]
    }
}
