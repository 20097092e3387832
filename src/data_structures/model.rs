//! Backend-independent geometry.

use std::cell::RefCell;

use cgmath::{InnerSpace, Vector3, Zero};

use crate::data_structures::any::AnySlot;

/// Triangle geometry shared by any number of [`Object`](super::object::Object)s.
///
/// Models are handed around as `Rc<Model>`. The `backend_data` slot is filled
/// by the first backend upload and checked by every later one, so a model is
/// sent to the GPU once no matter how many objects reference it.
#[derive(Debug, Default)]
pub struct Model {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tex_coords: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
    pub backend_data: RefCell<AnySlot>,
}

impl Model {
    pub fn new(
        name: impl Into<String>,
        positions: Vec<[f32; 3]>,
        normals: Vec<[f32; 3]>,
        tex_coords: Vec<[f32; 2]>,
        indices: Vec<u32>,
    ) -> Self {
        Self {
            name: name.into(),
            positions,
            normals,
            tex_coords,
            indices,
            backend_data: RefCell::new(AnySlot::new()),
        }
    }

    /// A unit quad in the XZ plane facing both up and down.
    ///
    /// Each face has its own four vertices so the normals stay flat:
    /// 8 vertices, 12 indices.
    pub fn double_sided_quad() -> Self {
        let corners = [
            [-0.5, 0.0, -0.5],
            [0.5, 0.0, -0.5],
            [0.5, 0.0, 0.5],
            [-0.5, 0.0, 0.5],
        ];
        let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

        let mut positions = Vec::with_capacity(8);
        let mut normals = Vec::with_capacity(8);
        let mut tex_coords = Vec::with_capacity(8);
        for normal in [[0.0, 1.0, 0.0], [0.0, -1.0, 0.0]] {
            positions.extend_from_slice(&corners);
            normals.extend(std::iter::repeat_n(normal, 4));
            tex_coords.extend_from_slice(&uvs);
        }

        // top face winds counter-clockwise seen from +Y, bottom face the other way
        let indices = vec![0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7];

        Self::new("quad", positions, normals, tex_coords, indices)
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Whether a backend has already uploaded this model.
    pub fn is_uploaded(&self) -> bool {
        !self.backend_data.borrow().is_empty()
    }

    /// Replaces the normals with smooth per-vertex normals.
    ///
    /// Face normals are accumulated on every vertex of the face (area weighted,
    /// since the cross product is not normalised) and then normalised.
    pub fn compute_normals(&mut self) {
        let mut accumulated = vec![Vector3::<f32>::zero(); self.positions.len()];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if a >= self.positions.len() || b >= self.positions.len() || c >= self.positions.len()
            {
                continue;
            }
            let p0: Vector3<f32> = self.positions[a].into();
            let p1: Vector3<f32> = self.positions[b].into();
            let p2: Vector3<f32> = self.positions[c].into();
            let face = (p1 - p0).cross(p2 - p0);
            accumulated[a] += face;
            accumulated[b] += face;
            accumulated[c] += face;
        }
        self.normals = accumulated
            .into_iter()
            .map(|n| {
                if n.magnitude2() > f32::EPSILON {
                    n.normalize().into()
                } else {
                    [0.0, 1.0, 0.0]
                }
            })
            .collect();
    }
}
