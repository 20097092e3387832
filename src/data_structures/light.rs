use cgmath::{Deg, Vector3};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    Point,
    Sun,
    Spot,
}

/// A light source. `direction` and `angle` only matter for sun and spot lights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub position: Vector3<f32>,
    pub direction: Vector3<f32>,
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    /// Constant, linear and quadratic attenuation factors.
    pub attenuation: [f32; 3],
    /// Half-angle of a spot light's cone.
    pub angle: Deg<f32>,
}

impl Light {
    pub fn point(position: Vector3<f32>) -> Self {
        Self {
            kind: LightKind::Point,
            position,
            direction: Vector3::new(0.0, -1.0, 0.0),
            ambient: [0.4, 0.4, 0.4, 1.0],
            diffuse: [1.0; 4],
            specular: [0.2, 0.2, 0.2, 1.0],
            attenuation: [1.0, 0.0, 0.0],
            angle: Deg(180.0),
        }
    }

    pub fn sun(direction: Vector3<f32>) -> Self {
        Self {
            kind: LightKind::Sun,
            direction,
            ambient: [0.0, 0.0, 0.0, 1.0],
            ..Self::point(Vector3::new(0.0, 0.0, 0.0))
        }
    }

    pub fn spot(position: Vector3<f32>, direction: Vector3<f32>, angle: Deg<f32>) -> Self {
        Self {
            kind: LightKind::Spot,
            direction,
            angle,
            ambient: [0.0, 0.0, 0.0, 1.0],
            ..Self::point(position)
        }
    }
}

/// The fixed light rig of a scene: always a point light, optionally a sun and a spot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSet {
    pub point: Light,
    pub sun: Option<Light>,
    pub spot: Option<Light>,
}

impl Default for LightSet {
    fn default() -> Self {
        Self {
            point: Light::point(Vector3::new(0.0, 20.0, 0.0)),
            sun: None,
            spot: None,
        }
    }
}
