//! Math types shared by the spatial index, portal geometry and terrain tiles

pub use nalgebra::{Quaternion, Unit, Vector2, Vector3};

/// 2D vector type (texture coordinates)
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// Unit quaternion used for node rotations
pub type Quat = Unit<Quaternion<f32>>;

/// World placement of a scene node: scale, then rotation, then translation
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Translation
    pub position: Vec3,

    /// Orientation
    pub rotation: Quat,

    /// Per-axis scale
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Pure translation
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Map a local-space point to world space
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation * self.scale.component_mul(&point)
    }

    /// Rotate a direction; scale and translation do not apply
    pub fn rotate_vector(&self, vector: Vec3) -> Vec3 {
        self.rotation * vector
    }
}

/// Tolerances
pub mod constants {
    /// Slack used by the ray/box slab classification
    pub const RAY_BOX_EPSILON: f32 = 1e-5;
}

/// Small helpers
pub mod utils {
    use super::Vec3;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees.to_radians()
    }

    /// True when every component of `a` is strictly less than the matching one of `b`
    pub fn all_less(a: &Vec3, b: &Vec3) -> bool {
        a.x < b.x && a.y < b.y && a.z < b.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_point_scales_rotates_then_translates() {
        let rotation = Quat::from_axis_angle(&Vec3::y_axis(), std::f32::consts::FRAC_PI_2);
        let transform = Transform {
            position: Vec3::new(10.0, 0.0, 0.0),
            rotation,
            scale: Vec3::new(2.0, 2.0, 2.0),
        };

        let p = transform.transform_point(Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 10.0, epsilon = 1e-5);
        assert_relative_eq!(p.z, -2.0, epsilon = 1e-5);

        let direction = transform.rotate_vector(Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(direction, Vec3::new(0.0, 0.0, -1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_all_less_is_strict() {
        assert!(utils::all_less(&Vec3::new(1.0, 1.0, 1.0), &Vec3::new(2.0, 2.0, 2.0)));
        assert!(!utils::all_less(&Vec3::new(1.0, 2.0, 1.0), &Vec3::new(2.0, 2.0, 2.0)));
    }
}
