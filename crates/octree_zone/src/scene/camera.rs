//! # Camera and view frustum
//!
//! Provides the camera description used for culling and the six-plane view
//! frustum built from it. Frustum planes face inwards: the positive side of
//! every plane is inside the view volume.
//!
//! ## Coordinate System
//! Right-handed, Y-up. The camera looks from `position` towards `target`.

use serde::{Deserialize, Serialize};

use crate::foundation::math::{utils, Vec3};
use crate::spatial::{Aabb, Extent, Plane, PlaneSide, Sphere};

/// Projection used by a camera
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    /// Perspective projection using the camera's vertical field of view
    Perspective,
    /// Orthographic projection with the given view height in world units
    Orthographic {
        /// Height of the view volume
        height: f32,
    },
}

/// Result of classifying a volume against a frustum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Completely culled
    None,
    /// Partially inside; contents need their own tests
    Partial,
    /// Completely inside; contents are visible without further tests
    Full,
}

/// 3D Camera for perspective and orthographic projections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,

    /// Point the camera is looking at in world space
    pub target: Vec3,

    /// Up vector for camera orientation (typically [0, 1, 0])
    pub up: Vec3,

    /// Vertical field of view angle in radians
    pub fov: f32,

    /// Aspect ratio (width / height)
    pub aspect: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane; infinite when not finite
    pub far: f32,

    /// Projection type
    pub projection: Projection,

    /// Height of the viewport in pixels, used for screen-space error metrics
    pub viewport_height: u32,
}

impl Camera {
    /// Create a new perspective camera with standard Y-up orientation
    ///
    /// The default target is the origin and the up vector is +Y.
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::new(0.0, 1.0, 0.0),
            fov: utils::deg_to_rad(fov_degrees),
            aspect,
            near,
            far,
            projection: Projection::Perspective,
            viewport_height: 768,
        }
    }

    /// Create an orthographic camera looking at the origin
    pub fn orthographic(position: Vec3, height: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Orthographic { height },
            ..Self::perspective(position, 60.0, aspect, near, far)
        }
    }

    /// Update camera position in world space
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        log::trace!("Camera position updated to: {:?}", position);
    }

    /// Update camera target (look-at point)
    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
        log::trace!("Camera target updated to: {:?}", target);
    }

    /// Configure camera to look at a specific point with custom up vector
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
        log::trace!("Camera look_at updated - target: {:?}, up: {:?}", target, up);
    }

    /// Set the viewport height in pixels
    pub fn set_viewport_height(&mut self, height: u32) {
        self.viewport_height = height;
    }

    /// Unit view direction
    pub fn direction(&self) -> Vec3 {
        (self.target - self.position)
            .try_normalize(0.0)
            .unwrap_or_else(|| -Vec3::z())
    }

    /// Orthonormal (right, up) basis of the view
    pub fn basis(&self) -> (Vec3, Vec3) {
        let forward = self.direction();
        let right = forward
            .cross(&self.up)
            .try_normalize(0.0)
            .unwrap_or_else(Vec3::x);
        let up = right.cross(&forward);
        (right, up)
    }

    /// Build the view frustum for the current camera state
    pub fn frustum(&self) -> Frustum {
        Frustum::from_camera(self)
    }
}

/// Index of each plane in [`Frustum::planes`]
pub mod frustum_plane {
    /// Near plane
    pub const NEAR: usize = 0;
    /// Far plane
    pub const FAR: usize = 1;
    /// Left plane
    pub const LEFT: usize = 2;
    /// Right plane
    pub const RIGHT: usize = 3;
    /// Top plane
    pub const TOP: usize = 4;
    /// Bottom plane
    pub const BOTTOM: usize = 5;
}

/// View frustum for culling
#[derive(Debug, Clone)]
pub struct Frustum {
    /// Six planes: near, far, left, right, top, bottom
    pub planes: [Plane; 6],

    /// When false the far plane is ignored
    pub finite_far: bool,
}

impl Frustum {
    /// Build the frustum planes of a camera
    pub fn from_camera(camera: &Camera) -> Self {
        use frustum_plane::{BOTTOM, FAR, LEFT, NEAR, RIGHT, TOP};

        let eye = camera.position;
        let forward = camera.direction();
        let (right, up) = camera.basis();
        let finite_far = camera.far.is_finite();

        let mut planes = [Plane::from_normal_point(forward, eye); 6];
        planes[NEAR] = Plane::from_normal_point(forward, eye + forward * camera.near);
        planes[FAR] = if finite_far {
            Plane::from_normal_point(-forward, eye + forward * camera.far)
        } else {
            planes[NEAR]
        };

        match camera.projection {
            Projection::Perspective => {
                let half_v = (camera.fov * 0.5).tan();
                let half_h = half_v * camera.aspect;

                let left_edge = forward - right * half_h;
                let right_edge = forward + right * half_h;
                let bottom_edge = forward - up * half_v;
                let top_edge = forward + up * half_v;

                planes[LEFT] = Plane::from_normal_point(left_edge.cross(&up), eye);
                planes[RIGHT] = Plane::from_normal_point(up.cross(&right_edge), eye);
                planes[BOTTOM] = Plane::from_normal_point(right.cross(&bottom_edge), eye);
                planes[TOP] = Plane::from_normal_point(top_edge.cross(&right), eye);
            }
            Projection::Orthographic { height } => {
                let half_v = height * 0.5;
                let half_h = half_v * camera.aspect;

                planes[LEFT] = Plane::from_normal_point(right, eye - right * half_h);
                planes[RIGHT] = Plane::from_normal_point(-right, eye + right * half_h);
                planes[BOTTOM] = Plane::from_normal_point(up, eye - up * half_v);
                planes[TOP] = Plane::from_normal_point(-up, eye + up * half_v);
            }
        }

        Self { planes, finite_far }
    }

    fn active_planes(&self) -> impl Iterator<Item = &Plane> {
        let skip_far = !self.finite_far;
        self.planes
            .iter()
            .enumerate()
            .filter(move |(index, _)| !(skip_far && *index == frustum_plane::FAR))
            .map(|(_, plane)| plane)
    }

    /// Classify a box against the frustum
    pub fn visibility(&self, aabb: &Aabb) -> Visibility {
        match aabb.extent() {
            Extent::Null => return Visibility::None,
            Extent::Infinite => return Visibility::Partial,
            Extent::Finite => {}
        }

        let center = aabb.center();
        let half = aabb.half_size();
        let mut all_inside = true;

        for plane in self.active_planes() {
            match plane.side_of_center_half(center, half) {
                PlaneSide::Negative => return Visibility::None,
                PlaneSide::Both => all_inside = false,
                _ => {}
            }
        }

        if all_inside {
            Visibility::Full
        } else {
            Visibility::Partial
        }
    }

    /// Check if an AABB intersects the frustum
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.visibility(aabb) != Visibility::None
    }

    /// Check if a sphere intersects the frustum
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        self.active_planes()
            .all(|plane| plane.distance_to_point(sphere.center) >= -sphere.radius)
    }

    /// True unless every point lies behind one single plane
    pub fn intersects_points(&self, points: &[Vec3]) -> bool {
        self.active_planes().all(|plane| {
            points
                .iter()
                .any(|point| plane.side_of_point(*point) != PlaneSide::Negative)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn looking_down_negative_z() -> Camera {
        let mut camera = Camera::perspective(Vec3::zeros(), 90.0, 1.0, 0.1, 100.0);
        camera.set_target(Vec3::new(0.0, 0.0, -1.0));
        camera
    }

    fn unit_box_at(center: Vec3) -> Aabb {
        Aabb::from_center_half_size(center, Vec3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_frustum_visibility() {
        let frustum = looking_down_negative_z().frustum();
        assert_eq!(frustum.visibility(&unit_box_at(Vec3::new(0.0, 0.0, -10.0))), Visibility::Full);
        assert_eq!(frustum.visibility(&unit_box_at(Vec3::new(0.0, 0.0, 10.0))), Visibility::None);
        assert_eq!(frustum.visibility(&unit_box_at(Vec3::new(10.0, 0.0, -10.0))), Visibility::Partial);
        assert_eq!(frustum.visibility(&unit_box_at(Vec3::new(30.0, 0.0, -10.0))), Visibility::None);
        assert_eq!(frustum.visibility(&unit_box_at(Vec3::new(0.0, 0.0, -200.0))), Visibility::None);
        assert_eq!(frustum.visibility(&Aabb::null()), Visibility::None);
        assert_eq!(frustum.visibility(&Aabb::infinite()), Visibility::Partial);
    }

    #[test]
    fn test_frustum_infinite_far_plane() {
        let mut camera = looking_down_negative_z();
        camera.far = f32::INFINITY;
        let frustum = camera.frustum();
        assert_eq!(frustum.visibility(&unit_box_at(Vec3::new(0.0, 0.0, -5000.0))), Visibility::Full);
    }

    #[test]
    fn test_frustum_orthographic() {
        let mut camera = Camera::orthographic(Vec3::zeros(), 10.0, 1.0, 0.1, 100.0);
        camera.set_target(Vec3::new(0.0, 0.0, -1.0));
        let frustum = camera.frustum();
        assert_eq!(frustum.visibility(&unit_box_at(Vec3::new(0.0, 0.0, -50.0))), Visibility::Full);
        assert_eq!(frustum.visibility(&unit_box_at(Vec3::new(8.0, 0.0, -50.0))), Visibility::None);
    }

    #[test]
    fn test_frustum_sphere_and_points() {
        let frustum = looking_down_negative_z().frustum();
        assert!(frustum.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, -10.0), 1.0)));
        assert!(!frustum.intersects_sphere(&Sphere::new(Vec3::new(0.0, 0.0, 10.0), 1.0)));
        assert!(frustum.intersects_points(&[Vec3::new(0.0, 0.0, -10.0), Vec3::new(0.0, 0.0, 10.0)]));
        assert!(!frustum.intersects_points(&[Vec3::new(0.0, 0.0, 10.0)]));
    }
}
