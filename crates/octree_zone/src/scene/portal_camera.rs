//! Camera wrapper used by the portal visibility walk
//!
//! Combines the camera's regular six-plane frustum with a [`PortalFrustum`]
//! that accumulates the culling planes of every portal the walk is
//! currently looking through.

use crate::foundation::collections::{PortalId, ZoneId};
use crate::foundation::math::Vec3;
use crate::spatial::{Aabb, Plane};
use super::camera::{Camera, Frustum, Projection, Visibility};
use super::portal::{Portal, PortalShape};
use super::portal_frustum::{FrustumProjection, PortalFrustum};

/// Camera registered with the zone scene manager
#[derive(Debug, Clone)]
pub struct PortalCamera {
    camera: Camera,
    frustum: Frustum,
    extra_frustum: PortalFrustum,
    home_zone: Option<ZoneId>,
}

impl PortalCamera {
    /// Wrap a camera; it has no home zone until one is assigned
    pub fn new(camera: Camera) -> Self {
        let mut portal_camera = Self {
            frustum: camera.frustum(),
            extra_frustum: PortalFrustum::default(),
            camera,
            home_zone: None,
        };
        portal_camera.begin_frame();
        portal_camera
    }

    /// The wrapped camera
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Mutable access to the wrapped camera. Changes take effect at the
    /// next [`PortalCamera::begin_frame`].
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Camera position
    pub fn position(&self) -> Vec3 {
        self.camera.position
    }

    /// Zone the camera is in
    pub fn home_zone(&self) -> Option<ZoneId> {
        self.home_zone
    }

    /// Place the camera in a zone
    pub fn set_home_zone(&mut self, zone: Option<ZoneId>) {
        self.home_zone = zone;
    }

    /// Cached six-plane frustum
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// Portal planes accumulated during the walk
    pub fn extra_frustum(&self) -> &PortalFrustum {
        &self.extra_frustum
    }

    /// Rebuild the frustum and reset the portal planes for a new walk
    pub fn begin_frame(&mut self) {
        self.frustum = self.camera.frustum();

        let position = self.camera.position;
        self.extra_frustum.set_origin(position);
        self.extra_frustum
            .set_origin_plane(Some(Plane::from_normal_point(self.camera.direction(), position)));
        self.extra_frustum.set_projection(self.frustum_projection());
        self.extra_frustum.remove_all_culling_planes();
    }

    /// Projection style of the wrapped camera
    pub fn frustum_projection(&self) -> FrustumProjection {
        match self.camera.projection {
            Projection::Perspective => FrustumProjection::Perspective,
            Projection::Orthographic { .. } => FrustumProjection::Orthographic,
        }
    }

    /// Classify a box against the frustum and the portal planes
    pub fn visibility(&self, aabb: &Aabb) -> Visibility {
        match self.frustum.visibility(aabb) {
            Visibility::None => Visibility::None,
            Visibility::Partial => match self.extra_frustum.visibility(aabb) {
                Visibility::None => Visibility::None,
                _ => Visibility::Partial,
            },
            Visibility::Full => self.extra_frustum.visibility(aabb),
        }
    }

    /// True unless the box is culled
    pub fn is_visible(&self, aabb: &Aabb) -> bool {
        self.visibility(aabb) != Visibility::None
    }

    /// Whether a portal can be seen from the camera along the current path
    pub fn is_portal_visible(&self, id: PortalId, portal: &Portal) -> bool {
        if !portal.is_open() {
            return false;
        }
        if !self.extra_frustum.is_portal_visible(id, portal) {
            return false;
        }

        match portal.shape() {
            PortalShape::Aabb => self.frustum.intersects_aabb(&portal.derived_aabb()),
            PortalShape::Sphere => self.frustum.intersects_sphere(&portal.derived_sphere()),
            PortalShape::Quad => {
                if !portal.is_anti_portal() {
                    let to_portal = portal.derived_cp() - self.camera.position;
                    if to_portal.dot(&portal.derived_direction()) > 0.0 {
                        return false;
                    }
                }
                self.frustum.intersects_points(portal.derived_corners())
            }
        }
    }

    /// Narrow the view to a portal's opening. Returns the number of planes added.
    pub fn add_portal_culling_planes(&mut self, id: PortalId, portal: &Portal) -> usize {
        self.extra_frustum.add_portal_culling_planes(id, portal)
    }

    /// Undo [`PortalCamera::add_portal_culling_planes`]
    pub fn remove_portal_culling_planes(&mut self, id: PortalId) -> usize {
        self.extra_frustum.remove_portal_culling_planes(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::SlotMap;
    use crate::scene::portal::PortalKind;

    fn camera_looking_down_negative_z() -> PortalCamera {
        let mut camera = Camera::perspective(Vec3::zeros(), 90.0, 1.0, 0.1, 1000.0);
        camera.set_target(Vec3::new(0.0, 0.0, -1.0));
        PortalCamera::new(camera)
    }

    fn doorway(z: f32) -> Portal {
        Portal::quad(
            "door",
            [
                Vec3::new(-1.0, -1.0, z),
                Vec3::new(1.0, -1.0, z),
                Vec3::new(1.0, 1.0, z),
                Vec3::new(-1.0, 1.0, z),
            ],
        )
    }

    #[test]
    fn test_portal_camera_narrows_view_through_portal() {
        let mut ids: SlotMap<PortalId, ()> = SlotMap::with_key();
        let door_id = ids.insert(());
        let door = doorway(-10.0);
        let mut camera = camera_looking_down_negative_z();

        let beside = Aabb::from_center_half_size(Vec3::new(10.0, 0.0, -20.0), Vec3::new(0.5, 0.5, 0.5));
        assert!(camera.is_visible(&beside));
        assert!(camera.is_portal_visible(door_id, &door));

        assert_eq!(camera.add_portal_culling_planes(door_id, &door), 5);
        assert!(!camera.is_visible(&beside));
        assert!(!camera.is_portal_visible(door_id, &door));

        camera.remove_portal_culling_planes(door_id);
        assert!(camera.is_visible(&beside));
    }

    #[test]
    fn test_portal_camera_ignores_back_facing_portal() {
        let mut ids: SlotMap<PortalId, ()> = SlotMap::with_key();
        let id = ids.insert(());
        let reversed = Portal::quad(
            "reversed",
            [
                Vec3::new(-1.0, 1.0, -10.0),
                Vec3::new(1.0, 1.0, -10.0),
                Vec3::new(1.0, -1.0, -10.0),
                Vec3::new(-1.0, -1.0, -10.0),
            ],
        );
        let camera = camera_looking_down_negative_z();
        assert!(!camera.is_portal_visible(id, &reversed));

        let anti = reversed.with_kind(PortalKind::AntiPortal);
        assert!(camera.is_portal_visible(id, &anti));
    }

    #[test]
    fn test_portal_camera_begin_frame_follows_camera() {
        let mut camera = camera_looking_down_negative_z();
        let behind = Aabb::from_center_half_size(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.5, 0.5, 0.5));
        assert!(!camera.is_visible(&behind));

        camera.camera_mut().set_target(Vec3::new(0.0, 0.0, 1.0));
        camera.begin_frame();
        assert!(camera.is_visible(&behind));
    }
}
