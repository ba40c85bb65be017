//! Extra culling frustum built from portal edges
//!
//! While the visibility walk looks through a portal, the planes spanned by
//! the viewer and each portal edge (plus the portal plane itself) are added
//! here, so everything seen in the target zone is clipped to the opening.
//! Every plane remembers which portal added it; that doubles as the guard
//! against looking through the same portal twice on one path.

use crate::foundation::collections::PortalId;
use crate::foundation::math::Vec3;
use crate::spatial::{Aabb, Extent, Plane, PlaneSide, Sphere};
use super::camera::Visibility;
use super::portal::{Portal, PortalShape};

/// Culling plane tagged with the portal that added it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CullingPlane {
    /// The plane; its positive side is kept
    pub plane: Plane,
    /// Portal that contributed the plane
    pub portal: PortalId,
}

/// Projection style used when building edge planes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrustumProjection {
    /// Edge planes pass through the origin
    #[default]
    Perspective,
    /// Edge planes run parallel to the origin plane normal
    Orthographic,
}

/// Frustum made of an optional origin plane and portal culling planes
#[derive(Debug, Clone, Default)]
pub struct PortalFrustum {
    origin: Vec3,
    origin_plane: Option<Plane>,
    projection: FrustumProjection,
    active_planes: Vec<CullingPlane>,
}

impl PortalFrustum {
    /// Empty frustum at `origin`
    pub fn new(origin: Vec3, projection: FrustumProjection) -> Self {
        Self {
            origin,
            origin_plane: None,
            projection,
            active_planes: Vec::new(),
        }
    }

    /// Viewer position
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Move the viewer
    pub fn set_origin(&mut self, origin: Vec3) {
        self.origin = origin;
    }

    /// Set or clear the plane that culls everything behind the viewer
    pub fn set_origin_plane(&mut self, plane: Option<Plane>) {
        self.origin_plane = plane;
    }

    /// Change the projection style
    pub fn set_projection(&mut self, projection: FrustumProjection) {
        self.projection = projection;
    }

    /// Currently active culling planes
    pub fn active_planes(&self) -> &[CullingPlane] {
        &self.active_planes
    }

    fn planes(&self) -> impl Iterator<Item = &Plane> {
        self.origin_plane
            .iter()
            .chain(self.active_planes.iter().map(|culling| &culling.plane))
    }

    fn has_planes_from(&self, portal: PortalId) -> bool {
        self.active_planes.iter().any(|culling| culling.portal == portal)
    }

    /// False when some plane has the whole box on its negative side
    pub fn is_aabb_visible(&self, aabb: &Aabb) -> bool {
        match aabb.extent() {
            Extent::Null => false,
            Extent::Infinite => true,
            Extent::Finite => self
                .planes()
                .all(|plane| plane.side_of_box(aabb) != PlaneSide::Negative),
        }
    }

    /// False when some plane has the whole sphere on its negative side
    pub fn is_sphere_visible(&self, sphere: &Sphere) -> bool {
        self.planes()
            .all(|plane| plane.distance_to_point(sphere.center) >= -sphere.radius)
    }

    /// Classify a box against the frustum
    pub fn visibility(&self, aabb: &Aabb) -> Visibility {
        match aabb.extent() {
            Extent::Null => return Visibility::None,
            Extent::Infinite => return Visibility::Partial,
            Extent::Finite => {}
        }

        let mut all_inside = true;
        for plane in self.planes() {
            match plane.side_of_box(aabb) {
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

    /// Whether a portal can be seen through this frustum
    pub fn is_portal_visible(&self, id: PortalId, portal: &Portal) -> bool {
        if !portal.is_open() {
            return false;
        }
        if self.active_planes.is_empty() {
            return true;
        }
        if self.has_planes_from(id) {
            return false;
        }

        match portal.shape() {
            PortalShape::Aabb => self.is_aabb_visible(&portal.derived_aabb()),
            PortalShape::Sphere => self.is_sphere_visible(&portal.derived_sphere()),
            PortalShape::Quad => {
                let to_portal = portal.derived_cp() - self.origin;
                if to_portal.dot(&portal.derived_direction()) > 0.0 {
                    return false;
                }
                let corners = portal.derived_corners();
                self.planes().all(|plane| {
                    corners
                        .iter()
                        .any(|corner| plane.side_of_point(*corner) != PlaneSide::Negative)
                })
            }
        }
    }

    /// Whether a portal lies completely inside this frustum
    ///
    /// With an anti-portal's planes loaded this means "completely hidden
    /// behind the anti-portal".
    pub fn is_fully_visible(&self, id: PortalId, portal: &Portal) -> bool {
        if self.active_planes.is_empty() || self.has_planes_from(id) {
            return false;
        }

        match portal.shape() {
            PortalShape::Aabb => {
                let aabb = portal.derived_aabb();
                self.planes().all(|plane| plane.side_of_box(&aabb) == PlaneSide::Positive)
            }
            PortalShape::Sphere => {
                let sphere = portal.derived_sphere();
                self.planes()
                    .all(|plane| plane.distance_to_point(sphere.center) >= sphere.radius)
            }
            PortalShape::Quad => {
                let to_portal = portal.derived_cp() - self.origin;
                if to_portal.dot(&portal.derived_direction()) > 0.0 {
                    return false;
                }
                let corners = portal.derived_corners();
                self.planes().all(|plane| {
                    corners
                        .iter()
                        .all(|corner| plane.side_of_point(*corner) != PlaneSide::Negative)
                })
            }
        }
    }

    /// Add the planes spanned by the viewer and the portal's edges.
    /// Returns the number of planes added.
    pub fn add_portal_culling_planes(&mut self, id: PortalId, portal: &Portal) -> usize {
        if portal.shape() != PortalShape::Quad {
            // A copy of the origin plane, present only to tag the portal
            let plane = self
                .origin_plane
                .unwrap_or_else(|| Plane::from_normal_point(portal.derived_cp() - self.origin, self.origin));
            self.active_planes.push(CullingPlane { plane, portal: id });
            return 1;
        }

        let corners = *portal.derived_corners();
        let mut added = 0;

        for i in 0..4 {
            let j = (i + 1) % 4;
            let culled = self.active_planes.iter().any(|culling| {
                culling.plane.side_of_point(corners[i]) == PlaneSide::Negative
                    && culling.plane.side_of_point(corners[j]) == PlaneSide::Negative
            });
            if culled {
                continue;
            }

            let apex = match (self.projection, self.origin_plane) {
                (FrustumProjection::Orthographic, Some(origin_plane)) => corners[j] + origin_plane.normal,
                _ => self.origin,
            };
            let plane = Plane::from_points(apex, corners[j], corners[i]);
            self.active_planes.push(CullingPlane { plane, portal: id });
            added += 1;
        }

        if added > 0 {
            let plane = Plane::from_points(corners[2], corners[1], corners[0]);
            self.active_planes.push(CullingPlane { plane, portal: id });
            added += 1;
        }

        added
    }

    /// Remove every plane a portal added. Returns the number removed.
    pub fn remove_portal_culling_planes(&mut self, id: PortalId) -> usize {
        let before = self.active_planes.len();
        self.active_planes.retain(|culling| culling.portal != id);
        before - self.active_planes.len()
    }

    /// Drop all portal planes
    pub fn remove_all_culling_planes(&mut self) {
        self.active_planes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::SlotMap;
    use crate::spatial::Aabb;

    fn quad_at(z: f32, half: f32) -> Portal {
        Portal::quad(
            "quad",
            [
                Vec3::new(-half, -half, z),
                Vec3::new(half, -half, z),
                Vec3::new(half, half, z),
                Vec3::new(-half, half, z),
            ],
        )
    }

    fn ids(count: usize) -> Vec<PortalId> {
        let mut arena: SlotMap<PortalId, ()> = SlotMap::with_key();
        (0..count).map(|_| arena.insert(())).collect()
    }

    fn looking_down_negative_z() -> PortalFrustum {
        let mut frustum = PortalFrustum::new(Vec3::zeros(), FrustumProjection::Perspective);
        frustum.set_origin_plane(Some(Plane::from_normal_point(-Vec3::z(), Vec3::zeros())));
        frustum
    }

    #[test]
    fn test_quad_portal_adds_edge_and_portal_planes() {
        let id = ids(1)[0];
        let portal = quad_at(-10.0, 1.0);
        let mut frustum = looking_down_negative_z();

        assert_eq!(frustum.add_portal_culling_planes(id, &portal), 5);
        assert_eq!(frustum.active_planes().len(), 5);

        let through = Aabb::from_center_half_size(Vec3::new(0.0, 0.0, -20.0), Vec3::new(0.5, 0.5, 0.5));
        let beside = Aabb::from_center_half_size(Vec3::new(10.0, 0.0, -20.0), Vec3::new(0.5, 0.5, 0.5));
        let in_front = Aabb::from_center_half_size(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.5, 0.5, 0.5));
        assert_eq!(frustum.visibility(&through), Visibility::Full);
        assert_eq!(frustum.visibility(&beside), Visibility::None);
        assert_eq!(frustum.visibility(&in_front), Visibility::None);

        assert_eq!(frustum.remove_portal_culling_planes(id), 5);
        assert!(frustum.active_planes().is_empty());
        assert_eq!(frustum.visibility(&beside), Visibility::Full);
    }

    #[test]
    fn test_portal_not_visible_twice_on_one_path() {
        let id = ids(1)[0];
        let portal = quad_at(-10.0, 1.0);
        let mut frustum = looking_down_negative_z();
        assert!(frustum.is_portal_visible(id, &portal));
        frustum.add_portal_culling_planes(id, &portal);
        assert!(!frustum.is_portal_visible(id, &portal));
    }

    #[test]
    fn test_portal_outside_opening_is_culled() {
        let keys = ids(2);
        let door = quad_at(-10.0, 1.0);
        let mut far_door = quad_at(-20.0, 1.0);
        far_door.set_transform(crate::foundation::math::Transform::from_position(Vec3::new(30.0, 0.0, 0.0)));
        far_door.update_derived_values();

        let mut frustum = looking_down_negative_z();
        frustum.add_portal_culling_planes(keys[0], &door);
        assert!(!frustum.is_portal_visible(keys[1], &far_door));
        assert!(frustum.is_portal_visible(keys[1], &quad_at(-20.0, 1.0)));
    }

    #[test]
    fn test_anti_portal_hides_smaller_portal_behind_it() {
        let keys = ids(3);
        let occluder = quad_at(-5.0, 2.0);
        let hidden = quad_at(-10.0, 1.0);
        let wide = quad_at(-10.0, 8.0);

        let mut frustum = PortalFrustum::new(Vec3::zeros(), FrustumProjection::Perspective);
        frustum.add_portal_culling_planes(keys[0], &occluder);
        assert!(frustum.is_fully_visible(keys[1], &hidden));
        assert!(!frustum.is_fully_visible(keys[2], &wide));
    }

    #[test]
    fn test_box_portal_tags_origin_plane() {
        let id = ids(1)[0];
        let portal = Portal::aabb("box", Vec3::new(-1.0, -1.0, -12.0), Vec3::new(1.0, 1.0, -10.0));
        let mut frustum = looking_down_negative_z();
        assert_eq!(frustum.add_portal_culling_planes(id, &portal), 1);
        assert!(!frustum.is_portal_visible(id, &portal));
        assert_eq!(frustum.remove_portal_culling_planes(id), 1);
    }
}
