//! Portals and anti-portals
//!
//! A portal is a directed opening from the zone it lives in to a target
//! zone. Quad portals face back into their home zone: the portal direction
//! (`(c1 - c0) x (c2 - c0)`) points towards viewers that can see through
//! it, and an entity crosses when it moves to the negative side of the
//! portal plane. Box and sphere portals use their direction only as a flag:
//! `+Z` means "crossing into the volume", anything else "crossing out".
//!
//! Anti-portals share the geometry but never lead anywhere; the visibility
//! walk uses them to prove other portals hidden.

use crate::foundation::collections::{PortalId, ZoneId};
use crate::foundation::math::{Transform, Vec3};
use crate::spatial::{
    Aabb, Capsule, Plane, PlaneBoundedVolume, PlaneSide, QueryShape, Ray, Segment, Sphere,
};
use super::entity::SceneEntity;

/// Geometric type of a portal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalShape {
    /// Planar quad given by four corners
    Quad,
    /// Axis-aligned box given by min/max corners
    Aabb,
    /// Sphere given by its center and one point on its surface
    Sphere,
}

/// Role of a portal in the visibility walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalKind {
    /// Connects its home zone to a target zone
    Portal,
    /// Occluder used to hide portals behind it
    AntiPortal,
}

/// Outcome of testing an entity's latest movement against a portal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalIntersectResult {
    /// No contact
    NoIntersect,
    /// Touching the portal from the front side
    IntersectNoCross,
    /// Touching the portal with its center behind it
    IntersectBackNoCross,
    /// Moved through the portal during the last update
    IntersectCross,
}

/// Portal or anti-portal
#[derive(Debug, Clone)]
pub struct Portal {
    name: String,
    shape: PortalShape,
    kind: PortalKind,
    corners: [Vec3; 4],
    direction: Vec3,
    radius: f32,
    local_cp: Vec3,

    derived_corners: [Vec3; 4],
    derived_direction: Vec3,
    derived_cp: Vec3,
    derived_plane: Plane,
    prev_derived_cp: Vec3,
    prev_derived_plane: Plane,
    derived_ready: bool,

    transform: Option<Transform>,
    applied_transform: Option<Transform>,

    current_home_zone: Option<ZoneId>,
    new_home_zone: Option<ZoneId>,
    target_zone: Option<ZoneId>,
    target_portal: Option<PortalId>,
    open: bool,
}

impl Portal {
    fn with_geometry(name: impl Into<String>, shape: PortalShape, corners: [Vec3; 4], direction: Vec3) -> Self {
        let mut portal = Self {
            name: name.into(),
            shape,
            kind: PortalKind::Portal,
            corners,
            direction,
            radius: 0.0,
            local_cp: Vec3::zeros(),
            derived_corners: corners,
            derived_direction: direction,
            derived_cp: Vec3::zeros(),
            derived_plane: Plane::from_normal_point(direction, Vec3::zeros()),
            prev_derived_cp: Vec3::zeros(),
            prev_derived_plane: Plane::from_normal_point(direction, Vec3::zeros()),
            derived_ready: false,
            transform: None,
            applied_transform: None,
            current_home_zone: None,
            new_home_zone: None,
            target_zone: None,
            target_portal: None,
            open: true,
        };
        portal.calc_direction_and_radius();
        portal.update_derived_values();
        portal
    }

    /// Quad portal; corners are wound counter-clockwise as seen from the
    /// side the portal faces
    pub fn quad(name: impl Into<String>, corners: [Vec3; 4]) -> Self {
        Self::with_geometry(name, PortalShape::Quad, corners, Vec3::z())
    }

    /// Box portal crossed when entering the box
    pub fn aabb(name: impl Into<String>, min: Vec3, max: Vec3) -> Self {
        let aabb = Aabb::new(min, max);
        Self::with_geometry(name, PortalShape::Aabb, [aabb.min, aabb.max, aabb.max, aabb.max], Vec3::z())
    }

    /// Sphere portal crossed when entering the sphere
    pub fn sphere(name: impl Into<String>, center: Vec3, surface_point: Vec3) -> Self {
        Self::with_geometry(name, PortalShape::Sphere, [center, surface_point, surface_point, surface_point], Vec3::z())
    }

    /// Turn this portal into an anti-portal (or back)
    pub fn with_kind(mut self, kind: PortalKind) -> Self {
        self.kind = kind;
        self
    }

    /// Box and sphere portals: `+Z` crosses inwards, anything else outwards
    pub fn with_direction(mut self, direction: Vec3) -> Self {
        if self.shape != PortalShape::Quad {
            self.direction = direction;
            self.derived_ready = false;
            self.update_derived_values();
        }
        self
    }

    fn calc_direction_and_radius(&mut self) {
        match self.shape {
            PortalShape::Quad => {
                let side1 = self.corners[1] - self.corners[0];
                let side2 = self.corners[2] - self.corners[0];
                let direction = side1.cross(&side2);
                self.direction = direction.try_normalize(0.0).unwrap_or(direction);
                self.local_cp = self.corners.iter().sum::<Vec3>() * 0.25;
                self.radius = (self.corners[0] - self.local_cp).magnitude();
            }
            PortalShape::Aabb => {
                self.local_cp = (self.corners[0] + self.corners[1]) * 0.5;
                self.radius = (self.corners[1] - self.local_cp).magnitude();
            }
            PortalShape::Sphere => {
                self.local_cp = self.corners[0];
                self.radius = (self.corners[1] - self.corners[0]).magnitude();
            }
        }
    }

    /// Portal name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Geometric type
    pub fn shape(&self) -> PortalShape {
        self.shape
    }

    /// Portal or anti-portal
    pub fn kind(&self) -> PortalKind {
        self.kind
    }

    /// True for anti-portals
    pub fn is_anti_portal(&self) -> bool {
        self.kind == PortalKind::AntiPortal
    }

    /// Number of meaningful corners for the shape
    pub fn corner_count(&self) -> usize {
        match self.shape {
            PortalShape::Quad => 4,
            PortalShape::Aabb | PortalShape::Sphere => 2,
        }
    }

    /// Local corner
    pub fn corner(&self, index: usize) -> Vec3 {
        self.corners[index]
    }

    /// World-space corner
    pub fn derived_corner(&self, index: usize) -> Vec3 {
        self.derived_corners[index]
    }

    /// World-space quad corners
    pub fn derived_corners(&self) -> &[Vec3; 4] {
        &self.derived_corners
    }

    /// Radius of the bounding sphere around the centre point
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// World-space facing direction
    pub fn derived_direction(&self) -> Vec3 {
        self.derived_direction
    }

    /// World-space centre point
    pub fn derived_cp(&self) -> Vec3 {
        self.derived_cp
    }

    /// Centre point before the latest update
    pub fn prev_derived_cp(&self) -> Vec3 {
        self.prev_derived_cp
    }

    /// World-space portal plane
    pub fn derived_plane(&self) -> &Plane {
        &self.derived_plane
    }

    /// Portal plane before the latest update
    pub fn prev_derived_plane(&self) -> &Plane {
        &self.prev_derived_plane
    }

    /// World-space bounding sphere
    pub fn derived_sphere(&self) -> Sphere {
        Sphere::new(self.derived_cp, self.radius)
    }

    /// World-space box of an AABB portal
    pub fn derived_aabb(&self) -> Aabb {
        Aabb::new(self.derived_corners[0], self.derived_corners[1])
    }

    /// Attach a world transform (the portal's scene node)
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = Some(transform);
    }

    /// Recompute world-space values. Returns true when they changed.
    ///
    /// The previous centre and plane are kept so that crossing tests can
    /// look at the movement since the last update.
    pub fn update_derived_values(&mut self) -> bool {
        if self.derived_ready && self.applied_transform == self.transform {
            self.prev_derived_cp = self.derived_cp;
            self.prev_derived_plane = self.derived_plane;
            return false;
        }

        let transform = self.transform.clone().unwrap_or_default();
        let derived_cp = transform.transform_point(self.local_cp);

        match self.shape {
            PortalShape::Quad => {
                for (derived, local) in self.derived_corners.iter_mut().zip(self.corners.iter()) {
                    *derived = transform.transform_point(*local);
                }
                self.derived_direction = transform.rotate_vector(self.direction);
            }
            PortalShape::Aabb => {
                let bounds = Aabb::new(self.corners[0], self.corners[1])
                    .corners()
                    .iter()
                    .fold(Aabb::null(), |acc, corner| acc.merge_point(transform.transform_point(*corner)));
                self.derived_corners[0] = bounds.min;
                self.derived_corners[1] = bounds.max;
                self.derived_direction = self.direction;
            }
            PortalShape::Sphere => {
                self.derived_corners[0] = derived_cp;
                self.derived_corners[1] = transform.transform_point(self.corners[1]);
                self.derived_direction = self.direction;
            }
        }

        let plane = Plane::from_normal_point(self.derived_direction, derived_cp);
        if self.derived_ready {
            self.prev_derived_cp = self.derived_cp;
            self.prev_derived_plane = self.derived_plane;
        } else {
            self.prev_derived_cp = derived_cp;
            self.prev_derived_plane = plane;
        }
        self.derived_cp = derived_cp;
        self.derived_plane = plane;
        self.derived_ready = true;
        self.applied_transform = self.transform.clone();
        true
    }

    /// Open the portal
    pub fn open(&mut self) {
        self.open = true;
    }

    /// Close the portal; closed portals block visibility and crossing
    pub fn close(&mut self) {
        self.open = false;
    }

    /// True while open
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Zone the portal currently lives in
    pub fn current_home_zone(&self) -> Option<ZoneId> {
        self.current_home_zone
    }

    pub(crate) fn set_current_home_zone(&mut self, zone: Option<ZoneId>) {
        self.current_home_zone = zone;
    }

    /// Zone the portal should move to on the next portal update
    pub fn new_home_zone(&self) -> Option<ZoneId> {
        self.new_home_zone
    }

    pub(crate) fn set_new_home_zone(&mut self, zone: Option<ZoneId>) {
        self.new_home_zone = zone;
    }

    /// Zone on the other side
    pub fn target_zone(&self) -> Option<ZoneId> {
        self.target_zone
    }

    pub(crate) fn set_target_zone(&mut self, zone: Option<ZoneId>) {
        self.target_zone = zone;
    }

    /// Matching portal in the target zone
    pub fn target_portal(&self) -> Option<PortalId> {
        self.target_portal
    }

    pub(crate) fn set_target_portal(&mut self, portal: Option<PortalId>) {
        self.target_portal = portal;
    }

    /// Overlap test against a box
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        if !self.open {
            return false;
        }
        match self.shape {
            PortalShape::Quad => aabb.intersects_sphere(&self.derived_sphere()) && aabb.intersects_plane(&self.derived_plane),
            PortalShape::Aabb => aabb.intersects(&self.derived_aabb()),
            PortalShape::Sphere => aabb.intersects_sphere(&self.derived_sphere()),
        }
    }

    /// Overlap test against a sphere
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        if !self.open {
            return false;
        }
        match self.shape {
            PortalShape::Quad => sphere.intersects(&self.derived_sphere()) && sphere.intersects_plane(&self.derived_plane),
            PortalShape::Aabb => self.derived_aabb().intersects_sphere(sphere),
            PortalShape::Sphere => self.derived_sphere().intersects(sphere),
        }
    }

    /// Overlap test against a convex volume
    pub fn intersects_volume(&self, volume: &PlaneBoundedVolume) -> bool {
        if !self.open {
            return false;
        }
        match self.shape {
            PortalShape::Quad => {
                if !volume.intersects_sphere(&self.derived_sphere()) {
                    return false;
                }
                volume.planes.iter().all(|plane| {
                    !self
                        .derived_corners
                        .iter()
                        .all(|corner| plane.side_of_point(*corner) == volume.outside)
                })
            }
            PortalShape::Aabb => volume.intersects_aabb(&self.derived_aabb()),
            PortalShape::Sphere => volume.intersects_sphere(&self.derived_sphere()),
        }
    }

    /// Hit test against a ray
    pub fn intersects_ray(&self, ray: &Ray) -> bool {
        if !self.open {
            return false;
        }
        match self.shape {
            PortalShape::Quad => {
                let Some(t) = ray.intersect_plane(&self.derived_plane) else {
                    return false;
                };
                let hit = ray.point_at(t);
                let c = &self.derived_corners;
                let reference = (c[1] - c[0]).cross(&(hit - c[0]));
                (1..4).all(|i| {
                    let edge = c[(i + 1) % 4] - c[i];
                    edge.cross(&(hit - c[i])).dot(&reference) >= 0.0
                })
            }
            PortalShape::Aabb => ray.intersect_aabb(&self.derived_aabb()).is_some(),
            PortalShape::Sphere => ray.intersect_sphere(&self.derived_sphere()).is_some(),
        }
    }

    /// Overlap test against any query shape
    pub fn intersects_shape(&self, shape: &QueryShape) -> bool {
        match shape {
            QueryShape::Box(aabb) => self.intersects_aabb(aabb),
            QueryShape::Sphere(sphere) => self.intersects_sphere(sphere),
            QueryShape::Ray(ray) => self.intersects_ray(ray),
            QueryShape::Volume(volume) => self.intersects_volume(volume),
        }
    }

    fn crosses_inward(&self) -> bool {
        self.direction == Vec3::z()
    }

    /// Test an entity's movement since the last update against the portal
    pub fn intersects_entity(&self, entity: &SceneEntity) -> PortalIntersectResult {
        if !self.open {
            return PortalIntersectResult::NoIntersect;
        }

        let position = entity.position();
        let world_aabb = entity.world_aabb();

        match self.shape {
            PortalShape::Quad => {
                let path = Segment::new(entity.previous_position(), position);
                let sweep = Capsule::new(self.prev_derived_cp, self.derived_cp, self.radius);
                if sweep.intersects_segment(&path)
                    && self.derived_plane.side_of_point(position) == PlaneSide::Negative
                    && self.prev_derived_plane.side_of_point(entity.previous_position()) != PlaneSide::Negative
                {
                    // Only entities narrower than the opening can pass through it
                    let half = world_aabb.half_size();
                    if half.min() < self.radius {
                        return PortalIntersectResult::IntersectCross;
                    }
                }

                if world_aabb.intersects_sphere(&self.derived_sphere())
                    && self.derived_plane.side_of_box(world_aabb) == PlaneSide::Both
                {
                    if self.derived_plane.side_of_point(position) == PlaneSide::Negative {
                        return PortalIntersectResult::IntersectBackNoCross;
                    }
                    return PortalIntersectResult::IntersectNoCross;
                }
                PortalIntersectResult::NoIntersect
            }
            PortalShape::Aabb => {
                let bounds = self.derived_aabb();
                let inside = bounds.contains_point(position);
                if inside == self.crosses_inward() {
                    return PortalIntersectResult::IntersectCross;
                }
                if bounds.intersects(world_aabb) && bounds.intersection(world_aabb) != *world_aabb {
                    return PortalIntersectResult::IntersectNoCross;
                }
                PortalIntersectResult::NoIntersect
            }
            PortalShape::Sphere => {
                let sphere = self.derived_sphere();
                let inside = (position - sphere.center).magnitude_squared() < sphere.radius * sphere.radius;
                if inside == self.crosses_inward() {
                    return PortalIntersectResult::IntersectCross;
                }
                let straddles = world_aabb.intersects_sphere(&sphere)
                    && !world_aabb.corners().iter().all(|corner| sphere.contains_point(*corner));
                if straddles {
                    return PortalIntersectResult::IntersectNoCross;
                }
                PortalIntersectResult::NoIntersect
            }
        }
    }

    /// True when this portal's centre moved through `other` since the last update
    pub fn crossed_portal(&self, other: &Portal) -> bool {
        if !other.open {
            return false;
        }

        let own_sweep = Capsule::new(self.prev_derived_cp, self.derived_cp, self.radius);
        let other_sweep = Capsule::new(other.prev_derived_cp, other.derived_cp, other.radius);
        if !own_sweep.intersects_capsule(&other_sweep) {
            return false;
        }

        match other.shape {
            PortalShape::Quad => {
                other.derived_plane.side_of_point(self.derived_cp) == PlaneSide::Negative
                    && other.prev_derived_plane.side_of_point(self.prev_derived_cp) != PlaneSide::Negative
            }
            PortalShape::Aabb => other.derived_aabb().contains_point(self.derived_cp) == other.crosses_inward(),
            PortalShape::Sphere => {
                let inside = (self.derived_cp - other.derived_cp).magnitude_squared() < other.radius * other.radius;
                inside == other.crosses_inward()
            }
        }
    }

    /// True when the two portals are close enough to be considered a pair
    pub fn close_to(&self, other: &Portal) -> bool {
        if self.shape != other.shape {
            return false;
        }
        match self.shape {
            PortalShape::Quad => {
                let mine = Sphere::new(self.derived_cp, self.radius * 0.25);
                let theirs = Sphere::new(other.derived_cp, other.radius * 0.25);
                mine.intersects(&theirs)
            }
            PortalShape::Aabb => {
                self.derived_cp == other.derived_cp
                    && self.corners[0] == other.corners[0]
                    && self.corners[1] == other.corners[1]
            }
            PortalShape::Sphere => self.derived_cp == other.derived_cp && self.radius == other.radius,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 2x2 doorway at z = -10 facing +Z
    fn doorway() -> Portal {
        Portal::quad(
            "door",
            [
                Vec3::new(-1.0, -1.0, -10.0),
                Vec3::new(1.0, -1.0, -10.0),
                Vec3::new(1.0, 1.0, -10.0),
                Vec3::new(-1.0, 1.0, -10.0),
            ],
        )
    }

    fn small_box(center: Vec3) -> Aabb {
        Aabb::from_center_half_size(center, Vec3::new(0.25, 0.25, 0.25))
    }

    #[test]
    fn test_portal_quad_derived_values() {
        let portal = doorway();
        assert_relative_eq!(portal.derived_direction(), Vec3::z(), epsilon = 1e-6);
        assert_relative_eq!(portal.derived_cp(), Vec3::new(0.0, 0.0, -10.0), epsilon = 1e-6);
        assert_relative_eq!(portal.radius(), 2.0_f32.sqrt(), epsilon = 1e-6);
        assert_eq!(portal.derived_plane().side_of_point(Vec3::zeros()), PlaneSide::Positive);
        assert_eq!(portal.prev_derived_cp(), portal.derived_cp());
    }

    #[test]
    fn test_portal_transform_tracks_previous_values() {
        let mut portal = doorway();
        portal.set_transform(Transform::from_position(Vec3::new(5.0, 0.0, 0.0)));
        assert!(portal.update_derived_values());
        assert_relative_eq!(portal.derived_cp(), Vec3::new(5.0, 0.0, -10.0), epsilon = 1e-6);
        assert_relative_eq!(portal.prev_derived_cp(), Vec3::new(0.0, 0.0, -10.0), epsilon = 1e-6);

        // Unchanged transform: previous catches up with current
        assert!(!portal.update_derived_values());
        assert_eq!(portal.prev_derived_cp(), portal.derived_cp());
    }

    #[test]
    fn test_portal_entity_crossing() {
        let portal = doorway();
        let mut walker = SceneEntity::with_bounds("walker", small_box(Vec3::new(0.0, 0.0, -9.0)));
        assert_eq!(portal.intersects_entity(&walker), PortalIntersectResult::NoIntersect);

        walker.translate(Vec3::new(0.0, 0.0, -2.0));
        assert_eq!(portal.intersects_entity(&walker), PortalIntersectResult::IntersectCross);
    }

    #[test]
    fn test_portal_entity_straddling() {
        let portal = doorway();
        let front = SceneEntity::with_bounds("front", small_box(Vec3::new(0.0, 0.0, -9.9)));
        let back = SceneEntity::with_bounds("back", small_box(Vec3::new(0.0, 0.0, -10.1)));
        assert_eq!(portal.intersects_entity(&front), PortalIntersectResult::IntersectNoCross);
        assert_eq!(portal.intersects_entity(&back), PortalIntersectResult::IntersectBackNoCross);
    }

    #[test]
    fn test_portal_closed_blocks_everything() {
        let mut portal = doorway();
        portal.close();
        let front = SceneEntity::with_bounds("front", small_box(Vec3::new(0.0, 0.0, -9.9)));
        assert_eq!(portal.intersects_entity(&front), PortalIntersectResult::NoIntersect);
        assert!(!portal.intersects_aabb(front.world_aabb()));
        portal.open();
        assert!(portal.intersects_aabb(front.world_aabb()));
    }

    #[test]
    fn test_portal_ray_hits_inside_quad_only() {
        let portal = doorway();
        let through = Ray::new(Vec3::zeros(), -Vec3::z());
        let beside = Ray::new(Vec3::new(3.0, 0.0, 0.0), -Vec3::z());
        assert!(portal.intersects_ray(&through));
        assert!(!portal.intersects_ray(&beside));
    }

    #[test]
    fn test_aabb_portal_crossing_inward() {
        let portal = Portal::aabb("hut", Vec3::new(-5.0, 0.0, -5.0), Vec3::new(5.0, 5.0, 5.0));
        let inside = SceneEntity::with_bounds("in", small_box(Vec3::new(0.0, 1.0, 0.0)));
        let outside = SceneEntity::with_bounds("out", small_box(Vec3::new(20.0, 1.0, 0.0)));
        assert_eq!(portal.intersects_entity(&inside), PortalIntersectResult::IntersectCross);
        assert_eq!(portal.intersects_entity(&outside), PortalIntersectResult::NoIntersect);

        let exit = Portal::aabb("hut exit", Vec3::new(-5.0, 0.0, -5.0), Vec3::new(5.0, 5.0, 5.0))
            .with_direction(-Vec3::z());
        assert_eq!(exit.intersects_entity(&outside), PortalIntersectResult::IntersectCross);
    }

    #[test]
    fn test_sphere_portal() {
        let portal = Portal::sphere("bubble", Vec3::zeros(), Vec3::new(0.0, 3.0, 0.0));
        assert_relative_eq!(portal.radius(), 3.0);
        let inside = SceneEntity::with_bounds("in", small_box(Vec3::new(1.0, 0.0, 0.0)));
        let rim = SceneEntity::with_bounds("rim", small_box(Vec3::new(3.1, 0.0, 0.0)));
        assert_eq!(portal.intersects_entity(&inside), PortalIntersectResult::IntersectCross);
        assert_eq!(portal.intersects_entity(&rim), PortalIntersectResult::IntersectNoCross);
    }

    #[test]
    fn test_portal_close_to() {
        let a = doorway();
        let mut b = doorway();
        b.set_transform(Transform::from_position(Vec3::new(0.1, 0.0, 0.0)));
        b.update_derived_values();
        let mut c = doorway();
        c.set_transform(Transform::from_position(Vec3::new(10.0, 0.0, 0.0)));
        c.update_derived_values();
        assert!(a.close_to(&b));
        assert!(!a.close_to(&c));
    }

    #[test]
    fn test_portal_crossed_portal() {
        let big = Portal::quad(
            "big",
            [
                Vec3::new(-5.0, -5.0, 0.0),
                Vec3::new(5.0, -5.0, 0.0),
                Vec3::new(5.0, 5.0, 0.0),
                Vec3::new(-5.0, 5.0, 0.0),
            ],
        );
        let mut small = doorway();
        small.set_transform(Transform::from_position(Vec3::new(0.0, 0.0, 10.5)));
        small.update_derived_values();
        small.update_derived_values();
        assert!(!small.crossed_portal(&big));

        small.set_transform(Transform::from_position(Vec3::new(0.0, 0.0, 9.5)));
        small.update_derived_values();
        assert!(small.crossed_portal(&big));
    }
}
