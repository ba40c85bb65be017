//! Bounding volumes and geometric primitives
//!
//! Axis-aligned boxes carry an explicit extent so that "no geometry" (null)
//! and "everything" (infinite) boxes can flow through the octree and the
//! portal tests without special-casing at every call site.

use serde::{Deserialize, Serialize};

use crate::foundation::math::Vec3;

/// Extent of an axis-aligned box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Extent {
    /// Box with no volume; never intersects anything
    Null,
    /// Regular box described by min/max corners
    Finite,
    /// Box covering all of space
    Infinite,
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
    extent: Extent,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::null()
    }
}

impl Aabb {
    /// Create a finite box from two corners (corners are reordered per axis)
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.inf(&b),
            max: a.sup(&b),
            extent: Extent::Finite,
        }
    }

    /// Box that contains nothing
    pub fn null() -> Self {
        Self {
            min: Vec3::zeros(),
            max: Vec3::zeros(),
            extent: Extent::Null,
        }
    }

    /// Box that contains everything
    pub fn infinite() -> Self {
        Self {
            min: Vec3::repeat(f32::NEG_INFINITY),
            max: Vec3::repeat(f32::INFINITY),
            extent: Extent::Infinite,
        }
    }

    /// Create a box from a center point and half extents
    pub fn from_center_half_size(center: Vec3, half_size: Vec3) -> Self {
        Self::new(center - half_size, center + half_size)
    }

    /// Extent of the box
    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// True when the box is null
    pub fn is_null(&self) -> bool {
        self.extent == Extent::Null
    }

    /// True when the box is infinite
    pub fn is_infinite(&self) -> bool {
        self.extent == Extent::Infinite
    }

    /// True for a regular min/max box
    pub fn is_finite(&self) -> bool {
        self.extent == Extent::Finite
    }

    /// Center of the box
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Full size along each axis
    pub fn size(&self) -> Vec3 {
        match self.extent {
            Extent::Null => Vec3::zeros(),
            Extent::Finite => self.max - self.min,
            Extent::Infinite => Vec3::repeat(f32::INFINITY),
        }
    }

    /// Half size along each axis
    pub fn half_size(&self) -> Vec3 {
        self.size() * 0.5
    }

    /// Box grown by `margin` on every side
    pub fn grown(&self, margin: Vec3) -> Self {
        match self.extent {
            Extent::Finite => Self::new(self.min - margin, self.max + margin),
            _ => *self,
        }
    }

    /// Union of two boxes
    pub fn merge(&self, other: &Aabb) -> Self {
        match (self.extent, other.extent) {
            (Extent::Infinite, _) | (_, Extent::Infinite) => Self::infinite(),
            (Extent::Null, _) => *other,
            (_, Extent::Null) => *self,
            (Extent::Finite, Extent::Finite) => Self::new(self.min.inf(&other.min), self.max.sup(&other.max)),
        }
    }

    /// Union of this box and a point
    pub fn merge_point(&self, point: Vec3) -> Self {
        match self.extent {
            Extent::Null => Self::new(point, point),
            Extent::Finite => Self::new(self.min.inf(&point), self.max.sup(&point)),
            Extent::Infinite => *self,
        }
    }

    /// The eight corners of a finite box
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Check if a point is inside the box (boundary included)
    pub fn contains_point(&self, point: Vec3) -> bool {
        match self.extent {
            Extent::Null => false,
            Extent::Infinite => true,
            Extent::Finite => {
                point.x >= self.min.x && point.x <= self.max.x &&
                point.y >= self.min.y && point.y <= self.max.y &&
                point.z >= self.min.z && point.z <= self.max.z
            }
        }
    }

    /// Check if another box lies entirely inside this one
    pub fn contains_box(&self, other: &Aabb) -> bool {
        match (self.extent, other.extent) {
            (_, Extent::Null) | (Extent::Infinite, _) => true,
            (Extent::Null, _) | (_, Extent::Infinite) => false,
            (Extent::Finite, Extent::Finite) => {
                other.min.x >= self.min.x && other.max.x <= self.max.x &&
                other.min.y >= self.min.y && other.max.y <= self.max.y &&
                other.min.z >= self.min.z && other.max.z <= self.max.z
            }
        }
    }

    /// Check if this box overlaps another (touching counts)
    pub fn intersects(&self, other: &Aabb) -> bool {
        match (self.extent, other.extent) {
            (Extent::Null, _) | (_, Extent::Null) => false,
            (Extent::Infinite, _) | (_, Extent::Infinite) => true,
            (Extent::Finite, Extent::Finite) => {
                self.min.x <= other.max.x && self.max.x >= other.min.x &&
                self.min.y <= other.max.y && self.max.y >= other.min.y &&
                self.min.z <= other.max.z && self.max.z >= other.min.z
            }
        }
    }

    /// Overlapping region of two boxes (null when disjoint)
    pub fn intersection(&self, other: &Aabb) -> Self {
        match (self.extent, other.extent) {
            (Extent::Null, _) | (_, Extent::Null) => Self::null(),
            (Extent::Infinite, _) => *other,
            (_, Extent::Infinite) => *self,
            (Extent::Finite, Extent::Finite) => {
                let min = self.min.sup(&other.min);
                let max = self.max.inf(&other.max);
                if min.x <= max.x && min.y <= max.y && min.z <= max.z {
                    Self::new(min, max)
                } else {
                    Self::null()
                }
            }
        }
    }

    /// Squared distance from the box to a point (zero inside)
    pub fn distance_squared(&self, point: Vec3) -> f32 {
        match self.extent {
            Extent::Null => f32::INFINITY,
            Extent::Infinite => 0.0,
            Extent::Finite => {
                let closest = point.sup(&self.min).inf(&self.max);
                (closest - point).magnitude_squared()
            }
        }
    }

    /// Check overlap with a sphere using the closest point on the box
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        self.distance_squared(sphere.center) <= sphere.radius * sphere.radius
    }

    /// True when the plane passes through the box
    pub fn intersects_plane(&self, plane: &Plane) -> bool {
        plane.side_of_box(self) == PlaneSide::Both
    }
}

/// Sphere primitive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    /// Center of the sphere
    pub center: Vec3,
    /// Radius of the sphere
    pub radius: f32,
}

impl Sphere {
    /// Create a sphere
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Check if two spheres overlap (touching counts)
    pub fn intersects(&self, other: &Sphere) -> bool {
        let reach = self.radius + other.radius;
        (self.center - other.center).magnitude_squared() <= reach * reach
    }

    /// True when the plane cuts the sphere
    pub fn intersects_plane(&self, plane: &Plane) -> bool {
        plane.distance_to_point(self.center).abs() <= self.radius
    }

    /// Check if a point is inside the sphere
    pub fn contains_point(&self, point: Vec3) -> bool {
        (point - self.center).magnitude_squared() <= self.radius * self.radius
    }
}

/// Which side of a plane something lies on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneSide {
    /// Exactly on the plane
    NoSide,
    /// In front of the plane (the side the normal points to)
    Positive,
    /// Behind the plane
    Negative,
    /// Straddling the plane
    Both,
}

/// Plane in 3D space, `normal . p + distance = 0`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// Unit normal of the plane
    pub normal: Vec3,
    /// Signed distance term
    pub distance: f32,
}

impl Plane {
    /// Create a plane from a normal (normalized here) and distance term
    pub fn new(normal: Vec3, distance: f32) -> Self {
        let length = normal.magnitude();
        if length > 0.0 {
            Self { normal: normal / length, distance: distance / length }
        } else {
            Self { normal, distance }
        }
    }

    /// Plane with the given normal passing through `point`
    pub fn from_normal_point(normal: Vec3, point: Vec3) -> Self {
        let normal = normal.try_normalize(0.0).unwrap_or(normal);
        Self { normal, distance: -normal.dot(&point) }
    }

    /// Plane through three points; counter-clockwise winding faces the viewer
    pub fn from_points(p0: Vec3, p1: Vec3, p2: Vec3) -> Self {
        let mut plane = Self { normal: Vec3::z(), distance: 0.0 };
        plane.redefine(p0, p1, p2);
        plane
    }

    /// Rebuild the plane through three points
    pub fn redefine(&mut self, p0: Vec3, p1: Vec3, p2: Vec3) {
        let normal = (p1 - p0).cross(&(p2 - p0));
        self.normal = normal.try_normalize(0.0).unwrap_or(normal);
        self.distance = -self.normal.dot(&p0);
    }

    /// Signed distance from plane to point
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(&point) + self.distance
    }

    /// Side of the plane a point lies on
    pub fn side_of_point(&self, point: Vec3) -> PlaneSide {
        let d = self.distance_to_point(point);
        if d < 0.0 {
            PlaneSide::Negative
        } else if d > 0.0 {
            PlaneSide::Positive
        } else {
            PlaneSide::NoSide
        }
    }

    /// Side of the plane a box lies on
    pub fn side_of_box(&self, aabb: &Aabb) -> PlaneSide {
        match aabb.extent() {
            Extent::Null => PlaneSide::NoSide,
            Extent::Infinite => PlaneSide::Both,
            Extent::Finite => self.side_of_center_half(aabb.center(), aabb.half_size()),
        }
    }

    /// Side of the plane for a box given as center and half size
    pub fn side_of_center_half(&self, center: Vec3, half_size: Vec3) -> PlaneSide {
        let d = self.distance_to_point(center);
        let max_abs = (self.normal.x * half_size.x).abs()
            + (self.normal.y * half_size.y).abs()
            + (self.normal.z * half_size.z).abs();

        if d < -max_abs {
            PlaneSide::Negative
        } else if d > max_abs {
            PlaneSide::Positive
        } else {
            PlaneSide::Both
        }
    }
}

/// Ray with an origin and a unit direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    /// Start of the ray
    pub origin: Vec3,
    /// Normalized direction
    pub direction: Vec3,
}

impl Ray {
    /// Create a ray; the direction is normalized
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.try_normalize(0.0).unwrap_or(direction),
        }
    }

    /// Point at distance `t` along the ray
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Distance along the ray to a plane, if it is hit in front of the origin
    pub fn intersect_plane(&self, plane: &Plane) -> Option<f32> {
        let denom = plane.normal.dot(&self.direction);
        if denom.abs() < f32::EPSILON {
            return None;
        }
        let t = -(plane.normal.dot(&self.origin) + plane.distance) / denom;
        (t >= 0.0).then_some(t)
    }

    /// Distance along the ray to a box (zero when the origin is inside)
    pub fn intersect_aabb(&self, aabb: &Aabb) -> Option<f32> {
        match aabb.extent() {
            Extent::Null => return None,
            Extent::Infinite => return Some(0.0),
            Extent::Finite => {}
        }

        let mut t_min = 0.0_f32;
        let mut t_max = f32::INFINITY;

        for axis in 0..3 {
            let origin = self.origin[axis];
            let dir = self.direction[axis];
            if dir.abs() < f32::EPSILON {
                if origin < aabb.min[axis] || origin > aabb.max[axis] {
                    return None;
                }
            } else {
                let inv = 1.0 / dir;
                let mut t0 = (aabb.min[axis] - origin) * inv;
                let mut t1 = (aabb.max[axis] - origin) * inv;
                if t0 > t1 {
                    std::mem::swap(&mut t0, &mut t1);
                }
                t_min = t_min.max(t0);
                t_max = t_max.min(t1);
                if t_min > t_max {
                    return None;
                }
            }
        }

        Some(t_min)
    }

    /// Distance along the ray to a sphere (zero when the origin is inside)
    pub fn intersect_sphere(&self, sphere: &Sphere) -> Option<f32> {
        let offset = self.origin - sphere.center;
        let r2 = sphere.radius * sphere.radius;
        if offset.magnitude_squared() <= r2 {
            return Some(0.0);
        }

        let b = offset.dot(&self.direction);
        let c = offset.magnitude_squared() - r2;
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let t = -b - discriminant.sqrt();
        (t >= 0.0).then_some(t)
    }
}

/// Convex volume bounded by planes
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneBoundedVolume {
    /// Bounding planes
    pub planes: Vec<Plane>,
    /// Side of each plane that is outside the volume
    pub outside: PlaneSide,
}

impl PlaneBoundedVolume {
    /// Volume whose planes face inwards
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes, outside: PlaneSide::Negative }
    }

    /// True unless some plane has the whole box on its outside
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        match aabb.extent() {
            Extent::Null => false,
            Extent::Infinite => true,
            Extent::Finite => self
                .planes
                .iter()
                .all(|plane| plane.side_of_box(aabb) != self.outside),
        }
    }

    /// True unless some plane has the whole sphere on its outside
    pub fn intersects_sphere(&self, sphere: &Sphere) -> bool {
        self.planes.iter().all(|plane| {
            let d = plane.distance_to_point(sphere.center);
            match self.outside {
                PlaneSide::Negative => d >= -sphere.radius,
                _ => d <= sphere.radius,
            }
        })
    }
}

/// Line segment between two points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Start point
    pub start: Vec3,
    /// End point
    pub end: Vec3,
}

impl Segment {
    /// Create a segment
    pub fn new(start: Vec3, end: Vec3) -> Self {
        Self { start, end }
    }

    /// Squared distance between the closest points of two segments
    pub fn distance_squared(&self, other: &Segment) -> f32 {
        const EPS: f32 = 1e-12;

        let d1 = self.end - self.start;
        let d2 = other.end - other.start;
        let r = self.start - other.start;
        let a = d1.dot(&d1);
        let e = d2.dot(&d2);
        let f = d2.dot(&r);

        if a <= EPS && e <= EPS {
            return r.magnitude_squared();
        }

        let (s, t) = if a <= EPS {
            (0.0, (f / e).clamp(0.0, 1.0))
        } else {
            let c = d1.dot(&r);
            if e <= EPS {
                ((-c / a).clamp(0.0, 1.0), 0.0)
            } else {
                let b = d1.dot(&d2);
                let denom = a * e - b * b;
                let mut s = if denom > EPS {
                    ((b * f - c * e) / denom).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let mut t = (b * s + f) / e;
                if t < 0.0 {
                    t = 0.0;
                    s = (-c / a).clamp(0.0, 1.0);
                } else if t > 1.0 {
                    t = 1.0;
                    s = ((b - c) / a).clamp(0.0, 1.0);
                }
                (s, t)
            }
        };

        let closest_self = self.start + d1 * s;
        let closest_other = other.start + d2 * t;
        (closest_self - closest_other).magnitude_squared()
    }
}

/// Sphere swept along a segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Capsule {
    /// Axis of the capsule
    pub segment: Segment,
    /// Radius around the axis
    pub radius: f32,
}

impl Capsule {
    /// Create a capsule between two points
    pub fn new(start: Vec3, end: Vec3, radius: f32) -> Self {
        Self { segment: Segment::new(start, end), radius }
    }

    /// True when the segment comes within the capsule radius
    pub fn intersects_segment(&self, segment: &Segment) -> bool {
        self.segment.distance_squared(segment) <= self.radius * self.radius
    }

    /// True when two capsules overlap
    pub fn intersects_capsule(&self, other: &Capsule) -> bool {
        let reach = self.radius + other.radius;
        self.segment.distance_squared(&other.segment) <= reach * reach
    }
}
