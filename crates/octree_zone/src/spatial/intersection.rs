//! Three-valued shape classification against axis-aligned boxes
//!
//! Queries use the classification twice: once against an octant's loose
//! bounds to prune or accept whole subtrees, and once per entity when the
//! octant is only partially covered.

use crate::foundation::math::{constants::RAY_BOX_EPSILON, Vec3};
use super::bounds::{Aabb, Extent, PlaneBoundedVolume, PlaneSide, Ray, Sphere};

/// Result of classifying a box against a query shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intersection {
    /// The box is entirely outside the shape
    Outside,
    /// The box is entirely inside the shape
    Inside,
    /// The box is partially covered by the shape
    Intersect,
}

/// Query volume accepted by the zone and octree queries
#[derive(Debug, Clone, PartialEq)]
pub enum QueryShape {
    /// Axis-aligned box query
    Box(Aabb),
    /// Sphere query
    Sphere(Sphere),
    /// Ray query
    Ray(Ray),
    /// Convex volume query
    Volume(PlaneBoundedVolume),
}

impl QueryShape {
    /// Classify `target` against this shape
    pub fn classify(&self, target: &Aabb) -> Intersection {
        match self {
            Self::Box(query) => classify_box(query, target),
            Self::Sphere(sphere) => classify_sphere(sphere, target),
            Self::Ray(ray) => classify_ray(ray, target),
            Self::Volume(volume) => classify_volume(volume, target),
        }
    }

    /// Quick overlap test used to reject whole zones by their enclosure
    pub fn touches(&self, target: &Aabb) -> bool {
        self.classify(target) != Intersection::Outside
    }
}

/// Classify `target` against a query box
pub fn classify_box(query: &Aabb, target: &Aabb) -> Intersection {
    if query.is_null() || target.is_null() {
        return Intersection::Outside;
    }
    if query.is_infinite() {
        return Intersection::Inside;
    }
    if target.is_infinite() {
        return Intersection::Intersect;
    }

    for axis in 0..3 {
        if target.min[axis] > query.max[axis] || target.max[axis] < query.min[axis] {
            return Intersection::Outside;
        }
    }

    let inside = (0..3).all(|axis| {
        target.min[axis] > query.min[axis] && target.max[axis] < query.max[axis]
    });

    if inside {
        Intersection::Inside
    } else {
        Intersection::Intersect
    }
}

/// Classify `target` against a sphere
pub fn classify_sphere(sphere: &Sphere, target: &Aabb) -> Intersection {
    match target.extent() {
        Extent::Null => return Intersection::Outside,
        Extent::Infinite => return Intersection::Intersect,
        Extent::Finite => {}
    }

    let r2 = sphere.radius * sphere.radius;
    let to_min = target.min - sphere.center;
    let to_max = target.max - sphere.center;
    if to_min.magnitude_squared() < r2 && to_max.magnitude_squared() < r2 {
        return Intersection::Inside;
    }

    if target.distance_squared(sphere.center) <= r2 {
        Intersection::Intersect
    } else {
        Intersection::Outside
    }
}

/// Classify `target` against a ray; a ray never contains a box
pub fn classify_ray(ray: &Ray, target: &Aabb) -> Intersection {
    match target.extent() {
        Extent::Null => return Intersection::Outside,
        Extent::Infinite => return Intersection::Intersect,
        Extent::Finite => {}
    }

    let origin = ray.origin;
    let dir = ray.direction;
    let mut max_t = Vec3::repeat(-1.0);
    let mut inside = true;

    for axis in 0..3 {
        if origin[axis] < target.min[axis] {
            inside = false;
            if dir[axis] > 0.0 {
                max_t[axis] = (target.min[axis] - origin[axis]) / dir[axis];
            }
        } else if origin[axis] > target.max[axis] {
            inside = false;
            if dir[axis] < 0.0 {
                max_t[axis] = (target.max[axis] - origin[axis]) / dir[axis];
            }
        }
    }

    if inside {
        return Intersection::Intersect;
    }

    let mut plane = 0;
    if max_t[1] > max_t[plane] {
        plane = 1;
    }
    if max_t[2] > max_t[plane] {
        plane = 2;
    }

    if max_t[plane] < 0.0 {
        return Intersection::Outside;
    }

    for axis in (0..3).filter(|&axis| axis != plane) {
        let hit = origin[axis] + max_t[plane] * dir[axis];
        if hit < target.min[axis] - RAY_BOX_EPSILON || hit > target.max[axis] + RAY_BOX_EPSILON {
            return Intersection::Outside;
        }
    }

    Intersection::Intersect
}

/// Classify `target` against a convex plane-bounded volume
pub fn classify_volume(volume: &PlaneBoundedVolume, target: &Aabb) -> Intersection {
    match target.extent() {
        Extent::Null => return Intersection::Outside,
        Extent::Infinite => return Intersection::Intersect,
        Extent::Finite => {}
    }

    let center = target.center();
    let half = target.half_size();
    let mut all_inside = true;

    for plane in &volume.planes {
        let side = plane.side_of_center_half(center, half);
        if side == volume.outside {
            return Intersection::Outside;
        }
        if side == PlaneSide::Both {
            all_inside = false;
        }
    }

    if all_inside {
        Intersection::Inside
    } else {
        Intersection::Intersect
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::bounds::Plane;

    fn unit_box_at(center: Vec3) -> Aabb {
        Aabb::from_center_half_size(center, Vec3::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_box_classification() {
        let query = Aabb::new(Vec3::new(-10.0, -10.0, -10.0), Vec3::new(10.0, 10.0, 10.0));
        assert_eq!(classify_box(&query, &unit_box_at(Vec3::zeros())), Intersection::Inside);
        assert_eq!(classify_box(&query, &unit_box_at(Vec3::new(10.0, 0.0, 0.0))), Intersection::Intersect);
        assert_eq!(classify_box(&query, &unit_box_at(Vec3::new(20.0, 0.0, 0.0))), Intersection::Outside);
    }

    #[test]
    fn test_box_touching_boundary_is_intersect() {
        let query = Aabb::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
        let touching = Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));
        assert_eq!(classify_box(&query, &touching), Intersection::Intersect);
        // Sharing the query's face is not strictly inside
        let flush = Aabb::new(Vec3::zeros(), Vec3::new(0.5, 0.5, 0.5));
        assert_eq!(classify_box(&query, &flush), Intersection::Intersect);
    }

    #[test]
    fn test_box_null_and_infinite() {
        let query = Aabb::new(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(classify_box(&query, &Aabb::null()), Intersection::Outside);
        assert_eq!(classify_box(&Aabb::infinite(), &query), Intersection::Inside);
        assert_eq!(classify_box(&query, &Aabb::infinite()), Intersection::Intersect);
    }

    #[test]
    fn test_sphere_classification() {
        let sphere = Sphere::new(Vec3::zeros(), 10.0);
        assert_eq!(classify_sphere(&sphere, &unit_box_at(Vec3::zeros())), Intersection::Inside);
        assert_eq!(classify_sphere(&sphere, &unit_box_at(Vec3::new(10.0, 0.0, 0.0))), Intersection::Intersect);
        assert_eq!(
            classify_sphere(&sphere, &Aabb::new(Vec3::new(500.0, 500.0, 500.0), Vec3::new(501.0, 501.0, 501.0))),
            Intersection::Outside
        );
    }

    #[test]
    fn test_ray_classification() {
        let ray = Ray::new(Vec3::new(-20.0, 0.0, 0.0), Vec3::x());
        assert_eq!(classify_ray(&ray, &unit_box_at(Vec3::zeros())), Intersection::Intersect);
        assert_eq!(classify_ray(&ray, &unit_box_at(Vec3::new(0.0, 5.0, 0.0))), Intersection::Outside);
        assert_eq!(classify_ray(&ray, &unit_box_at(Vec3::new(-40.0, 0.0, 0.0))), Intersection::Outside);
        // Origin inside
        assert_eq!(classify_ray(&ray, &unit_box_at(Vec3::new(-20.0, 0.0, 0.0))), Intersection::Intersect);
    }

    #[test]
    fn test_volume_classification() {
        let volume = PlaneBoundedVolume::new(vec![
            Plane::from_normal_point(Vec3::y(), Vec3::zeros()),
        ]);
        assert_eq!(classify_volume(&volume, &unit_box_at(Vec3::new(0.0, 5.0, 0.0))), Intersection::Inside);
        assert_eq!(classify_volume(&volume, &unit_box_at(Vec3::zeros())), Intersection::Intersect);
        assert_eq!(classify_volume(&volume, &unit_box_at(Vec3::new(0.0, -5.0, 0.0))), Intersection::Outside);
    }

    #[test]
    fn test_query_shape_dispatch() {
        let shape = QueryShape::Sphere(Sphere::new(Vec3::zeros(), 10.0));
        assert!(shape.touches(&unit_box_at(Vec3::zeros())));
        assert!(!shape.touches(&unit_box_at(Vec3::new(100.0, 0.0, 0.0))));
    }
}
