//! Spatial partitioning structures and queries
//!
//! Provides the bounding primitives, the three-valued shape classification
//! used by scene queries and the loose octree every zone is built on.

mod bounds;
mod intersection;
mod octree;

pub use bounds::{Aabb, Capsule, Extent, Plane, PlaneBoundedVolume, PlaneSide, Ray, Segment, Sphere};
pub use intersection::{classify_box, classify_ray, classify_sphere, classify_volume, Intersection, QueryShape};
pub use octree::{Octant, Octree};
