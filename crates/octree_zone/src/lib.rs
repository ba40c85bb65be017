//! # Octree Zone
//!
//! Portal-connected scene zones backed by loose octrees, with paged
//! geo-mipmapped heightmap terrain.
//!
//! ## Features
//!
//! - **Loose octrees**: lazily subdivided, one per zone
//! - **Portals and anti-portals**: visibility and entity membership flow between zones
//! - **Shape queries**: boxes, spheres, rays and plane-bounded volumes across zones
//! - **Terrain zones**: tile LOD chosen per camera, stitched against coarser neighbours
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use octree_zone::prelude::*;
//!
//! fn main() -> Result<(), SceneError> {
//!     let mut scene = ZoneSceneManager::new();
//!     let room = scene.create_zone("room", ZoneType::Octree)?;
//!
//!     let door_out = scene.create_portal(
//!         scene.default_zone(),
//!         Portal::quad("door", [
//!             Vec3::new(-1.0, -1.0, 0.0),
//!             Vec3::new(1.0, -1.0, 0.0),
//!             Vec3::new(1.0, 1.0, 0.0),
//!             Vec3::new(-1.0, 1.0, 0.0),
//!         ]),
//!     )?;
//!     let door_in = scene.create_portal(
//!         room,
//!         Portal::quad("door", [
//!             Vec3::new(-1.0, 1.0, 0.0),
//!             Vec3::new(1.0, 1.0, 0.0),
//!             Vec3::new(1.0, -1.0, 0.0),
//!             Vec3::new(-1.0, -1.0, 0.0),
//!         ]),
//!     )?;
//!     scene.connect_portals(door_out, door_in)?;
//!
//!     let crate_box = scene.create_entity("crate", Aabb::new(Vec3::new(-0.5, -0.5, -6.0), Vec3::new(0.5, 0.5, -5.0)));
//!     scene.add_entity_to_zone(crate_box, room)?;
//!
//!     let camera = scene.create_camera(
//!         Camera::perspective(Vec3::new(0.0, 0.0, 10.0), 60.0, 4.0 / 3.0, 0.1, 1000.0),
//!         scene.default_zone(),
//!     )?;
//!     scene.update_scene();
//!
//!     let mut queue = RenderQueue::new();
//!     let visible = scene.find_visible_objects(camera, &mut queue)?;
//!     println!("{} visible entities", visible.entities.len());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod scene;
pub mod spatial;
pub mod terrain;

/// Common imports for library users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, ConfigFormat},
        foundation::{
            collections::{CameraId, EntityId, PortalId, TileId, ZoneId},
            math::{Transform, Vec3},
        },
        scene::{
            Camera, OctreeZone, OctreeZoneConfig, Portal, PortalKind, RenderQueue, RenderQueueSink,
            RenderableHandle, SceneConfig, SceneEntity, SceneError, VisibleSet, Zone, ZoneSceneManager, ZoneType,
        },
        spatial::{Aabb, Intersection, PlaneBoundedVolume, QueryShape, Ray, Sphere},
        terrain::{
            HeightData, HeightmapPageSource, PageSource, PageSourceRegistry, TerrainError, TerrainSettings,
            TerrainZone, TerrainZoneOptions,
        },
    };
}
