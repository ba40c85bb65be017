//! Portal-connected zone scene
//!
//! ## Architecture
//!
//! ```text
//! ZoneSceneManager (owns entities, zones, portals, cameras)
//!      ↓
//! Zones (OctreeZone / TerrainZone, one loose octree each)
//!      ↓
//! Portal walk (PortalCamera + PortalFrustum) → RenderQueueSink
//! ```
//!
//! The scene manager:
//! - Keeps every entity's home zone and visited zones up to date
//! - Moves portals that travel through bigger portals into the zone behind them
//! - Walks visible zones from the camera's zone through portals and anti-portals
//! - Answers shape queries across zones without revisiting portals

pub mod camera;
pub mod entity;
pub mod portal;
pub mod portal_camera;
pub mod portal_frustum;
pub mod render_queue;
pub mod scene_manager;
pub mod visibility;
pub mod zone;

#[cfg(test)]
mod tests;

pub use camera::{Camera, Frustum, Projection, Visibility};
pub use entity::{EntityStore, SceneEntity};
pub use portal::{Portal, PortalIntersectResult, PortalKind, PortalShape};
pub use portal_camera::PortalCamera;
pub use portal_frustum::{CullingPlane, FrustumProjection, PortalFrustum};
pub use render_queue::{RenderBatch, RenderGroup, RenderQueue, RenderQueueSink, RenderableHandle};
pub use scene_manager::{SceneConfig, SceneError, SceneResult, ZoneSceneManager, DEFAULT_ZONE_NAME};
pub use visibility::VisibleSet;
pub use zone::{OctreeZone, OctreeZoneConfig, OctreeZoneData, Zone, ZoneType};
