//! Scene entities as seen by the zone system
//!
//! An entity here is only what the spatial core needs: a world-space box,
//! a position history for portal crossing tests, zone membership and the
//! visibility stamps written by the walk. Transform hierarchies and mesh
//! data belong to the application and reach the renderer through
//! [`RenderableHandle`]s.

use crate::foundation::collections::{CameraId, EntityId, SlotMap, ZoneId};
use crate::foundation::math::Vec3;
use crate::spatial::Aabb;
use super::render_queue::RenderableHandle;

/// Arena holding every entity of a scene
pub type EntityStore = SlotMap<EntityId, SceneEntity>;

/// Entity tracked by the zone system
#[derive(Debug, Clone)]
pub struct SceneEntity {
    name: String,
    world_aabb: Aabb,
    position: Vec3,
    previous_position: Vec3,
    home_zone: Option<ZoneId>,
    visiting_zones: Vec<ZoneId>,
    allow_to_visit: bool,
    anchored: bool,
    renderables: Vec<RenderableHandle>,
    last_visible_frame: u64,
    last_visible_camera: Option<CameraId>,
    moved: bool,
}

impl SceneEntity {
    /// Create an entity with no bounds yet
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            world_aabb: Aabb::null(),
            position: Vec3::zeros(),
            previous_position: Vec3::zeros(),
            home_zone: None,
            visiting_zones: Vec::new(),
            allow_to_visit: true,
            anchored: false,
            renderables: Vec::new(),
            last_visible_frame: 0,
            last_visible_camera: None,
            moved: false,
        }
    }

    /// Create an entity with initial bounds (no movement history)
    pub fn with_bounds(name: impl Into<String>, world_aabb: Aabb) -> Self {
        let mut entity = Self::new(name);
        entity.world_aabb = world_aabb;
        if world_aabb.is_finite() {
            entity.position = world_aabb.center();
            entity.previous_position = entity.position;
        }
        entity
    }

    /// Entity name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// World-space bounds of everything attached to the entity
    pub fn world_aabb(&self) -> &Aabb {
        &self.world_aabb
    }

    /// Derived world position (center of the bounds)
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Position before the latest move
    pub fn previous_position(&self) -> Vec3 {
        self.previous_position
    }

    /// Replace the world bounds, remembering the position at the start of the update
    pub fn set_world_bounds(&mut self, world_aabb: Aabb) {
        if !self.moved {
            self.previous_position = self.position;
        }
        self.world_aabb = world_aabb;
        if world_aabb.is_finite() {
            self.position = world_aabb.center();
        }
        self.moved = true;
    }

    /// Translate the entity, remembering the position at the start of the update
    pub fn translate(&mut self, delta: Vec3) {
        if !self.moved {
            self.previous_position = self.position;
        }
        self.position += delta;
        if self.world_aabb.is_finite() {
            self.world_aabb = Aabb::new(self.world_aabb.min + delta, self.world_aabb.max + delta);
        }
        self.moved = true;
    }

    /// Zone the entity logically belongs to
    pub fn home_zone(&self) -> Option<ZoneId> {
        self.home_zone
    }

    pub(crate) fn set_home_zone(&mut self, zone: Option<ZoneId>) {
        self.home_zone = zone;
    }

    /// Zones the entity currently overlaps through portals
    pub fn visiting_zones(&self) -> &[ZoneId] {
        &self.visiting_zones
    }

    pub(crate) fn add_visiting_zone(&mut self, zone: ZoneId) {
        if !self.visiting_zones.contains(&zone) {
            self.visiting_zones.push(zone);
        }
    }

    pub(crate) fn take_visiting_zones(&mut self) -> Vec<ZoneId> {
        std::mem::take(&mut self.visiting_zones)
    }

    /// Whether the entity may become a visitor of neighbouring zones
    pub fn allow_to_visit(&self) -> bool {
        self.allow_to_visit
    }

    /// Allow or forbid visiting neighbouring zones
    pub fn set_allow_to_visit(&mut self, allow: bool) {
        self.allow_to_visit = allow;
    }

    /// Anchored entities never change home zone through portals
    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// Pin the entity to its home zone
    pub fn set_anchored(&mut self, anchored: bool) {
        self.anchored = anchored;
    }

    /// Renderables queued when the entity is visible
    pub fn renderables(&self) -> &[RenderableHandle] {
        &self.renderables
    }

    /// Attach a renderable
    pub fn attach_renderable(&mut self, renderable: RenderableHandle) {
        self.renderables.push(renderable);
    }

    /// Frame in which the entity was last found visible
    pub fn last_visible_frame(&self) -> u64 {
        self.last_visible_frame
    }

    /// Camera that last found the entity visible
    pub fn last_visible_camera(&self) -> Option<CameraId> {
        self.last_visible_camera
    }

    /// True if the entity was already queued for this frame and camera
    pub fn is_visible_in(&self, frame: u64, camera: CameraId) -> bool {
        self.last_visible_frame == frame && self.last_visible_camera == Some(camera)
    }

    pub(crate) fn mark_visible(&mut self, frame: u64, camera: CameraId) {
        self.last_visible_frame = frame;
        self.last_visible_camera = Some(camera);
    }

    /// True if bounds changed since the last scene update
    pub fn has_moved(&self) -> bool {
        self.moved
    }

    pub(crate) fn clear_moved(&mut self) {
        self.moved = false;
        self.previous_position = self.position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_position_history() {
        let mut entity = SceneEntity::with_bounds(
            "crate",
            Aabb::from_center_half_size(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.5, 0.5, 0.5)),
        );
        assert_eq!(entity.position(), Vec3::new(1.0, 0.0, 0.0));
        assert!(!entity.has_moved());

        entity.translate(Vec3::new(0.0, 0.0, -2.0));
        assert_eq!(entity.previous_position(), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(entity.position(), Vec3::new(1.0, 0.0, -2.0));
        assert_eq!(entity.world_aabb().center(), Vec3::new(1.0, 0.0, -2.0));
        assert!(entity.has_moved());

        // A second move before the scene update keeps the original start point
        entity.translate(Vec3::new(0.0, 0.0, -2.0));
        assert_eq!(entity.previous_position(), Vec3::new(1.0, 0.0, 0.0));

        entity.clear_moved();
        assert_eq!(entity.previous_position(), entity.position());
    }

    #[test]
    fn test_entity_visible_stamp() {
        let mut cameras: SlotMap<CameraId, ()> = SlotMap::with_key();
        let main = cameras.insert(());
        let shadow = cameras.insert(());

        let mut entity = SceneEntity::new("lamp");
        entity.mark_visible(3, main);
        assert!(entity.is_visible_in(3, main));
        assert!(!entity.is_visible_in(3, shadow));
        assert!(!entity.is_visible_in(4, main));
    }
}
