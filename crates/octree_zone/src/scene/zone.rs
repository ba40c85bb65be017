//! Octree zones
//!
//! A zone is a region of the scene with its own loose octree. Entities
//! whose home is the zone are stored alongside visitors that reach into it
//! through portals; both kinds live in the same tree and are told apart by
//! their per-zone [`OctreeZoneData`].

use std::any::Any;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::foundation::collections::{CameraId, EntityId, OctantId, PortalId, SecondaryMap, ZoneId};
use crate::foundation::math::Vec3;
use crate::spatial::{Aabb, Octree, QueryShape};
use super::camera::Visibility;
use super::entity::{EntityStore, SceneEntity};
use super::portal::PortalKind;
use super::portal_camera::PortalCamera;
use super::render_queue::{RenderQueueSink, RenderableHandle};

/// Octree settings for new zones
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OctreeZoneConfig {
    /// Maximum subdivision depth
    pub max_depth: u32,
    /// Initial root bounds
    pub bounds: Aabb,
}

impl Default for OctreeZoneConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            bounds: Aabb::new(Vec3::new(-10000.0, -10000.0, -10000.0), Vec3::new(10000.0, 10000.0, 10000.0)),
        }
    }
}

impl Config for OctreeZoneConfig {}

/// Kind of zone to create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneType {
    /// Generic octree zone
    Octree,
    /// Paged heightmap terrain on top of an octree zone
    Terrain,
}

/// What a zone knows about one of its entities
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctreeZoneData {
    /// Octant holding the entity, `None` until placed
    pub octant: Option<OctantId>,
    /// World bounds the entity was last placed with
    pub world_aabb: Aabb,
    /// True when the entity only visits this zone through a portal
    pub visitor: bool,
}

/// True when `aabb` may live in an octant with box `bounds`: its center is
/// strictly inside and it is strictly smaller on every axis.
fn fits_in(bounds: &Aabb, aabb: &Aabb) -> bool {
    if aabb.is_null() {
        return false;
    }
    if bounds.is_infinite() {
        return true;
    }

    let center = aabb.center();
    let inside = (0..3).all(|axis| bounds.min[axis] < center[axis] && center[axis] < bounds.max[axis]);
    inside && crate::foundation::math::utils::all_less(&aabb.size(), &bounds.size())
}

/// Zone backed by a loose octree
#[derive(Debug, Clone)]
pub struct OctreeZone {
    id: ZoneId,
    name: String,
    octree: Octree,
    home_entities: Vec<EntityId>,
    visitor_entities: Vec<EntityId>,
    zone_data: SecondaryMap<EntityId, OctreeZoneData>,
    portals: Vec<PortalId>,
    anti_portals: Vec<PortalId>,
    enclosure: Option<EntityId>,
    enclosure_bounds: Aabb,
    last_visible_frame: u64,
    last_visible_camera: Option<CameraId>,
}

impl OctreeZone {
    /// Create an empty zone
    pub fn new(id: ZoneId, name: impl Into<String>, config: &OctreeZoneConfig) -> Self {
        let name = name.into();
        log::info!("Created octree zone '{}' (max depth {})", name, config.max_depth);
        Self {
            id,
            name,
            octree: Octree::new(config.bounds, config.max_depth),
            home_entities: Vec::new(),
            visitor_entities: Vec::new(),
            zone_data: SecondaryMap::new(),
            portals: Vec::new(),
            anti_portals: Vec::new(),
            enclosure: None,
            enclosure_bounds: Aabb::null(),
            last_visible_frame: 0,
            last_visible_camera: None,
        }
    }

    /// Handle of this zone
    pub fn id(&self) -> ZoneId {
        self.id
    }

    /// Zone name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The zone's octree
    pub fn octree(&self) -> &Octree {
        &self.octree
    }

    /// Current root bounds
    pub fn bounds(&self) -> &Aabb {
        self.octree.root_octant().bounds()
    }

    /// Entities whose home is this zone
    pub fn home_entities(&self) -> &[EntityId] {
        &self.home_entities
    }

    /// Entities visiting through portals
    pub fn visitor_entities(&self) -> &[EntityId] {
        &self.visitor_entities
    }

    /// Per-entity data, `None` if the entity is not in this zone
    pub fn zone_data(&self, entity: EntityId) -> Option<&OctreeZoneData> {
        self.zone_data.get(entity)
    }

    /// True if the entity is a home entity or visitor of this zone
    pub fn contains_entity(&self, entity: EntityId) -> bool {
        self.zone_data.contains_key(entity)
    }

    /// Octant currently holding an entity
    pub fn entity_octant(&self, entity: EntityId) -> Option<OctantId> {
        self.zone_data.get(entity).and_then(|data| data.octant)
    }

    /// Add an entity as home entity or visitor depending on its home zone.
    ///
    /// The entity is not placed in the tree until [`OctreeZone::update_node_octant`].
    pub fn add_entity(&mut self, id: EntityId, entity: &SceneEntity) {
        let visitor = entity.home_zone() != Some(self.id);

        match self.zone_data.get_mut(id) {
            Some(data) if data.visitor == visitor => return,
            Some(data) => data.visitor = visitor,
            None => {
                self.zone_data.insert(
                    id,
                    OctreeZoneData {
                        octant: None,
                        world_aabb: *entity.world_aabb(),
                        visitor,
                    },
                );
            }
        }

        self.home_entities.retain(|other| *other != id);
        self.visitor_entities.retain(|other| *other != id);
        if visitor {
            self.visitor_entities.push(id);
        } else {
            self.home_entities.push(id);
        }
    }

    /// Remove an entity from the tree and from whichever list holds it
    pub fn remove_entity(&mut self, id: EntityId) {
        let Some(data) = self.zone_data.remove(id) else {
            return;
        };
        if let Some(octant) = data.octant {
            self.octree.remove_entity(octant, id);
        }
        if data.visitor {
            self.visitor_entities.retain(|other| *other != id);
        } else {
            self.home_entities.retain(|other| *other != id);
        }
    }

    /// Remove an entity only if it is a visitor here
    pub fn remove_visitor(&mut self, id: EntityId) {
        if self.zone_data.get(id).is_some_and(|data| data.visitor) {
            self.remove_entity(id);
        }
    }

    /// Rebuild the tree with new root bounds and re-place every entity
    pub fn resize(&mut self, bounds: Aabb) {
        log::info!("Resizing zone '{}' to {:?} .. {:?}", self.name, bounds.min, bounds.max);
        self.octree = Octree::new(bounds, self.octree.max_depth());

        let entities: Vec<(EntityId, Aabb)> = self
            .zone_data
            .iter_mut()
            .map(|(id, data)| {
                data.octant = None;
                (id, data.world_aabb)
            })
            .collect();
        for (id, world_aabb) in entities {
            self.update_node_octant(id, world_aabb);
        }
    }

    /// Change the maximum depth; the tree is rebuilt
    pub fn set_max_depth(&mut self, max_depth: u32) {
        let bounds = *self.bounds();
        self.octree = Octree::new(bounds, max_depth);
        self.resize(bounds);
    }

    /// Maximum subdivision depth
    pub fn max_depth(&self) -> u32 {
        self.octree.max_depth()
    }

    /// True when the entity bounds may live in `octant`
    pub fn is_in(&self, octant: OctantId, aabb: &Aabb) -> bool {
        self.octree
            .octant(octant)
            .is_some_and(|node| fits_in(node.bounds(), aabb))
    }

    /// Place or re-place an entity after its bounds changed
    pub fn update_node_octant(&mut self, id: EntityId, world_aabb: Aabb) {
        let Some(data) = self.zone_data.get_mut(id) else {
            return;
        };
        data.world_aabb = world_aabb;
        let current = data.octant;

        if world_aabb.is_null() {
            return;
        }

        let root = self.octree.root();
        match current {
            None => {
                if self.is_in(root, &world_aabb) {
                    self.add_to_octree(id, &world_aabb, root, 0);
                } else {
                    self.place(id, root);
                }
            }
            Some(octant) if !self.is_in(octant, &world_aabb) => {
                if !self.is_in(root, &world_aabb) {
                    if octant != root {
                        self.place(id, root);
                    }
                } else {
                    self.add_to_octree(id, &world_aabb, root, 0);
                }
            }
            Some(_) => {}
        }
    }

    /// Descend from `octant` while the entity is small enough, creating
    /// children on the way, and store it at the deepest octant reached.
    pub fn add_to_octree(&mut self, id: EntityId, world_aabb: &Aabb, octant: OctantId, depth: u32) {
        let max_depth = self.octree.max_depth();
        let mut octant = octant;
        let mut depth = depth;

        while depth < max_depth {
            let Some(node) = self.octree.octant(octant) else {
                return;
            };
            if !node.is_twice_size(world_aabb) {
                break;
            }
            let index = node.child_index(world_aabb);
            octant = self.octree.child_or_create(octant, index);
            depth += 1;
        }

        self.place(id, octant);
    }

    fn place(&mut self, id: EntityId, octant: OctantId) {
        let Some(data) = self.zone_data.get_mut(id) else {
            return;
        };
        if data.octant == Some(octant) {
            return;
        }
        let previous = data.octant.replace(octant);
        if let Some(previous) = previous {
            self.octree.remove_entity(previous, id);
        }
        self.octree.add_entity(octant, id);
        log::trace!("Placed {:?} in octant {:?} of zone '{}'", id, octant, self.name);
    }

    /// Drop empty octant subtrees. Returns the number of octants freed.
    pub fn prune_empty_octants(&mut self) -> usize {
        self.octree.prune_empty()
    }

    /// Register a portal or anti-portal. Returns false if already present.
    pub fn add_portal(&mut self, id: PortalId, kind: PortalKind) -> bool {
        let list = match kind {
            PortalKind::Portal => &mut self.portals,
            PortalKind::AntiPortal => &mut self.anti_portals,
        };
        if list.contains(&id) {
            return false;
        }
        list.push(id);
        true
    }

    /// Unregister a portal or anti-portal
    pub fn remove_portal(&mut self, id: PortalId) {
        self.portals.retain(|other| *other != id);
        self.anti_portals.retain(|other| *other != id);
    }

    /// Outbound portals
    pub fn portals(&self) -> &[PortalId] {
        &self.portals
    }

    /// Anti-portals
    pub fn anti_portals(&self) -> &[PortalId] {
        &self.anti_portals
    }

    /// Use an entity's bounds as the zone's bounds
    pub fn set_enclosure(&mut self, id: EntityId, entity: &SceneEntity) {
        self.enclosure = Some(id);
        self.enclosure_bounds = *entity.world_aabb();
        self.resize(self.enclosure_bounds);
    }

    /// Use an entity as the enclosure but keep the current tree bounds
    pub fn attach_enclosure(&mut self, id: EntityId, bounds: Aabb) {
        self.enclosure = Some(id);
        self.enclosure_bounds = bounds;
    }

    /// Record new enclosure bounds, optionally resizing the tree to them
    pub fn update_enclosure_bounds(&mut self, bounds: Aabb, resize: bool) {
        self.enclosure_bounds = bounds;
        if resize && bounds.is_finite() {
            self.resize(bounds);
        }
    }

    /// Enclosure entity, if any
    pub fn enclosure(&self) -> Option<EntityId> {
        self.enclosure
    }

    /// Bounds of the enclosure entity
    pub fn enclosure_bounds(&self) -> &Aabb {
        &self.enclosure_bounds
    }

    pub(crate) fn clear_enclosure(&mut self) {
        self.enclosure = None;
        self.enclosure_bounds = Aabb::null();
    }

    /// Frame in which the zone was last reached by a visibility walk
    pub fn last_visible_frame(&self) -> u64 {
        self.last_visible_frame
    }

    /// Camera of the last walk that reached this zone
    pub fn last_visible_camera(&self) -> Option<CameraId> {
        self.last_visible_camera
    }

    pub(crate) fn mark_visible(&mut self, frame: u64, camera: CameraId) {
        self.last_visible_frame = frame;
        self.last_visible_camera = Some(camera);
    }

    /// True when the walk has nothing to look at in this zone
    pub fn is_empty(&self) -> bool {
        self.home_entities.is_empty() && self.visitor_entities.is_empty() && self.portals.is_empty()
    }

    /// Entities of this zone overlapping `shape`
    ///
    /// Rejects everything early when an enclosure exists and does not touch
    /// the shape.
    pub fn find_entities(
        &self,
        shape: &QueryShape,
        include_visitors: bool,
        exclude: Option<EntityId>,
        results: &mut Vec<EntityId>,
    ) {
        if self.enclosure.is_some() && !shape.touches(&self.enclosure_bounds) {
            return;
        }

        self.octree.find_entities(shape, results, |id| {
            if Some(id) == exclude {
                return None;
            }
            let data = self.zone_data.get(id)?;
            if data.visitor && !include_visitors {
                return None;
            }
            Some(data.world_aabb)
        });
    }

    /// Collect visible entities of this zone's octree
    pub(crate) fn walk_octree(
        &self,
        camera: &PortalCamera,
        camera_id: CameraId,
        frame: u64,
        entities: &mut EntityStore,
        queue: &mut dyn RenderQueueSink,
        visible: &mut Vec<EntityId>,
    ) {
        let mut walk = OctreeWalk {
            camera,
            camera_id,
            frame,
            entities,
            queue,
            visible,
        };
        walk.visit(&self.octree, self.octree.root(), false);
    }
}

struct OctreeWalk<'a> {
    camera: &'a PortalCamera,
    camera_id: CameraId,
    frame: u64,
    entities: &'a mut EntityStore,
    queue: &'a mut dyn RenderQueueSink,
    visible: &'a mut Vec<EntityId>,
}

impl OctreeWalk<'_> {
    fn visit(&mut self, octree: &Octree, octant: OctantId, parent_full: bool) {
        let Some(node) = octree.octant(octant) else {
            return;
        };
        if node.ref_count() == 0 {
            return;
        }

        let visibility = if parent_full {
            Visibility::Full
        } else if octant == octree.root() {
            Visibility::Partial
        } else {
            self.camera.visibility(&node.cull_bounds())
        };
        if visibility == Visibility::None {
            return;
        }

        for id in node.entities() {
            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            if entity.is_visible_in(self.frame, self.camera_id) {
                continue;
            }
            if visibility == Visibility::Partial && !self.camera.is_visible(entity.world_aabb()) {
                continue;
            }

            entity.mark_visible(self.frame, self.camera_id);
            for renderable in entity.renderables() {
                self.queue.add_renderable(*renderable);
            }
            self.visible.push(id);
        }

        let full = visibility == Visibility::Full;
        for child in node.children() {
            self.visit(octree, child, full);
        }
    }
}

/// Common interface of every zone kind
pub trait Zone: std::fmt::Debug {
    /// Zone kind
    fn zone_type(&self) -> ZoneType;

    /// The octree zone at the core of this zone
    fn octree_zone(&self) -> &OctreeZone;

    /// Mutable access to the core octree zone
    fn octree_zone_mut(&mut self) -> &mut OctreeZone;

    /// Zone name
    fn name(&self) -> &str {
        self.octree_zone().name()
    }

    /// Attach an enclosure entity
    fn set_enclosure(&mut self, id: EntityId, entity: &mut SceneEntity) {
        self.octree_zone_mut().set_enclosure(id, entity);
    }

    /// The enclosure entity moved or was resized
    fn enclosure_moved(&mut self, bounds: Aabb) {
        self.octree_zone_mut().update_enclosure_bounds(bounds, true);
    }

    /// A renderable owned by this zone was found visible this frame
    fn notify_renderable_visible(&mut self, _renderable: RenderableHandle) {}

    /// Called once per walk after every visible renderable was notified
    fn notify_camera(&mut self, _camera: &PortalCamera) {}

    /// Downcast to Any for type-specific access (e.g., TerrainZone)
    fn as_any(&self) -> &dyn Any;

    /// Downcast to Any for mutable type-specific access
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl Zone for OctreeZone {
    fn zone_type(&self) -> ZoneType {
        ZoneType::Octree
    }

    fn octree_zone(&self) -> &OctreeZone {
        self
    }

    fn octree_zone_mut(&mut self) -> &mut OctreeZone {
        self
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
