//! Zone scene manager
//!
//! Owns every entity, zone, portal and camera of a portal-connected scene
//! and keeps their relationships consistent:
//! 1. Portals are moved between zones when they pass through bigger portals
//! 2. Entities change home zone when they move through a portal
//! 3. Entities touching a portal become visitors of the zone behind it
//! 4. The visibility walk starts in the camera's zone and follows portals

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::foundation::collections::{CameraId, EntityId, PortalId, SecondaryMap, SlotMap, TileId, ZoneId};
use crate::foundation::math::Vec3;
use crate::spatial::{Aabb, QueryShape};
use crate::terrain::{PageSourceRegistry, TerrainError, TerrainSettings, TerrainZone, TileRenderOperation};
use super::camera::Camera;
use super::entity::{EntityStore, SceneEntity};
use super::portal::{Portal, PortalIntersectResult, PortalKind};
use super::portal_camera::PortalCamera;
use super::render_queue::{RenderQueueSink, RenderableHandle};
use super::visibility::{VisibilityWalk, VisibleSet};
use super::zone::{OctreeZone, OctreeZoneConfig, Zone, ZoneType};

/// Name of the zone every scene starts with
pub const DEFAULT_ZONE_NAME: &str = "Default_Zone";

/// Scene manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Octree settings used for every new zone
    pub octree: OctreeZoneConfig,

    /// Maximum number of portals followed from the camera's zone, also
    /// bounding home-zone and visitor recursion
    pub max_portal_depth: usize,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            octree: OctreeZoneConfig::default(),
            max_portal_depth: 32,
        }
    }
}

impl Config for SceneConfig {}

/// Scene manager errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// No zone with this handle
    #[error("Unknown zone {0:?}")]
    UnknownZone(ZoneId),

    /// No entity with this handle
    #[error("Unknown entity {0:?}")]
    UnknownEntity(EntityId),

    /// No portal with this handle
    #[error("Unknown portal {0:?}")]
    UnknownPortal(PortalId),

    /// No camera with this handle
    #[error("Unknown camera {0:?}")]
    UnknownCamera(CameraId),

    /// Zone names are unique
    #[error("A zone named '{0}' already exists")]
    DuplicateZone(String),

    /// Portal names are unique within a zone
    #[error("Zone '{zone}' already has a portal named '{portal}'")]
    DuplicatePortal {
        /// Zone name
        zone: String,
        /// Portal name
        portal: String,
    },

    /// Location-based connection found no partner
    #[error("Could not find a matching portal for portal '{0}'")]
    MissingTargetZone(String),

    /// Terrain operation on an octree zone
    #[error("Zone '{0}' is not a terrain zone")]
    NotTerrainZone(String),

    /// The default zone lives as long as the scene
    #[error("The default zone cannot be destroyed")]
    CannotDestroyDefaultZone,

    /// Terrain setup failed
    #[error(transparent)]
    Terrain(#[from] TerrainError),
}

/// Scene manager result type
pub type SceneResult<T> = Result<T, SceneError>;

/// Portal-connected zone scene
#[derive(Debug)]
pub struct ZoneSceneManager {
    config: SceneConfig,
    zones: SlotMap<ZoneId, Box<dyn Zone>>,
    portals: SlotMap<PortalId, Portal>,
    cameras: SlotMap<CameraId, PortalCamera>,
    camera_anchors: SecondaryMap<CameraId, EntityId>,
    primary_camera: Option<CameraId>,
    entities: EntityStore,
    default_zone: ZoneId,
    frame: u64,
}

impl Default for ZoneSceneManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneSceneManager {
    /// Create a scene with default configuration
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    /// Create a scene holding only the default zone
    pub fn with_config(config: SceneConfig) -> Self {
        let mut zones: SlotMap<ZoneId, Box<dyn Zone>> = SlotMap::with_key();
        let octree = config.octree.clone();
        let default_zone =
            zones.insert_with_key(|id| Box::new(OctreeZone::new(id, DEFAULT_ZONE_NAME, &octree)) as Box<dyn Zone>);

        Self {
            config,
            zones,
            portals: SlotMap::with_key(),
            cameras: SlotMap::with_key(),
            camera_anchors: SecondaryMap::new(),
            primary_camera: None,
            entities: EntityStore::with_key(),
            default_zone,
            frame: 0,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Number of completed visibility walks
    pub fn frame(&self) -> u64 {
        self.frame
    }

    // ---- zones ----

    /// Zone that homes entities without a better place
    pub fn default_zone(&self) -> ZoneId {
        self.default_zone
    }

    /// Create an empty zone
    pub fn create_zone(&mut self, name: impl Into<String>, zone_type: ZoneType) -> SceneResult<ZoneId> {
        let name = name.into();
        if self.zone_by_name(&name).is_some() {
            return Err(SceneError::DuplicateZone(name));
        }

        let config = self.config.octree.clone();
        let id = self.zones.insert_with_key(|id| -> Box<dyn Zone> {
            match zone_type {
                ZoneType::Octree => Box::new(OctreeZone::new(id, name, &config)),
                ZoneType::Terrain => Box::new(TerrainZone::new(id, name, &config)),
            }
        });
        Ok(id)
    }

    /// Destroy a zone, its portals and its terrain tiles.
    ///
    /// Entities and cameras homed there move to the default zone; portals
    /// elsewhere that led into the zone are left without a target.
    pub fn destroy_zone(&mut self, id: ZoneId) -> SceneResult<()> {
        if id == self.default_zone {
            return Err(SceneError::CannotDestroyDefaultZone);
        }
        let mut zone = self.zones.remove(id).ok_or(SceneError::UnknownZone(id))?;
        log::info!("Destroying zone '{}'", zone.name());

        if let Some(terrain) = zone.as_any_mut().downcast_mut::<TerrainZone>() {
            terrain.clear(&mut self.entities);
        }

        let octree_zone = zone.octree_zone();
        for portal in octree_zone.portals().iter().chain(octree_zone.anti_portals()) {
            self.portals.remove(*portal);
        }
        for portal in self.portals.values_mut() {
            if portal.target_zone() == Some(id) {
                portal.set_target_zone(None);
                portal.set_target_portal(None);
            }
        }

        let homeless: Vec<EntityId> = octree_zone.home_entities().to_vec();
        for entity in homeless {
            if let Some(data) = self.entities.get_mut(entity) {
                data.set_home_zone(None);
            }
            self.rehome_entity(entity, self.default_zone);
        }
        for entity in self.entities.values_mut() {
            let visiting = entity.take_visiting_zones();
            for zone_id in visiting.into_iter().filter(|zone_id| *zone_id != id) {
                entity.add_visiting_zone(zone_id);
            }
        }
        for camera in self.cameras.values_mut() {
            if camera.home_zone() == Some(id) {
                camera.set_home_zone(Some(self.default_zone));
            }
        }
        Ok(())
    }

    /// Zone by handle
    pub fn zone(&self, id: ZoneId) -> Option<&dyn Zone> {
        self.zones.get(id).map(|zone| &**zone)
    }

    /// Mutable zone by handle
    pub fn zone_mut(&mut self, id: ZoneId) -> Option<&mut dyn Zone> {
        self.zones.get_mut(id).map(|zone| -> &mut dyn Zone { &mut **zone })
    }

    /// Octree core of a zone
    pub fn octree_zone(&self, id: ZoneId) -> Option<&OctreeZone> {
        self.zones.get(id).map(|zone| zone.octree_zone())
    }

    /// Terrain zone by handle, `None` for octree zones
    pub fn terrain_zone(&self, id: ZoneId) -> Option<&TerrainZone> {
        self.zones.get(id)?.as_any().downcast_ref::<TerrainZone>()
    }

    /// Mutable terrain zone by handle
    pub fn terrain_zone_mut(&mut self, id: ZoneId) -> Option<&mut TerrainZone> {
        self.zones.get_mut(id)?.as_any_mut().downcast_mut::<TerrainZone>()
    }

    /// Look a zone up by name
    pub fn zone_by_name(&self, name: &str) -> Option<ZoneId> {
        self.zones
            .iter()
            .find(|(_, zone)| zone.name() == name)
            .map(|(id, _)| id)
    }

    /// Handles of every zone
    pub fn zone_ids(&self) -> impl Iterator<Item = ZoneId> + '_ {
        self.zones.keys()
    }

    /// Smallest zone whose enclosure contains `point`, else the default zone
    pub fn find_zone_for_point(&self, point: Vec3) -> ZoneId {
        let mut best = self.default_zone;
        let mut best_volume = f32::INFINITY;

        for (id, zone) in &self.zones {
            let zone = zone.octree_zone();
            if zone.enclosure().is_none() {
                continue;
            }
            let bounds = zone.enclosure_bounds();
            if !bounds.is_finite() || !bounds.contains_point(point) {
                continue;
            }
            let size = bounds.size();
            let volume = size.x * size.y * size.z;
            if volume < best_volume {
                best = id;
                best_volume = volume;
            }
        }
        best
    }

    // ---- entities ----

    /// Create an entity in the zone containing its centre
    pub fn create_entity(&mut self, name: impl Into<String>, bounds: Aabb) -> EntityId {
        let home = if bounds.is_finite() {
            self.find_zone_for_point(bounds.center())
        } else {
            self.default_zone
        };
        let id = self.entities.insert(SceneEntity::with_bounds(name, bounds));
        self.rehome_entity(id, home);
        self.check_node_against_portals(id, home, None, 0);
        id
    }

    /// Remove an entity from every zone and drop it
    pub fn destroy_entity(&mut self, id: EntityId) -> SceneResult<()> {
        let entity = self.entities.remove(id).ok_or(SceneError::UnknownEntity(id))?;

        for zone_id in entity.home_zone().into_iter().chain(entity.visiting_zones().iter().copied()) {
            if let Some(zone) = self.zones.get_mut(zone_id) {
                zone.octree_zone_mut().remove_entity(id);
            }
        }
        for zone in self.zones.values_mut() {
            if zone.octree_zone().enclosure() == Some(id) {
                zone.octree_zone_mut().clear_enclosure();
            }
        }
        self.camera_anchors.retain(|_, anchor| *anchor != id);
        Ok(())
    }

    /// Entity by handle
    pub fn entity(&self, id: EntityId) -> Option<&SceneEntity> {
        self.entities.get(id)
    }

    /// Mutable entity by handle. Zone membership changes go through the manager.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut SceneEntity> {
        self.entities.get_mut(id)
    }

    /// Every entity of the scene
    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    /// Replace an entity's world bounds; applied by [`ZoneSceneManager::update_scene`]
    pub fn set_entity_bounds(&mut self, id: EntityId, bounds: Aabb) -> SceneResult<()> {
        self.entities
            .get_mut(id)
            .ok_or(SceneError::UnknownEntity(id))?
            .set_world_bounds(bounds);
        Ok(())
    }

    /// Move an entity; applied by [`ZoneSceneManager::update_scene`]
    pub fn translate_entity(&mut self, id: EntityId, delta: Vec3) -> SceneResult<()> {
        self.entities
            .get_mut(id)
            .ok_or(SceneError::UnknownEntity(id))?
            .translate(delta);
        Ok(())
    }

    /// Attach a renderable to an entity
    pub fn attach_renderable(&mut self, id: EntityId, renderable: RenderableHandle) -> SceneResult<()> {
        self.entities
            .get_mut(id)
            .ok_or(SceneError::UnknownEntity(id))?
            .attach_renderable(renderable);
        Ok(())
    }

    /// Make `zone` the entity's home zone
    pub fn add_entity_to_zone(&mut self, entity: EntityId, zone: ZoneId) -> SceneResult<()> {
        if !self.entities.contains_key(entity) {
            return Err(SceneError::UnknownEntity(entity));
        }
        if !self.zones.contains_key(zone) {
            return Err(SceneError::UnknownZone(zone));
        }

        self.clear_visits(entity);
        self.rehome_entity(entity, zone);
        self.check_node_against_portals(entity, zone, None, 0);
        Ok(())
    }

    /// Use an entity's bounds as a zone's bounds. The entity is anchored to the zone.
    pub fn set_zone_enclosure(&mut self, zone: ZoneId, entity: EntityId) -> SceneResult<()> {
        if !self.zones.contains_key(zone) {
            return Err(SceneError::UnknownZone(zone));
        }
        if !self.entities.contains_key(entity) {
            return Err(SceneError::UnknownEntity(entity));
        }

        self.clear_visits(entity);
        self.rehome_entity(entity, zone);
        let (Some(target), Some(data)) = (self.zones.get_mut(zone), self.entities.get_mut(entity)) else {
            return Ok(());
        };
        data.set_anchored(true);
        target.set_enclosure(entity, data);
        log::debug!("Entity '{}' encloses zone '{}'", data.name(), target.name());
        Ok(())
    }

    // ---- portals ----

    /// Add a portal to a zone
    pub fn create_portal(&mut self, zone: ZoneId, mut portal: Portal) -> SceneResult<PortalId> {
        let home = self.zones.get(zone).ok_or(SceneError::UnknownZone(zone))?;
        let home = home.octree_zone();
        let duplicate = home
            .portals()
            .iter()
            .chain(home.anti_portals())
            .filter_map(|id| self.portals.get(*id))
            .any(|other| other.name() == portal.name());
        if duplicate {
            return Err(SceneError::DuplicatePortal {
                zone: home.name().to_string(),
                portal: portal.name().to_string(),
            });
        }

        portal.set_current_home_zone(Some(zone));
        portal.update_derived_values();
        let kind = portal.kind();
        log::debug!("Registering {:?} '{}' in zone '{}'", kind, portal.name(), home.name());

        let id = self.portals.insert(portal);
        if let Some(home) = self.zones.get_mut(zone) {
            home.octree_zone_mut().add_portal(id, kind);
        }
        Ok(id)
    }

    /// Add an anti-portal to a zone
    pub fn create_anti_portal(&mut self, zone: ZoneId, portal: Portal) -> SceneResult<PortalId> {
        self.create_portal(zone, portal.with_kind(PortalKind::AntiPortal))
    }

    /// Link two portals to each other's zones
    pub fn connect_portals(&mut self, a: PortalId, b: PortalId) -> SceneResult<()> {
        let zone_a = self.portals.get(a).ok_or(SceneError::UnknownPortal(a))?.current_home_zone();
        let zone_b = self.portals.get(b).ok_or(SceneError::UnknownPortal(b))?.current_home_zone();

        if let Some(portal) = self.portals.get_mut(a) {
            portal.set_target_zone(zone_b);
            portal.set_target_portal(Some(b));
        }
        if let Some(portal) = self.portals.get_mut(b) {
            portal.set_target_zone(zone_a);
            portal.set_target_portal(Some(a));
        }
        Ok(())
    }

    /// Point a portal at a zone without a partner portal
    pub fn set_portal_target_zone(&mut self, portal: PortalId, zone: ZoneId) -> SceneResult<()> {
        if !self.zones.contains_key(zone) {
            return Err(SceneError::UnknownZone(zone));
        }
        let portal = self.portals.get_mut(portal).ok_or(SceneError::UnknownPortal(portal))?;
        portal.set_target_zone(Some(zone));
        Ok(())
    }

    /// Pair every unconnected portal with a coincident portal of another zone.
    /// Returns the number of pairs made.
    pub fn connect_portals_by_location(&mut self) -> SceneResult<usize> {
        let mut connected = 0;
        let unconnected: Vec<PortalId> = self
            .portals
            .iter()
            .filter(|(_, portal)| !portal.is_anti_portal() && portal.target_zone().is_none())
            .map(|(id, _)| id)
            .collect();

        for id in unconnected {
            let Some(portal) = self.portals.get(id) else {
                continue;
            };
            if portal.target_zone().is_some() {
                continue;
            }

            let home = portal.current_home_zone();
            let partner = self
                .portals
                .iter()
                .find(|(other_id, other)| {
                    *other_id != id
                        && !other.is_anti_portal()
                        && other.current_home_zone().is_some()
                        && other.current_home_zone() != home
                        && portal.close_to(other)
                })
                .map(|(other_id, other)| (other_id, other.name().to_string()));

            let Some((partner, partner_name)) = partner else {
                return Err(SceneError::MissingTargetZone(portal.name().to_string()));
            };
            log::info!("Connecting portal '{}' to portal '{}'", portal.name(), partner_name);
            self.connect_portals(id, partner)?;
            connected += 1;
        }
        Ok(connected)
    }

    /// Remove a portal from its zone and from every partner
    pub fn destroy_portal(&mut self, id: PortalId) -> SceneResult<()> {
        let portal = self.portals.remove(id).ok_or(SceneError::UnknownPortal(id))?;
        if let Some(zone) = portal.current_home_zone().and_then(|zone| self.zones.get_mut(zone)) {
            zone.octree_zone_mut().remove_portal(id);
        }
        for other in self.portals.values_mut() {
            if other.target_portal() == Some(id) {
                other.set_target_portal(None);
                other.set_target_zone(None);
            }
        }
        Ok(())
    }

    /// Portal by handle
    pub fn portal(&self, id: PortalId) -> Option<&Portal> {
        self.portals.get(id)
    }

    /// Mutable portal by handle
    pub fn portal_mut(&mut self, id: PortalId) -> Option<&mut Portal> {
        self.portals.get_mut(id)
    }

    // ---- cameras ----

    /// Register a camera in a zone. The first camera becomes the primary camera.
    pub fn create_camera(&mut self, camera: Camera, zone: ZoneId) -> SceneResult<CameraId> {
        if !self.zones.contains_key(zone) {
            return Err(SceneError::UnknownZone(zone));
        }
        let mut portal_camera = PortalCamera::new(camera);
        portal_camera.set_home_zone(Some(zone));
        let id = self.cameras.insert(portal_camera);
        self.primary_camera.get_or_insert(id);
        Ok(id)
    }

    /// Unregister a camera
    pub fn destroy_camera(&mut self, id: CameraId) -> SceneResult<()> {
        self.cameras.remove(id).ok_or(SceneError::UnknownCamera(id))?;
        self.camera_anchors.remove(id);
        if self.primary_camera == Some(id) {
            self.primary_camera = self.cameras.keys().next();
        }
        Ok(())
    }

    /// Camera by handle
    pub fn camera(&self, id: CameraId) -> Option<&PortalCamera> {
        self.cameras.get(id)
    }

    /// Mutable camera by handle
    pub fn camera_mut(&mut self, id: CameraId) -> Option<&mut PortalCamera> {
        self.cameras.get_mut(id)
    }

    /// Camera whose viewport drives terrain LOD
    pub fn primary_camera(&self) -> Option<CameraId> {
        self.primary_camera
    }

    /// Choose the camera whose viewport drives terrain LOD
    pub fn set_primary_camera(&mut self, id: CameraId) -> SceneResult<()> {
        if !self.cameras.contains_key(id) {
            return Err(SceneError::UnknownCamera(id));
        }
        self.primary_camera = Some(id);
        Ok(())
    }

    /// Move a camera to another zone
    pub fn set_camera_home_zone(&mut self, id: CameraId, zone: ZoneId) -> SceneResult<()> {
        if !self.zones.contains_key(zone) {
            return Err(SceneError::UnknownZone(zone));
        }
        self.cameras
            .get_mut(id)
            .ok_or(SceneError::UnknownCamera(id))?
            .set_home_zone(Some(zone));
        Ok(())
    }

    /// Keep a camera in the home zone of an entity (camera rig, player)
    pub fn attach_camera_to_entity(&mut self, camera: CameraId, entity: EntityId) -> SceneResult<()> {
        if !self.cameras.contains_key(camera) {
            return Err(SceneError::UnknownCamera(camera));
        }
        let home = self
            .entities
            .get(entity)
            .ok_or(SceneError::UnknownEntity(entity))?
            .home_zone();
        self.camera_anchors.insert(camera, entity);
        if let (Some(home), Some(portal_camera)) = (home, self.cameras.get_mut(camera)) {
            portal_camera.set_home_zone(Some(home));
        }
        Ok(())
    }

    // ---- terrain ----

    /// Load terrain into a terrain zone from flat settings and a page source.
    ///
    /// The primary camera's viewport height takes precedence over the
    /// `PrimaryViewportHeight` setting.
    pub fn configure_terrain(
        &mut self,
        zone: ZoneId,
        settings: &TerrainSettings,
        sources: &mut PageSourceRegistry,
    ) -> SceneResult<()> {
        let viewport_height = self
            .primary_camera
            .and_then(|id| self.cameras.get(id))
            .map(|camera| camera.camera().viewport_height)
            .filter(|height| *height > 0);

        let target = self.zones.get_mut(zone).ok_or(SceneError::UnknownZone(zone))?;
        let name = target.name().to_string();
        let terrain = target
            .as_any_mut()
            .downcast_mut::<TerrainZone>()
            .ok_or(SceneError::NotTerrainZone(name))?;
        terrain.configure(settings, sources, viewport_height, &mut self.entities)?;
        Ok(())
    }

    /// Geometry and stitched indices of a visible terrain tile
    pub fn terrain_render_operation(
        &mut self,
        zone: ZoneId,
        tile: TileId,
    ) -> Option<TileRenderOperation<'_>> {
        self.terrain_zone_mut(zone)?.render_operation(tile)
    }

    // ---- per-frame update ----

    /// Bring zone membership up to date after entities or portals moved
    pub fn update_scene(&mut self) {
        for portal in self.portals.values_mut() {
            portal.update_derived_values();
        }
        for zone in self.zones.values_mut() {
            let zone = zone.octree_zone_mut();
            for visitor in zone.visitor_entities().to_vec() {
                zone.remove_entity(visitor);
            }
        }

        self.update_portal_zone_data();

        let ids: Vec<EntityId> = self.entities.keys().collect();
        for id in ids {
            self.update_entity(id);
        }

        for (camera, entity) in &self.camera_anchors {
            let home = self.entities.get(*entity).and_then(SceneEntity::home_zone);
            if let (Some(home), Some(portal_camera)) = (home, self.cameras.get_mut(camera)) {
                portal_camera.set_home_zone(Some(home));
            }
        }
    }

    fn update_entity(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        entity.take_visiting_zones();
        let moved = entity.has_moved();
        let anchored = entity.is_anchored();

        let home = match entity.home_zone() {
            Some(home) if self.zones.contains_key(home) => home,
            _ => {
                let point = entity.position();
                let home = self.find_zone_for_point(point);
                self.rehome_entity(id, home);
                home
            }
        };

        if moved && !anchored {
            self.update_home_zone_from(id, home, false, 0);
        }

        let Some(entity) = self.entities.get(id) else {
            return;
        };
        let bounds = *entity.world_aabb();
        let home = entity.home_zone().unwrap_or(self.default_zone);
        if let Some(zone) = self.zones.get_mut(home) {
            zone.octree_zone_mut().update_node_octant(id, bounds);
        }

        self.check_node_against_portals(id, home, None, 0);

        if moved {
            for zone in self.zones.values_mut() {
                if zone.octree_zone().enclosure() == Some(id) {
                    zone.enclosure_moved(bounds);
                }
            }
        }
        if let Some(entity) = self.entities.get_mut(id) {
            entity.clear_moved();
        }
    }

    /// Move portals that passed through a bigger portal into that portal's
    /// target zone, and retarget portals that passed through a bigger
    /// portal of their target zone.
    fn update_portal_zone_data(&mut self) {
        let zone_ids: Vec<ZoneId> = self.zones.keys().collect();

        for zone_id in zone_ids {
            let Some(zone) = self.zones.get(zone_id) else {
                continue;
            };
            let own: Vec<PortalId> = zone.octree_zone().portals().to_vec();
            let mut transfers = Vec::new();
            let mut retargets = Vec::new();

            for &id in &own {
                let Some(portal) = self.portals.get(id) else {
                    continue;
                };
                let radius = portal.radius();

                let crossed = own
                    .iter()
                    .filter_map(|other| self.portals.get(*other))
                    .find(|other| {
                        radius < other.radius()
                            && other.target_zone().is_some_and(|target| target != zone_id)
                            && portal.crossed_portal(other)
                    })
                    .and_then(Portal::target_zone);
                if let Some(new_home) = crossed {
                    transfers.push((id, new_home));
                }

                let Some(target_zone) = portal.target_zone().filter(|target| *target != zone_id) else {
                    continue;
                };
                let Some(target) = self.zones.get(target_zone) else {
                    continue;
                };
                let retarget = target
                    .octree_zone()
                    .portals()
                    .iter()
                    .filter_map(|other| self.portals.get(*other))
                    .find(|other| {
                        radius < other.radius()
                            && portal.crossed_portal(other)
                            && portal.current_home_zone() != other.target_zone()
                    })
                    .and_then(Portal::target_zone);
                if let Some(new_target) = retarget {
                    retargets.push((id, new_target));
                }
            }

            for (id, new_target) in retargets {
                if let Some(portal) = self.portals.get_mut(id) {
                    log::debug!("Portal '{}' now leads to zone {:?}", portal.name(), new_target);
                    portal.set_target_zone(Some(new_target));
                }
            }
            for (id, new_home) in transfers {
                let Some(portal) = self.portals.get_mut(id) else {
                    continue;
                };
                portal.set_new_home_zone(Some(new_home));
                let kind = portal.kind();
                if let Some(zone) = self.zones.get_mut(zone_id) {
                    zone.octree_zone_mut().remove_portal(id);
                }
                if let Some(zone) = self.zones.get_mut(new_home) {
                    zone.octree_zone_mut().add_portal(id, kind);
                }
                portal.set_current_home_zone(Some(new_home));
                portal.set_new_home_zone(None);
                log::debug!("Portal '{}' moved to zone {:?}", portal.name(), new_home);
            }
        }
    }

    /// Follow portal crossings from the entity's home zone and update it.
    /// Returns the resulting home zone.
    pub fn update_node_home_zone(&mut self, id: EntityId, allow_back_touches: bool) -> SceneResult<ZoneId> {
        let entity = self.entities.get(id).ok_or(SceneError::UnknownEntity(id))?;
        let start = entity.home_zone().unwrap_or(self.default_zone);
        if !entity.is_anchored() {
            self.update_home_zone_from(id, start, allow_back_touches, 0);
        }
        Ok(self
            .entities
            .get(id)
            .and_then(SceneEntity::home_zone)
            .unwrap_or(self.default_zone))
    }

    fn update_home_zone_from(&mut self, id: EntityId, zone_id: ZoneId, allow_back_touches: bool, depth: usize) {
        if depth >= self.config.max_portal_depth {
            log::warn!("Home zone search for {:?} stopped after {} portals", id, depth);
            return;
        }
        let Some(zone) = self.zones.get(zone_id) else {
            return;
        };
        let portals: Vec<PortalId> = zone.octree_zone().portals().to_vec();

        for portal_id in portals {
            let (Some(portal), Some(entity)) = (self.portals.get(portal_id), self.entities.get(id)) else {
                continue;
            };
            let Some(target) = portal.target_zone() else {
                continue;
            };
            let allow_next = match portal.intersects_entity(entity) {
                PortalIntersectResult::IntersectCross => true,
                PortalIntersectResult::IntersectBackNoCross if allow_back_touches => false,
                _ => continue,
            };
            if target == zone_id || entity.home_zone() == Some(target) {
                continue;
            }

            self.rehome_entity(id, target);
            self.update_home_zone_from(id, target, allow_next, depth + 1);
        }
    }

    /// Register the entity as a visitor of every zone it reaches into
    fn check_node_against_portals(&mut self, id: EntityId, zone_id: ZoneId, ignore: Option<PortalId>, depth: usize) {
        if depth >= self.config.max_portal_depth {
            return;
        }
        let Some(zone) = self.zones.get(zone_id) else {
            return;
        };
        let zone = zone.octree_zone();
        let Some(entity) = self.entities.get(id) else {
            return;
        };
        if zone.enclosure() == Some(id) || !entity.allow_to_visit() {
            return;
        }
        let portals: Vec<PortalId> = zone.portals().to_vec();

        for portal_id in portals {
            if Some(portal_id) == ignore {
                continue;
            }
            let (Some(portal), Some(entity)) = (self.portals.get(portal_id), self.entities.get_mut(id)) else {
                continue;
            };
            let Some(target) = portal.target_zone() else {
                continue;
            };
            if portal.intersects_entity(entity) == PortalIntersectResult::NoIntersect {
                continue;
            }
            if entity.home_zone() == Some(target) || entity.visiting_zones().contains(&target) {
                continue;
            }

            entity.add_visiting_zone(target);
            if let Some(visited) = self.zones.get_mut(target) {
                let visited = visited.octree_zone_mut();
                visited.add_entity(id, entity);
                visited.update_node_octant(id, *entity.world_aabb());
            }
            let next_ignore = portal.target_portal();
            self.check_node_against_portals(id, target, next_ignore, depth + 1);
        }
    }

    fn rehome_entity(&mut self, id: EntityId, zone: ZoneId) {
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        let previous = entity.home_zone();
        if previous == Some(zone) && self.zones.get(zone).is_some_and(|z| z.octree_zone().contains_entity(id)) {
            return;
        }

        if let Some(old) = previous.and_then(|old| self.zones.get_mut(old)) {
            old.octree_zone_mut().remove_entity(id);
        }
        if entity.visiting_zones().contains(&zone) {
            let visiting = entity.take_visiting_zones();
            for other in visiting.into_iter().filter(|other| *other != zone) {
                entity.add_visiting_zone(other);
            }
        }
        entity.set_home_zone(Some(zone));
        if let Some(new) = self.zones.get_mut(zone) {
            let new = new.octree_zone_mut();
            new.add_entity(id, entity);
            new.update_node_octant(id, *entity.world_aabb());
            log::debug!("Entity '{}' now homed in zone '{}'", entity.name(), new.name());
        }
    }

    fn clear_visits(&mut self, id: EntityId) {
        let Some(entity) = self.entities.get_mut(id) else {
            return;
        };
        for zone in entity.take_visiting_zones() {
            if let Some(zone) = self.zones.get_mut(zone) {
                zone.octree_zone_mut().remove_visitor(id);
            }
        }
    }

    // ---- queries ----

    /// Walk the scene from a camera, feeding visible renderables to `queue`.
    ///
    /// Terrain zones pick tile LODs for the camera once the walk is done.
    pub fn find_visible_objects(&mut self, camera_id: CameraId, queue: &mut dyn RenderQueueSink) -> SceneResult<VisibleSet> {
        let camera = self
            .cameras
            .get_mut(camera_id)
            .ok_or(SceneError::UnknownCamera(camera_id))?;
        let home = camera
            .home_zone()
            .filter(|zone| self.zones.contains_key(*zone))
            .unwrap_or(self.default_zone);

        self.frame += 1;
        camera.begin_frame();

        let mut walk = VisibilityWalk {
            zones: &mut self.zones,
            portals: &self.portals,
            entities: &mut self.entities,
            camera,
            camera_id,
            frame: self.frame,
            queue,
            max_depth: self.config.max_portal_depth,
            result: VisibleSet::default(),
        };
        walk.find_visible_nodes(home, 0);
        let result = walk.result;

        for id in &result.entities {
            let Some(entity) = self.entities.get(*id) else {
                continue;
            };
            for renderable in entity.renderables() {
                if let RenderableHandle::TerrainTile { zone, .. } = renderable {
                    if let Some(zone) = self.zones.get_mut(*zone) {
                        zone.notify_renderable_visible(*renderable);
                    }
                }
            }
        }

        if let Some(camera) = self.cameras.get(camera_id) {
            for zone in self.zones.values_mut() {
                zone.notify_camera(camera);
            }
        }

        log::trace!(
            "Frame {}: {} entities visible in {} zones",
            self.frame,
            result.entities.len(),
            result.zones.len()
        );
        Ok(result)
    }

    /// Entities overlapping `shape`, starting in `zone` and optionally
    /// following portals the shape touches. Each portal is followed at most
    /// once; the result holds no duplicates.
    pub fn find_entities(
        &self,
        zone: ZoneId,
        shape: &QueryShape,
        include_visitors: bool,
        recurse_through_portals: bool,
        exclude: Option<EntityId>,
    ) -> Vec<EntityId> {
        let mut results = Vec::new();
        let mut visited = HashSet::new();
        self.collect_entities(
            zone,
            shape,
            include_visitors,
            recurse_through_portals,
            exclude,
            &mut visited,
            &mut results,
        );

        let mut seen = HashSet::new();
        results.retain(|id| seen.insert(*id));
        results
    }

    /// Entities overlapping `shape` in any zone, home entities only
    pub fn find_entities_in_all_zones(&self, shape: &QueryShape, exclude: Option<EntityId>) -> Vec<EntityId> {
        let mut results = Vec::new();
        for zone in self.zones.values() {
            zone.octree_zone().find_entities(shape, false, exclude, &mut results);
        }
        let mut seen = HashSet::new();
        results.retain(|id| seen.insert(*id));
        results
    }

    fn collect_entities(
        &self,
        zone: ZoneId,
        shape: &QueryShape,
        include_visitors: bool,
        recurse: bool,
        exclude: Option<EntityId>,
        visited: &mut HashSet<PortalId>,
        results: &mut Vec<EntityId>,
    ) {
        let Some(zone) = self.zones.get(zone) else {
            return;
        };
        let zone = zone.octree_zone();
        zone.find_entities(shape, include_visitors, exclude, results);
        if !recurse {
            return;
        }

        for id in zone.portals() {
            let Some(portal) = self.portals.get(*id) else {
                continue;
            };
            let Some(target) = portal.target_zone() else {
                continue;
            };
            if visited.contains(id) || !portal.intersects_shape(shape) {
                continue;
            }
            visited.insert(*id);
            self.collect_entities(target, shape, include_visitors, recurse, exclude, visited, results);
        }
    }
}
