//! Portal visibility walk
//!
//! Starting in the camera's home zone, every zone reached is walked through
//! its octree, then the walk looks through each visible portal into the
//! zone behind it. Portals are handled near to far so anti-portals can hide
//! the portals behind them before those are entered.

use crate::foundation::collections::{CameraId, EntityId, PortalId, SlotMap, ZoneId};
use crate::foundation::math::Vec3;
use super::entity::EntityStore;
use super::portal::Portal;
use super::portal_camera::PortalCamera;
use super::portal_frustum::PortalFrustum;
use super::render_queue::RenderQueueSink;
use super::zone::Zone;

/// Zones and entities reached by one walk
#[derive(Debug, Clone, Default)]
pub struct VisibleSet {
    /// Entities queued this frame, in discovery order
    pub entities: Vec<EntityId>,
    /// Zones the walk entered, in discovery order
    pub zones: Vec<ZoneId>,
    /// Portals looked through
    pub portals: Vec<PortalId>,
    /// Portals hidden by an anti-portal
    pub occluded_portals: Vec<PortalId>,
}

/// One visibility walk for one camera and frame
pub(crate) struct VisibilityWalk<'a> {
    pub zones: &'a mut SlotMap<ZoneId, Box<dyn Zone>>,
    pub portals: &'a SlotMap<PortalId, Portal>,
    pub entities: &'a mut EntityStore,
    pub camera: &'a mut PortalCamera,
    pub camera_id: CameraId,
    pub frame: u64,
    pub queue: &'a mut dyn RenderQueueSink,
    pub max_depth: usize,
    pub result: VisibleSet,
}

impl VisibilityWalk<'_> {
    /// Walk `zone` and everything visible through its portals
    pub fn find_visible_nodes(&mut self, zone_id: ZoneId, depth: usize) {
        let Some(zone) = self.zones.get_mut(zone_id) else {
            return;
        };
        let zone = zone.octree_zone_mut();
        zone.mark_visible(self.frame, self.camera_id);
        if !self.result.zones.contains(&zone_id) {
            self.result.zones.push(zone_id);
        }
        if zone.is_empty() && zone.anti_portals().is_empty() {
            return;
        }

        zone.walk_octree(
            self.camera,
            self.camera_id,
            self.frame,
            self.entities,
            self.queue,
            &mut self.result.entities,
        );

        let portals = self.portals;
        let camera_position = self.camera.position();
        let mut candidates: Vec<(PortalId, f32)> = zone
            .portals()
            .iter()
            .chain(zone.anti_portals())
            .filter_map(|id| {
                let portal = portals.get(*id)?;
                self.camera
                    .is_portal_visible(*id, portal)
                    .then(|| (*id, (portal.derived_cp() - camera_position).magnitude_squared()))
            })
            .collect();
        candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
        let mut ordered: Vec<Option<PortalId>> = candidates.into_iter().map(|(id, _)| Some(id)).collect();

        for index in 0..ordered.len() {
            let Some(id) = ordered[index] else {
                continue;
            };
            let Some(portal) = portals.get(id) else {
                continue;
            };

            if portal.is_anti_portal() {
                self.occlude_behind(id, portal, camera_position, &mut ordered[index + 1..]);
                continue;
            }

            let Some(target) = portal.target_zone() else {
                continue;
            };
            if depth >= self.max_depth {
                log::warn!(
                    "Portal depth limit {} reached at portal '{}', not entering zone {:?}",
                    self.max_depth,
                    portal.name(),
                    target
                );
                continue;
            }

            let added = self.camera.add_portal_culling_planes(id, portal);
            if added > 0 {
                log::trace!("Looking through portal '{}' ({} planes)", portal.name(), added);
                self.result.portals.push(id);
                self.find_visible_nodes(target, depth + 1);
                self.camera.remove_portal_culling_planes(id);
            }
        }
    }

    /// Null out every later portal completely hidden by an anti-portal
    fn occlude_behind(&mut self, id: PortalId, anti_portal: &Portal, origin: Vec3, later: &mut [Option<PortalId>]) {
        let mut frustum = PortalFrustum::new(origin, self.camera.frustum_projection());
        if frustum.add_portal_culling_planes(id, anti_portal) == 0 {
            return;
        }

        for slot in later {
            let Some(other) = *slot else {
                continue;
            };
            let Some(portal) = self.portals.get(other) else {
                continue;
            };
            if frustum.is_fully_visible(other, portal) {
                log::trace!("Portal '{}' hidden by anti-portal '{}'", portal.name(), anti_portal.name());
                self.result.occluded_portals.push(other);
                *slot = None;
            }
        }
    }
}
