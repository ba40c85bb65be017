//! Terrain zone: an octree zone holding one page of heightmap terrain
//!
//! Each tile of the page is registered as an anchored scene entity of the
//! zone, so the regular visibility walk finds visible tiles. The zone
//! collects the tiles reported visible, picks their LOD once the walk is
//! done and builds stitched index lists on request.

use std::any::Any;
use std::sync::Arc;

use crate::foundation::collections::{EntityId, TileId, ZoneId};
use crate::foundation::math::{Vec2, Vec3};
use crate::scene::entity::{EntityStore, SceneEntity};
use crate::scene::portal_camera::PortalCamera;
use crate::scene::render_queue::RenderableHandle;
use crate::scene::zone::{OctreeZone, OctreeZoneConfig, Zone, ZoneType};
use crate::spatial::Aabb;
use super::error::TerrainError;
use super::indices::{IndexCache, IndexData, StitchFlags};
use super::options::{TerrainSettings, TerrainZoneOptions};
use super::page::TerrainPage;
use super::page_source::PageSourceRegistry;
use super::tile::TerrainTile;

/// Height reported where there is no terrain
pub const NO_TERRAIN_HEIGHT: f32 = -1.0;

/// Everything needed to draw one tile this frame
#[derive(Debug, Clone)]
pub struct TileRenderOperation<'a> {
    /// Tile being drawn
    pub tile: TileId,
    /// Vertex positions
    pub positions: &'a [Vec3],
    /// Vertex normals, empty unless lit
    pub normals: &'a [Vec3],
    /// Page-wide texture coordinates
    pub tex_coords0: &'a [Vec2],
    /// Detail texture coordinates
    pub tex_coords1: &'a [Vec2],
    /// Stitched indices for the current level
    pub indices: Arc<IndexData>,
    /// Current LOD level
    pub render_level: usize,
    /// Blend towards the next coarser level
    pub morph_factor: f32,
    /// Height offsets for morphing
    pub delta: Option<&'a [f32]>,
}

/// Octree zone with a terrain page
#[derive(Debug)]
pub struct TerrainZone {
    zone: OctreeZone,
    options: TerrainZoneOptions,
    page: Option<TerrainPage>,
    index_cache: IndexCache,
    pending_tiles: Vec<TileId>,
    visible_tiles: Vec<TileId>,
    tile_entities: Vec<EntityId>,
}

impl TerrainZone {
    /// Create a terrain zone with no page loaded
    pub fn new(id: ZoneId, name: impl Into<String>, config: &OctreeZoneConfig) -> Self {
        Self {
            zone: OctreeZone::new(id, name, config),
            options: TerrainZoneOptions::default(),
            page: None,
            index_cache: IndexCache::new(),
            pending_tiles: Vec::new(),
            visible_tiles: Vec::new(),
            tile_entities: Vec::new(),
        }
    }

    /// Current options
    pub fn options(&self) -> &TerrainZoneOptions {
        &self.options
    }

    /// Apply settings, initialise the named page source and load page (0, 0).
    ///
    /// `viewport_height` comes from the primary camera; without one the
    /// `PrimaryViewportHeight` setting is used. Any previously loaded page
    /// is dropped along with its tile entities.
    pub fn configure(
        &mut self,
        settings: &TerrainSettings,
        sources: &mut PageSourceRegistry,
        viewport_height: Option<u32>,
        entities: &mut EntityStore,
    ) -> Result<(), TerrainError> {
        let (mut options, forwarded) = TerrainZoneOptions::from_settings(settings)?;
        options.primary_viewport_height = viewport_height.or(options.primary_viewport_height);
        if options.primary_viewport_height.is_none() {
            return Err(TerrainError::NoPrimaryCamera);
        }

        let source = sources.get_mut(&options.page_source)?;
        source.initialize(&options, &forwarded)?;

        self.clear(entities);
        self.options = options;

        let scale = self.options.scale;
        let page_size = self.options.page_size as f32;
        self.zone.resize(Aabb::new(
            Vec3::zeros(),
            Vec3::new(scale.x * page_size, scale.y, scale.z * page_size),
        ));

        if let Some(heights) = source.request_page(0, 0)? {
            self.load_page(&heights, entities)?;
        } else {
            log::warn!(
                "Page source '{}' has no page for terrain zone '{}'",
                self.options.page_source,
                self.zone.name()
            );
        }

        log::info!(
            "Configured terrain zone '{}': page {}, tile {}, {} levels",
            self.zone.name(),
            self.options.page_size,
            self.options.tile_size,
            self.options.max_geo_mipmap_level
        );
        Ok(())
    }

    /// Build the page from heights and register one entity per tile
    pub fn load_page(&mut self, heights: &[f32], entities: &mut EntityStore) -> Result<(), TerrainError> {
        self.clear(entities);
        let mut page = TerrainPage::build(&self.options, self.zone.name(), heights)?;
        let zone_id = self.zone.id();

        for (tile_id, tile) in page.tiles_mut().iter_mut() {
            if !tile.is_initialized() {
                continue;
            }
            let bounds = *tile.bounds();
            let mut entity = SceneEntity::with_bounds(tile.name(), bounds);
            entity.set_home_zone(Some(zone_id));
            entity.set_allow_to_visit(false);
            entity.set_anchored(true);
            entity.attach_renderable(RenderableHandle::TerrainTile { zone: zone_id, tile: tile_id });

            let id = entities.insert(entity);
            tile.set_entity(Some(id));
            self.zone.add_entity(id, &entities[id]);
            self.zone.update_node_octant(id, bounds);
            self.tile_entities.push(id);
        }

        self.page = Some(page);
        Ok(())
    }

    /// Drop the page and remove its tile entities
    pub fn clear(&mut self, entities: &mut EntityStore) {
        for id in self.tile_entities.drain(..) {
            self.zone.remove_entity(id);
            entities.remove(id);
        }
        self.page = None;
        self.index_cache.clear();
        self.pending_tiles.clear();
        self.visible_tiles.clear();
    }

    /// Loaded page
    pub fn page(&self) -> Option<&TerrainPage> {
        self.page.as_ref()
    }

    /// Tile by handle
    pub fn tile(&self, id: TileId) -> Option<&TerrainTile> {
        self.page.as_ref()?.tile(id)
    }

    /// Entities standing in for tiles
    pub fn tile_entities(&self) -> &[EntityId] {
        &self.tile_entities
    }

    /// Tile under `point`
    pub fn tile_at(&self, point: Vec3) -> Option<TileId> {
        self.page.as_ref()?.tile_at(point)
    }

    /// Terrain height at (`x`, `z`), [`NO_TERRAIN_HEIGHT`] off the terrain
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        self.page
            .as_ref()
            .and_then(|page| page.height_at(x, z))
            .unwrap_or(NO_TERRAIN_HEIGHT)
    }

    /// Surface normal at (`x`, `z`)
    pub fn normal_at(&self, x: f32, z: f32) -> Option<Vec3> {
        self.page.as_ref()?.normal_at(x, z)
    }

    /// Where the segment from `start` towards `end` first meets the ground
    pub fn intersect_segment(&self, start: Vec3, end: Vec3) -> Option<Vec3> {
        self.page.as_ref()?.intersect_segment(start, end)
    }

    /// Tiles whose LOD was updated by the last walk
    pub fn visible_tiles(&self) -> &[TileId] {
        &self.visible_tiles
    }

    /// Edges of `tile` bordering a coarser neighbour
    pub fn stitch_flags(&self, tile: TileId) -> StitchFlags {
        let Some(page) = self.page.as_ref() else { return StitchFlags::empty() };
        let Some(current) = page.tile(tile) else { return StitchFlags::empty() };

        let levels = current.neighbors().map(|neighbor| {
            neighbor
                .and_then(|id| page.tile(id))
                .filter(|neighbor| neighbor.is_initialized())
                .map(TerrainTile::render_level)
        });
        StitchFlags::from_levels(current.render_level(), levels)
    }

    /// Draw data for `tile` at its current level
    pub fn render_operation(&mut self, tile: TileId) -> Option<TileRenderOperation<'_>> {
        let flags = self.stitch_flags(tile);
        let page = self.page.as_ref()?;
        let current = page.tile(tile).filter(|current| current.is_initialized())?;

        let indices = self.index_cache.get_or_generate(
            self.options.tile_size,
            current.render_level(),
            flags,
            self.options.use_tri_strips,
        );

        Some(TileRenderOperation {
            tile,
            positions: current.positions(),
            normals: current.normals(),
            tex_coords0: current.tex_coords0(),
            tex_coords1: current.tex_coords1(),
            indices,
            render_level: current.render_level(),
            morph_factor: current.morph_factor(),
            delta: current.delta_buffer(),
        })
    }
}

impl Zone for TerrainZone {
    fn zone_type(&self) -> ZoneType {
        ZoneType::Terrain
    }

    fn octree_zone(&self) -> &OctreeZone {
        &self.zone
    }

    fn octree_zone_mut(&mut self) -> &mut OctreeZone {
        &mut self.zone
    }

    fn set_enclosure(&mut self, id: EntityId, entity: &mut SceneEntity) {
        // Terrain keeps its own bounds
        self.zone.attach_enclosure(id, *entity.world_aabb());
        entity.set_anchored(true);
        entity.set_allow_to_visit(false);
    }

    fn enclosure_moved(&mut self, bounds: Aabb) {
        self.zone.update_enclosure_bounds(bounds, false);
    }

    fn notify_renderable_visible(&mut self, renderable: RenderableHandle) {
        if let RenderableHandle::TerrainTile { zone, tile } = renderable {
            if zone == self.zone.id() && !self.pending_tiles.contains(&tile) {
                self.pending_tiles.push(tile);
            }
        }
    }

    fn notify_camera(&mut self, camera: &PortalCamera) {
        let position = camera.position();
        if let Some(page) = self.page.as_mut() {
            for id in &self.pending_tiles {
                if let Some(tile) = page.tile_mut(*id) {
                    tile.notify_camera(&self.options, position);
                }
            }
        }
        self.visible_tiles = std::mem::take(&mut self.pending_tiles);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crate::foundation::collections::SlotMap;
    use crate::scene::camera::Camera;
    use crate::terrain::indices::Neighbor;
    use crate::terrain::page_source::{HeightData, HeightmapPageSource};

    /// 33x33 heightmap with spikes on odd/odd samples
    fn bumpy_heightmap() -> HeightData {
        let data = (0..33 * 33)
            .map(|i| {
                let (x, z) = (i % 33, i / 33);
                if x % 2 == 1 && z % 2 == 1 { 128 } else { ((x + z) % 3) as u8 * 25 }
            })
            .collect();
        HeightData::from_u8(33, 33, data)
    }

    fn settings() -> TerrainSettings {
        TerrainSettings::from_pairs([
            ("PageSize", "33"),
            ("TileSize", "17"),
            ("PageWorldX", "128"),
            ("PageWorldZ", "128"),
            ("MaxHeight", "1"),
            ("MaxMipMapLevel", "3"),
            ("PageSource", "Heightmap"),
        ])
    }

    fn configured(data: HeightData) -> (TerrainZone, EntityStore) {
        let mut zones: SlotMap<ZoneId, ()> = SlotMap::with_key();
        let id = zones.insert(());
        let mut zone = TerrainZone::new(id, "terrain", &OctreeZoneConfig::default());
        let mut sources = PageSourceRegistry::new();
        sources
            .register("Heightmap", Box::new(HeightmapPageSource::new(data)))
            .unwrap();
        let mut entities = EntityStore::with_key();
        zone.configure(&settings(), &mut sources, Some(768), &mut entities).unwrap();
        (zone, entities)
    }

    #[test]
    fn test_configure_registers_tile_entities() {
        let (zone, entities) = configured(bumpy_heightmap());
        assert_eq!(zone.page().unwrap().tiles().len(), 4);
        assert_eq!(zone.tile_entities().len(), 4);
        assert_eq!(zone.octree_zone().home_entities().len(), 4);

        let bounds = zone.octree_zone().bounds();
        assert_relative_eq!(bounds.max.x, 132.0);
        assert_relative_eq!(bounds.max.y, 1.0);

        for id in zone.tile_entities() {
            let entity = &entities[*id];
            assert!(entity.is_anchored());
            assert!(!entity.allow_to_visit());
            assert_eq!(entity.home_zone(), Some(zone.octree_zone().id()));
            assert!(zone.octree_zone().entity_octant(*id).is_some());
        }
    }

    #[test]
    fn test_configure_without_camera_fails() {
        let mut zones: SlotMap<ZoneId, ()> = SlotMap::with_key();
        let mut zone = TerrainZone::new(zones.insert(()), "terrain", &OctreeZoneConfig::default());
        let mut sources = PageSourceRegistry::new();
        let mut entities = EntityStore::with_key();
        assert_eq!(
            zone.configure(&settings(), &mut sources, None, &mut entities),
            Err(TerrainError::NoPrimaryCamera)
        );
        assert_eq!(
            zone.configure(&settings(), &mut sources, Some(600), &mut entities),
            Err(TerrainError::UnknownPageSource("Heightmap".to_string()))
        );
    }

    #[test]
    fn test_height_queries() {
        let (zone, _) = configured(HeightData::from_u8(33, 33, vec![51; 33 * 33]));
        assert_relative_eq!(zone.height_at(10.0, 70.0), 0.2, epsilon = 1e-5);
        assert_relative_eq!(zone.height_at(-5.0, 10.0), NO_TERRAIN_HEIGHT);

        let normal = zone.normal_at(40.0, 40.0).unwrap();
        assert_relative_eq!(normal.y.abs(), 1.0, epsilon = 1e-5);

        let hit = zone
            .intersect_segment(Vec3::new(10.0, 5.0, 10.0), Vec3::new(100.0, -5.0, 100.0))
            .unwrap();
        assert!(hit.y <= 0.2);
        assert!(zone
            .intersect_segment(Vec3::new(-10.0, 5.0, 10.0), Vec3::new(100.0, -5.0, 100.0))
            .is_none());
    }

    #[test]
    fn test_lod_follows_camera_and_stitches_coarser_neighbor() {
        let (mut zone, _) = configured(bumpy_heightmap());
        let page = zone.page().unwrap();
        let near = page.tile_at_grid(0, 0).unwrap();
        let east = page.tile_at_grid(1, 0).unwrap();
        let handles: Vec<RenderableHandle> = page
            .tiles()
            .keys()
            .map(|tile| RenderableHandle::TerrainTile { zone: zone.octree_zone().id(), tile })
            .collect();

        for handle in handles {
            zone.notify_renderable_visible(handle);
            zone.notify_renderable_visible(handle);
        }
        let camera = PortalCamera::new(Camera::perspective(Vec3::new(8.0, 2.0, 8.0), 60.0, 1.0, 0.1, 1000.0));
        zone.notify_camera(&camera);
        assert_eq!(zone.visible_tiles().len(), 4);

        assert_eq!(zone.tile(near).unwrap().render_level(), 0);
        assert!(zone.tile(east).unwrap().render_level() > 0);

        let flags = zone.stitch_flags(near);
        assert!(flags.stitches(Neighbor::East));
        assert!(!flags.stitches(Neighbor::North));
        assert!(!flags.stitches(Neighbor::West));

        let operation = zone.render_operation(near).unwrap();
        assert_eq!(operation.render_level, 0);
        assert_eq!(operation.positions.len(), 17 * 17);
        assert!(!operation.indices.is_empty());
        assert!(operation.indices.indices.iter().all(|i| *i < 17 * 17));
    }

    #[test]
    fn test_enclosure_keeps_terrain_bounds() {
        let (mut zone, mut entities) = configured(bumpy_heightmap());
        let before = *zone.octree_zone().bounds();
        let id = entities.insert(SceneEntity::with_bounds(
            "shell",
            Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0)),
        ));

        let mut shell = entities[id].clone();
        zone.set_enclosure(id, &mut shell);
        assert_eq!(zone.octree_zone().enclosure(), Some(id));
        assert_eq!(*zone.octree_zone().bounds(), before);
        assert!(shell.is_anchored());
        assert!(!shell.allow_to_visit());

        zone.clear(&mut entities);
        assert!(zone.page().is_none());
        assert_eq!(entities.len(), 1);
    }
}
