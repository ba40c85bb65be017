//! A square block of terrain vertices with geo-mipmapped LOD
//!
//! Each tile owns `tile_size * tile_size` vertices cut out of its page's
//! height samples. At setup it measures, for every LOD level, how far the
//! camera has to be before dropping to that level keeps the vertical error
//! under the configured pixel error. Per frame it picks its level from the
//! camera distance.

use crate::foundation::collections::{EntityId, TileId};
use crate::foundation::math::{Vec2, Vec3};
use crate::spatial::{Aabb, Plane};
use super::error::TerrainError;
use super::indices::Neighbor;
use super::options::TerrainZoneOptions;

/// Terrain tile at one position of a page
#[derive(Debug, Clone)]
pub struct TerrainTile {
    name: String,
    tile_size: usize,
    start_x: usize,
    start_z: usize,
    positions: Vec<Vec3>,
    tex_coords0: Vec<Vec2>,
    tex_coords1: Vec<Vec2>,
    normals: Vec<Vec3>,
    bounds: Aabb,
    center: Vec3,
    bounding_radius: f32,
    min_level_dist_sqr: Vec<f32>,
    next_level_down: Vec<usize>,
    delta_buffers: Vec<Vec<f32>>,
    neighbors: [Option<TileId>; 4],
    render_level: usize,
    next_level: usize,
    morph_factor: f32,
    initialized: bool,
    entity: Option<EntityId>,
}

impl TerrainTile {
    /// Create an empty tile
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tile_size: 0,
            start_x: 0,
            start_z: 0,
            positions: Vec::new(),
            tex_coords0: Vec::new(),
            tex_coords1: Vec::new(),
            normals: Vec::new(),
            bounds: Aabb::null(),
            center: Vec3::zeros(),
            bounding_radius: 0.0,
            min_level_dist_sqr: Vec::new(),
            next_level_down: Vec::new(),
            delta_buffers: Vec::new(),
            neighbors: [None; 4],
            render_level: 0,
            next_level: 0,
            morph_factor: 0.0,
            initialized: false,
            entity: None,
        }
    }

    /// Build vertices from page heights starting at sample (`start_x`, `start_z`).
    ///
    /// `page_heights` holds `page_size * page_size` samples, row by row.
    /// A tile too small for the configured number of LOD levels is left
    /// uninitialised.
    pub fn initialize(
        &mut self,
        options: &TerrainZoneOptions,
        start_x: usize,
        start_z: usize,
        page_heights: &[f32],
    ) -> Result<(), TerrainError> {
        let tile_size = options.tile_size;
        let page_size = options.page_size;

        if options.max_geo_mipmap_level != 0 {
            let needed = (1usize << (options.max_geo_mipmap_level - 1)) + 1;
            if needed > tile_size {
                log::warn!(
                    "Tile '{}' of size {} cannot hold {} LOD levels, skipping",
                    self.name,
                    tile_size,
                    options.max_geo_mipmap_level
                );
                return Ok(());
            }
        }

        let needed = page_size * page_size;
        if page_heights.len() < needed {
            return Err(TerrainError::HeightmapTruncated {
                expected: needed,
                actual: page_heights.len(),
            });
        }

        let end_x = start_x + tile_size;
        let end_z = start_z + tile_size;
        let scale = options.scale;
        let page_span = (page_size - 1) as f32;
        let tile_span = (tile_size - 1) as f32;
        let detail_tile = options.detail_tile as f32;

        self.tile_size = tile_size;
        self.start_x = start_x;
        self.start_z = start_z;
        self.positions = Vec::with_capacity(tile_size * tile_size);
        self.tex_coords0 = Vec::with_capacity(tile_size * tile_size);
        self.tex_coords1 = Vec::with_capacity(tile_size * tile_size);

        let mut min_height = f32::MAX;
        let mut max_height = f32::MIN;

        for j in start_z..end_z {
            for i in start_x..end_x {
                let height = page_heights[j * page_size + i] * scale.y;
                min_height = min_height.min(height);
                max_height = max_height.max(height);

                self.positions
                    .push(Vec3::new(i as f32 * scale.x, height, j as f32 * scale.z));
                self.tex_coords0
                    .push(Vec2::new(i as f32 / page_span, j as f32 / page_span));
                self.tex_coords1.push(Vec2::new(
                    i as f32 / tile_span * detail_tile,
                    j as f32 / tile_span * detail_tile,
                ));
            }
        }

        self.bounds = Aabb::new(
            Vec3::new(start_x as f32 * scale.x, min_height, start_z as f32 * scale.z),
            Vec3::new(
                (end_x - 1) as f32 * scale.x,
                max_height,
                (end_z - 1) as f32 * scale.z,
            ),
        );
        self.center = self.bounds.center();

        let extent_x = (end_x - 1 - start_x) as f32 * scale.x;
        let extent_z = (end_z - 1 - start_z) as f32 * scale.z;
        let extent_y = max_height - min_height;
        self.bounding_radius =
            (extent_y * extent_y + extent_x * extent_x + extent_z * extent_z).sqrt() / 2.0;

        let c = options.detail_factor()?;
        self.calculate_min_level_dist2(options, c);

        self.render_level = 0;
        self.next_level = 0;
        self.morph_factor = 0.0;
        self.initialized = true;
        Ok(())
    }

    /// Squared camera distance at which each LOD level becomes acceptable.
    ///
    /// For every level, each skipped vertex is compared with the height the
    /// coarser triangles would give it there; the largest error, scaled by
    /// `c`, sets the level's threshold. Thresholds never decrease with level.
    pub fn calculate_min_level_dist2(&mut self, options: &TerrainZoneOptions, c: f32) {
        let levels = options.max_geo_mipmap_level;
        let tile_size = self.tile_size;

        self.min_level_dist_sqr = vec![0.0; levels];
        self.next_level_down = vec![0; levels];
        self.delta_buffers = if options.lod_morph {
            vec![vec![0.0; tile_size * tile_size]; levels.saturating_sub(1)]
        } else {
            Vec::new()
        };

        for level in 1..levels {
            let step = 1usize << level;
            let mut max_dist_sqr = 0.0f32;

            let mut j = 0;
            while j < tile_size - step {
                let mut i = 0;
                while i < tile_size - step {
                    let v1 = self.vertex(i, j);
                    let v2 = self.vertex(i + step, j);
                    let v3 = self.vertex(i, j + step);
                    let v4 = self.vertex(i + step, j + step);

                    let (t1, t2, backward) = if !options.use_tri_strips || j % 2 == 0 {
                        (Plane::from_points(v1, v3, v2), Plane::from_points(v2, v3, v4), false)
                    } else {
                        (Plane::from_points(v1, v3, v4), Plane::from_points(v1, v4, v2), true)
                    };

                    let z_upper = if j == tile_size - step { step } else { step - 1 };
                    let x_upper = if i == tile_size - step { step } else { step - 1 };

                    for z in 0..=z_upper {
                        for x in 0..=x_upper {
                            let full_x = i + x;
                            let full_z = j + z;
                            if full_x % step == 0 && full_z % step == 0 {
                                continue;
                            }

                            let z_pct = z as f32 / step as f32;
                            let x_pct = x as f32 / step as f32;
                            let actual = self.vertex(full_x, full_z);

                            let on_first = (x_pct + z_pct <= 1.0 && !backward)
                                || (x_pct + (1.0 - z_pct) <= 1.0 && backward);
                            let plane = if on_first { &t1 } else { &t2 };
                            if plane.normal.y.abs() <= f32::EPSILON {
                                continue;
                            }
                            let interpolated = (-plane.normal.x * actual.x
                                - plane.normal.z * actual.z
                                - plane.distance)
                                / plane.normal.y;

                            let delta = (interpolated - actual.y).abs();
                            max_dist_sqr = max_dist_sqr.max(delta * delta * c * c);

                            let on_edge = full_x == 0
                                || full_x == tile_size - 1
                                || full_z == 0
                                || full_z == tile_size - 1;
                            if options.lod_morph && !on_edge {
                                self.delta_buffers[level - 1][full_x + full_z * tile_size] =
                                    interpolated - actual.y;
                            }
                        }
                    }
                    i += step;
                }
                j += step;
            }

            self.min_level_dist_sqr[level] = max_dist_sqr;
        }

        for level in 1..levels {
            if self.min_level_dist_sqr[level] < self.min_level_dist_sqr[level - 1] {
                self.min_level_dist_sqr[level] = self.min_level_dist_sqr[level - 1];
            }
        }

        // Walk down from the coarsest level to find each level's next distinct threshold
        let mut last_index = levels.saturating_sub(1);
        let mut last_dist = self.min_level_dist_sqr.last().copied().unwrap_or(0.0);
        for level in (0..levels.saturating_sub(1)).rev() {
            self.next_level_down[level] = last_index;
            if (self.min_level_dist_sqr[level] - last_dist).abs() > f32::EPSILON {
                last_index = level;
                last_dist = self.min_level_dist_sqr[level];
            }
        }
        if let Some(last) = self.next_level_down.last_mut() {
            *last = 0;
        }
    }

    /// Choose the render level for a camera at `camera_position`
    pub fn notify_camera(&mut self, options: &TerrainZoneOptions, camera_position: Vec3) {
        if !self.initialized {
            return;
        }
        let levels = options.max_geo_mipmap_level.max(1);

        if let Some(forced) = options.forced_render_level {
            self.render_level = forced.min(levels - 1);
            self.next_level = 0;
            self.morph_factor = 0.0;
            return;
        }

        let diff = (camera_position - self.bounds.min)
            .inf(&Vec3::zeros())
            .sup(&(camera_position - self.bounds.max));
        let dist_sqr = diff.magnitude_squared();

        let level = self
            .min_level_dist_sqr
            .iter()
            .position(|threshold| *threshold > dist_sqr)
            .and_then(|i| i.checked_sub(1))
            .unwrap_or(levels - 1);
        self.render_level = level.max(options.min_render_level).min(levels - 1);

        if !options.lod_morph {
            self.next_level = 0;
            self.morph_factor = 0.0;
            return;
        }

        let next = self.next_level_down.get(self.render_level).copied().unwrap_or(0);
        self.next_level = next;
        self.morph_factor = if next == 0 {
            0.0
        } else {
            let current = self.min_level_dist_sqr[self.render_level];
            let range = self.min_level_dist_sqr[next] - current;
            if range > 0.0 {
                let percent = (dist_sqr - current) / range;
                let rescale = 1.0 / (1.0 - options.lod_morph_start);
                ((percent - options.lod_morph_start) * rescale).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
    }

    /// Name given at creation
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether vertices have been built
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Heights per side
    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// First page sample covered, as (x, z)
    pub fn start(&self) -> (usize, usize) {
        (self.start_x, self.start_z)
    }

    /// World position of vertex (`x`, `z`), both in `0..tile_size`
    pub fn vertex(&self, x: usize, z: usize) -> Vec3 {
        self.positions[x + z * self.tile_size]
    }

    /// Vertex positions, row by row
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Page-wide texture coordinates
    pub fn tex_coords0(&self) -> &[Vec2] {
        &self.tex_coords0
    }

    /// Detail texture coordinates
    pub fn tex_coords1(&self) -> &[Vec2] {
        &self.tex_coords1
    }

    /// Vertex normals; empty unless the terrain is lit
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    pub(crate) fn set_normals(&mut self, normals: Vec<Vec3>) {
        self.normals = normals;
    }

    /// World bounds
    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    /// Center of the bounds
    pub fn center(&self) -> Vec3 {
        self.center
    }

    /// Radius of a sphere around the tile
    pub fn bounding_radius(&self) -> f32 {
        self.bounding_radius
    }

    /// Squared switch distance per LOD level
    pub fn min_level_dist_sqr(&self) -> &[f32] {
        &self.min_level_dist_sqr
    }

    /// Next coarser level with a different threshold, 0 for none
    pub fn next_level_down(&self) -> &[usize] {
        &self.next_level_down
    }

    /// Level chosen by the last [`TerrainTile::notify_camera`]
    pub fn render_level(&self) -> usize {
        self.render_level
    }

    /// Blend towards the next coarser level, 0 to 1
    pub fn morph_factor(&self) -> f32 {
        self.morph_factor
    }

    /// Height offsets towards the next coarser level, when morphing
    pub fn delta_buffer(&self) -> Option<&[f32]> {
        self.delta_buffers
            .get(self.next_level.saturating_sub(1))
            .map(Vec::as_slice)
    }

    /// Neighbour on `edge`
    pub fn neighbor(&self, edge: Neighbor) -> Option<TileId> {
        self.neighbors[edge.index()]
    }

    /// All neighbours in slot order
    pub fn neighbors(&self) -> [Option<TileId>; 4] {
        self.neighbors
    }

    pub(crate) fn set_neighbor(&mut self, edge: Neighbor, tile: Option<TileId>) {
        self.neighbors[edge.index()] = tile;
    }

    /// Scene entity standing in for this tile
    pub fn entity(&self) -> Option<EntityId> {
        self.entity
    }

    pub(crate) fn set_entity(&mut self, entity: Option<EntityId>) {
        self.entity = entity;
    }

    /// Minimum and maximum corners; only X and Z are meaningful
    pub fn extent_xz(&self) -> (Vec3, Vec3) {
        (self.bounds.min, self.bounds.max)
    }

    /// Interpolated height at (`x`, `z`), clamped to this tile
    pub fn local_height_at(&self, x: f32, z: f32) -> f32 {
        if !self.initialized {
            return 0.0;
        }
        let (start, end) = self.extent_xz();
        let last = self.tile_size - 1;

        let span_x = end.x - start.x;
        let span_z = end.z - start.z;
        let mut x_pct = if span_x > 0.0 { ((x - start.x) / span_x).clamp(0.0, 1.0) } else { 0.0 };
        let mut z_pct = if span_z > 0.0 { ((z - start.z) / span_z).clamp(0.0, 1.0) } else { 0.0 };

        let x_pt = x_pct * last as f32;
        let z_pt = z_pct * last as f32;
        let mut x_index = x_pt as usize;
        let mut z_index = z_pt as usize;

        // On the far edge, step back one cell and sit on its far side
        if x_index >= last {
            x_index = last - 1;
            x_pct = 1.0;
        } else {
            x_pct = x_pt - x_index as f32;
        }
        if z_index >= last {
            z_index = last - 1;
            z_pct = 1.0;
        } else {
            z_pct = z_pt - z_index as f32;
        }

        let mut t1 = self.vertex(x_index, z_index).y;
        let t2 = self.vertex(x_index + 1, z_index).y;
        let b1 = self.vertex(x_index, z_index + 1).y;
        let mut b2 = self.vertex(x_index + 1, z_index + 1).y;

        // Reflect the far corner through the shared diagonal so the result
        // matches the triangle the point lies on
        let midpoint = (b1 + t2) / 2.0;
        if x_pct + z_pct <= 1.0 {
            b2 = midpoint + (midpoint - t1);
        } else {
            t1 = midpoint + (midpoint - b2);
        }

        let top = t1 * (1.0 - x_pct) + t2 * x_pct;
        let bottom = b1 * (1.0 - x_pct) + b2 * x_pct;
        top * (1.0 - z_pct) + bottom * z_pct
    }
}
