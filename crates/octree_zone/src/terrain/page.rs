//! A page: a square grid of linked terrain tiles
//!
//! Tiles live in an arena owned by the page and refer to their neighbours
//! by [`TileId`]. Height, normal and segment queries start at the tile
//! under the point and hand off across neighbour links when they leave it.

use crate::foundation::collections::{SlotMap, TileId};
use crate::foundation::math::Vec3;
use super::error::TerrainError;
use super::indices::Neighbor;
use super::options::TerrainZoneOptions;
use super::tile::TerrainTile;

/// Grid of tiles built from one page of heights
#[derive(Debug, Clone)]
pub struct TerrainPage {
    tiles: SlotMap<TileId, TerrainTile>,
    grid: Vec<Vec<TileId>>,
    tiles_per_side: usize,
}

impl TerrainPage {
    /// Cut `heights` into tiles, initialise them and link neighbours.
    ///
    /// `grid[i][j]` is the tile at column `i` (X) and row `j` (Z).
    pub fn build(
        options: &TerrainZoneOptions,
        name: &str,
        heights: &[f32],
    ) -> Result<Self, TerrainError> {
        options.validate()?;
        let tiles_per_side = options.tiles_per_page();
        let stride = options.tile_size - 1;

        let mut tiles = SlotMap::with_key();
        let mut grid = vec![Vec::with_capacity(tiles_per_side); tiles_per_side];

        for q in 0..tiles_per_side {
            for (p, column) in grid.iter_mut().enumerate() {
                let mut tile = TerrainTile::new(format!("{name}[{p}][{q}]"));
                tile.initialize(options, p * stride, q * stride, heights)?;
                column.push(tiles.insert(tile));
            }
        }

        let mut page = Self { tiles, grid, tiles_per_side };
        page.link_neighbors();
        if options.lit {
            page.calculate_normals();
        }

        log::debug!(
            "Built terrain page '{}' with {} tiles",
            name,
            tiles_per_side * tiles_per_side
        );
        Ok(page)
    }

    fn link_neighbors(&mut self) {
        let n = self.tiles_per_side;
        for j in 0..n {
            for i in 0..n {
                let here = self.grid[i][j];
                if j + 1 < n {
                    let south = self.grid[i][j + 1];
                    self.link(here, Neighbor::South, south);
                }
                if i + 1 < n {
                    let east = self.grid[i + 1][j];
                    self.link(here, Neighbor::East, east);
                }
            }
        }
    }

    fn link(&mut self, from: TileId, edge: Neighbor, to: TileId) {
        if let Some(tile) = self.tiles.get_mut(from) {
            tile.set_neighbor(edge, Some(to));
        }
        if let Some(tile) = self.tiles.get_mut(to) {
            tile.set_neighbor(edge.opposite(), Some(from));
        }
    }

    fn calculate_normals(&mut self) {
        let ids: Vec<TileId> = self.tiles.keys().collect();
        for id in ids {
            let Some(tile) = self.tiles.get(id) else { continue };
            if !tile.is_initialized() {
                continue;
            }
            let tile_size = tile.tile_size();
            let mut normals = Vec::with_capacity(tile_size * tile_size);
            for z in 0..tile_size {
                for x in 0..tile_size {
                    let vertex = tile.vertex(x, z);
                    normals.push(self.tile_normal_at(id, vertex.x, vertex.z));
                }
            }
            if let Some(tile) = self.tiles.get_mut(id) {
                tile.set_normals(normals);
            }
        }
    }

    /// Tile arena
    pub fn tiles(&self) -> &SlotMap<TileId, TerrainTile> {
        &self.tiles
    }

    /// Mutable tile arena
    pub fn tiles_mut(&mut self) -> &mut SlotMap<TileId, TerrainTile> {
        &mut self.tiles
    }

    /// Tile by handle
    pub fn tile(&self, id: TileId) -> Option<&TerrainTile> {
        self.tiles.get(id)
    }

    /// Mutable tile by handle
    pub fn tile_mut(&mut self, id: TileId) -> Option<&mut TerrainTile> {
        self.tiles.get_mut(id)
    }

    /// Tile at grid column `i`, row `j`
    pub fn tile_at_grid(&self, i: usize, j: usize) -> Option<TileId> {
        self.grid.get(i)?.get(j).copied()
    }

    /// Tiles along one side
    pub fn tiles_per_side(&self) -> usize {
        self.tiles_per_side
    }

    /// Tile whose X/Z extent contains `point`, found by walking neighbour
    /// links from the first tile
    pub fn tile_at(&self, point: Vec3) -> Option<TileId> {
        let mut current = self.tile_at_grid(0, 0);
        for _ in 0..=self.tiles.len() {
            let id = current?;
            let tile = self.tiles.get(id)?;
            let bounds = tile.bounds();
            current = if point.x < bounds.min.x {
                tile.neighbor(Neighbor::West)
            } else if point.x > bounds.max.x {
                tile.neighbor(Neighbor::East)
            } else if point.z < bounds.min.z {
                tile.neighbor(Neighbor::North)
            } else if point.z > bounds.max.z {
                tile.neighbor(Neighbor::South)
            } else {
                return Some(id);
            };
        }
        None
    }

    /// Terrain height at (`x`, `z`), `None` when no tile covers the point
    pub fn height_at(&self, x: f32, z: f32) -> Option<f32> {
        let tile = self.tile_at(Vec3::new(x, 0.0, z))?;
        Some(self.tile_height_at(tile, x, z))
    }

    /// Height starting at `tile`, following neighbours or clamping to the
    /// edge when the point lies outside it
    pub fn tile_height_at(&self, tile: TileId, mut x: f32, mut z: f32) -> f32 {
        let mut current = tile;
        for _ in 0..=self.tiles.len() {
            let Some(tile) = self.tiles.get(current) else { return 0.0 };
            let (start, end) = tile.extent_xz();

            let edge = if x < start.x {
                Neighbor::West
            } else if x > end.x {
                Neighbor::East
            } else if z < start.z {
                Neighbor::North
            } else if z > end.z {
                Neighbor::South
            } else {
                return tile.local_height_at(x, z);
            };

            match (tile.neighbor(edge), edge) {
                (Some(next), _) => current = next,
                (None, Neighbor::West) => x = start.x,
                (None, Neighbor::East) => x = end.x,
                (None, Neighbor::North) => z = start.z,
                (None, Neighbor::South) => z = end.z,
            }
        }
        self.tiles
            .get(current)
            .map_or(0.0, |tile| tile.local_height_at(x, z))
    }

    /// Surface normal at (`x`, `z`)
    pub fn normal_at(&self, x: f32, z: f32) -> Option<Vec3> {
        let tile = self.tile_at(Vec3::new(x, 0.0, z))?;
        Some(self.tile_normal_at(tile, x, z))
    }

    fn tile_normal_at(&self, tile: TileId, x: f32, z: f32) -> Vec3 {
        let Some(first) = self.tiles.get(tile) else { return Vec3::y() };
        let (start, end) = first.extent_xz();
        let last = first.tile_size().saturating_sub(1).max(1) as f32;
        let spacing_x = (end.x - start.x) / last;
        let spacing_z = (end.z - start.z) / last;

        let here = Vec3::new(x, self.tile_height_at(tile, x, z), z);
        let left = Vec3::new(x - spacing_x, self.tile_height_at(tile, x - spacing_x, z), z) - here;
        let down = Vec3::new(x, self.tile_height_at(tile, x, z + spacing_z), z + spacing_z) - here;

        let (Some(left), Some(down)) = (left.try_normalize(0.0), down.try_normalize(0.0)) else {
            return Vec3::y();
        };
        left.cross(&down).try_normalize(0.0).unwrap_or_else(Vec3::y)
    }

    /// First point at or below the surface when marching from `start`
    /// towards `end` in unit steps
    ///
    /// The march continues along the same direction until it leaves the
    /// page, so hits past `end` are reported too.
    pub fn intersect_segment(&self, start: Vec3, end: Vec3) -> Option<Vec3> {
        let mut current = self.tile_at(start)?;

        let dir = end - start;
        if dir.x == 0.0 && dir.z == 0.0 {
            let height = self.tile_height_at(current, start.x, start.z);
            return (start.y <= height).then_some(start);
        }
        let dir = dir.try_normalize(0.0)?;

        let mut ray = start + dir;
        loop {
            let tile = self.tiles.get(current)?;
            let bounds = tile.bounds();

            while ray.x >= bounds.min.x
                && ray.x <= bounds.max.x
                && ray.z >= bounds.min.z
                && ray.z <= bounds.max.z
            {
                if ray.y <= self.tile_height_at(current, ray.x, ray.z) {
                    return Some(ray);
                }
                ray += dir;
            }

            current = if ray.x < bounds.min.x {
                tile.neighbor(Neighbor::West)
            } else if ray.z < bounds.min.z {
                tile.neighbor(Neighbor::North)
            } else if ray.x > bounds.max.x {
                tile.neighbor(Neighbor::East)
            } else {
                tile.neighbor(Neighbor::South)
            }?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn options() -> TerrainZoneOptions {
        TerrainZoneOptions {
            page_size: 9,
            tile_size: 5,
            max_geo_mipmap_level: 2,
            primary_viewport_height: Some(600),
            ..TerrainZoneOptions::default()
        }
    }

    /// Heights rising along X: sample i has height i / 8
    fn ramp() -> Vec<f32> {
        (0..81).map(|i| (i % 9) as f32 / 8.0).collect()
    }

    #[test]
    fn test_build_links_neighbors() {
        let page = TerrainPage::build(&options(), "page", &ramp()).unwrap();
        assert_eq!(page.tiles_per_side(), 2);
        assert_eq!(page.tiles().len(), 4);

        let nw = page.tile_at_grid(0, 0).unwrap();
        let ne = page.tile_at_grid(1, 0).unwrap();
        let sw = page.tile_at_grid(0, 1).unwrap();

        let tile = page.tile(nw).unwrap();
        assert_eq!(tile.neighbor(Neighbor::East), Some(ne));
        assert_eq!(tile.neighbor(Neighbor::South), Some(sw));
        assert_eq!(tile.neighbor(Neighbor::West), None);
        assert_eq!(page.tile(ne).unwrap().neighbor(Neighbor::West), Some(nw));
        assert_eq!(page.tile(sw).unwrap().neighbor(Neighbor::North), Some(nw));
    }

    #[test]
    fn test_tile_at_walks_to_containing_tile() {
        let page = TerrainPage::build(&options(), "page", &ramp()).unwrap();
        assert_eq!(page.tile_at(Vec3::new(1.0, 0.0, 1.0)), page.tile_at_grid(0, 0));
        assert_eq!(page.tile_at(Vec3::new(6.0, 0.0, 7.0)), page.tile_at_grid(1, 1));
        assert_eq!(page.tile_at(Vec3::new(20.0, 0.0, 1.0)), None);
    }

    #[test]
    fn test_height_follows_ramp_across_tiles() {
        let page = TerrainPage::build(&options(), "page", &ramp()).unwrap();
        assert_relative_eq!(page.height_at(2.0, 2.0).unwrap(), 0.25);
        assert_relative_eq!(page.height_at(6.5, 3.0).unwrap(), 6.5 / 8.0, epsilon = 1e-5);
        assert!(page.height_at(-1.0, 2.0).is_none());

        // Handing off from the first tile reaches the east tile's heights
        let first = page.tile_at_grid(0, 0).unwrap();
        assert_relative_eq!(page.tile_height_at(first, 7.0, 2.0), 7.0 / 8.0, epsilon = 1e-5);
        // Past the page edge the height is clamped
        assert_relative_eq!(page.tile_height_at(first, -3.0, 2.0), 0.0);
    }

    #[test]
    fn test_flat_normal_points_up() {
        let page = TerrainPage::build(&options(), "page", &vec![0.5; 81]).unwrap();
        let normal = page.normal_at(4.0, 4.0).unwrap();
        assert_relative_eq!(normal.y.abs(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_intersect_segment_hits_ground() {
        let page = TerrainPage::build(&options(), "page", &vec![0.5; 81]).unwrap();

        let hit = page
            .intersect_segment(Vec3::new(1.0, 3.0, 1.0), Vec3::new(7.0, -3.0, 7.0))
            .unwrap();
        assert!(hit.y <= 0.5);
        assert!(hit.x > 1.0 && hit.x < 8.0);

        assert!(page
            .intersect_segment(Vec3::new(1.0, 3.0, 1.0), Vec3::new(7.0, 3.0, 7.0))
            .is_none());
        assert_eq!(
            page.intersect_segment(Vec3::new(2.0, 0.1, 2.0), Vec3::new(2.0, -5.0, 2.0)),
            Some(Vec3::new(2.0, 0.1, 2.0))
        );
        assert!(page
            .intersect_segment(Vec3::new(20.0, 0.1, 2.0), Vec3::new(2.0, -5.0, 2.0))
            .is_none());
    }
}
