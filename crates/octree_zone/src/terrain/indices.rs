//! Geo-mipmap index generation
//!
//! A tile renders at a LOD level where only every `2^level`th vertex is
//! used. Where a neighbour renders coarser, the shared edge is stitched
//! with fan triangles so no cracks open. The resulting index lists depend
//! only on the level and the stitch flags, so they are cached and shared
//! between tiles.

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;

bitflags! {
    /// Which edges need stitching, with the LOD difference per edge.
    ///
    /// Each edge owns one byte: bit 7 says "stitch", the low seven bits
    /// carry how many levels coarser the neighbour is.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StitchFlags: u32 {
        /// North edge (row 0) borders a coarser tile
        const NORTH = 128;
        /// South edge (last row) borders a coarser tile
        const SOUTH = 128 << 8;
        /// West edge (column 0) borders a coarser tile
        const WEST = 128 << 16;
        /// East edge (last column) borders a coarser tile
        const EAST = 128 << 24;

        const _ = !0;
    }
}

/// Edge of a tile, in neighbour slot order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Neighbor {
    /// Towards negative Z
    North = 0,
    /// Towards positive Z
    South = 1,
    /// Towards positive X
    East = 2,
    /// Towards negative X
    West = 3,
}

impl Neighbor {
    /// All four edges in slot order
    pub const ALL: [Self; 4] = [Self::North, Self::South, Self::East, Self::West];

    /// Slot index
    pub fn index(self) -> usize {
        self as usize
    }

    /// Edge seen from the neighbour's side
    pub fn opposite(self) -> Self {
        match self {
            Self::North => Self::South,
            Self::South => Self::North,
            Self::East => Self::West,
            Self::West => Self::East,
        }
    }

    fn shift(self) -> u32 {
        match self {
            Self::North => 0,
            Self::South => 8,
            Self::West => 16,
            Self::East => 24,
        }
    }

    fn flag(self) -> StitchFlags {
        match self {
            Self::North => StitchFlags::NORTH,
            Self::South => StitchFlags::SOUTH,
            Self::West => StitchFlags::WEST,
            Self::East => StitchFlags::EAST,
        }
    }
}

impl StitchFlags {
    /// Flags for a tile at `level` given its neighbours' levels, in slot order
    pub fn from_levels(level: usize, neighbors: [Option<usize>; 4]) -> Self {
        let mut flags = Self::empty();
        for edge in Neighbor::ALL {
            if let Some(neighbor_level) = neighbors[edge.index()] {
                if neighbor_level > level {
                    let delta = ((neighbor_level - level) as u32) & 0x7F;
                    flags |= edge.flag() | Self::from_bits_retain(delta << edge.shift());
                }
            }
        }
        flags
    }

    /// Whether `edge` needs stitching
    pub fn stitches(self, edge: Neighbor) -> bool {
        self.contains(edge.flag())
    }

    /// How many levels coarser the neighbour on `edge` renders
    pub fn level_delta(self, edge: Neighbor) -> usize {
        ((self.bits() >> edge.shift()) & 0x7F) as usize
    }
}

/// Primitive layout of an index list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexTopology {
    /// Three indices per triangle
    TriangleList,
    /// Each index after the second closes a triangle
    TriangleStrip,
}

/// Indices for one tile at one LOD level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexData {
    /// Primitive layout
    pub topology: IndexTopology,
    /// Vertex indices, `x + z * tile_size`
    pub indices: Vec<u32>,
}

impl IndexData {
    /// Number of indices
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// True when nothing is drawn
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

fn vertex_index(tile_size: usize, x: i64, z: i64) -> u32 {
    (x + z * tile_size as i64) as u32
}

/// Triangle list for a tile at `level`, stitched where `flags` says
pub fn generate_tri_list_indices(tile_size: usize, level: usize, flags: StitchFlags) -> IndexData {
    let step = 1usize << level;
    let mut indices = Vec::new();

    let edge_step = |edge| if flags.stitches(edge) { step } else { 0 };
    let north = edge_step(Neighbor::North);
    let south = edge_step(Neighbor::South);
    let east = edge_step(Neighbor::East);
    let west = edge_step(Neighbor::West);

    let idx = |x: usize, z: usize| vertex_index(tile_size, x as i64, z as i64);

    let mut j = north;
    while j < tile_size - 1 - south {
        let mut i = west;
        while i < tile_size - 1 - east {
            indices.extend_from_slice(&[
                idx(i, j + step),
                idx(i + step, j),
                idx(i, j),
                idx(i + step, j + step),
                idx(i + step, j),
                idx(i, j + step),
            ]);
            i += step;
        }
        j += step;
    }

    let edges = [
        (Neighbor::North, west > 0, east > 0),
        (Neighbor::East, north > 0, south > 0),
        (Neighbor::South, east > 0, west > 0),
        (Neighbor::West, south > 0, north > 0),
    ];
    for (edge, omit_first, omit_last) in edges {
        if flags.stitches(edge) {
            let coarse = level + flags.level_delta(edge);
            stitch_edge(tile_size, edge, level, coarse, omit_first, omit_last, &mut indices);
        }
    }

    IndexData {
        topology: IndexTopology::TriangleList,
        indices,
    }
}

/// Fan triangles joining a tile edge at `hi_lod` to a neighbour at `lo_lod`.
///
/// `omit_first` and `omit_last` drop the corner triangles another edge's
/// stitching already covers. Returns the number of indices appended.
pub fn stitch_edge(
    tile_size: usize,
    edge: Neighbor,
    hi_lod: usize,
    lo_lod: usize,
    omit_first: bool,
    omit_last: bool,
    out: &mut Vec<u32>,
) -> usize {
    let before = out.len();
    let last = tile_size as i64 - 1;

    let mut step = 1i64 << hi_lod;
    let mut superstep = 1i64 << lo_lod;
    let mut halfsuperstep = superstep >> 1;

    let (start_x, end_x, start_y, rowstep, horizontal) = match edge {
        Neighbor::North => (0, last, 0, step, true),
        Neighbor::South => {
            let rowstep = -step;
            step = -step;
            superstep = -superstep;
            halfsuperstep = -halfsuperstep;
            (last, 0, last, rowstep, true)
        }
        Neighbor::East => (0, last, last, -step, false),
        Neighbor::West => {
            let rowstep = step;
            step = -step;
            superstep = -superstep;
            halfsuperstep = -halfsuperstep;
            (last, 0, 0, rowstep, false)
        }
    };

    let idx = |a: i64, b: i64| {
        if horizontal {
            vertex_index(tile_size, a, b)
        } else {
            vertex_index(tile_size, b, a)
        }
    };

    let mut j = start_x;
    while j != end_x {
        // Fine-side triangles up to the midpoint of the coarse edge
        let mut k = 0;
        while k != halfsuperstep {
            let jk = j + k;
            if !(j == start_x && k == 0 && omit_first) {
                out.extend_from_slice(&[
                    idx(jk, start_y + rowstep),
                    idx(jk + step, start_y + rowstep),
                    idx(j, start_y),
                ]);
            }
            k += step;
        }

        out.extend_from_slice(&[
            idx(j + halfsuperstep, start_y + rowstep),
            idx(j + superstep, start_y),
            idx(j, start_y),
        ]);

        let mut k = halfsuperstep;
        while k != superstep {
            let jk = j + k;
            if !(j == end_x - superstep && k == superstep - step && omit_last) {
                out.extend_from_slice(&[
                    idx(jk, start_y + rowstep),
                    idx(jk + step, start_y + rowstep),
                    idx(j + superstep, start_y),
                ]);
            }
            k += step;
        }

        j += superstep;
    }

    out.len() - before
}

/// Triangle strip for a tile at `level`.
///
/// Edge vertices bordering a coarser neighbour are snapped onto the
/// coarser grid, which produces degenerate triangles instead of cracks.
pub fn generate_tri_strip_indices(tile_size: usize, level: usize, flags: StitchFlags) -> IndexData {
    let step = 1usize << level;
    let lowstep = 1usize << (level + 1);
    let last = tile_size - 1;
    let mut indices = Vec::new();

    let idx = |x: usize, z: usize| vertex_index(tile_size, x as i64, z as i64);
    let snap = |value: &mut usize| {
        if *value % lowstep != 0 {
            *value -= step;
        }
    };

    let mut j = 0;
    while j < last {
        // Left to right
        let mut i = 0;
        while i < last {
            let (mut x0, mut x1, mut x2, mut x3) = (i, i, i + step, i + step);
            let (mut y0, mut y1, mut y2, mut y3) = (j, j + step, j, j + step);

            if j == 0 && flags.stitches(Neighbor::North) {
                snap(&mut x0);
                snap(&mut x2);
            }
            if i == 0 && flags.stitches(Neighbor::West) {
                snap(&mut y0);
                snap(&mut y1);
            }
            if i == last - step && flags.stitches(Neighbor::East) {
                snap(&mut y2);
                snap(&mut y3);
            }

            if i == 0 {
                indices.push(idx(x0, y0));
            }
            indices.push(idx(x1, y1));
            indices.push(idx(x2, y2));
            if i == last - step {
                indices.push(idx(x3, y3));
            }
            i += step;
        }

        j += step;
        if j >= last {
            break;
        }

        // Right to left
        let mut i = last;
        while i > 0 {
            let (mut x1, x2, mut x3) = (i, i - step, i - step);
            let (mut y1, mut y2, mut y3) = (j + step, j, j + step);

            if j == last - step && flags.stitches(Neighbor::South) {
                snap(&mut x1);
                snap(&mut x3);
            }
            if i == step && flags.stitches(Neighbor::West) {
                snap(&mut y2);
                snap(&mut y3);
            }
            if i == last && flags.stitches(Neighbor::East) {
                snap(&mut y1);
            }

            indices.push(idx(x1, y1));
            indices.push(idx(x2, y2));
            if i == step {
                indices.push(idx(x3, y3));
                if j < last - step {
                    indices.push(idx(x3, y3));
                }
            }
            i -= step;
        }
        j += step;
    }

    IndexData {
        topology: IndexTopology::TriangleStrip,
        indices,
    }
}

/// Shared cache of generated index lists, keyed by level and stitch flags
#[derive(Debug, Default)]
pub struct IndexCache {
    entries: HashMap<(usize, StitchFlags), Arc<IndexData>>,
}

impl IndexCache {
    /// Empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached indices for `level`/`flags`, generating them on first use
    pub fn get_or_generate(
        &mut self,
        tile_size: usize,
        level: usize,
        flags: StitchFlags,
        use_tri_strips: bool,
    ) -> Arc<IndexData> {
        Arc::clone(self.entries.entry((level, flags)).or_insert_with(|| {
            log::trace!("Generating terrain indices for level {level} flags {flags:?}");
            let data = if use_tri_strips {
                generate_tri_strip_indices(tile_size, level, flags)
            } else {
                generate_tri_list_indices(tile_size, level, flags)
            };
            Arc::new(data)
        }))
    }

    /// Number of cached lists
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every cached list
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stitch_flags_record_coarser_neighbors_only() {
        let flags = StitchFlags::from_levels(1, [Some(1), Some(0), Some(3), None]);
        assert!(!flags.stitches(Neighbor::North));
        assert!(!flags.stitches(Neighbor::South));
        assert!(flags.stitches(Neighbor::East));
        assert!(!flags.stitches(Neighbor::West));
        assert_eq!(flags.level_delta(Neighbor::East), 2);
        assert_eq!(flags.bits(), (128 | 2) << 24);
    }

    #[test]
    fn test_unstitched_list_covers_whole_tile() {
        let data = generate_tri_list_indices(17, 0, StitchFlags::empty());
        assert_eq!(data.topology, IndexTopology::TriangleList);
        assert_eq!(data.len(), 16 * 16 * 6);
        assert_eq!(data.indices.iter().copied().max(), Some(17 * 17 - 1));

        let coarse = generate_tri_list_indices(17, 2, StitchFlags::empty());
        assert_eq!(coarse.len(), 4 * 4 * 6);
        assert!(coarse.indices.iter().all(|i| (i % 17) % 4 == 0 && (i / 17) % 4 == 0));
    }

    #[test]
    fn test_east_stitch_against_coarser_neighbor() {
        let flags = StitchFlags::from_levels(0, [None, None, Some(1), None]);
        let data = generate_tri_list_indices(17, 0, flags);

        // 15 interior columns, then 8 fans of 3 triangles along the edge
        let core = 15 * 16 * 6;
        assert_eq!(data.len(), core + 8 * 3 * 3);

        let stitch = &data.indices[core..];
        assert!(stitch.iter().all(|i| i % 17 >= 15));
        // Coarse edge vertices only touch even rows
        assert!(stitch
            .iter()
            .filter(|i| *i % 17 == 16)
            .all(|i| (i / 17) % 2 == 0));
    }

    #[test]
    fn test_stitch_edge_omits_corner_triangles() {
        let mut full = Vec::new();
        let mut trimmed = Vec::new();
        stitch_edge(17, Neighbor::North, 0, 2, false, false, &mut full);
        stitch_edge(17, Neighbor::North, 0, 2, true, true, &mut trimmed);
        assert_eq!(full.len(), 4 * 5 * 3);
        assert_eq!(trimmed.len(), full.len() - 6);
    }

    #[test]
    fn test_tri_strip_stays_in_tile() {
        let data = generate_tri_strip_indices(9, 0, StitchFlags::empty());
        assert_eq!(data.topology, IndexTopology::TriangleStrip);
        assert!(data.indices.iter().all(|i| *i < 81));
        assert_eq!(data.indices.first(), Some(&0));

        let stitched = generate_tri_strip_indices(9, 0, StitchFlags::NORTH | StitchFlags::from_bits_retain(1));
        // Snapped north edge vertices land on even columns of row 0
        assert!(stitched.indices.iter().filter(|i| **i < 9).all(|i| i % 2 == 0));
    }

    #[test]
    fn test_index_cache_shares_lists() {
        let mut cache = IndexCache::new();
        let a = cache.get_or_generate(17, 1, StitchFlags::empty(), false);
        let b = cache.get_or_generate(17, 1, StitchFlags::empty(), false);
        assert!(Arc::ptr_eq(&a, &b));
        cache.get_or_generate(17, 2, StitchFlags::empty(), false);
        assert_eq!(cache.len(), 2);
    }
}
