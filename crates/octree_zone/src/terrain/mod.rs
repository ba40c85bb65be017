//! Paged heightmap terrain
//!
//! A [`TerrainZone`] turns one page of height samples into a grid of
//! geo-mipmapped [`TerrainTile`]s. Tiles pick their level of detail from
//! the camera distance and stitch their edges against coarser neighbours.

pub mod error;
pub mod indices;
pub mod options;
pub mod page;
pub mod page_source;
pub mod tile;
pub mod zone;

pub use error::TerrainError;
pub use indices::{IndexCache, IndexData, IndexTopology, Neighbor, StitchFlags};
pub use options::{TerrainSettings, TerrainZoneOptions};
pub use page::TerrainPage;
pub use page_source::{HeightData, HeightmapPageSource, PageSource, PageSourceRegistry};
pub use tile::TerrainTile;
pub use zone::{TerrainZone, TileRenderOperation, NO_TERRAIN_HEIGHT};
