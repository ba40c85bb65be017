//! Terrain zone options
//!
//! [`TerrainSettings`] is the flat key/value form that arrives from a
//! terrain description. [`TerrainZoneOptions::from_settings`] turns it into
//! typed options and hands every key it does not understand on to the page
//! source.

use std::collections::BTreeMap;

use crate::config::{Config, Deserialize, Serialize};
use crate::foundation::math::Vec3;
use super::error::TerrainError;

/// Largest accepted page or tile exponent
const MAX_SIZE_EXPONENT: u32 = 16;

/// Flat key/value terrain description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TerrainSettings {
    entries: BTreeMap<String, String>,
}

impl Config for TerrainSettings {}

impl TerrainSettings {
    /// Empty settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from key/value pairs; later pairs win
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Set a value, replacing any previous one
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Value stored under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Whether `key` is present
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// All entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, TerrainError> {
        self.get(key)
            .map(|value| {
                value.trim().parse().map_err(|_| TerrainError::InvalidOption {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            })
            .transpose()
    }

    fn parse_flag(&self, key: &str) -> Result<Option<bool>, TerrainError> {
        self.get(key)
            .map(|value| match value.trim().to_ascii_lowercase().as_str() {
                "yes" | "true" | "on" | "1" => Ok(true),
                "no" | "false" | "off" | "0" => Ok(false),
                _ => Err(TerrainError::InvalidOption {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
            })
            .transpose()
    }

    fn require<T: std::str::FromStr>(&self, key: &str) -> Result<T, TerrainError> {
        self.parse(key)?
            .ok_or_else(|| TerrainError::MissingOption(key.to_string()))
    }
}

/// Setting keys understood by the terrain zone itself
pub mod keys {
    /// Heights per page side, 2^n+1
    pub const PAGE_SIZE: &str = "PageSize";
    /// Heights per tile side, 2^n+1
    pub const TILE_SIZE: &str = "TileSize";
    /// World extent of a page along X
    pub const PAGE_WORLD_X: &str = "PageWorldX";
    /// World extent of a page along Z
    pub const PAGE_WORLD_Z: &str = "PageWorldZ";
    /// Height of a full-scale sample
    pub const MAX_HEIGHT: &str = "MaxHeight";
    /// Detail texture repeats per tile
    pub const DETAIL_TILE: &str = "DetailTile";
    /// Number of geo-mipmap levels
    pub const MAX_MIP_MAP_LEVEL: &str = "MaxMipMapLevel";
    /// Allowed screen-space error in pixels
    pub const MAX_PIXEL_ERROR: &str = "MaxPixelError";
    /// Emit per-vertex colours
    pub const VERTEX_COLOURS: &str = "VertexColours";
    /// Emit per-vertex normals
    pub const VERTEX_NORMALS: &str = "VertexNormals";
    /// Build triangle strips instead of lists
    pub const USE_TRI_STRIPS: &str = "UseTriStrips";
    /// Blend between LOD levels
    pub const VERTEX_PROGRAM_MORPH: &str = "VertexProgramMorph";
    /// Fraction of the LOD range where morphing starts
    pub const LOD_MORPH_START: &str = "LODMorphStart";
    /// Detail texture name
    pub const DETAIL_TEXTURE: &str = "DetailTexture";
    /// World texture name
    pub const WORLD_TEXTURE: &str = "WorldTexture";
    /// Material used instead of the generated one
    pub const CUSTOM_MATERIAL_NAME: &str = "CustomMaterialName";
    /// Alias of [`CUSTOM_MATERIAL_NAME`]
    pub const MATERIAL_NAME: &str = "MaterialName";
    /// Shader parameter receiving the morph factor, by name
    pub const MORPH_LOD_FACTOR_PARAM_NAME: &str = "MorphLODFactorParamName";
    /// Shader parameter receiving the morph factor, by index
    pub const MORPH_LOD_FACTOR_PARAM_INDEX: &str = "MorphLODFactorParamIndex";
    /// Registered page source to pull heights from
    pub const PAGE_SOURCE: &str = "PageSource";
    /// Lowest LOD level a tile may render at
    pub const MIN_RENDER_LEVEL: &str = "MinRenderLevel";
    /// Pin every tile to one LOD level
    pub const FORCED_RENDER_LEVEL: &str = "ForcedRenderLevel";
    /// Viewport height used when no camera is registered
    pub const PRIMARY_VIEWPORT_HEIGHT: &str = "PrimaryViewportHeight";

    /// Every key above
    pub const ALL: &[&str] = &[
        PAGE_SIZE,
        TILE_SIZE,
        PAGE_WORLD_X,
        PAGE_WORLD_Z,
        MAX_HEIGHT,
        DETAIL_TILE,
        MAX_MIP_MAP_LEVEL,
        MAX_PIXEL_ERROR,
        VERTEX_COLOURS,
        VERTEX_NORMALS,
        USE_TRI_STRIPS,
        VERTEX_PROGRAM_MORPH,
        LOD_MORPH_START,
        DETAIL_TEXTURE,
        WORLD_TEXTURE,
        CUSTOM_MATERIAL_NAME,
        MATERIAL_NAME,
        MORPH_LOD_FACTOR_PARAM_NAME,
        MORPH_LOD_FACTOR_PARAM_INDEX,
        PAGE_SOURCE,
        MIN_RENDER_LEVEL,
        FORCED_RENDER_LEVEL,
        PRIMARY_VIEWPORT_HEIGHT,
    ];
}

/// Typed terrain options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainZoneOptions {
    /// Heights per page side
    pub page_size: usize,
    /// Heights per tile side
    pub tile_size: usize,
    /// Per-sample world scale. X and Z are the distance between samples.
    pub scale: Vec3,
    /// Number of geo-mipmap levels
    pub max_geo_mipmap_level: usize,
    /// Allowed screen-space error in pixels
    pub max_pixel_error: u32,
    /// Detail texture repeats per tile
    pub detail_tile: u32,
    /// Triangle strips instead of lists
    pub use_tri_strips: bool,
    /// Blend between LOD levels
    pub lod_morph: bool,
    /// Fraction of the LOD range where morphing starts
    pub lod_morph_start: f32,
    /// Per-vertex normals
    pub lit: bool,
    /// Per-vertex colours
    pub coloured: bool,
    /// Lowest LOD level a tile may render at
    pub min_render_level: usize,
    /// Pin every tile to one LOD level
    pub forced_render_level: Option<usize>,
    /// Viewport height used for the detail factor
    pub primary_viewport_height: Option<u32>,
    /// Registered page source to pull heights from
    pub page_source: String,
    /// Material used instead of the generated one
    pub custom_material_name: Option<String>,
    /// World texture name
    pub world_texture: Option<String>,
    /// Detail texture name
    pub detail_texture: Option<String>,
    /// Shader parameter receiving the morph factor, by name
    pub morph_param_name: Option<String>,
    /// Shader parameter receiving the morph factor, by index
    pub morph_param_index: Option<u32>,
}

impl Default for TerrainZoneOptions {
    fn default() -> Self {
        Self {
            page_size: 129,
            tile_size: 33,
            scale: Vec3::new(1.0, 1.0, 1.0),
            max_geo_mipmap_level: 5,
            max_pixel_error: 8,
            detail_tile: 1,
            use_tri_strips: false,
            lod_morph: false,
            lod_morph_start: 0.5,
            lit: false,
            coloured: false,
            min_render_level: 0,
            forced_render_level: None,
            primary_viewport_height: None,
            page_source: String::new(),
            custom_material_name: None,
            world_texture: None,
            detail_texture: None,
            morph_param_name: None,
            morph_param_index: None,
        }
    }
}

impl Config for TerrainZoneOptions {}

/// True when `size` is 2^n+1 for some n below 16
pub fn check_size(size: usize) -> bool {
    (0..MAX_SIZE_EXPONENT).any(|i| size == (1 << i) + 1)
}

impl TerrainZoneOptions {
    /// Parse settings into typed options.
    ///
    /// Returns the options and the settings left over for the page source.
    pub fn from_settings(settings: &TerrainSettings) -> Result<(Self, TerrainSettings), TerrainError> {
        let mut options = Self {
            page_size: settings.require(keys::PAGE_SIZE)?,
            tile_size: settings.require(keys::TILE_SIZE)?,
            ..Self::default()
        };

        let world_x: f32 = settings.parse(keys::PAGE_WORLD_X)?.unwrap_or(1.0);
        let max_height: f32 = settings.parse(keys::MAX_HEIGHT)?.unwrap_or(1.0);
        let world_z: f32 = settings.parse(keys::PAGE_WORLD_Z)?.unwrap_or(1.0);

        if let Some(detail_tile) = settings.parse(keys::DETAIL_TILE)? {
            options.detail_tile = detail_tile;
        }
        if let Some(level) = settings.parse(keys::MAX_MIP_MAP_LEVEL)? {
            options.max_geo_mipmap_level = level;
        }
        if let Some(error) = settings.parse(keys::MAX_PIXEL_ERROR)? {
            options.max_pixel_error = error;
        }
        if let Some(start) = settings.parse(keys::LOD_MORPH_START)? {
            options.lod_morph_start = start;
        }
        if let Some(level) = settings.parse(keys::MIN_RENDER_LEVEL)? {
            options.min_render_level = level;
        }
        options.forced_render_level = settings.parse(keys::FORCED_RENDER_LEVEL)?;
        options.primary_viewport_height = settings.parse(keys::PRIMARY_VIEWPORT_HEIGHT)?;
        options.morph_param_index = settings.parse(keys::MORPH_LOD_FACTOR_PARAM_INDEX)?;

        options.coloured = settings.parse_flag(keys::VERTEX_COLOURS)?.unwrap_or(false);
        options.lit = settings.parse_flag(keys::VERTEX_NORMALS)?.unwrap_or(false);
        options.use_tri_strips = settings.parse_flag(keys::USE_TRI_STRIPS)?.unwrap_or(false);
        options.lod_morph = settings.parse_flag(keys::VERTEX_PROGRAM_MORPH)?.unwrap_or(false);

        options.detail_texture = settings.get(keys::DETAIL_TEXTURE).map(str::to_string);
        options.world_texture = settings.get(keys::WORLD_TEXTURE).map(str::to_string);
        options.custom_material_name = settings
            .get(keys::CUSTOM_MATERIAL_NAME)
            .or_else(|| settings.get(keys::MATERIAL_NAME))
            .map(str::to_string);
        options.morph_param_name = settings.get(keys::MORPH_LOD_FACTOR_PARAM_NAME).map(str::to_string);

        options.page_source = settings
            .get(keys::PAGE_SOURCE)
            .ok_or_else(|| TerrainError::MissingOption(keys::PAGE_SOURCE.to_string()))?
            .to_string();

        options.validate()?;

        // World extents become per-sample spacing
        let spacing = (options.page_size - 1) as f32;
        options.scale = Vec3::new(world_x / spacing, max_height, world_z / spacing);

        let forwarded = TerrainSettings::from_pairs(
            settings
                .iter()
                .filter(|(key, _)| !keys::ALL.contains(key)),
        );

        Ok((options, forwarded))
    }

    /// Check page and tile sizes
    pub fn validate(&self) -> Result<(), TerrainError> {
        if self.max_geo_mipmap_level == 0 {
            return Err(TerrainError::InvalidOption {
                key: keys::MAX_MIP_MAP_LEVEL.to_string(),
                value: "0".to_string(),
            });
        }
        if !check_size(self.page_size) {
            return Err(TerrainError::InvalidSize { what: "page", size: self.page_size });
        }
        if !check_size(self.tile_size) {
            return Err(TerrainError::InvalidSize { what: "tile", size: self.tile_size });
        }
        if self.tile_size > self.page_size {
            return Err(TerrainError::TileLargerThanPage {
                tile: self.tile_size,
                page: self.page_size,
            });
        }
        if (self.page_size - 1) % (self.tile_size - 1) != 0 {
            return Err(TerrainError::PageNotDivisible {
                page: self.page_size,
                tile: self.tile_size,
            });
        }
        Ok(())
    }

    /// Tiles along one side of a page
    pub fn tiles_per_page(&self) -> usize {
        (self.page_size - 1) / (self.tile_size - 1)
    }

    /// Factor converting a vertical error into a squared switch distance.
    ///
    /// Needs the viewport height of the primary camera.
    pub fn detail_factor(&self) -> Result<f32, TerrainError> {
        let height = self
            .primary_viewport_height
            .filter(|height| *height > 0)
            .ok_or(TerrainError::NoPrimaryCamera)?;
        let threshold = 2.0 * self.max_pixel_error as f32 / height as f32;
        Ok(1.0 / threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn base_settings() -> TerrainSettings {
        TerrainSettings::from_pairs([
            ("PageSize", "129"),
            ("TileSize", "33"),
            ("PageSource", "Heightmap"),
        ])
    }

    #[test]
    fn test_check_size() {
        assert!(check_size(2));
        assert!(check_size(17));
        assert!(check_size(513));
        assert!(!check_size(16));
        assert!(!check_size(100));
        assert!(!check_size((1 << 16) + 1));
    }

    #[test]
    fn test_from_settings_scales_world_extent() {
        let mut settings = base_settings();
        settings.set("PageWorldX", "1280");
        settings.set("PageWorldZ", "640");
        settings.set("MaxHeight", "50");
        settings.set("VertexNormals", "yes");
        settings.set("Heightmap.image", "terrain.png");

        let (options, forwarded) = TerrainZoneOptions::from_settings(&settings).unwrap();
        assert_relative_eq!(options.scale.x, 10.0);
        assert_relative_eq!(options.scale.y, 50.0);
        assert_relative_eq!(options.scale.z, 5.0);
        assert!(options.lit);
        assert!(!options.use_tri_strips);
        assert_eq!(options.tiles_per_page(), 4);
        assert_eq!(options.page_source, "Heightmap");

        assert_eq!(forwarded.len(), 1);
        assert_eq!(forwarded.get("Heightmap.image"), Some("terrain.png"));
    }

    #[test]
    fn test_from_settings_requires_sizes_and_source() {
        let settings = TerrainSettings::from_pairs([("TileSize", "33"), ("PageSource", "Heightmap")]);
        assert_eq!(
            TerrainZoneOptions::from_settings(&settings),
            Err(TerrainError::MissingOption("PageSize".to_string()))
        );

        let settings = TerrainSettings::from_pairs([("PageSize", "129"), ("TileSize", "33")]);
        assert_eq!(
            TerrainZoneOptions::from_settings(&settings),
            Err(TerrainError::MissingOption("PageSource".to_string()))
        );
    }

    #[test]
    fn test_from_settings_rejects_bad_sizes() {
        let mut settings = base_settings();
        settings.set("PageSize", "100");
        assert!(matches!(
            TerrainZoneOptions::from_settings(&settings),
            Err(TerrainError::InvalidSize { what: "page", .. })
        ));

        let mut settings = base_settings();
        settings.set("TileSize", "257");
        assert!(matches!(
            TerrainZoneOptions::from_settings(&settings),
            Err(TerrainError::TileLargerThanPage { .. })
        ));

        let mut settings = base_settings();
        settings.set("UseTriStrips", "maybe");
        assert!(matches!(
            TerrainZoneOptions::from_settings(&settings),
            Err(TerrainError::InvalidOption { .. })
        ));
    }

    #[test]
    fn test_detail_factor_needs_viewport() {
        let mut options = TerrainZoneOptions::default();
        assert_eq!(options.detail_factor(), Err(TerrainError::NoPrimaryCamera));

        options.primary_viewport_height = Some(768);
        options.max_pixel_error = 8;
        assert_relative_eq!(options.detail_factor().unwrap(), 48.0);
    }
}
