//! Terrain setup errors

/// Errors raised while configuring a terrain zone or its page sources
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TerrainError {
    /// A required setting is absent
    #[error("Missing option '{0}'")]
    MissingOption(String),

    /// A setting could not be parsed or is out of range
    #[error("Invalid value '{value}' for option '{key}'")]
    InvalidOption {
        /// Setting key
        key: String,
        /// Offending value
        value: String,
    },

    /// Page or tile size is not 2^n+1
    #[error("Invalid {what} size {size}, must be 2^n+1")]
    InvalidSize {
        /// "page" or "tile"
        what: &'static str,
        /// Offending size
        size: usize,
    },

    /// Tile size exceeds page size
    #[error("Tile size {tile} is larger than page size {page}")]
    TileLargerThanPage {
        /// Tile size
        tile: usize,
        /// Page size
        page: usize,
    },

    /// Page cannot be split into whole tiles
    #[error("Page size {page} cannot be divided into tiles of size {tile}")]
    PageNotDivisible {
        /// Page size
        page: usize,
        /// Tile size
        tile: usize,
    },

    /// Raw heightmaps store 1 or 2 bytes per sample
    #[error("Invalid heightmap bytes per pixel {0}, must be 1 or 2")]
    InvalidBitsPerPixel(u32),

    /// Heightmap width differs from its height
    #[error("Heightmap must be square, got {width}x{height}")]
    NonSquareHeightmap {
        /// Width in samples
        width: usize,
        /// Height in samples
        height: usize,
    },

    /// Heightmap does not match the page size
    #[error("Heightmap size {actual} does not match page size {expected}")]
    HeightmapSizeMismatch {
        /// Configured page size
        expected: usize,
        /// Heightmap size
        actual: usize,
    },

    /// Height buffer is too short for its declared size
    #[error("Height buffer holds {actual} values, expected {expected}")]
    HeightmapTruncated {
        /// Values required
        expected: usize,
        /// Values present
        actual: usize,
    },

    /// A page source with this name already exists
    #[error("Page source '{0}' is already registered")]
    DuplicatePageSource(String),

    /// No page source with this name exists
    #[error("Unknown page source '{0}'")]
    UnknownPageSource(String),

    /// LOD thresholds need the viewport height of a camera
    #[error("No primary camera available to derive the terrain detail factor")]
    NoPrimaryCamera,

    /// Page requested before the source was initialised
    #[error("Page source '{0}' has not been initialised")]
    PageSourceNotInitialised(String),
}
