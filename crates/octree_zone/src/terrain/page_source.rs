//! Page sources supply height samples for terrain pages
//!
//! A terrain zone names its source in its settings. Sources are registered
//! by name in a [`PageSourceRegistry`], initialised with the settings the
//! zone did not consume, and then asked for pages.

use std::collections::HashMap;

use super::error::TerrainError;
use super::options::{TerrainSettings, TerrainZoneOptions};

/// Setting key that flips a heightmap vertically
pub const HEIGHTMAP_FLIP_KEY: &str = "Heightmap.flip";

/// Produces height samples for terrain pages
pub trait PageSource: std::fmt::Debug {
    /// Prepare for the given options. `settings` holds the keys the terrain
    /// zone did not understand.
    fn initialize(
        &mut self,
        options: &TerrainZoneOptions,
        settings: &TerrainSettings,
    ) -> Result<(), TerrainError>;

    /// Heights for page (`x`, `z`), `page_size * page_size` values in 0..=1
    /// row by row, or `None` when the source has no such page
    fn request_page(&mut self, x: usize, z: usize) -> Result<Option<Vec<f32>>, TerrainError>;

    /// Page (`x`, `z`) is no longer displayed
    fn expire_page(&mut self, _x: usize, _z: usize) {}

    /// Release everything built by [`PageSource::initialize`]
    fn shutdown(&mut self) {}
}

/// Page sources by name
#[derive(Debug, Default)]
pub struct PageSourceRegistry {
    sources: HashMap<String, Box<dyn PageSource>>,
}

impl PageSourceRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under `name`
    pub fn register(
        &mut self,
        name: impl Into<String>,
        source: Box<dyn PageSource>,
    ) -> Result<(), TerrainError> {
        let name = name.into();
        if self.sources.contains_key(&name) {
            return Err(TerrainError::DuplicatePageSource(name));
        }
        log::debug!("Registered terrain page source '{name}'");
        self.sources.insert(name, source);
        Ok(())
    }

    /// Remove and shut down a source
    pub fn unregister(&mut self, name: &str) -> Option<Box<dyn PageSource>> {
        let mut source = self.sources.remove(name)?;
        source.shutdown();
        Some(source)
    }

    /// Source registered under `name`
    pub fn get_mut(&mut self, name: &str) -> Result<&mut dyn PageSource, TerrainError> {
        match self.sources.get_mut(name) {
            Some(source) => Ok(source.as_mut()),
            None => Err(TerrainError::UnknownPageSource(name.to_string())),
        }
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    /// Number of registered sources
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Decoded heightmap image or raw dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeightData {
    /// Samples per row
    pub width: usize,
    /// Rows
    pub height: usize,
    /// Bytes per sample, 1 or 2 (2 is little endian)
    pub bytes_per_pixel: u32,
    /// Sample bytes, row by row
    pub data: Vec<u8>,
}

impl HeightData {
    /// 8-bit heightmap
    pub fn from_u8(width: usize, height: usize, data: Vec<u8>) -> Self {
        Self { width, height, bytes_per_pixel: 1, data }
    }

    /// 16-bit heightmap
    pub fn from_u16(width: usize, height: usize, samples: &[u16]) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel: 2,
            data: samples.iter().flat_map(|sample| sample.to_le_bytes()).collect(),
        }
    }
}

/// Single-page source backed by one heightmap
#[derive(Debug, Clone)]
pub struct HeightmapPageSource {
    data: HeightData,
    flip: bool,
    heights: Option<Vec<f32>>,
}

impl HeightmapPageSource {
    /// Source serving `data` as page (0, 0)
    pub fn new(data: HeightData) -> Self {
        Self { data, flip: false, heights: None }
    }

    /// Serve rows bottom to top
    pub fn with_flip(mut self, flip: bool) -> Self {
        self.flip = flip;
        self
    }

    fn normalized_heights(&self, page_size: usize) -> Vec<f32> {
        let bpp = self.data.bytes_per_pixel as usize;
        let row_bytes = page_size * bpp;
        let max_value = ((1u32 << (8 * bpp)) - 1) as f32;

        let mut heights = Vec::with_capacity(page_size * page_size);
        for j in 0..page_size {
            let row = if self.flip { page_size - j - 1 } else { j };
            let bytes = &self.data.data[row * row_bytes..(row + 1) * row_bytes];
            heights.extend(bytes.chunks_exact(bpp).map(|sample| {
                let value = match sample {
                    [low, high] => u16::from_le_bytes([*low, *high]) as f32,
                    [value] => f32::from(*value),
                    _ => 0.0,
                };
                value / max_value
            }));
        }
        heights
    }
}

impl PageSource for HeightmapPageSource {
    fn initialize(
        &mut self,
        options: &TerrainZoneOptions,
        settings: &TerrainSettings,
    ) -> Result<(), TerrainError> {
        for (key, value) in settings.iter() {
            if key == HEIGHTMAP_FLIP_KEY {
                self.flip = match value.trim().to_ascii_lowercase().as_str() {
                    "yes" | "true" | "on" | "1" => true,
                    "no" | "false" | "off" | "0" => false,
                    _ => {
                        return Err(TerrainError::InvalidOption {
                            key: key.to_string(),
                            value: value.to_string(),
                        })
                    }
                };
            } else {
                log::warn!("Ignoring unknown page source option '{key}'");
            }
        }

        if !matches!(self.data.bytes_per_pixel, 1 | 2) {
            return Err(TerrainError::InvalidBitsPerPixel(self.data.bytes_per_pixel));
        }
        if self.data.width != self.data.height {
            return Err(TerrainError::NonSquareHeightmap {
                width: self.data.width,
                height: self.data.height,
            });
        }
        if self.data.width != options.page_size {
            return Err(TerrainError::HeightmapSizeMismatch {
                expected: options.page_size,
                actual: self.data.width,
            });
        }
        let expected = self.data.width * self.data.height * self.data.bytes_per_pixel as usize;
        if self.data.data.len() < expected {
            return Err(TerrainError::HeightmapTruncated {
                expected,
                actual: self.data.data.len(),
            });
        }

        self.heights = Some(self.normalized_heights(options.page_size));
        Ok(())
    }

    fn request_page(&mut self, x: usize, z: usize) -> Result<Option<Vec<f32>>, TerrainError> {
        let heights = self
            .heights
            .as_ref()
            .ok_or_else(|| TerrainError::PageSourceNotInitialised("Heightmap".to_string()))?;
        if x != 0 || z != 0 {
            log::debug!("Heightmap source has no page ({x}, {z})");
            return Ok(None);
        }
        Ok(Some(heights.clone()))
    }

    fn shutdown(&mut self) {
        self.heights = None;
    }
}
