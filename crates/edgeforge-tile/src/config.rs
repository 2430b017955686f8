//! Decoder configuration.
//!
//! [`TileConfig`] is the user-facing configuration surface. It deserializes
//! from YAML with every field optional, then layers environment overrides on
//! top. Validation happens in [`TileConfig::to_spec`].
//!
//! ```yaml
//! tile_extent: 512
//! overlap_extent: 64
//! scale_factor: 8
//! out_channels: 3
//! blend: feather
//! ```
//!
//! # Environment Variables
//!
//! - `EDGEFORGE_TILE_SIZE` - Tile extent in output pixels
//! - `EDGEFORGE_OVERLAP` - Overlap extent in output pixels
//! - `EDGEFORGE_SCALE` - Scale factor between feature map and output
//! - `EDGEFORGE_BLEND` - `uniform` or `feather`

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::accumulate::BlendMode;
use crate::grid::TileSpec;
use crate::{TileError, TileResult};

/// Tiled decoder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TileConfig {
    /// Tile extent in output pixels.
    pub tile_extent: usize,
    /// Overlap between neighbouring tiles in output pixels.
    pub overlap_extent: usize,
    /// Output pixels per feature-map unit.
    pub scale_factor: usize,
    /// Channels produced by the transform.
    pub out_channels: usize,
    /// Seam blending policy.
    pub blend: BlendMode,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            tile_extent: 512,
            overlap_extent: 32,
            scale_factor: 8,
            out_channels: 3,
            blend: BlendMode::Uniform,
        }
    }
}

impl TileConfig {
    /// Parses a YAML document.
    pub fn from_yaml_str(yaml: &str) -> TileResult<Self> {
        serde_yaml::from_str(yaml).map_err(|e| TileError::Config(format!("invalid YAML: {e}")))
    }

    /// Reads and parses a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> TileResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), "loading tile config");
        Self::from_yaml_str(&text)
    }

    /// Applies `EDGEFORGE_*` environment overrides.
    pub fn with_env_overrides(self) -> TileResult<Self> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    pub fn with_overrides<F>(mut self, lookup: F) -> TileResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EDGEFORGE_TILE_SIZE") {
            self.tile_extent = parse_usize("EDGEFORGE_TILE_SIZE", &v)?;
        }
        if let Some(v) = lookup("EDGEFORGE_OVERLAP") {
            self.overlap_extent = parse_usize("EDGEFORGE_OVERLAP", &v)?;
        }
        if let Some(v) = lookup("EDGEFORGE_SCALE") {
            self.scale_factor = parse_usize("EDGEFORGE_SCALE", &v)?;
        }
        if let Some(v) = lookup("EDGEFORGE_BLEND") {
            self.blend = v.parse()?;
        }
        Ok(self)
    }

    /// Validates the geometry and derives a [`TileSpec`].
    pub fn to_spec(&self) -> TileResult<TileSpec> {
        if self.out_channels == 0 {
            return Err(TileError::invalid_config("output channel count must be at least 1"));
        }
        TileSpec::new(self.tile_extent, self.overlap_extent, self.scale_factor)
    }
}

fn parse_usize(key: &str, value: &str) -> TileResult<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| TileError::Config(format!("{key}: expected a non-negative integer, got `{value}`")))
}
