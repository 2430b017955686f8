//! Tile geometry: validated tile configuration and per-axis grid planning.
//!
//! Tiles are described in output pixels by the caller and planned in
//! feature-map units, which are the pixel values integer-divided by the
//! scale factor.
//!
//! # Example
//!
//! ```rust
//! use edgeforge_tile::grid::{clamp_axis, plan_axis};
//!
//! let starts = plan_axis(100, 40, 10).unwrap();
//! assert_eq!(starts, vec![0, 30, 60]);
//! assert_eq!(clamp_axis(90, 100, 40), (60, 100));
//! ```

use tracing::trace;

use crate::{TileError, TileResult};

/// Validated tiling configuration.
///
/// Holds the pixel-space tile and overlap extents together with their
/// feature-map equivalents. Construction guarantees
/// `latent_tile > latent_overlap`, so grid planning always advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSpec {
    tile_extent: usize,
    overlap_extent: usize,
    scale_factor: usize,
    latent_tile: usize,
    latent_overlap: usize,
}

impl TileSpec {
    /// Validates and derives a tile spec.
    ///
    /// Fails with [`TileError::InvalidConfig`] when the scale factor is zero,
    /// when `overlap_extent >= tile_extent`, or when the tile is smaller than
    /// one feature-map unit.
    pub fn new(tile_extent: usize, overlap_extent: usize, scale_factor: usize) -> TileResult<Self> {
        if scale_factor == 0 {
            return Err(TileError::invalid_config("scale factor must be at least 1"));
        }
        if tile_extent == 0 {
            return Err(TileError::invalid_config("tile extent must be at least 1 pixel"));
        }
        if overlap_extent >= tile_extent {
            return Err(TileError::invalid_config(format!(
                "overlap {overlap_extent}px must be smaller than tile {tile_extent}px"
            )));
        }

        let latent_tile = tile_extent / scale_factor;
        let latent_overlap = overlap_extent / scale_factor;
        if latent_tile == 0 {
            return Err(TileError::invalid_config(format!(
                "tile {tile_extent}px is smaller than one feature-map unit ({scale_factor}px)"
            )));
        }
        if latent_overlap >= latent_tile {
            return Err(TileError::invalid_config(format!(
                "latent overlap {latent_overlap} must be smaller than latent tile {latent_tile}"
            )));
        }

        Ok(Self {
            tile_extent,
            overlap_extent,
            scale_factor,
            latent_tile,
            latent_overlap,
        })
    }

    /// Tile extent in output pixels.
    pub fn tile_extent(&self) -> usize {
        self.tile_extent
    }

    /// Overlap extent in output pixels.
    pub fn overlap_extent(&self) -> usize {
        self.overlap_extent
    }

    /// Ratio between output pixels and feature-map units.
    pub fn scale_factor(&self) -> usize {
        self.scale_factor
    }

    /// Tile extent in feature-map units.
    pub fn latent_tile(&self) -> usize {
        self.latent_tile
    }

    /// Overlap extent in feature-map units.
    pub fn latent_overlap(&self) -> usize {
        self.latent_overlap
    }

    /// Grid stride in feature-map units.
    pub fn latent_stride(&self) -> usize {
        self.latent_tile - self.latent_overlap
    }

    /// Overlap band width in output pixels, as actually realized on the grid.
    pub fn output_overlap(&self) -> usize {
        self.latent_overlap * self.scale_factor
    }
}

/// Plans tile start offsets along one axis.
///
/// Emits `0, stride, 2 * stride, ...` with `stride = tile - overlap` and
/// stops after the first offset whose tile reaches `dim`. The final offset
/// is not clamped here; [`clamp_axis`] pulls it back so the last tile ends
/// flush with the axis.
///
/// `dim <= tile` yields `[0]`.
pub fn plan_axis(dim: usize, tile: usize, overlap: usize) -> TileResult<Vec<usize>> {
    if tile == 0 {
        return Err(TileError::invalid_config("tile extent must be at least 1"));
    }
    if overlap >= tile {
        return Err(TileError::invalid_config(format!(
            "overlap {overlap} must be smaller than tile {tile}"
        )));
    }
    if dim == 0 {
        return Err(TileError::invalid_config("axis size must be at least 1"));
    }

    let stride = tile - overlap;
    let mut starts = Vec::with_capacity(dim.saturating_sub(overlap).div_ceil(stride).max(1));
    let mut pos = 0;
    loop {
        starts.push(pos);
        if pos + tile >= dim {
            break;
        }
        pos += stride;
    }

    trace!(dim, tile, overlap, count = starts.len(), "plan_axis");
    Ok(starts)
}

/// Clamps a planned start offset to a boundary-flush `(start, end)` range.
///
/// The range keeps the full `tile` extent whenever the axis is at least that
/// long, reusing context from the previous tile instead of emitting an
/// undersized one.
#[inline]
pub fn clamp_axis(start: usize, dim: usize, tile: usize) -> (usize, usize) {
    let end = (start + tile).min(dim);
    (end.saturating_sub(tile), end)
}
