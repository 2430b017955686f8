//! Host-resident accumulation of decoded tiles.
//!
//! Decoded tiles are summed into an output-sized buffer while a coverage
//! plane records how much weight each output pixel received. The final
//! result is `sum / weight`, which under [`BlendMode::Uniform`] is the plain
//! arithmetic mean of every tile covering a pixel.
//!
//! The weight plane is shared by all batches and channels: a tile covers the
//! same pixels with the same weight in every channel, so a single
//! `height x width` plane carries the full per-element count.
//!
//! Accumulation is commutative, so the result does not depend on the order
//! tiles are added in. Two partial accumulators over the same output shape
//! combine with [`Accumulator::merge`].

use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use edgeforge_core::{Error as CoreError, Shape4, Tensor4, Window};

use crate::{TileError, TileResult};

/// How overlapping tiles are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendMode {
    /// Every covering tile contributes with weight 1.
    #[default]
    Uniform,
    /// Linear ramp across the overlap band; tile edges interior to the
    /// output fade in, edges on the output border keep full weight.
    Feather,
}

impl BlendMode {
    /// Lowercase name, as accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::Feather => "feather",
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BlendMode {
    type Err = TileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uniform" | "mean" => Ok(Self::Uniform),
            "feather" | "linear" => Ok(Self::Feather),
            other => Err(TileError::Config(format!("unknown blend mode: {other}"))),
        }
    }
}

/// Per-position weights along one axis of a tile spanning `[start, end)` of `dim`.
fn axis_weights(start: usize, end: usize, dim: usize, ramp: usize, blend: BlendMode) -> Vec<f32> {
    let len = end - start;
    if blend == BlendMode::Uniform || ramp == 0 {
        return vec![1.0; len];
    }

    let denom = (ramp + 1) as f32;
    (0..len)
        .map(|i| {
            let lead = if start > 0 { i } else { usize::MAX };
            let trail = if end < dim { len - 1 - i } else { usize::MAX };
            let d = lead.min(trail);
            if d >= ramp {
                1.0
            } else {
                (d + 1) as f32 / denom
            }
        })
        .collect()
}

/// Running weighted sum of decoded tiles plus coverage weights.
pub struct Accumulator {
    sum: Tensor4,
    weight: Vec<f32>,
    blend: BlendMode,
    ramp: usize,
    tiles: usize,
}

impl Accumulator {
    /// Zeroed buffers for an output of `shape`.
    ///
    /// `ramp` is the feather band width in output pixels; ignored by
    /// [`BlendMode::Uniform`].
    pub fn new(shape: Shape4, blend: BlendMode, ramp: usize) -> Self {
        Self {
            sum: Tensor4::zeros(shape),
            weight: vec![0.0; shape.plane_len()],
            blend,
            ramp,
            tiles: 0,
        }
    }

    /// Output shape.
    pub fn shape(&self) -> Shape4 {
        self.sum.shape()
    }

    /// Blend mode in use.
    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    /// Number of tiles accumulated, including merged ones.
    pub fn tile_count(&self) -> usize {
        self.tiles
    }

    /// Coverage weight per output pixel, row-major `height x width`.
    pub fn coverage(&self) -> &[f32] {
        &self.weight
    }

    /// Host bytes held by both buffers.
    pub fn size_bytes(&self) -> u64 {
        self.sum.size_bytes() + (self.weight.len() as u64) * 4
    }

    /// Adds a decoded tile covering `window` (output space).
    pub fn add_tile(&mut self, window: &Window, tile: &Tensor4) -> TileResult<()> {
        let shape = self.sum.shape();
        if !window.fits(shape.height, shape.width) {
            return Err(CoreError::WindowOutOfBounds {
                window: *window,
                height: shape.height,
                width: shape.width,
            }
            .into());
        }
        let expected = shape.with_spatial(window.height(), window.width());
        if tile.shape() != expected {
            return Err(CoreError::shape_mismatch(expected, tile.shape()).into());
        }

        trace!(%window, blend = %self.blend, "accumulate tile");

        let wy = axis_weights(window.row_start, window.row_end, shape.height, self.ramp, self.blend);
        let wx = axis_weights(window.col_start, window.col_end, shape.width, self.ramp, self.blend);
        let tw = window.width();
        let out_w = shape.width;

        for b in 0..shape.batch {
            for c in 0..shape.channels {
                let src = tile.plane(b, c);
                let dst = self.sum.plane_mut(b, c);
                for (i, y) in (window.row_start..window.row_end).enumerate() {
                    let dst_row = &mut dst[y * out_w + window.col_start..y * out_w + window.col_end];
                    let src_row = &src[i * tw..(i + 1) * tw];
                    for ((d, s), w) in dst_row.iter_mut().zip(src_row).zip(&wx) {
                        *d += wy[i] * w * s;
                    }
                }
            }
        }

        for (i, y) in (window.row_start..window.row_end).enumerate() {
            let row = &mut self.weight[y * out_w + window.col_start..y * out_w + window.col_end];
            for (d, w) in row.iter_mut().zip(&wx) {
                *d += wy[i] * w;
            }
        }

        self.tiles += 1;
        Ok(())
    }

    /// Folds another accumulator over the same output into this one.
    pub fn merge(&mut self, other: Accumulator) -> TileResult<()> {
        if other.shape() != self.shape() {
            return Err(CoreError::shape_mismatch(self.shape(), other.shape()).into());
        }
        for (d, s) in self.sum.data_mut().iter_mut().zip(other.sum.data()) {
            *d += s;
        }
        for (d, s) in self.weight.iter_mut().zip(&other.weight) {
            *d += s;
        }
        self.tiles += other.tiles;
        Ok(())
    }

    /// Number of output pixels no tile has covered.
    pub fn uncovered(&self) -> usize {
        self.weight.iter().filter(|&&w| w <= 0.0).count()
    }

    /// Divides the sum by the coverage weight, consuming the buffers.
    ///
    /// Fails with [`TileError::CoverageGap`] if any output pixel has zero
    /// weight; no output is produced in that case.
    pub fn normalize(self) -> TileResult<Tensor4> {
        let shape = self.shape();
        if shape.is_empty() {
            return Err(CoreError::invalid_dimensions(shape, "empty output").into());
        }

        if let Some(first) = self.weight.iter().position(|&w| w <= 0.0) {
            return Err(TileError::CoverageGap {
                uncovered: self.uncovered(),
                row: first / shape.width,
                col: first % shape.width,
            });
        }

        debug!(%shape, tiles = self.tiles, blend = %self.blend, "normalizing accumulation buffer");

        let Accumulator { mut sum, weight, .. } = self;
        sum.data_mut()
            .par_chunks_mut(shape.plane_len())
            .for_each(|plane| {
                for (v, w) in plane.iter_mut().zip(&weight) {
                    *v /= *w;
                }
            });
        Ok(sum)
    }
}

impl fmt::Debug for Accumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accumulator")
            .field("shape", &self.shape())
            .field("blend", &self.blend)
            .field("ramp", &self.ramp)
            .field("tiles", &self.tiles)
            .finish()
    }
}
