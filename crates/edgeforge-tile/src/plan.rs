//! Tile plans: the full 2-D grid for one feature map.
//!
//! A [`TilePlan`] is the cross product of the row and column grids from
//! [`plan_axis`](crate::grid::plan_axis), with every window clamped flush to
//! the feature-map boundary. It also carries the memory estimates the
//! decoder checks before running and the CLI reports.

use tracing::debug;

use edgeforge_core::{Error as CoreError, Shape4, Window};

use crate::grid::{TileSpec, clamp_axis, plan_axis};
use crate::memory::{accumulator_memory, format_bytes};
use crate::TileResult;

/// Memory figures for a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryEstimate {
    /// Host bytes held by the accumulation buffers.
    pub host_bytes: u64,
    /// Bytes of one cropped input tile.
    pub tile_input_bytes: u64,
    /// Bytes of one decoded output tile.
    pub tile_output_bytes: u64,
}

/// Grid of tile windows covering a feature map.
#[derive(Debug, Clone)]
pub struct TilePlan {
    spec: TileSpec,
    input: Shape4,
    out_channels: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
}

impl TilePlan {
    /// Plans tiles for a feature map of shape `input`.
    pub fn new(spec: &TileSpec, input: Shape4, out_channels: usize) -> TileResult<Self> {
        if input.is_empty() {
            return Err(CoreError::invalid_dimensions(input, "feature map must be non-empty").into());
        }
        if out_channels == 0 {
            return Err(CoreError::invalid_dimensions(input, "output channel count must be at least 1").into());
        }

        let rows = plan_axis(input.height, spec.latent_tile(), spec.latent_overlap())?;
        let cols = plan_axis(input.width, spec.latent_tile(), spec.latent_overlap())?;

        debug!(
            %input,
            rows = rows.len(),
            cols = cols.len(),
            latent_tile = spec.latent_tile(),
            latent_overlap = spec.latent_overlap(),
            "planned tile grid"
        );

        Ok(Self {
            spec: *spec,
            input,
            out_channels,
            rows,
            cols,
        })
    }

    /// Tile spec the plan was built from.
    pub fn spec(&self) -> &TileSpec {
        &self.spec
    }

    /// Input feature-map shape.
    pub fn input_shape(&self) -> Shape4 {
        self.input
    }

    /// Output shape: input spatial extent times the scale factor.
    pub fn output_shape(&self) -> Shape4 {
        let s = self.spec.scale_factor();
        Shape4::new(self.input.batch, self.out_channels, self.input.height * s, self.input.width * s)
    }

    /// Unclamped row start offsets.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Unclamped column start offsets.
    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    /// Grid dimensions as (rows, cols).
    pub fn grid_dims(&self) -> (usize, usize) {
        (self.rows.len(), self.cols.len())
    }

    /// Total number of tiles.
    pub fn tile_count(&self) -> usize {
        self.rows.len() * self.cols.len()
    }

    /// Clamped feature-map windows in row-major order.
    pub fn windows(&self) -> Vec<Window> {
        let tile = self.spec.latent_tile();
        let mut windows = Vec::with_capacity(self.tile_count());
        for &r in &self.rows {
            let (row_start, row_end) = clamp_axis(r, self.input.height, tile);
            for &c in &self.cols {
                let (col_start, col_end) = clamp_axis(c, self.input.width, tile);
                windows.push(Window::new(row_start, row_end, col_start, col_end));
            }
        }
        windows
    }

    /// Memory estimates for this plan.
    pub fn memory(&self) -> MemoryEstimate {
        let tile = self.spec.latent_tile();
        let th = tile.min(self.input.height);
        let tw = tile.min(self.input.width);
        let s = self.spec.scale_factor();
        MemoryEstimate {
            host_bytes: accumulator_memory(self.output_shape()),
            tile_input_bytes: self.input.with_spatial(th, tw).size_bytes(),
            tile_output_bytes: Shape4::new(self.input.batch, self.out_channels, th * s, tw * s).size_bytes(),
        }
    }

    /// Human-readable plan summary.
    pub fn describe(&self) -> String {
        let mut desc = String::new();
        let (r, c) = self.grid_dims();
        let mem = self.memory();

        desc.push_str(&format!("Input: {}\n", self.input));
        desc.push_str(&format!("Output: {}\n", self.output_shape()));
        desc.push_str(&format!(
            "Tile: {}px ({} latent), overlap {}px ({} latent), scale {}\n",
            self.spec.tile_extent(),
            self.spec.latent_tile(),
            self.spec.overlap_extent(),
            self.spec.latent_overlap(),
            self.spec.scale_factor()
        ));
        desc.push_str(&format!("Grid: {}x{} = {} tiles\n", r, c, self.tile_count()));
        desc.push_str(&format!("Host buffers: {}\n", format_bytes(mem.host_bytes)));
        desc.push_str(&format!(
            "Per tile: {} in, {} out\n",
            format_bytes(mem.tile_input_bytes),
            format_bytes(mem.tile_output_bytes)
        ));

        desc
    }
}
