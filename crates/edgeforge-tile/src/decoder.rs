//! Tiled decoder: crop, transform, accumulate, normalize.
//!
//! # Architecture
//!
//! ```text
//! TiledDecoder
//!     │
//!     ├── TilePlan ──> row/col grids, boundary-flush windows
//!     │
//!     ├── decode()          ─┐  sequential, row-major, one tile in flight
//!     ├── decode_windows()  ─┼── all crop -> T::decode_tile -> Accumulator
//!     └── decode_parallel() ─┘  one chunk per worker, merged in chunk order
//!     │
//!     └── Accumulator::normalize ──> coverage check, sum / weight
//! ```
//!
//! The decoder is accelerator-agnostic: it hands the transform one host
//! tile at a time and keeps the accumulation buffers in host memory, so
//! peak transform-side memory is bounded by a single tile. Any failure
//! aborts the whole call and drops the partially filled buffers.

use rayon::prelude::*;
use tracing::{debug, info, trace};

use edgeforge_core::{Error as CoreError, Shape4, Tensor4, Window};

use crate::accumulate::{Accumulator, BlendMode};
use crate::config::TileConfig;
use crate::grid::TileSpec;
use crate::memory::{self, format_bytes};
use crate::plan::TilePlan;
use crate::transform::TileTransform;
use crate::{TileError, TileResult};

/// Default number of channels a decoded tile carries (RGB).
pub const DEFAULT_OUT_CHANNELS: usize = 3;

/// Memory-bounded tiled decoder.
///
/// Owns its configuration only; every decode call allocates and drops its
/// own accumulation buffers, so one instance can serve many calls.
#[derive(Debug, Clone)]
pub struct TiledDecoder {
    spec: TileSpec,
    out_channels: usize,
    blend: BlendMode,
    host_budget: Option<u64>,
}

impl TiledDecoder {
    /// Decoder with RGB output and uniform blending.
    pub fn new(spec: TileSpec) -> Self {
        Self {
            spec,
            out_channels: DEFAULT_OUT_CHANNELS,
            blend: BlendMode::Uniform,
            host_budget: None,
        }
    }

    /// Builds a decoder from a validated [`TileConfig`].
    pub fn from_config(config: &TileConfig) -> TileResult<Self> {
        Ok(Self::new(config.to_spec()?)
            .with_out_channels(config.out_channels)
            .with_blend(config.blend))
    }

    /// Sets the channel count decoded tiles must have.
    pub fn with_out_channels(mut self, channels: usize) -> Self {
        self.out_channels = channels;
        self
    }

    /// Sets the seam blending policy.
    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    /// Caps host memory for accumulation buffers. Defaults to
    /// [`memory::available_memory`].
    pub fn with_host_budget(mut self, bytes: u64) -> Self {
        self.host_budget = Some(bytes);
        self
    }

    /// Tile spec.
    pub fn spec(&self) -> &TileSpec {
        &self.spec
    }

    /// Output channel count.
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Blend mode.
    pub fn blend(&self) -> BlendMode {
        self.blend
    }

    /// Plans the tile grid for a feature map of shape `input`.
    pub fn plan(&self, input: Shape4) -> TileResult<TilePlan> {
        TilePlan::new(&self.spec, input, self.out_channels)
    }

    // =========================================================================
    // Sequential
    // =========================================================================

    /// Decodes `feature_map` tile by tile in row-major order.
    pub fn decode<T>(&self, feature_map: &Tensor4, transform: &mut T) -> TileResult<Tensor4>
    where
        T: TileTransform + ?Sized,
    {
        let plan = self.plan(feature_map.shape())?;
        info!(
            input = %feature_map.shape(),
            output = %plan.output_shape(),
            tiles = plan.tile_count(),
            transform = transform.name(),
            "starting tiled decode"
        );
        self.decode_windows(feature_map, transform, &plan.windows())
    }

    /// Decodes an explicit list of feature-map windows.
    ///
    /// Windows are used as-is (no clamping) but are visited in canonical
    /// order, sorted by start then end corner, so any permutation of the same
    /// list yields a bit-identical result for a deterministic transform. Tile
    /// indices in errors refer to that order. The output still covers the full
    /// scaled feature map, so a window list with gaps fails with
    /// [`TileError::CoverageGap`].
    pub fn decode_windows<T>(
        &self,
        feature_map: &Tensor4,
        transform: &mut T,
        windows: &[Window],
    ) -> TileResult<Tensor4>
    where
        T: TileTransform + ?Sized,
    {
        let out_shape = self.output_shape(feature_map.shape())?;
        self.check_host_budget(memory::accumulator_memory(out_shape))?;

        let ordered = canonical_order(windows);
        let total = ordered.len();
        let mut acc = self.new_accumulator(out_shape);
        for (index, window) in ordered.iter().enumerate() {
            let (out_window, decoded) = self.decode_one(feature_map, transform, index, total, window)?;
            acc.add_tile(&out_window, &decoded)?;
        }

        let out = acc.normalize()?;
        debug!(output = %out.shape(), tiles = total, "tiled decode finished");
        Ok(out)
    }

    // =========================================================================
    // Parallel
    // =========================================================================

    /// Decodes tiles on the rayon pool.
    ///
    /// The row-major window list is split into one contiguous chunk per
    /// worker. Each chunk gets exactly one `make_transform()` instance and one
    /// private accumulator, so at most `workers` of each exist at a time and
    /// the host budget check covers all of them. Partial buffers are merged
    /// in chunk order: the result is deterministic for a given pool size and
    /// equals [`decode`](Self::decode) exactly when the sums are exact.
    /// Only use this when the transform instances do not contend for the same
    /// accelerator memory.
    pub fn decode_parallel<T, M>(&self, feature_map: &Tensor4, make_transform: M) -> TileResult<Tensor4>
    where
        T: TileTransform + Send,
        M: Fn() -> T + Sync + Send,
    {
        let plan = self.plan(feature_map.shape())?;
        let out_shape = plan.output_shape();
        let windows = plan.windows();
        let total = windows.len();

        let workers = rayon::current_num_threads().clamp(1, total.max(1));
        let chunk_len = total.div_ceil(workers).max(1);
        let chunks = total.div_ceil(chunk_len);
        self.check_host_budget(memory::accumulator_memory(out_shape).saturating_mul(chunks as u64))?;

        info!(
            input = %feature_map.shape(),
            output = %out_shape,
            tiles = total,
            workers = chunks,
            "starting parallel tiled decode"
        );

        let partials = windows
            .par_chunks(chunk_len)
            .enumerate()
            .map(|(chunk, part)| -> TileResult<Accumulator> {
                let mut transform = make_transform();
                let mut acc = self.new_accumulator(out_shape);
                for (offset, window) in part.iter().enumerate() {
                    let index = chunk * chunk_len + offset;
                    let (out_window, decoded) =
                        self.decode_one(feature_map, &mut transform, index, total, window)?;
                    acc.add_tile(&out_window, &decoded)?;
                }
                trace!(chunk, tiles = part.len(), "worker chunk done");
                Ok(acc)
            })
            .collect::<TileResult<Vec<Accumulator>>>()?;

        let mut partials = partials.into_iter();
        let mut acc = partials.next().unwrap_or_else(|| self.new_accumulator(out_shape));
        for partial in partials {
            acc.merge(partial)?;
        }

        acc.normalize()
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn output_shape(&self, input: Shape4) -> TileResult<Shape4> {
        if input.is_empty() {
            return Err(CoreError::invalid_dimensions(input, "feature map must be non-empty").into());
        }
        let s = self.spec.scale_factor();
        Ok(Shape4::new(input.batch, self.out_channels, input.height * s, input.width * s))
    }

    fn new_accumulator(&self, out_shape: Shape4) -> Accumulator {
        Accumulator::new(out_shape, self.blend, self.spec.output_overlap())
    }

    fn check_host_budget(&self, required: u64) -> TileResult<()> {
        let budget = self.host_budget.unwrap_or_else(memory::available_memory);
        if required > budget {
            return Err(TileError::HostMemory { required, budget });
        }
        trace!(required = %format_bytes(required), budget = %format_bytes(budget), "host budget ok");
        Ok(())
    }

    /// Crops, decodes and shape-checks one tile. Returns the output-space window.
    fn decode_one<T>(
        &self,
        feature_map: &Tensor4,
        transform: &mut T,
        index: usize,
        total: usize,
        window: &Window,
    ) -> TileResult<(Window, Tensor4)>
    where
        T: TileTransform + ?Sized,
    {
        debug!(index, total, %window, "decoding tile");

        let tile = feature_map.crop(window)?;
        let decoded = transform
            .decode_tile(&tile)
            .map_err(|source| TileError::Transform {
                name: transform.name().to_string(),
                index,
                total,
                window: *window,
                source,
            })?;

        let out_window = window.scaled(self.spec.scale_factor());
        let expected = Shape4::new(
            tile.shape().batch,
            self.out_channels,
            out_window.height(),
            out_window.width(),
        );
        if decoded.shape() != expected {
            return Err(TileError::ShapeMismatch {
                index,
                window: *window,
                expected,
                actual: decoded.shape(),
            });
        }

        Ok((out_window, decoded))
    }
}

/// Copies `windows` sorted by `(row_start, col_start, row_end, col_end)`.
fn canonical_order(windows: &[Window]) -> Vec<Window> {
    let mut ordered = windows.to_vec();
    ordered.sort_by_key(|w| (w.row_start, w.col_start, w.row_end, w.col_end));
    ordered
}
