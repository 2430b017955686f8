//! Memory-bounded tiled decoding for oversized latent feature maps.
//!
//! Splits a feature map into overlapping tiles, runs an opaque decode
//! transform on each tile independently, and blends the decoded tiles back
//! into one seamless output by overlap averaging.
//!
//! # Architecture
//!
//! ```text
//! TiledDecoder (configuration, entry points)
//!     ├── grid       plan_axis / clamp_axis / TileSpec
//!     ├── plan       TilePlan: 2-D grid, windows, memory estimate
//!     ├── transform  TileTransform capability (+ NearestUpsample reference)
//!     ├── accumulate Accumulator: sum + coverage weight, BlendMode
//!     └── memory     host budget, DeviceBudget tile sizing
//! ```
//!
//! # Example
//!
//! ```rust
//! use edgeforge_core::{Shape4, Tensor4};
//! use edgeforge_tile::{NearestUpsample, TileSpec, TiledDecoder};
//!
//! let decoder = TiledDecoder::new(TileSpec::new(64, 16, 8)?);
//! let latents = Tensor4::zeros(Shape4::new(1, 4, 16, 16));
//! let mut vae = NearestUpsample::new(8, 4, 3);
//!
//! let image = decoder.decode(&latents, &mut vae)?;
//! assert_eq!(image.shape(), Shape4::new(1, 3, 128, 128));
//! # Ok::<(), edgeforge_tile::TileError>(())
//! ```

pub mod accumulate;
pub mod config;
pub mod decoder;
pub mod grid;
pub mod memory;
pub mod plan;
pub mod transform;

pub use accumulate::{Accumulator, BlendMode};
pub use config::TileConfig;
pub use decoder::{DEFAULT_OUT_CHANNELS, TiledDecoder};
pub use grid::{TileSpec, clamp_axis, plan_axis};
pub use memory::{DeviceBudget, format_bytes};
pub use plan::{MemoryEstimate, TilePlan};
pub use transform::{BoxError, NearestUpsample, TileTransform, TransformError};

use edgeforge_core::{Shape4, Window};
use thiserror::Error;

/// Tiled decode errors.
#[derive(Error, Debug)]
pub enum TileError {
    /// Tile geometry cannot be planned (e.g. overlap not smaller than tile).
    #[error("invalid tile configuration: {0}")]
    InvalidConfig(String),

    /// The transform failed on a tile; the whole decode is abandoned.
    #[error("transform `{name}` failed on tile {index}/{total} {window}: {source}")]
    Transform {
        name: String,
        index: usize,
        total: usize,
        window: Window,
        source: TransformError,
    },

    /// The transform returned a tile of the wrong shape.
    #[error("tile {index} {window}: transform returned {actual}, expected {expected}")]
    ShapeMismatch {
        index: usize,
        window: Window,
        expected: Shape4,
        actual: Shape4,
    },

    /// Output pixels left without any tile after the grid was walked.
    #[error("coverage gap: {uncovered} output pixels received no tile, first at ({row}, {col})")]
    CoverageGap { uncovered: usize, row: usize, col: usize },

    /// Accumulation buffers would not fit the host memory budget.
    #[error("accumulation buffers need {required} bytes, host budget is {budget} bytes")]
    HostMemory { required: u64, budget: u64 },

    /// Configuration file or override could not be read.
    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Core(#[from] edgeforge_core::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TileError {
    /// Creates an [`TileError::InvalidConfig`] error.
    #[inline]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Returns `true` for tile geometry errors.
    #[inline]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }

    /// Returns `true` if the transform failed or misbehaved.
    #[inline]
    pub fn is_transform_error(&self) -> bool {
        matches!(self, Self::Transform { .. } | Self::ShapeMismatch { .. })
    }
}

pub type TileResult<T> = Result<T, TileError>;
