//! The decode capability the tiler wraps.
//!
//! The engine depends on exactly one operation: map a bounded feature-map
//! tile to a decoded tile whose spatial extent is the tile extent times the
//! engine's scale factor. Everything else about the transform (model
//! weights, device placement, host/accelerator transfers, retries) stays
//! behind [`TileTransform::decode_tile`].
//!
//! Closures implement the trait directly:
//!
//! ```rust
//! use edgeforge_core::{Shape4, Tensor4};
//! use edgeforge_tile::{TileTransform, TransformError};
//!
//! let mut identity = |t: &Tensor4| -> Result<Tensor4, TransformError> { Ok(t.clone()) };
//! let tile = Tensor4::zeros(Shape4::new(1, 4, 8, 8));
//! assert_eq!(identity.decode_tile(&tile).unwrap().shape(), tile.shape());
//! ```

use std::error::Error as StdError;
use std::fmt;

use edgeforge_core::{Shape4, Tensor4};

/// Boxed error type transforms can attach as a cause.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure reported by a [`TileTransform`].
#[derive(Debug)]
pub struct TransformError {
    message: String,
    source: Option<BoxError>,
}

impl TransformError {
    /// Error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Error wrapping an underlying cause.
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for TransformError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn StdError + 'static))
    }
}

/// Maps one feature-map tile to its decoded output tile.
///
/// For an input tile of shape `(B, C, h, w)` the engine expects
/// `(B, out_channels, h * scale, w * scale)` back; any other shape fails the
/// decode call. Implementations should be deterministic for a given input
/// (and seed, if they use one) so tiled results are reproducible.
pub trait TileTransform {
    /// Decode a single tile.
    fn decode_tile(&mut self, tile: &Tensor4) -> Result<Tensor4, TransformError>;

    /// Name used in logs and error messages.
    fn name(&self) -> &str {
        "transform"
    }
}

impl<F> TileTransform for F
where
    F: FnMut(&Tensor4) -> Result<Tensor4, TransformError>,
{
    fn decode_tile(&mut self, tile: &Tensor4) -> Result<Tensor4, TransformError> {
        self(tile)
    }

    fn name(&self) -> &str {
        "closure"
    }
}

// =============================================================================
// Reference transform
// =============================================================================

/// Deterministic stand-in decoder: per-pixel channel projection followed by
/// nearest-neighbour upsampling.
///
/// Every output value depends only on the feature-map pixel it was upsampled
/// from, so decoding tile by tile reproduces a single full-map decode. Used by
/// the CLI, tests and benchmarks where no real decoder is available.
#[derive(Debug, Clone)]
pub struct NearestUpsample {
    scale: usize,
    in_channels: usize,
    out_channels: usize,
    /// Row-major `out_channels x in_channels`.
    weights: Vec<f32>,
    bias: Vec<f32>,
    calls: usize,
}

impl NearestUpsample {
    /// Averages all input channels into each output channel, offset by
    /// `0.25 * channel_index`.
    pub fn new(scale: usize, in_channels: usize, out_channels: usize) -> Self {
        let w = if in_channels == 0 { 0.0 } else { 1.0 / in_channels as f32 };
        Self {
            scale,
            in_channels,
            out_channels,
            weights: vec![w; out_channels * in_channels],
            bias: (0..out_channels).map(|o| o as f32 * 0.25).collect(),
            calls: 0,
        }
    }

    /// Uses an explicit projection. `weights` is row-major `out x in`.
    pub fn with_projection(
        scale: usize,
        in_channels: usize,
        weights: Vec<f32>,
        bias: Vec<f32>,
    ) -> Result<Self, TransformError> {
        let out_channels = bias.len();
        if weights.len() != out_channels * in_channels {
            return Err(TransformError::new(format!(
                "projection has {} weights, expected {}x{}",
                weights.len(),
                out_channels,
                in_channels
            )));
        }
        Ok(Self {
            scale,
            in_channels,
            out_channels,
            weights,
            bias,
            calls: 0,
        })
    }

    /// Number of tiles decoded so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Output channel count.
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }
}

impl TileTransform for NearestUpsample {
    fn decode_tile(&mut self, tile: &Tensor4) -> Result<Tensor4, TransformError> {
        let shape = tile.shape();
        if shape.channels != self.in_channels {
            return Err(TransformError::new(format!(
                "expected {} input channels, got {}",
                self.in_channels, shape.channels
            )));
        }

        let s = self.scale;
        let out_shape = Shape4::new(shape.batch, self.out_channels, shape.height * s, shape.width * s);
        let mut out = Tensor4::zeros(out_shape);

        for b in 0..shape.batch {
            for o in 0..self.out_channels {
                let row_w = &self.weights[o * self.in_channels..(o + 1) * self.in_channels];
                let plane = out.plane_mut(b, o);
                for y in 0..shape.height {
                    for x in 0..shape.width {
                        let mut v = self.bias[o];
                        for (i, w) in row_w.iter().enumerate() {
                            v += w * tile.get(b, i, y, x);
                        }
                        for dy in 0..s {
                            let row = (y * s + dy) * out_shape.width;
                            plane[row + x * s..row + (x + 1) * s].fill(v);
                        }
                    }
                }
            }
        }

        self.calls += 1;
        Ok(out)
    }

    fn name(&self) -> &str {
        "nearest-upsample"
    }
}
