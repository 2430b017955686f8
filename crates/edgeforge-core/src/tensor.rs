//! Dense 4-D `f32` arrays in NCHW layout.
//!
//! [`Tensor4`] is the exchange format of the engine: feature maps go in,
//! cropped tiles are handed to the transform, decoded tiles come back and
//! the normalized output is returned, all as `Tensor4`.
//!
//! # Memory Layout
//!
//! ```text
//! index(b, c, y, x) = ((b * C + c) * H + y) * W + x
//! ```
//!
//! Each `(b, c)` pair owns a contiguous `H * W` plane, see [`Tensor4::plane`].

use std::fmt;

use crate::error::{Error, Result};
use crate::window::Window;

/// Shape of a [`Tensor4`]: (batch, channels, height, width).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Shape4 {
    /// Batch size
    pub batch: usize,
    /// Channel count
    pub channels: usize,
    /// Spatial height
    pub height: usize,
    /// Spatial width
    pub width: usize,
}

impl Shape4 {
    /// Creates a shape.
    #[inline]
    pub const fn new(batch: usize, channels: usize, height: usize, width: usize) -> Self {
        Self {
            batch,
            channels,
            height,
            width,
        }
    }

    /// Total element count.
    #[inline]
    pub const fn len(&self) -> usize {
        self.batch * self.channels * self.height * self.width
    }

    /// Returns `true` if any dimension is zero.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements per `(b, c)` plane.
    #[inline]
    pub const fn plane_len(&self) -> usize {
        self.height * self.width
    }

    /// Same batch and channels with new spatial extent.
    #[inline]
    pub const fn with_spatial(&self, height: usize, width: usize) -> Self {
        Self::new(self.batch, self.channels, height, width)
    }

    /// Same batch and spatial extent with a new channel count.
    #[inline]
    pub const fn with_channels(&self, channels: usize) -> Self {
        Self::new(self.batch, channels, self.height, self.width)
    }

    /// Size in bytes of an `f32` buffer with this shape.
    #[inline]
    pub const fn size_bytes(&self) -> u64 {
        (self.len() as u64) * 4
    }
}

impl fmt::Display for Shape4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}x{}", self.batch, self.channels, self.height, self.width)
    }
}

impl From<(usize, usize, usize, usize)> for Shape4 {
    fn from((b, c, h, w): (usize, usize, usize, usize)) -> Self {
        Self::new(b, c, h, w)
    }
}

/// Dense NCHW `f32` tensor.
#[derive(Clone, PartialEq)]
pub struct Tensor4 {
    shape: Shape4,
    data: Vec<f32>,
}

impl Tensor4 {
    /// Zero-filled tensor.
    pub fn zeros(shape: Shape4) -> Self {
        Self::filled(shape, 0.0)
    }

    /// Tensor with every element set to `value`.
    pub fn filled(shape: Shape4, value: f32) -> Self {
        Self {
            shape,
            data: vec![value; shape.len()],
        }
    }

    /// Wraps existing data, checking the length against `shape`.
    pub fn from_vec(shape: Shape4, data: Vec<f32>) -> Result<Self> {
        if data.len() != shape.len() {
            return Err(Error::BufferSizeMismatch {
                expected: shape.len(),
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Builds a tensor by evaluating `f(b, c, y, x)` for every element.
    pub fn from_fn<F>(shape: Shape4, mut f: F) -> Self
    where
        F: FnMut(usize, usize, usize, usize) -> f32,
    {
        let mut data = Vec::with_capacity(shape.len());
        for b in 0..shape.batch {
            for c in 0..shape.channels {
                for y in 0..shape.height {
                    for x in 0..shape.width {
                        data.push(f(b, c, y, x));
                    }
                }
            }
        }
        Self { shape, data }
    }

    /// Tensor shape.
    #[inline]
    pub fn shape(&self) -> Shape4 {
        self.shape
    }

    /// Raw element data in NCHW order.
    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable element data in NCHW order.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consumes the tensor, returning its data.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Size in bytes.
    #[inline]
    pub fn size_bytes(&self) -> u64 {
        self.shape.size_bytes()
    }

    /// Flat offset of `(b, c, y, x)`.
    #[inline]
    pub fn offset(&self, b: usize, c: usize, y: usize, x: usize) -> usize {
        let s = &self.shape;
        ((b * s.channels + c) * s.height + y) * s.width + x
    }

    /// Element at `(b, c, y, x)`.
    ///
    /// # Panics
    ///
    /// Panics if any index is out of range.
    #[inline]
    pub fn get(&self, b: usize, c: usize, y: usize, x: usize) -> f32 {
        self.data[self.offset(b, c, y, x)]
    }

    /// Sets the element at `(b, c, y, x)`.
    #[inline]
    pub fn set(&mut self, b: usize, c: usize, y: usize, x: usize, value: f32) {
        let i = self.offset(b, c, y, x);
        self.data[i] = value;
    }

    /// Contiguous `H * W` plane for batch `b`, channel `c`.
    #[inline]
    pub fn plane(&self, b: usize, c: usize) -> &[f32] {
        let start = self.offset(b, c, 0, 0);
        &self.data[start..start + self.shape.plane_len()]
    }

    /// Mutable `H * W` plane for batch `b`, channel `c`.
    #[inline]
    pub fn plane_mut(&mut self, b: usize, c: usize) -> &mut [f32] {
        let start = self.offset(b, c, 0, 0);
        let len = self.shape.plane_len();
        &mut self.data[start..start + len]
    }

    /// Copies the spatial `window` across every batch and channel.
    pub fn crop(&self, window: &Window) -> Result<Tensor4> {
        if !window.fits(self.shape.height, self.shape.width) {
            return Err(Error::WindowOutOfBounds {
                window: *window,
                height: self.shape.height,
                width: self.shape.width,
            });
        }

        let out_shape = self.shape.with_spatial(window.height(), window.width());
        let mut data = Vec::with_capacity(out_shape.len());
        for b in 0..self.shape.batch {
            for c in 0..self.shape.channels {
                let plane = self.plane(b, c);
                for row in window.row_start..window.row_end {
                    let start = row * self.shape.width + window.col_start;
                    data.extend_from_slice(&plane[start..start + window.width()]);
                }
            }
        }

        Ok(Tensor4 {
            shape: out_shape,
            data,
        })
    }

    /// Minimum, maximum and mean over all elements. `None` for empty tensors.
    pub fn stats(&self) -> Option<(f32, f32, f32)> {
        if self.data.is_empty() {
            return None;
        }
        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        for &v in &self.data {
            min = min.min(v);
            max = max.max(v);
            sum += v as f64;
        }
        Some((min, max, (sum / self.data.len() as f64) as f32))
    }

    /// Returns `true` if every element is finite.
    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

impl fmt::Debug for Tensor4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor4")
            .field("shape", &self.shape)
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}
