//! Crop windows for tile-based processing.
//!
//! A [`Window`] is a half-open rectangle `[row_start, row_end) x [col_start, col_end)`
//! over the spatial axes of a [`Tensor4`](crate::Tensor4). The same type is
//! used in feature-map space (where tiles are cropped) and in output space
//! (where decoded tiles are accumulated); [`Window::scaled`] maps between them.
//!
//! # Coordinate System
//!
//! ```text
//! (0,0) ────────► col
//!   │
//!   │   ┌──────────┐
//!   │   │  Window  │
//!   │   └──────────┘
//!   ▼
//!  row
//! ```

use std::fmt;

/// Half-open rectangular region over the (height, width) axes.
///
/// # Example
///
/// ```rust
/// use edgeforge_core::Window;
///
/// let w = Window::new(60, 100, 0, 40);
/// assert_eq!(w.height(), 40);
/// assert_eq!(w.scaled(8), Window::new(480, 800, 0, 320));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Window {
    /// First row (inclusive)
    pub row_start: usize,
    /// Last row (exclusive)
    pub row_end: usize,
    /// First column (inclusive)
    pub col_start: usize,
    /// Last column (exclusive)
    pub col_end: usize,
}

impl Window {
    /// Creates a window from row and column ranges.
    #[inline]
    pub const fn new(row_start: usize, row_end: usize, col_start: usize, col_end: usize) -> Self {
        Self {
            row_start,
            row_end,
            col_start,
            col_end,
        }
    }

    /// Window covering a full `height x width` plane.
    #[inline]
    pub const fn full(height: usize, width: usize) -> Self {
        Self::new(0, height, 0, width)
    }

    /// Number of rows.
    #[inline]
    pub const fn height(&self) -> usize {
        self.row_end.saturating_sub(self.row_start)
    }

    /// Number of columns.
    #[inline]
    pub const fn width(&self) -> usize {
        self.col_end.saturating_sub(self.col_start)
    }

    /// Number of positions covered.
    #[inline]
    pub const fn area(&self) -> usize {
        self.height() * self.width()
    }

    /// Returns `true` if the window covers no positions.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.row_end <= self.row_start || self.col_end <= self.col_start
    }

    /// Returns `true` if `(row, col)` lies inside the window.
    #[inline]
    pub const fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.row_start && row < self.row_end && col >= self.col_start && col < self.col_end
    }

    /// Returns `true` if the window is non-empty and lies within a `height x width` plane.
    #[inline]
    pub const fn fits(&self, height: usize, width: usize) -> bool {
        !self.is_empty() && self.row_end <= height && self.col_end <= width
    }

    /// Multiplies every edge by `factor`, mapping feature-map space into output space.
    #[inline]
    pub const fn scaled(&self, factor: usize) -> Self {
        Self::new(
            self.row_start * factor,
            self.row_end * factor,
            self.col_start * factor,
            self.col_end * factor,
        )
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[rows {}..{}, cols {}..{}]",
            self.row_start, self.row_end, self.col_start, self.col_end
        )
    }
}
