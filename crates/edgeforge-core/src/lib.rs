//! # edgeforge-core
//!
//! Core types for the EdgeForge tiled decode engine.
//!
//! - [`Tensor4`], [`Shape4`] - Dense NCHW `f32` arrays used for feature maps
//!   and decoded outputs
//! - [`Window`] - Rectangular crop window in feature-map or output space
//! - [`Error`], [`Result`] - Shape and bounds errors
//!
//! ## Crate Structure
//!
//! ```text
//! edgeforge-core (this crate)
//!    ^
//!    |
//!    +-- edgeforge-tile (grid planning, accumulation, tiled decoder)
//!    +-- edgeforge-cli (edgeforge binary)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use edgeforge_core::{Shape4, Tensor4, Window};
//!
//! let map = Tensor4::from_fn(Shape4::new(1, 4, 16, 16), |_, c, y, x| (c + y + x) as f32);
//! let tile = map.crop(&Window::new(0, 8, 8, 16)).unwrap();
//! assert_eq!(tile.shape(), Shape4::new(1, 4, 8, 8));
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod tensor;
pub mod window;

pub use error::{Error, Result};
pub use tensor::{Shape4, Tensor4};
pub use window::Window;
