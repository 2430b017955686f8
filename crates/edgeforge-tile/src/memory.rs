//! Host and accelerator memory budgeting.
//!
//! The accumulation buffers live in host memory for the whole decode call,
//! while the transform only ever sees one tile. This module sizes both sides:
//! host budget detection (with environment overrides) and a tile-extent
//! recommendation for a given accelerator budget.
//!
//! # Environment Variables
//!
//! - `EDGEFORGE_RAM_MAX` - Maximum host memory for accumulation, in bytes
//! - `EDGEFORGE_RAM_PCT` - Maximum host memory as percentage of system RAM (10-95)

use std::env;
use std::sync::OnceLock;

use edgeforge_core::Shape4;

use crate::{TileError, TileResult};

/// Default safety margin - use at most 80% of system memory.
pub const SAFE_MEMORY_FRACTION: f64 = 0.80;

/// Fraction of accelerator memory kept free for the driver and other work.
const DEVICE_SAFETY_MARGIN: f64 = 0.4;

/// Default transform working set as a multiple of its input + output tiles.
const DEFAULT_WORKING_SET_FACTOR: f64 = 3.0;

/// Assumed accelerator memory when nothing better is known.
const DEFAULT_DEVICE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

static SYSTEM_MEMORY: OnceLock<u64> = OnceLock::new();

/// Detect total system RAM in bytes.
pub fn system_memory() -> u64 {
    *SYSTEM_MEMORY.get_or_init(|| {
        sys_info::mem_info()
            .map(|m| m.total * 1024) // KB to bytes
            .unwrap_or(8 * 1024 * 1024 * 1024) // 8 GB fallback
    })
}

/// Host memory available for accumulation buffers.
///
/// Priority:
/// 1. `EDGEFORGE_RAM_MAX` - explicit bytes limit
/// 2. `EDGEFORGE_RAM_PCT` - percentage of system RAM
/// 3. Default: 80% of system RAM
pub fn available_memory() -> u64 {
    if let Some(bytes) = env_u64("EDGEFORGE_RAM_MAX") {
        return bytes;
    }

    let pct = env_u64("EDGEFORGE_RAM_PCT").unwrap_or((SAFE_MEMORY_FRACTION * 100.0) as u64);
    let pct = pct.clamp(10, 95);

    system_memory() * pct / 100
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Host bytes needed by the accumulation buffers for an output of `shape`.
#[inline]
pub fn accumulator_memory(shape: Shape4) -> u64 {
    shape.size_bytes() + (shape.plane_len() as u64) * 4
}

/// Format bytes as human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= 1024 * 1024 * 1024 {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    } else if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{} KB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

// =============================================================================
// Accelerator budget
// =============================================================================

/// Accelerator memory budget for one in-flight tile.
#[derive(Debug, Clone)]
pub struct DeviceBudget {
    /// Total accelerator memory in bytes.
    pub total_bytes: u64,
    /// Bytes usable by a tile after the safety margin.
    pub available_bytes: u64,
    /// Transform working set as a multiple of its input + output tile bytes.
    pub working_set_factor: f64,
}

impl Default for DeviceBudget {
    fn default() -> Self {
        Self::with_device_memory(DEFAULT_DEVICE_BYTES)
    }
}

impl DeviceBudget {
    /// Budget for an accelerator with `total_bytes` of memory (applies safety margin).
    pub fn with_device_memory(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            available_bytes: (total_bytes as f64 * (1.0 - DEVICE_SAFETY_MARGIN)) as u64,
            working_set_factor: DEFAULT_WORKING_SET_FACTOR,
        }
    }

    /// Overrides the working-set multiplier.
    pub fn working_set(mut self, factor: f64) -> Self {
        self.working_set_factor = factor;
        self
    }

    /// Estimated accelerator bytes to decode one square tile of `tile_extent` pixels.
    pub fn tile_memory(
        &self,
        tile_extent: usize,
        scale_factor: usize,
        batch: usize,
        latent_channels: usize,
        out_channels: usize,
    ) -> u64 {
        let latent = tile_extent / scale_factor.max(1);
        let input = Shape4::new(batch, latent_channels, latent, latent).size_bytes();
        let output = Shape4::new(batch, out_channels, tile_extent, tile_extent).size_bytes();
        ((input + output) as f64 * self.working_set_factor) as u64
    }

    /// Largest tile extent (a multiple of `scale_factor`, at most `max_extent`)
    /// whose estimated working set fits the budget.
    pub fn recommend_tile_extent(
        &self,
        scale_factor: usize,
        batch: usize,
        latent_channels: usize,
        out_channels: usize,
        max_extent: usize,
    ) -> TileResult<usize> {
        if scale_factor == 0 {
            return Err(TileError::invalid_config("scale factor must be at least 1"));
        }

        let mut extent = max_extent - max_extent % scale_factor;
        while extent >= scale_factor {
            let bytes = self.tile_memory(extent, scale_factor, batch, latent_channels, out_channels);
            if bytes <= self.available_bytes {
                return Ok(extent);
            }
            extent -= scale_factor;
        }

        Err(TileError::invalid_config(format!(
            "no tile extent fits the device budget of {}",
            format_bytes(self.available_bytes)
        )))
    }
}
