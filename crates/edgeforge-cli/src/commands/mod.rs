//! CLI command implementations

pub mod decode;
pub mod plan;

use crate::{ShapeArgs, TileArgs};
use anyhow::{Context, Result};
use edgeforge_core::{Shape4, Tensor4};
use edgeforge_tile::{BlendMode, TileConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Resolves the tile configuration: file (or defaults), then environment, then flags.
pub fn load_config(args: &TileArgs) -> Result<TileConfig> {
    let base = match &args.config {
        Some(path) => TileConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => TileConfig::default(),
    };
    let mut config = base
        .with_env_overrides()
        .context("Invalid EDGEFORGE_* environment override")?;

    if let Some(tile) = args.tile {
        config.tile_extent = tile;
    }
    if let Some(overlap) = args.overlap {
        config.overlap_extent = overlap;
    }
    if let Some(scale) = args.scale {
        config.scale_factor = scale;
    }
    if let Some(blend) = &args.blend {
        config.blend = blend.parse::<BlendMode>().context("Invalid --blend value")?;
    }
    if let Some(channels) = args.out_channels {
        config.out_channels = channels;
    }

    debug!(
        tile = config.tile_extent,
        overlap = config.overlap_extent,
        scale = config.scale_factor,
        blend = %config.blend,
        "resolved tile config"
    );
    Ok(config)
}

/// Feature-map shape from the command line.
pub fn input_shape(args: &ShapeArgs) -> Shape4 {
    Shape4::new(args.batch, args.channels, args.height, args.width)
}

/// Smooth pseudo-random feature map, reproducible from `seed`.
///
/// Low-frequency gradients plus uniform noise in [-1, 1], so seams between
/// tiles would be visible in the decoded statistics.
pub fn synthetic_latents(shape: Shape4, seed: u64) -> Tensor4 {
    let mut rng = StdRng::seed_from_u64(seed);
    let phases: Vec<f32> = (0..shape.channels).map(|_| rng.gen_range(0.0..std::f32::consts::TAU)).collect();
    let (h, w) = (shape.height.max(1) as f32, shape.width.max(1) as f32);

    Tensor4::from_fn(shape, |_, c, y, x| {
        let gradient = ((x as f32 / w + y as f32 / h) * std::f32::consts::PI + phases[c]).sin();
        0.5 * gradient + 0.5 * rng.gen_range(-1.0f32..1.0)
    })
}
