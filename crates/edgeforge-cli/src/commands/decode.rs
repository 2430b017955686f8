//! Decode command.
//!
//! Runs a full tiled decode of a synthetic feature map through the built-in
//! nearest-upsample decoder and reports output statistics.

use crate::DecodeArgs;
use anyhow::{Context, Result, bail};
use edgeforge_tile::{NearestUpsample, TiledDecoder, format_bytes};
use std::time::Instant;
use tracing::info;

/// Runs the decode command.
pub fn run(args: DecodeArgs, verbose: bool) -> Result<()> {
    let config = super::load_config(&args.tile)?;
    let decoder = TiledDecoder::from_config(&config).context("Invalid tile configuration")?;

    let input = super::input_shape(&args.shape);
    let latents = super::synthetic_latents(input, args.seed);
    let plan = decoder.plan(input).context("Failed to plan tiles")?;

    if verbose {
        println!("{}", plan.describe());
    }

    let scale = decoder.spec().scale_factor();
    let (in_channels, out_channels) = (input.channels, decoder.out_channels());
    let started = Instant::now();

    let output = if args.parallel {
        decoder.decode_parallel(&latents, || NearestUpsample::new(scale, in_channels, out_channels))
    } else {
        let mut transform = NearestUpsample::new(scale, in_channels, out_channels);
        decoder.decode(&latents, &mut transform)
    }
    .context("Tiled decode failed")?;

    let elapsed = started.elapsed();
    info!(elapsed_ms = elapsed.as_millis() as u64, "decode complete");

    if !output.is_finite() {
        bail!("Decoded output contains non-finite values");
    }

    println!("Decoded {} -> {}", input, output.shape());
    println!("  Tiles:      {}", plan.tile_count());
    println!("  Mode:       {}", if args.parallel { "parallel" } else { "sequential" });
    println!("  Blend:      {}", decoder.blend());
    println!("  Output:     {}", format_bytes(output.size_bytes()));
    if let Some((min, max, mean)) = output.stats() {
        println!("  Min value:  {:.6}", min);
        println!("  Max value:  {:.6}", max);
        println!("  Avg value:  {:.6}", mean);
    }
    println!("  Time:       {:.2?}", elapsed);

    Ok(())
}
