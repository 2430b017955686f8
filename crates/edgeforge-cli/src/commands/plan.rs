//! Plan command.
//!
//! Shows the tile grid, window list and memory estimate for a feature map
//! without decoding anything.

use crate::PlanArgs;
use anyhow::{Context, Result};
use edgeforge_tile::{DeviceBudget, TilePlan, TileSpec, format_bytes};
use serde::Serialize;
use tracing::info;

/// Upper bound when searching for a tile extent that fits the device.
const MAX_RECOMMENDED_EXTENT: usize = 2048;

#[derive(Serialize)]
struct PlanReport {
    input: [usize; 4],
    output: [usize; 4],
    tile_extent: usize,
    overlap_extent: usize,
    scale_factor: usize,
    blend: String,
    rows: Vec<usize>,
    cols: Vec<usize>,
    tiles: usize,
    host_bytes: u64,
    tile_input_bytes: u64,
    tile_output_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    windows: Option<Vec<[usize; 4]>>,
}

/// Runs the plan command.
pub fn run(args: PlanArgs, verbose: bool) -> Result<()> {
    let mut config = super::load_config(&args.tile)?;
    let input = super::input_shape(&args.shape);

    if let Some(mb) = args.device_mem {
        let budget = DeviceBudget::with_device_memory(megabytes(mb));
        let extent = budget
            .recommend_tile_extent(
                config.scale_factor,
                input.batch,
                input.channels,
                config.out_channels,
                MAX_RECOMMENDED_EXTENT,
            )
            .context("Failed to fit a tile into device memory")?;
        info!(extent, budget = %format_bytes(budget.available_bytes), "recommended tile extent");
        config.tile_extent = extent;
        // Keep the overlap valid for the smaller tile
        if config.overlap_extent >= extent {
            config.overlap_extent = extent / 4;
        }
    }

    let spec = config.to_spec().context("Invalid tile configuration")?;
    let plan = TilePlan::new(&spec, input, config.out_channels).context("Failed to plan tiles")?;

    if args.json {
        let report = report(&plan, &spec, config.blend.name(), args.windows);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", plan.describe());
    println!("  Blend:      {}", config.blend);
    if args.device_mem.is_some() {
        println!("  Recommended tile: {}px", spec.tile_extent());
    }

    if args.windows || verbose {
        println!("  Windows (latent space):");
        for (index, window) in plan.windows().iter().enumerate() {
            println!("    {:>4}: {}", index, window);
        }
    }

    Ok(())
}

/// `--device-mem` value in bytes; saturates instead of overflowing.
fn megabytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

fn report(plan: &TilePlan, spec: &TileSpec, blend: &str, with_windows: bool) -> PlanReport {
    let dims = |s: edgeforge_core::Shape4| [s.batch, s.channels, s.height, s.width];
    let memory = plan.memory();

    PlanReport {
        input: dims(plan.input_shape()),
        output: dims(plan.output_shape()),
        tile_extent: spec.tile_extent(),
        overlap_extent: spec.overlap_extent(),
        scale_factor: spec.scale_factor(),
        blend: blend.to_string(),
        rows: plan.rows().to_vec(),
        cols: plan.cols().to_vec(),
        tiles: plan.tile_count(),
        host_bytes: memory.host_bytes,
        tile_input_bytes: memory.tile_input_bytes,
        tile_output_bytes: memory.tile_output_bytes,
        windows: with_windows.then(|| {
            plan.windows()
                .iter()
                .map(|w| [w.row_start, w.row_end, w.col_start, w.col_end])
                .collect()
        }),
    }
}
