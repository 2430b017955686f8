//! edgeforge - tiled latent decoding driver
//!
//! Plans and runs memory-bounded tiled decodes over synthetic feature maps.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

mod commands;

#[derive(Parser)]
#[command(name = "edgeforge")]
#[command(author, version, about = "Memory-bounded tiled latent decoding")]
#[command(long_about = "
Splits oversized latent feature maps into overlapping tiles, decodes each tile
independently and blends the results into one seamless output.

Examples:
  edgeforge plan --height 256 --width 192            # Show the tile grid
  edgeforge plan --height 256 --width 192 --json
  edgeforge plan --height 128 --width 128 --device-mem 4096
  edgeforge decode --height 128 --width 128 --tile 512 --overlap 64
  edgeforge decode --height 96 --width 96 --blend feather --parallel
  EDGEFORGE_TILE_SIZE=256 edgeforge -vv decode --height 64 --width 64
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Number of threads (0 = auto)
    #[arg(short = 'j', long, global = true, default_value = "0")]
    threads: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the tile grid and memory estimate for a feature map
    #[command(visible_alias = "p")]
    Plan(PlanArgs),

    /// Run a tiled decode over a synthetic feature map
    #[command(visible_alias = "d")]
    Decode(DecodeArgs),
}

/// Tile configuration flags shared by all commands.
///
/// Layering: `--config` file (or defaults), then `EDGEFORGE_*` environment
/// variables, then these flags.
#[derive(Args, Clone)]
struct TileArgs {
    /// YAML tile configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tile extent in output pixels
    #[arg(short, long)]
    tile: Option<usize>,

    /// Overlap extent in output pixels
    #[arg(short, long)]
    overlap: Option<usize>,

    /// Output pixels per feature-map unit
    #[arg(short, long)]
    scale: Option<usize>,

    /// Seam blending: uniform, feather
    #[arg(short, long)]
    blend: Option<String>,

    /// Output channels produced by the decoder
    #[arg(long)]
    out_channels: Option<usize>,
}

/// Feature-map shape flags.
#[derive(Args, Clone)]
struct ShapeArgs {
    /// Feature-map height (latent units)
    #[arg(short = 'H', long)]
    height: usize,

    /// Feature-map width (latent units)
    #[arg(short = 'W', long)]
    width: usize,

    /// Batch size
    #[arg(long, default_value = "1")]
    batch: usize,

    /// Latent channels
    #[arg(long, default_value = "4")]
    channels: usize,
}

#[derive(Args)]
struct PlanArgs {
    #[command(flatten)]
    shape: ShapeArgs,

    #[command(flatten)]
    tile: TileArgs,

    /// Recommend a tile extent for this much accelerator memory (MB)
    #[arg(long)]
    device_mem: Option<u64>,

    /// List every tile window
    #[arg(long)]
    windows: bool,

    /// Machine-readable output (JSON)
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct DecodeArgs {
    #[command(flatten)]
    shape: ShapeArgs,

    #[command(flatten)]
    tile: TileArgs,

    /// Seed for the synthetic feature map
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Decode tiles on the thread pool instead of one at a time
    #[arg(long)]
    parallel: bool,
}

/// Installs the tracing subscriber. The returned guard flushes the log file on drop.
fn init_logging(verbose: u8, log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr.and(writer))
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.verbose, cli.log_file.as_ref())?;

    // Configure thread pool
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("Failed to configure thread pool")?;
    }

    match cli.command {
        Commands::Plan(args) => commands::plan::run(args, cli.verbose > 0),
        Commands::Decode(args) => commands::decode::run(args, cli.verbose > 0),
    }
}
