//! Tiled decode tests for edgeforge-tile.

use approx::assert_relative_eq;
use edgeforge_core::{Shape4, Tensor4, Window};
use edgeforge_tile::{
    Accumulator, BlendMode, NearestUpsample, TileError, TileSpec, TileTransform, TiledDecoder,
    TransformError, clamp_axis, plan_axis,
};

fn latents(shape: Shape4) -> Tensor4 {
    Tensor4::from_fn(shape, |b, c, y, x| ((b * 5 + c * 3 + y * 7 + x * 11) % 17) as f32)
}

/// Integer-valued decoder whose output depends on the whole tile, so
/// overlapping tiles disagree and the blend actually mixes values.
fn context_decoder(scale: usize) -> impl FnMut(&Tensor4) -> Result<Tensor4, TransformError> {
    move |tile: &Tensor4| -> Result<Tensor4, TransformError> {
        let s = tile.shape();
        let offset = tile.data().iter().take(3).sum::<f32>();
        Ok(Tensor4::from_fn(
            Shape4::new(s.batch, 3, s.height * scale, s.width * scale),
            |b, c, y, x| tile.get(b, 0, y / scale, x / scale) + offset + c as f32,
        ))
    }
}

/// Non-integer decoder whose output depends on the whole tile. Overlap sums
/// of its values are inexact in f32, so they expose any order dependence.
fn smooth_context_decoder(scale: usize) -> impl FnMut(&Tensor4) -> Result<Tensor4, TransformError> {
    move |tile: &Tensor4| -> Result<Tensor4, TransformError> {
        let s = tile.shape();
        let mean = tile.data().iter().sum::<f32>() / tile.data().len() as f32;
        Ok(Tensor4::from_fn(
            Shape4::new(s.batch, 3, s.height * scale, s.width * scale),
            |b, c, y, x| {
                let v = tile.get(b, c, y / scale, x / scale);
                (v * 0.37 + mean).sin() * 1.7 + (x as f32 * 0.013 + c as f32).cos() / 3.0
            },
        ))
    }
}

fn bit_differences(a: &Tensor4, b: &Tensor4) -> usize {
    a.data().iter().zip(b.data()).filter(|(x, y)| x.to_bits() != y.to_bits()).count()
}

/// Deterministic permutation without a RNG.
fn shuffled(windows: &[Window]) -> Vec<Window> {
    let n = windows.len();
    let step = (1..n).rev().find(|k| gcd(*k, n) == 1 && *k > n / 2).unwrap_or(1);
    (0..n).map(|i| windows[(i * step + 3) % n]).collect()
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 { a } else { gcd(b, a % b) }
}

#[test]
fn test_boundary_clamp() {
    let starts = plan_axis(100, 40, 10).unwrap();
    let last = *starts.last().unwrap();
    let (start, end) = clamp_axis(last, 100, 40);
    assert_eq!(start, 60);
    assert_eq!(end - start, 40);
}

#[test]
fn test_coverage_all_configs() {
    for dim in 1..60 {
        for tile in 1..20 {
            for overlap in 0..tile {
                let mut hits = vec![0u32; dim];
                for s in plan_axis(dim, tile, overlap).unwrap() {
                    let (a, b) = clamp_axis(s, dim, tile);
                    assert!(b <= dim);
                    for h in &mut hits[a..b] {
                        *h += 1;
                    }
                }
                assert!(hits.iter().all(|&h| h > 0), "dim={dim} tile={tile} overlap={overlap}");
            }
        }
    }
}

#[test]
fn test_scale_consistency() {
    let decoder = TiledDecoder::new(TileSpec::new(64, 16, 8).unwrap());
    let fm = latents(Shape4::new(1, 4, 16, 16));
    let out = decoder.decode(&fm, &mut NearestUpsample::new(8, 4, 3)).unwrap();
    assert_eq!(out.shape(), Shape4::new(1, 3, 128, 128));
}

#[test]
fn test_order_independence() {
    let decoder = TiledDecoder::new(TileSpec::new(64, 40, 8).unwrap());
    let fm = Tensor4::from_fn(Shape4::new(1, 4, 29, 23), |_, c, y, x| {
        (c as f32 * 0.31 + y as f32 * 0.173 + x as f32 * 0.091).sin()
    });
    let windows = decoder.plan(fm.shape()).unwrap().windows();
    assert_eq!(windows.len(), 48);

    let row_major = decoder
        .decode_windows(&fm, &mut smooth_context_decoder(8), &windows)
        .unwrap();

    let mut reversed = windows.clone();
    reversed.reverse();
    let rev = decoder
        .decode_windows(&fm, &mut smooth_context_decoder(8), &reversed)
        .unwrap();
    let shuf = decoder
        .decode_windows(&fm, &mut smooth_context_decoder(8), &shuffled(&windows))
        .unwrap();

    assert_eq!(bit_differences(&row_major, &rev), 0);
    assert_eq!(bit_differences(&row_major, &shuf), 0);

    // decode() walks the same canonical order
    let planned = decoder.decode(&fm, &mut smooth_context_decoder(8)).unwrap();
    assert_eq!(bit_differences(&row_major, &planned), 0);
}

#[test]
fn test_order_independence_integer_tiles() {
    let decoder = TiledDecoder::new(TileSpec::new(64, 24, 8).unwrap());
    let fm = latents(Shape4::new(2, 4, 29, 23));
    let windows = decoder.plan(fm.shape()).unwrap().windows();

    let row_major = decoder
        .decode_windows(&fm, &mut context_decoder(8), &windows)
        .unwrap();
    let shuf = decoder
        .decode_windows(&fm, &mut context_decoder(8), &shuffled(&windows))
        .unwrap();
    assert_eq!(row_major.data(), shuf.data());
}

#[test]
fn test_no_overlap_idempotence() {
    let spec = TileSpec::new(64, 0, 8).unwrap();
    let decoder = TiledDecoder::new(spec);
    let fm = latents(Shape4::new(1, 4, 24, 16));
    let plan = decoder.plan(fm.shape()).unwrap();
    let windows = plan.windows();
    assert_eq!(plan.grid_dims(), (3, 2));

    // Every output pixel is covered exactly once
    let mut acc = Accumulator::new(plan.output_shape(), BlendMode::Uniform, 0);
    let mut t = context_decoder(8);
    for w in &windows {
        let tile = t.decode_tile(&fm.crop(w).unwrap()).unwrap();
        acc.add_tile(&w.scaled(8), &tile).unwrap();
    }
    assert!(acc.coverage().iter().all(|&c| c == 1.0));

    // Result equals the raw tiles placed edge to edge
    let mut expected = Tensor4::zeros(plan.output_shape());
    for w in &windows {
        let tile = t.decode_tile(&fm.crop(w).unwrap()).unwrap();
        let ow = w.scaled(8);
        for c in 0..3 {
            for y in 0..ow.height() {
                for x in 0..ow.width() {
                    expected.set(0, c, ow.row_start + y, ow.col_start + x, tile.get(0, c, y, x));
                }
            }
        }
    }

    let out = decoder.decode(&fm, &mut context_decoder(8)).unwrap();
    assert_eq!(out.data(), expected.data());
}

#[test]
fn test_overlap_is_mean_of_tiles() {
    // One row of two 8-unit tiles over 12 units: overlap band is units 4..8
    let decoder = TiledDecoder::new(TileSpec::new(8, 4, 1).unwrap()).with_out_channels(1);
    let fm = Tensor4::zeros(Shape4::new(1, 1, 8, 12));
    let mut tile_id = 0.0;
    let mut t = |tile: &Tensor4| -> Result<Tensor4, TransformError> {
        tile_id += 1.0;
        Ok(Tensor4::filled(tile.shape(), tile_id * 10.0))
    };
    let out = decoder.decode(&fm, &mut t).unwrap();
    assert_eq!(out.get(0, 0, 0, 0), 10.0);
    assert_eq!(out.get(0, 0, 0, 5), 15.0);
    assert_eq!(out.get(0, 0, 7, 11), 20.0);
}

#[test]
fn test_trailing_band_is_plain_mean() {
    // 100 units, tile 40, overlap 10: tiles at 0, 30, 60 each weigh 1
    let decoder = TiledDecoder::new(TileSpec::new(40, 10, 1).unwrap()).with_out_channels(1);
    let fm = Tensor4::zeros(Shape4::new(1, 1, 1, 100));
    let mut tile_id = 0.0;
    let mut t = |tile: &Tensor4| -> Result<Tensor4, TransformError> {
        tile_id += 1.0;
        Ok(Tensor4::filled(tile.shape(), tile_id))
    };

    let out = decoder.decode(&fm, &mut t).unwrap();
    assert_eq!(tile_id, 3.0);
    assert_relative_eq!(out.get(0, 0, 0, 65), 2.5);
    assert_relative_eq!(out.get(0, 0, 0, 35), 1.5);
    assert_relative_eq!(out.get(0, 0, 0, 99), 3.0);
}

#[test]
fn test_failure_propagation() {
    let decoder = TiledDecoder::new(TileSpec::new(64, 16, 8).unwrap());
    let fm = latents(Shape4::new(1, 4, 16, 16));
    let mut seen = Vec::new();
    let mut inner = NearestUpsample::new(8, 4, 3);
    let mut t = |tile: &Tensor4| -> Result<Tensor4, TransformError> {
        seen.push(tile.shape());
        if seen.len() == 4 {
            let cause = std::io::Error::new(std::io::ErrorKind::OutOfMemory, "CUDA out of memory");
            return Err(TransformError::with_source("vae decode failed", cause));
        }
        inner.decode_tile(tile)
    };

    let result = decoder.decode(&fm, &mut t);
    assert_eq!(seen.len(), 4);
    let err = result.unwrap_err();
    assert!(matches!(err, TileError::Transform { index: 3, total: 9, .. }));
    let msg = err.to_string();
    assert!(msg.contains("tile 3/9"), "{msg}");
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_zero_division_guard() {
    let decoder = TiledDecoder::new(TileSpec::new(64, 16, 8).unwrap());
    let fm = latents(Shape4::new(1, 4, 16, 16));
    // Drop the last column of tiles from a valid plan
    let windows: Vec<Window> = decoder
        .plan(fm.shape())
        .unwrap()
        .windows()
        .into_iter()
        .filter(|w| w.col_end < 16)
        .collect();

    let err = decoder
        .decode_windows(&fm, &mut NearestUpsample::new(8, 4, 3), &windows)
        .unwrap_err();
    match err {
        TileError::CoverageGap { uncovered, row, col } => {
            assert!(uncovered > 0);
            assert_eq!(row, 0);
            assert!(col >= 14 * 8);
        }
        other => panic!("expected coverage gap, got {other}"),
    }
}

#[test]
fn test_config_error_before_any_tile() {
    assert!(TileSpec::new(64, 64, 8).unwrap_err().is_config_error());
    assert!(plan_axis(10, 4, 4).unwrap_err().is_config_error());
}

#[test]
fn test_feather_blend_smooths_seam() {
    let fm = latents(Shape4::new(1, 4, 20, 20));
    let uniform = TiledDecoder::new(TileSpec::new(64, 32, 8).unwrap());
    let feather = uniform.clone().with_blend(BlendMode::Feather);

    let a = uniform.decode(&fm, &mut context_decoder(8)).unwrap();
    let b = feather.decode(&fm, &mut context_decoder(8)).unwrap();
    assert_eq!(a.shape(), b.shape());
    assert!(b.is_finite());

    // Away from any overlap band both policies see a single tile
    assert_relative_eq!(a.get(0, 0, 0, 0), b.get(0, 0, 0, 0));
}

#[test]
fn test_parallel_decode_exact_for_integer_tiles() {
    let decoder = TiledDecoder::new(TileSpec::new(64, 24, 8).unwrap());
    let fm = latents(Shape4::new(1, 4, 29, 23));
    let seq = decoder.decode(&fm, &mut context_decoder(8)).unwrap();
    let par = decoder.decode_parallel(&fm, || context_decoder(8)).unwrap();
    assert_eq!(seq.data(), par.data());
}

#[test]
fn test_parallel_one_transform_per_worker() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    // 2-unit tiles at stride 1 over 40 units: 39 x 39 = 1521 tiles
    let decoder = TiledDecoder::new(TileSpec::new(16, 8, 8).unwrap());
    let fm = latents(Shape4::new(1, 4, 40, 40));
    assert_eq!(decoder.plan(fm.shape()).unwrap().tile_count(), 1521);

    let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    let created = AtomicUsize::new(0);
    let out = pool
        .install(|| {
            decoder.decode_parallel(&fm, || {
                created.fetch_add(1, Ordering::SeqCst);
                NearestUpsample::new(8, 4, 3)
            })
        })
        .unwrap();

    assert_eq!(created.load(Ordering::SeqCst), 4);
    assert_eq!(out.shape(), Shape4::new(1, 3, 320, 320));
}

#[test]
fn test_parallel_budget_counts_workers() {
    let decoder = TiledDecoder::new(TileSpec::new(64, 16, 8).unwrap());
    let fm = latents(Shape4::new(1, 4, 30, 30));
    let single = edgeforge_tile::memory::accumulator_memory(Shape4::new(1, 3, 240, 240));

    let pool = rayon::ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    let tight = decoder.clone().with_host_budget(single * 3);
    let err = pool
        .install(|| tight.decode_parallel(&fm, || NearestUpsample::new(8, 4, 3)))
        .unwrap_err();
    assert!(matches!(err, TileError::HostMemory { .. }));

    let enough = decoder.with_host_budget(single * 4);
    assert!(pool.install(|| enough.decode_parallel(&fm, || NearestUpsample::new(8, 4, 3))).is_ok());
}

#[test]
fn test_parallel_deterministic_per_pool_size() {
    let decoder = TiledDecoder::new(TileSpec::new(64, 40, 8).unwrap());
    let fm = latents(Shape4::new(1, 4, 29, 23));
    let pool = rayon::ThreadPoolBuilder::new().num_threads(3).build().unwrap();

    let a = pool.install(|| decoder.decode_parallel(&fm, || smooth_context_decoder(8))).unwrap();
    let b = pool.install(|| decoder.decode_parallel(&fm, || smooth_context_decoder(8))).unwrap();
    assert_eq!(bit_differences(&a, &b), 0);
}

#[test]
fn test_parallel_decode_failure() {
    let decoder = TiledDecoder::new(TileSpec::new(64, 16, 8).unwrap());
    let fm = latents(Shape4::new(1, 4, 16, 16));
    let result = decoder.decode_parallel(&fm, || {
        |_: &Tensor4| -> Result<Tensor4, TransformError> { Err(TransformError::new("no device")) }
    });
    assert!(result.unwrap_err().is_transform_error());
}
