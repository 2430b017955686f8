//! Hash-based determinism checks.
//!
//! Decodes the same feature map along different execution paths and compares
//! SHA256 hashes of the quantized output. Inputs and projections are
//! integer-valued so every overlap sum is exact and the hashes must agree
//! bit for bit regardless of tile order or thread count.
//!
//! ```bash
//! cargo test --package edgeforge-tests golden
//! ```

use edgeforge_core::{Shape4, Tensor4};
use edgeforge_tile::{NearestUpsample, TileSpec, TiledDecoder};
use sha2::{Digest, Sha256};

/// Decimal places kept before hashing.
const HASH_PRECISION: i32 = 5;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

fn integer_latents(shape: Shape4) -> Tensor4 {
    Tensor4::from_fn(shape, |b, c, y, x| ((b * 13 + c * 7 + y * 5 + x * 3) % 11) as f32)
}

/// 4 -> 3 projection with integer weights.
fn integer_decoder(scale: usize) -> NearestUpsample {
    let weights = vec![
        1.0, 0.0, 2.0, 0.0, //
        0.0, 1.0, 0.0, 1.0, //
        1.0, 1.0, 1.0, 1.0,
    ];
    let bias = vec![0.0, 1.0, -2.0];
    NearestUpsample::with_projection(scale, 4, weights, bias).unwrap()
}

fn hash_tensor(t: &Tensor4) -> String {
    let factor = 10f64.powi(HASH_PRECISION);
    let mut hasher = Sha256::new();
    hasher.update(t.shape().to_string().as_bytes());
    for &v in t.data() {
        let q = (v as f64 * factor).round() as i64;
        hasher.update(q.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn decoder(tile: usize, overlap: usize) -> TiledDecoder {
    TiledDecoder::new(TileSpec::new(tile, overlap, 8).unwrap())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn golden_order_independent() {
    let latents = integer_latents(Shape4::new(1, 4, 23, 17));
    let dec = decoder(64, 24);
    let windows = dec.plan(latents.shape()).unwrap().windows();

    let forward = dec.decode_windows(&latents, &mut integer_decoder(8), &windows).unwrap();
    let reversed: Vec<_> = windows.iter().rev().copied().collect();
    let backward = dec.decode_windows(&latents, &mut integer_decoder(8), &reversed).unwrap();

    assert_eq!(hash_tensor(&forward), hash_tensor(&backward));
}

#[test]
fn golden_thread_count_independent() {
    let latents = integer_latents(Shape4::new(2, 4, 19, 26));
    let dec = decoder(48, 16);
    let sequential = hash_tensor(&dec.decode(&latents, &mut integer_decoder(8)).unwrap());

    for threads in [1, 2, 3, 8] {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build().unwrap();
        let out = pool.install(|| dec.decode_parallel(&latents, || integer_decoder(8)).unwrap());
        assert_eq!(hash_tensor(&out), sequential, "threads={threads}");
    }
}

#[test]
fn golden_untiled_when_pointwise() {
    // A pointwise decoder gives identical output with or without tiling
    let latents = integer_latents(Shape4::new(1, 4, 21, 21));
    let tiled = decoder(64, 16).decode(&latents, &mut integer_decoder(8)).unwrap();
    let whole = decoder(168, 0).decode(&latents, &mut integer_decoder(8)).unwrap();

    assert_eq!(hash_tensor(&tiled), hash_tensor(&whole));
}

#[test]
fn golden_hash_detects_change() {
    let latents = integer_latents(Shape4::new(1, 4, 8, 8));
    let a = decoder(32, 8).decode(&latents, &mut integer_decoder(8)).unwrap();

    let mut shifted = latents.clone();
    shifted.set(0, 0, 3, 3, shifted.get(0, 0, 3, 3) + 1.0);
    let b = decoder(32, 8).decode(&shifted, &mut integer_decoder(8)).unwrap();

    assert_ne!(hash_tensor(&a), hash_tensor(&b));
}
