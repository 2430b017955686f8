//! Integration tests for EdgeForge crates.
//!
//! End-to-end checks that run a configuration file through planning,
//! decoding and blending across `edgeforge-core` and `edgeforge-tile`.

#[cfg(test)]
mod golden;
