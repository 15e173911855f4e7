//! Deterministic RNG using PCG32 with BLAKE3 seed derivation.
//!
//! All randomness in Psalmody flows through this module. Each layer or
//! component derives its own seed from the render's base seed, so streams are
//! independent of one another and of thread scheduling.

use rand::SeedableRng;
use rand_pcg::Pcg32;

/// Creates a PCG32 RNG from a 64-bit seed.
pub fn create_rng(seed: u64) -> Pcg32 {
    Pcg32::seed_from_u64(seed)
}

fn hash_to_u64(input: &[u8]) -> u64 {
    let hash = blake3::hash(input);
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(bytes)
}

/// Derives a seed for a specific layer from the base seed.
pub fn derive_layer_seed(base_seed: u64, layer_index: u32) -> u64 {
    let mut input = Vec::with_capacity(12);
    input.extend_from_slice(&base_seed.to_le_bytes());
    input.extend_from_slice(&layer_index.to_le_bytes());
    hash_to_u64(&input)
}

/// Derives a seed for a named component (e.g. "pad", "percussion") from the base seed.
pub fn derive_component_seed(base_seed: u64, key: &str) -> u64 {
    let mut input = Vec::with_capacity(8 + key.len());
    input.extend_from_slice(&base_seed.to_le_bytes());
    input.extend_from_slice(key.as_bytes());
    hash_to_u64(&input)
}

/// Creates an RNG for a named component.
pub fn component_rng(base_seed: u64, key: &str) -> Pcg32 {
    create_rng(derive_component_seed(base_seed, key))
}
