use bayesdag_core::derive_substream_seed;

const SWAP_STREAM_SALT: u64 = 0xA5A5_A5A5_A5A5_A5A5;

/// Derives the seed of a chain's random source.
pub fn chain_seed(master_seed: u64, chain_index: usize) -> u64 {
    derive_substream_seed(master_seed, chain_index as u64)
}

/// Derives the seed of the ensemble's swap stream.
pub fn swap_seed(master_seed: u64) -> u64 {
    derive_substream_seed(master_seed ^ SWAP_STREAM_SALT, 0)
}
