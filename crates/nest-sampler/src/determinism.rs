use nest_core::derive_substream_seed;

/// Seed used by the start engine for walker `walker_id`.
pub fn walker_seed(master_seed: u64, walker_id: usize) -> u64 {
    derive_substream_seed(master_seed, walker_id as u64)
}

/// Seed for the engine copies exploring `slot` during `iteration`.
pub fn engine_seed(master_seed: u64, iteration: usize, slot: usize) -> u64 {
    let intermediate =
        derive_substream_seed(master_seed ^ 0x3C3C_3C3C_3C3C_3C3C, (iteration as u64) << 32 | slot as u64);
    derive_substream_seed(intermediate, 0)
}

/// Seed for the sampler's own choices (survivor cloning) in `iteration`.
pub fn explorer_seed(master_seed: u64, iteration: usize) -> u64 {
    derive_substream_seed(master_seed ^ 0xA5A5_A5A5_A5A5_A5A5, iteration as u64)
}
