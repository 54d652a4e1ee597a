//! Common types, gadgets and serialization helpers shared by the indexed
//! Merkle map crates.

use plonky2::plonk::{
    circuit_data::CircuitConfig,
    config::{GenericConfig, PoseidonGoldilocksConfig},
};

pub mod merkle_map;
pub mod poseidon;
pub mod serialization;
pub mod utils;

pub const D: usize = 2;
pub type C = PoseidonGoldilocksConfig;
pub type F = <C as GenericConfig<D>>::F;

/// Returns the default circuit configuration used by every circuit in
/// this workspace.
pub fn default_config() -> CircuitConfig {
    CircuitConfig::standard_recursion_config()
}
