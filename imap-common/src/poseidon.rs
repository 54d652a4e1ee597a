//! Poseidon hashing helpers, native and in-circuit.

use crate::F;
use plonky2::{
    field::{extension::Extendable, goldilocks_field::GoldilocksField},
    hash::{
        hash_types::{HashOut, HashOutTarget, RichField, NUM_HASH_OUT_ELTS},
        hashing::PlonkyPermutation,
        poseidon::PoseidonHash,
    },
    iop::target::{BoolTarget, Target},
    plonk::{
        circuit_builder::CircuitBuilder,
        config::{AlgebraicHasher, Hasher},
    },
};
use std::sync::OnceLock;

pub type H = PoseidonHash;
type P = <PoseidonHash as AlgebraicHasher<GoldilocksField>>::AlgebraicPermutation;

/// The static variable of Empty Poseidon hash
static EMPTY_POSEIDON_HASH: OnceLock<HashOut<GoldilocksField>> = OnceLock::new();

/// Get the static empty Poseidon hash.
pub fn empty_poseidon_hash() -> &'static HashOut<GoldilocksField> {
    EMPTY_POSEIDON_HASH.get_or_init(|| H::hash_no_pad(&[]))
}

/// Hash two sibling digests into their parent digest.
pub fn hash_pair(left: HashOut<F>, right: HashOut<F>) -> HashOut<F> {
    let mut preimage = Vec::with_capacity(2 * NUM_HASH_OUT_ELTS);
    preimage.extend_from_slice(&left.elements);
    preimage.extend_from_slice(&right.elements);
    H::hash_no_pad(&preimage)
}

/// Digests of the all-empty subtrees, from a single empty leaf (index 0)
/// up to the root of an all-empty tree of the given height (index
/// `height`).
pub fn empty_subtree_hashes(height: usize) -> Vec<HashOut<F>> {
    let mut hashes = Vec::with_capacity(height + 1);
    hashes.push(*empty_poseidon_hash());
    for level in 0..height {
        let h = hashes[level];
        hashes.push(hash_pair(h, h));
    }
    hashes
}

/// Hash the concatenation of the two provided 4-wide inputs, swapping them if specified.
pub fn hash_maybe_swap<F, const D: usize>(
    b: &mut CircuitBuilder<F, D>,
    inputs: &[[Target; NUM_HASH_OUT_ELTS]; 2],
    do_swap: BoolTarget,
) -> HashOutTarget
where
    F: RichField + Extendable<D>,
{
    let zero = b.zero();

    let inputs = inputs
        .iter()
        .flat_map(|i| i.iter())
        .copied()
        .collect::<Vec<_>>();
    let mut state = P::new(core::iter::repeat(zero));
    for input_chunk in inputs.chunks(P::RATE) {
        state.set_from_slice(input_chunk, 0);
        state = H::permute_swapped(state, do_swap, b);
    }

    HashOutTarget {
        elements: {
            let mut outputs = Vec::with_capacity(NUM_HASH_OUT_ELTS);
            'outer: loop {
                for &s in state.squeeze() {
                    outputs.push(s);
                    if outputs.len() == NUM_HASH_OUT_ELTS {
                        break 'outer;
                    }
                }
                state = H::permute_swapped(state, do_swap, b);
            }
            outputs.try_into().unwrap()
        },
    }
}
