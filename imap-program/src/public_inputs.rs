//! Public-input layout of the insert method.
//!
//! The raw slice is `[old_root (4) || new_root (4)]`, extended with
//! `[new_length (1)]` when the program was defined with the
//! `RootAndLength` projection.

use crate::api::OutputProjection;
use plonky2::hash::hash_types::NUM_HASH_OUT_ELTS;

/// Typed view over the raw public inputs of an insert proof.
#[derive(Clone, Debug)]
pub struct PublicInputs<'a, T> {
    old_root: &'a [T],
    new_root: &'a [T],
    new_length: Option<&'a T>,
}

impl<'a, T> PublicInputs<'a, T> {
    pub const fn total_len(projection: OutputProjection) -> usize {
        match projection {
            OutputProjection::RootOnly => 2 * NUM_HASH_OUT_ELTS,
            OutputProjection::RootAndLength => 2 * NUM_HASH_OUT_ELTS + 1,
        }
    }

    pub fn from_slice(pi: &'a [T], projection: OutputProjection) -> Self {
        assert_eq!(
            pi.len(),
            Self::total_len(projection),
            "unexpected public input length"
        );

        Self {
            old_root: &pi[..NUM_HASH_OUT_ELTS],
            new_root: &pi[NUM_HASH_OUT_ELTS..2 * NUM_HASH_OUT_ELTS],
            new_length: match projection {
                OutputProjection::RootOnly => None,
                OutputProjection::RootAndLength => Some(&pi[2 * NUM_HASH_OUT_ELTS]),
            },
        }
    }

    pub fn old_root_raw(&self) -> &'a [T] {
        self.old_root
    }

    pub fn new_root_raw(&self) -> &'a [T] {
        self.new_root
    }

    pub fn new_length(&self) -> Option<&'a T> {
        self.new_length
    }
}
