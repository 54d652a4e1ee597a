//! Circuit proving one insertion into the indexed Merkle map.
//!
//! The witness opens two paths of the tree: the predecessor leaf in the
//! pre-state, and the target slot of the new leaf in the intermediate
//! state obtained by rewriting the predecessor's successor link. The
//! sorted-neighbour bracket `pred.key < key < pred.next` (with
//! `pred.next == 0` meaning "no successor") doubles as the
//! non-membership argument for the inserted key. The sentinel leaf at
//! slot zero guarantees a predecessor exists for every insertion, so the
//! opening is always checked against the prior root.

use crate::api::OutputProjection;
use imap_common::{
    merkle_map::{InsertUpdate, KEY_BITS},
    poseidon::{empty_poseidon_hash, hash_maybe_swap, H},
    serialization::{deserialize, serialize},
    utils::less_than,
    D, F,
};
use plonky2::{
    field::types::Field,
    hash::{
        hash_types::{HashOut, HashOutTarget},
        merkle_proofs::MerkleProofTarget,
    },
    iop::{
        target::{BoolTarget, Target},
        witness::{PartialWitness, WitnessWrite},
    },
    plonk::circuit_builder::CircuitBuilder,
};
use serde::{Deserialize, Serialize};

/// Wires of the insert method, kept around to assign fresh witnesses
/// against the compiled circuit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InsertWires<const HEIGHT: usize> {
    #[serde(serialize_with = "serialize", deserialize_with = "deserialize")]
    old_root: HashOutTarget,
    pred_key: Target,
    pred_value: Target,
    pred_next: Target,
    #[serde(serialize_with = "serialize", deserialize_with = "deserialize")]
    pred_position: Vec<BoolTarget>,
    #[serde(serialize_with = "serialize", deserialize_with = "deserialize")]
    pred_siblings: MerkleProofTarget,
    new_key: Target,
    new_value: Target,
    #[serde(serialize_with = "serialize", deserialize_with = "deserialize")]
    new_position: Vec<BoolTarget>,
    #[serde(serialize_with = "serialize", deserialize_with = "deserialize")]
    new_siblings: MerkleProofTarget,
    old_length: Target,
}

/// Witness values of one insertion, as extracted by
/// [imap_common::merkle_map::IndexedMerkleMap::insert_update].
#[derive(Clone, Debug)]
pub struct InsertCircuit<const HEIGHT: usize> {
    pub update: InsertUpdate,
}

impl<const HEIGHT: usize> InsertCircuit<HEIGHT> {
    /// Builds the insert method and registers its public inputs:
    /// `old_root`, `new_root` and, for the `RootAndLength` projection,
    /// `new_length`.
    pub fn build(
        b: &mut CircuitBuilder<F, D>,
        projection: OutputProjection,
    ) -> InsertWires<HEIGHT> {
        let zero = b.zero();

        let old_root = b.add_virtual_hash();
        let pred_key = b.add_virtual_target();
        let pred_value = b.add_virtual_target();
        let pred_next = b.add_virtual_target();
        let pred_position: Vec<_> = (0..HEIGHT)
            .map(|_| b.add_virtual_bool_target_safe())
            .collect();
        let pred_siblings = MerkleProofTarget {
            siblings: b.add_virtual_hashes(HEIGHT),
        };
        let new_key = b.add_virtual_target();
        let new_value = b.add_virtual_target();
        let new_position: Vec<_> = (0..HEIGHT)
            .map(|_| b.add_virtual_bool_target_safe())
            .collect();
        let new_siblings = MerkleProofTarget {
            siblings: b.add_virtual_hashes(HEIGHT),
        };
        let old_length = b.add_virtual_target();

        // The comparison gadget is only sound on inputs within the key
        // domain.
        b.range_check(pred_key, KEY_BITS);
        b.range_check(pred_next, KEY_BITS);
        b.range_check(new_key, KEY_BITS);

        // The reserved sentinel key cannot be inserted.
        let key_is_zero = b.is_equal(new_key, zero);
        b.assert_zero(key_is_zero.target);

        // Sorted-neighbour bracket; strict comparisons also exclude
        // duplicates of either neighbour.
        let below = less_than(b, pred_key, new_key, KEY_BITS);
        b.assert_one(below.target);
        let above = less_than(b, new_key, pred_next, KEY_BITS);
        let next_is_zero = b.is_equal(pred_next, zero);
        let upper_ok = b.or(above, next_is_zero);
        b.assert_one(upper_ok.target);

        // The predecessor opening must match the claimed prior root.
        let pred_digest = b.hash_n_to_hash_no_pad::<H>(vec![pred_key, pred_value, pred_next]);
        let opened_root = merkle_root(b, pred_digest, &pred_position, &pred_siblings);
        b.connect_hashes(opened_root, old_root);

        // Rewrite the predecessor's successor link to the new key.
        let rewritten_digest = b.hash_n_to_hash_no_pad::<H>(vec![pred_key, pred_value, new_key]);
        let middle_root = merkle_root(b, rewritten_digest, &pred_position, &pred_siblings);

        // The target slot must be empty in the intermediate tree, and be
        // the next free one.
        let empty_digest = b.constant_hash(*empty_poseidon_hash());
        let opened_middle = merkle_root(b, empty_digest, &new_position, &new_siblings);
        b.connect_hashes(opened_middle, middle_root);
        let position_value = b.le_sum(new_position.iter());
        b.connect(position_value, old_length);

        // Write the new leaf; it inherits the predecessor's old
        // successor.
        let new_digest = b.hash_n_to_hash_no_pad::<H>(vec![new_key, new_value, pred_next]);
        let new_root = merkle_root(b, new_digest, &new_position, &new_siblings);

        b.register_public_inputs(&old_root.elements);
        b.register_public_inputs(&new_root.elements);
        if let OutputProjection::RootAndLength = projection {
            let one = b.one();
            let new_length = b.add(old_length, one);
            b.register_public_input(new_length);
        }

        InsertWires {
            old_root,
            pred_key,
            pred_value,
            pred_next,
            pred_position,
            pred_siblings,
            new_key,
            new_value,
            new_position,
            new_siblings,
            old_length,
        }
    }

    /// Assigns the witness of one insertion.
    pub fn assign(&self, pw: &mut PartialWitness<F>, wires: &InsertWires<HEIGHT>) {
        let update = &self.update;
        let opening = &update.predecessor;

        pw.set_hash_target(wires.old_root, update.old_root);
        pw.set_target(wires.pred_key, opening.leaf.key);
        pw.set_target(wires.pred_value, opening.leaf.value);
        pw.set_target(wires.pred_next, opening.leaf.next);
        assign_position(pw, &wires.pred_position, opening.leaf.position);
        assign_siblings(pw, &wires.pred_siblings, &opening.siblings);

        pw.set_target(wires.new_key, update.new_leaf.key);
        pw.set_target(wires.new_value, update.new_leaf.value);
        assign_position(pw, &wires.new_position, update.new_leaf.position);
        assign_siblings(pw, &wires.new_siblings, &update.new_siblings);
        pw.set_target(wires.old_length, F::from_canonical_usize(update.old_length));
    }
}

/// Climbs from a leaf digest to the root; a set position bit means the
/// current node is the right child.
fn merkle_root(
    b: &mut CircuitBuilder<F, D>,
    leaf_digest: HashOutTarget,
    position: &[BoolTarget],
    path: &MerkleProofTarget,
) -> HashOutTarget {
    let mut node = leaf_digest;
    for (bit, sibling) in position.iter().zip(&path.siblings) {
        node = hash_maybe_swap(b, &[node.elements, sibling.elements], *bit);
    }
    node
}

fn assign_position(pw: &mut PartialWitness<F>, bits: &[BoolTarget], position: usize) {
    for (i, bit) in bits.iter().enumerate() {
        pw.set_bool_target(*bit, (position >> i) & 1 == 1);
    }
}

fn assign_siblings(pw: &mut PartialWitness<F>, path: &MerkleProofTarget, siblings: &[HashOut<F>]) {
    for (target, sibling) in path.siblings.iter().zip(siblings) {
        pw.set_hash_target(*target, *sibling);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::public_inputs::PublicInputs;
    use imap_common::{
        default_config,
        merkle_map::{merkle_root_from_opening, IndexedMerkleMap, Leaf, LeafOpening},
        C,
    };
    use plonky2::field::types::PrimeField64;
    use plonky2::plonk::circuit_data::CircuitData;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    const HEIGHT: usize = 3;

    fn f(x: u64) -> F {
        F::from_canonical_u64(x)
    }

    fn build_insert(
        projection: OutputProjection,
    ) -> (CircuitData<F, C, D>, InsertWires<HEIGHT>) {
        let mut b = CircuitBuilder::<F, D>::new(default_config());
        let wires = InsertCircuit::<HEIGHT>::build(&mut b, projection);
        (b.build::<C>(), wires)
    }

    fn prove_insert(
        projection: OutputProjection,
        map: &IndexedMerkleMap<HEIGHT>,
        key: F,
        value: F,
    ) -> Vec<F> {
        let update = map.insert_update(key, value).unwrap();
        let expected_old = update.old_root;
        let expected_new = update.new_root;
        let expected_length = update.new_length();

        let (data, wires) = build_insert(projection);

        let mut pw = PartialWitness::new();
        InsertCircuit::<HEIGHT> { update }.assign(&mut pw, &wires);
        let proof = data.prove(pw).unwrap();
        data.verify(proof.clone()).unwrap();

        let pi = PublicInputs::from_slice(&proof.public_inputs, projection);
        assert_eq!(pi.old_root_raw(), expected_old.elements.as_slice());
        assert_eq!(pi.new_root_raw(), expected_new.elements.as_slice());
        if let Some(length) = pi.new_length() {
            assert_eq!(length.to_canonical_u64(), expected_length as u64);
        }

        proof.public_inputs
    }

    #[test]
    fn insert_with_predecessor_proves() {
        let mut map = IndexedMerkleMap::<HEIGHT>::new();
        map.insert(f(1), f(10)).unwrap();
        map.insert(f(5), f(50)).unwrap();

        let pi = prove_insert(OutputProjection::RootOnly, &map, f(3), f(30));
        assert_eq!(pi.len(), PublicInputs::<F>::total_len(OutputProjection::RootOnly));
    }

    #[test]
    fn front_insert_proves_against_the_sentinel_leaf() {
        let mut map = IndexedMerkleMap::<HEIGHT>::new();
        map.insert(f(7), f(70)).unwrap();

        prove_insert(OutputProjection::RootOnly, &map, f(2), f(20));
    }

    #[test]
    fn first_insert_reports_length_two() {
        let map = IndexedMerkleMap::<HEIGHT>::new();

        let pi = prove_insert(OutputProjection::RootAndLength, &map, f(1), f(2));
        assert_eq!(
            pi.len(),
            PublicInputs::<F>::total_len(OutputProjection::RootAndLength)
        );
        assert_eq!(pi.last().unwrap().to_canonical_u64(), 2);
    }

    #[test]
    fn duplicate_insert_with_a_tampered_predecessor_does_not_prove() {
        let mut map = IndexedMerkleMap::<HEIGHT>::new();
        map.insert(f(5), f(50)).unwrap();

        // Re-inserting key 5 needs a predecessor bracket that excludes
        // it. The only leaf below 5 is the sentinel, whose successor
        // link already points at 5, so the bracket can only be opened by
        // lying that the link is still unset. That lie changes the
        // sentinel digest and the opening no longer matches the root.
        let mut forged_pred = map.snapshot().sorted_leaves[0];
        assert_eq!(forged_pred.next, f(5));
        forged_pred.next = F::ZERO;

        let new_leaf = Leaf {
            key: f(5),
            value: f(99),
            next: F::ZERO,
            position: map.length(),
        };
        let new_siblings = map.siblings(new_leaf.position);
        let update = InsertUpdate {
            old_root: map.root(),
            old_length: map.length(),
            predecessor: LeafOpening {
                leaf: forged_pred,
                siblings: map.siblings(0),
            },
            new_root: merkle_root_from_opening(
                new_leaf.digest(),
                new_leaf.position,
                &new_siblings,
            ),
            new_leaf,
            new_siblings,
        };

        let (data, wires) = build_insert(OutputProjection::RootOnly);
        let mut pw = PartialWitness::new();
        InsertCircuit::<HEIGHT> { update }.assign(&mut pw, &wires);
        let rejected = match catch_unwind(AssertUnwindSafe(|| data.prove(pw))) {
            Ok(Ok(proof)) => data.verify(proof).is_err(),
            _ => true,
        };
        assert!(rejected);
    }

    #[test]
    fn fresh_key_with_a_wrong_successor_does_not_prove() {
        let mut map = IndexedMerkleMap::<HEIGHT>::new();
        map.insert(f(3), f(30)).unwrap();

        // Inserting 1 must set its successor to 3; claiming the chain
        // ends at 1 requires opening the sentinel with `next == 0`,
        // which is no longer its committed content.
        let mut forged_pred = map.snapshot().sorted_leaves[0];
        forged_pred.next = F::ZERO;

        let new_leaf = Leaf {
            key: f(1),
            value: f(10),
            next: F::ZERO,
            position: map.length(),
        };
        let new_siblings = map.siblings(new_leaf.position);
        let update = InsertUpdate {
            old_root: map.root(),
            old_length: map.length(),
            predecessor: LeafOpening {
                leaf: forged_pred,
                siblings: map.siblings(0),
            },
            new_root: merkle_root_from_opening(
                new_leaf.digest(),
                new_leaf.position,
                &new_siblings,
            ),
            new_leaf,
            new_siblings,
        };

        let (data, wires) = build_insert(OutputProjection::RootOnly);
        let mut pw = PartialWitness::new();
        InsertCircuit::<HEIGHT> { update }.assign(&mut pw, &wires);
        let rejected = match catch_unwind(AssertUnwindSafe(|| data.prove(pw))) {
            Ok(Ok(proof)) => data.verify(proof).is_err(),
            _ => true,
        };
        assert!(rejected);
    }
}
