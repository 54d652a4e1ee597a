//! An indexed Merkle map: a fixed-height binary Poseidon tree over
//! key-sorted leaves, where each leaf also records the key of its sorted
//! successor.
//!
//! The successor links make the map an authenticated dictionary that
//! supports succinct non-membership evidence: a key is provably absent
//! when some leaf `p` satisfies `p.key < key < p.next` (with `next == 0`
//! meaning "no successor"). The tree itself is addressed by insertion
//! order, so the sorted view and the Merkle positions are independent.
//!
//! Slot zero always holds the sentinel leaf `(0, 0, first_key)`, so
//! every insertion has a real predecessor whose membership can be
//! checked against the root. A fresh map therefore has length one.

use crate::{
    poseidon::{empty_subtree_hashes, hash_pair, H},
    F,
};
use hashbrown::HashMap;
use plonky2::{
    field::types::{Field, PrimeField64},
    hash::hash_types::HashOut,
    plonk::config::Hasher,
};
use thiserror::Error;

/// Number of bits of the key domain. Keys are ordered by their canonical
/// integer value; capping them below the Goldilocks order keeps the
/// in-circuit comparisons sound.
pub const KEY_BITS: usize = 63;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MapError {
    /// Zero is the reserved sentinel and keys must fit in [KEY_BITS] bits.
    #[error("key {0} is reserved or out of range")]
    InvalidKey(F),
    #[error("key {0} is already present")]
    DuplicateKey(F),
    #[error("map is full ({0} leaves)")]
    CapacityExceeded(usize),
}

/// A single occupied slot of the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Leaf {
    pub key: F,
    pub value: F,
    /// Key of the sorted successor; zero when this is the largest key.
    pub next: F,
    /// Tree slot, assigned in insertion order and never changed.
    pub position: usize,
}

impl Leaf {
    pub fn digest(&self) -> HashOut<F> {
        H::hash_no_pad(&[self.key, self.value, self.next])
    }
}

/// A leaf together with its Merkle opening.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafOpening {
    pub leaf: Leaf,
    /// Sibling digests from the leaf level up to the root level.
    pub siblings: Vec<HashOut<F>>,
}

/// Everything an insertion touches, extracted without mutating the map:
/// the predecessor opening in the pre-state, the new leaf and its opening
/// in the intermediate state (after the predecessor rewrite), and the
/// resulting root. This is the witness of the provable insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertUpdate {
    pub old_root: HashOut<F>,
    pub old_length: usize,
    /// Opening of the predecessor in the pre-state; front insertions
    /// are bracketed by the sentinel leaf at slot zero.
    pub predecessor: LeafOpening,
    pub new_leaf: Leaf,
    pub new_siblings: Vec<HashOut<F>>,
    pub new_root: HashOut<F>,
}

impl InsertUpdate {
    pub fn new_length(&self) -> usize {
        self.old_length + 1
    }
}

/// Read-only view over the internals of the map.
#[derive(Clone, Copy, Debug)]
pub struct MapSnapshot<'a> {
    pub root: HashOut<F>,
    pub length: usize,
    pub nodes: &'a [HashMap<usize, HashOut<F>>],
    pub sorted_leaves: &'a [Leaf],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedMerkleMap<const HEIGHT: usize> {
    root: HashOut<F>,
    /// Sparse digest cache; `nodes[level]` holds the non-empty nodes of
    /// that level, leaves at level zero. Missing entries are all-empty
    /// subtrees.
    nodes: Vec<HashMap<usize, HashOut<F>>>,
    /// Digests of all-empty subtrees, one per level up to the root.
    empties: Vec<HashOut<F>>,
    /// The leaves in ascending key order.
    sorted_leaves: Vec<Leaf>,
}

impl<const HEIGHT: usize> Default for IndexedMerkleMap<HEIGHT> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const HEIGHT: usize> IndexedMerkleMap<HEIGHT> {
    /// Creates a fresh map holding only the sentinel leaf `(0, 0, 0)`
    /// at slot zero.
    pub fn new() -> Self {
        let empties = empty_subtree_hashes(HEIGHT);
        let mut map = Self {
            root: empties[HEIGHT],
            nodes: vec![HashMap::new(); HEIGHT],
            empties,
            sorted_leaves: Vec::new(),
        };
        let sentinel = Leaf {
            key: F::ZERO,
            value: F::ZERO,
            next: F::ZERO,
            position: 0,
        };
        map.update_leaf(0, sentinel.digest());
        map.sorted_leaves.push(sentinel);
        map
    }

    pub fn root(&self) -> HashOut<F> {
        self.root
    }

    /// Number of occupied slots, the sentinel included; a fresh map has
    /// length one.
    pub fn length(&self) -> usize {
        self.sorted_leaves.len()
    }

    /// Total slot count; one slot is taken by the sentinel.
    pub const fn capacity() -> usize {
        1 << HEIGHT
    }

    /// Returns the value stored under `key`, if any. The reserved zero
    /// key is never reported as present.
    pub fn get(&self, key: F) -> Option<F> {
        if key.is_zero() {
            return None;
        }
        self.find(key).ok().map(|i| self.sorted_leaves[i].value)
    }

    pub fn contains(&self, key: F) -> bool {
        !key.is_zero() && self.find(key).is_ok()
    }

    pub fn snapshot(&self) -> MapSnapshot<'_> {
        MapSnapshot {
            root: self.root,
            length: self.sorted_leaves.len(),
            nodes: &self.nodes,
            sorted_leaves: &self.sorted_leaves,
        }
    }

    /// Inserts a fresh key. All preconditions are checked before any node
    /// is touched, so an error leaves the map unmodified.
    pub fn insert(&mut self, key: F, value: F) -> Result<(), MapError> {
        let idx = self.validate(key)?;

        let next = match self.sorted_leaves.get(idx) {
            Some(successor) => successor.key,
            None => F::ZERO,
        };
        let position = self.sorted_leaves.len();

        // Rewrite the predecessor's successor link; `validate` returns
        // an index past the sentinel, so a predecessor always exists.
        let pred = &mut self.sorted_leaves[idx - 1];
        pred.next = key;
        let (pred_position, pred_digest) = (pred.position, pred.digest());
        self.update_leaf(pred_position, pred_digest);

        let leaf = Leaf {
            key,
            value,
            next,
            position,
        };
        self.update_leaf(position, leaf.digest());
        self.sorted_leaves.insert(idx, leaf);

        Ok(())
    }

    /// Computes the witness of inserting `(key, value)` without mutating
    /// `self`. Fails with the same errors, and under the same
    /// preconditions, as [Self::insert].
    pub fn insert_update(&self, key: F, value: F) -> Result<InsertUpdate, MapError> {
        let idx = self.validate(key)?;

        let old_root = self.root;
        let old_length = self.sorted_leaves.len();
        let pred_leaf = self.sorted_leaves[idx - 1];
        let predecessor = LeafOpening {
            leaf: pred_leaf,
            siblings: self.siblings(pred_leaf.position),
        };
        let next = match self.sorted_leaves.get(idx) {
            Some(successor) => successor.key,
            None => F::ZERO,
        };

        // Replay the two leaf updates on a scratch tree to collect the
        // opening of the new slot in the intermediate state.
        let mut tree = self.clone();
        let mut rewritten = pred_leaf;
        rewritten.next = key;
        tree.update_leaf(rewritten.position, rewritten.digest());
        let new_leaf = Leaf {
            key,
            value,
            next,
            position: old_length,
        };
        let new_siblings = tree.siblings(new_leaf.position);
        tree.update_leaf(new_leaf.position, new_leaf.digest());

        Ok(InsertUpdate {
            old_root,
            old_length,
            predecessor,
            new_leaf,
            new_siblings,
            new_root: tree.root,
        })
    }

    /// Sibling digests along the path of the given slot, leaf level
    /// first.
    pub fn siblings(&self, position: usize) -> Vec<HashOut<F>> {
        (0..HEIGHT)
            .map(|level| self.node(level, (position >> level) ^ 1))
            .collect()
    }

    fn validate(&self, key: F) -> Result<usize, MapError> {
        let k = key.to_canonical_u64();
        if k == 0 || k >= 1u64 << KEY_BITS {
            return Err(MapError::InvalidKey(key));
        }
        if self.sorted_leaves.len() == Self::capacity() {
            return Err(MapError::CapacityExceeded(Self::capacity()));
        }
        match self.find(key) {
            Ok(_) => Err(MapError::DuplicateKey(key)),
            Err(idx) => Ok(idx),
        }
    }

    fn find(&self, key: F) -> Result<usize, usize> {
        let k = key.to_canonical_u64();
        self.sorted_leaves
            .binary_search_by_key(&k, |leaf| leaf.key.to_canonical_u64())
    }

    fn node(&self, level: usize, index: usize) -> HashOut<F> {
        self.nodes[level]
            .get(&index)
            .copied()
            .unwrap_or(self.empties[level])
    }

    fn update_leaf(&mut self, position: usize, digest: HashOut<F>) {
        let mut index = position;
        let mut node = digest;
        self.nodes[0].insert(index, node);
        for level in 0..HEIGHT {
            let sibling = self.node(level, index ^ 1);
            node = if index & 1 == 0 {
                hash_pair(node, sibling)
            } else {
                hash_pair(sibling, node)
            };
            index >>= 1;
            if level + 1 < HEIGHT {
                self.nodes[level + 1].insert(index, node);
            }
        }
        self.root = node;
    }
}

/// Recomputes a root from a leaf digest and its opening.
pub fn merkle_root_from_opening(
    digest: HashOut<F>,
    position: usize,
    siblings: &[HashOut<F>],
) -> HashOut<F> {
    let mut node = digest;
    for (level, sibling) in siblings.iter().enumerate() {
        node = if (position >> level) & 1 == 0 {
            hash_pair(node, *sibling)
        } else {
            hash_pair(*sibling, node)
        };
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poseidon::empty_poseidon_hash;
    use itertools::Itertools;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const HEIGHT: usize = 3;
    type TestMap = IndexedMerkleMap<HEIGHT>;

    fn f(x: u64) -> F {
        F::from_canonical_u64(x)
    }

    /// Rebuilds the root from scratch out of the leaf records only.
    fn naive_root(map: &TestMap) -> HashOut<F> {
        let mut level: Vec<_> = vec![*empty_poseidon_hash(); TestMap::capacity()];
        for leaf in map.snapshot().sorted_leaves {
            level[leaf.position] = leaf.digest();
        }
        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| hash_pair(pair[0], pair[1]))
                .collect();
        }
        level[0]
    }

    #[test]
    fn fresh_map_holds_only_the_sentinel() {
        let map = TestMap::new();
        assert_eq!(map.length(), 1);
        assert_eq!(map.root(), naive_root(&map));

        let sentinel = map.snapshot().sorted_leaves[0];
        assert_eq!(sentinel.key, F::ZERO);
        assert_eq!(sentinel.next, F::ZERO);
        assert_eq!(sentinel.position, 0);
        assert!(!map.contains(F::ZERO));
        assert_eq!(map.get(F::ZERO), None);
    }

    #[test]
    fn inserts_keep_root_length_and_links_consistent() {
        let mut map = TestMap::new();
        for (key, value) in [(5, 50), (1, 10), (3, 30), (7, 70)] {
            map.insert(f(key), f(value)).unwrap();
            assert_eq!(map.root(), naive_root(&map));
        }
        assert_eq!(map.length(), 5);

        let snapshot = map.snapshot();
        for (a, b) in snapshot.sorted_leaves.iter().tuple_windows() {
            assert!(a.key.to_canonical_u64() < b.key.to_canonical_u64());
            assert_eq!(a.next, b.key);
        }
        assert_eq!(snapshot.sorted_leaves.last().unwrap().next, F::ZERO);

        assert_eq!(map.get(f(3)), Some(f(30)));
        assert_eq!(map.get(f(4)), None);
        assert!(map.contains(f(7)));
    }

    #[test]
    fn same_inserts_give_the_same_root() {
        let mut a = TestMap::new();
        let mut b = TestMap::new();
        for (key, value) in [(2, 9), (6, 1), (4, 4)] {
            a.insert(f(key), f(value)).unwrap();
            b.insert(f(key), f(value)).unwrap();
        }
        assert_eq!(a, b);
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn rejections_leave_the_map_untouched() {
        let mut map = TestMap::new();
        map.insert(f(1), f(2)).unwrap();
        let before = map.clone();

        assert_eq!(map.insert(F::ZERO, f(1)), Err(MapError::InvalidKey(F::ZERO)));
        let big = f(1 << KEY_BITS);
        assert_eq!(map.insert(big, f(1)), Err(MapError::InvalidKey(big)));
        assert_eq!(map.insert(f(1), f(9)), Err(MapError::DuplicateKey(f(1))));
        assert_eq!(map, before);
    }

    #[test]
    fn capacity_is_two_to_the_height_with_one_sentinel_slot() {
        let mut map = TestMap::new();
        for key in 1..TestMap::capacity() as u64 {
            map.insert(f(key), f(key)).unwrap();
        }
        assert_eq!(map.length(), TestMap::capacity());

        let before = map.clone();
        assert_eq!(
            map.insert(f(100), f(1)),
            Err(MapError::CapacityExceeded(TestMap::capacity()))
        );
        assert_eq!(map, before);
    }

    #[test]
    fn insert_update_matches_insert_and_opens_correctly() {
        let mut rng = StdRng::seed_from_u64(0xcafe);
        let mut map = TestMap::new();
        for _ in 0..5 {
            let key = f(rng.gen_range(1..1 << 16));
            let value = f(rng.gen::<u32>() as u64);
            if map.contains(key) {
                continue;
            }

            let update = map.insert_update(key, value).unwrap();
            assert_eq!(update.old_root, map.root());
            assert_eq!(update.old_length, map.length());

            // The predecessor opening must verify against the pre-state.
            let opening = &update.predecessor;
            assert_eq!(
                merkle_root_from_opening(
                    opening.leaf.digest(),
                    opening.leaf.position,
                    &opening.siblings,
                ),
                update.old_root
            );
            assert_eq!(opening.leaf.next, update.new_leaf.next);
            // The new leaf opening must verify against the post-state.
            assert_eq!(
                merkle_root_from_opening(
                    update.new_leaf.digest(),
                    update.new_leaf.position,
                    &update.new_siblings,
                ),
                update.new_root
            );

            map.insert(key, value).unwrap();
            assert_eq!(map.root(), update.new_root);
            assert_eq!(map.length(), update.new_length());
        }
    }

    #[test]
    fn front_insertion_is_bracketed_by_the_sentinel() {
        let mut map = TestMap::new();
        map.insert(f(10), f(1)).unwrap();

        let update = map.insert_update(f(2), f(5)).unwrap();
        assert_eq!(update.predecessor.leaf.key, F::ZERO);
        assert_eq!(update.predecessor.leaf.position, 0);
        assert_eq!(update.predecessor.leaf.next, f(10));
        assert_eq!(update.new_leaf.next, f(10));

        map.insert(f(2), f(5)).unwrap();
        assert_eq!(map.root(), update.new_root);
        assert_eq!(map.snapshot().sorted_leaves[0].next, f(2));
        assert_eq!(map.snapshot().sorted_leaves[1].key, f(2));
    }
}
