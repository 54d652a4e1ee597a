//! Insert Program APIs: compiled parameters, proof generation and raw
//! execution.

use crate::{
    error::ProgramError,
    insert_circuit::{InsertCircuit, InsertWires},
    public_inputs::PublicInputs,
};
use anyhow::Result;
use imap_common::{
    default_config,
    merkle_map::IndexedMerkleMap,
    serialization::{deserialize, serialize},
    C, D, F,
};
use plonky2::{
    field::types::PrimeField64,
    hash::hash_types::HashOut,
    iop::witness::PartialWitness,
    plonk::{
        circuit_builder::CircuitBuilder,
        circuit_data::{CircuitData, VerifierCircuitData},
        proof::ProofWithPublicInputs,
    },
};
use serde::{Deserialize, Serialize};

/// Shape of the public output, chosen once when the program is defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputProjection {
    RootOnly,
    RootAndLength,
}

impl OutputProjection {
    pub(crate) fn tag(&self) -> &'static str {
        match self {
            Self::RootOnly => "root_only",
            Self::RootAndLength => "root_and_length",
        }
    }
}

/// The projected public output of one insert: the authenticated summary
/// of the post-state. `length` is present iff the program was defined
/// with [OutputProjection::RootAndLength].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapState {
    pub root: HashOut<F>,
    pub length: Option<u64>,
}

impl MapState {
    /// Parses the projected output from the public inputs of a proof.
    pub fn from_public_inputs(pi: &[F], projection: OutputProjection) -> Self {
        let pi = PublicInputs::from_slice(pi, projection);
        let root = HashOut {
            elements: pi
                .new_root_raw()
                .try_into()
                .expect("the slice is exactly one digest wide"),
        };

        Self {
            root,
            length: pi.new_length().map(|l| l.to_canonical_u64()),
        }
    }
}

/// Compiled artifact of the insert method: the circuit data, the witness
/// wires, and the output projection it was defined with. Built once,
/// reused for every proving invocation, and serializable so it can live
/// in an artifact cache.
#[derive(Serialize, Deserialize)]
pub struct Parameters<const HEIGHT: usize> {
    #[serde(serialize_with = "serialize", deserialize_with = "deserialize")]
    data: CircuitData<F, C, D>,
    wires: InsertWires<HEIGHT>,
    projection: OutputProjection,
}

impl<const HEIGHT: usize> Parameters<HEIGHT> {
    /// Compiles the insert method for the given output projection.
    pub fn build(projection: OutputProjection) -> Self {
        let mut b = CircuitBuilder::<F, D>::new(default_config());
        let wires = InsertCircuit::<HEIGHT>::build(&mut b, projection);
        let data = b.build::<C>();
        log::debug!(
            "insert method compiled: degree 2^{}",
            data.common.degree_bits()
        );

        Self {
            data,
            wires,
            projection,
        }
    }

    pub fn projection(&self) -> OutputProjection {
        self.projection
    }

    pub fn verifier_data(&self) -> VerifierCircuitData<F, C, D> {
        self.data.verifier_data()
    }

    /// Proves one insertion. The public input is `old_root`; the map and
    /// the `(key, value)` pair are the private witness. The witness map
    /// is never mutated; the caller adopts the returned [MapState]
    /// explicitly if it wants to chain.
    pub fn generate_proof(
        &self,
        old_root: HashOut<F>,
        map: &IndexedMerkleMap<HEIGHT>,
        key: F,
        value: F,
    ) -> Result<(MapState, ProofWithPublicInputs<F, C, D>), ProgramError> {
        check_prior_root(old_root, map)?;
        let update = map.insert_update(key, value)?;

        let mut pw = PartialWitness::new();
        InsertCircuit::<HEIGHT> { update }.assign(&mut pw, &self.wires);
        let proof = self
            .data
            .prove(pw)
            .map_err(ProgramError::ProvingFailure)?;
        self.data
            .verify(proof.clone())
            .map_err(ProgramError::ProvingFailure)?;

        let state = MapState::from_public_inputs(&proof.public_inputs, self.projection);
        Ok((state, proof))
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let buff = bincode::serialize(&self)?;
        Ok(buff)
    }

    pub fn deserialize(buff: &[u8]) -> Result<Self> {
        let params = bincode::deserialize(buff)?;
        Ok(params)
    }
}

/// Runs the insert method natively, with no proof: asserts the prior
/// root, inserts into a clone of the witness map, and returns the
/// projected output. Bit-identical to the compiled path on identical
/// inputs.
pub fn run_insert_raw<const HEIGHT: usize>(
    projection: OutputProjection,
    old_root: HashOut<F>,
    map: &IndexedMerkleMap<HEIGHT>,
    key: F,
    value: F,
) -> Result<MapState, ProgramError> {
    check_prior_root(old_root, map)?;

    let mut witness = map.clone();
    witness.insert(key, value)?;

    Ok(MapState {
        root: witness.root(),
        length: match projection {
            OutputProjection::RootOnly => None,
            OutputProjection::RootAndLength => Some(witness.length() as u64),
        },
    })
}

fn check_prior_root<const HEIGHT: usize>(
    old_root: HashOut<F>,
    map: &IndexedMerkleMap<HEIGHT>,
) -> Result<(), ProgramError> {
    if map.root() != old_root {
        return Err(ProgramError::RootMismatch);
    }
    Ok(())
}
