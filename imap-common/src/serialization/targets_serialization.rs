use plonky2::{
    hash::{hash_types::HashOutTarget, merkle_proofs::MerkleProofTarget},
    iop::target::BoolTarget,
    util::serialization::{Buffer, Read, Write},
};

use super::{FromBytes, SerializationError, ToBytes};

impl ToBytes for Vec<BoolTarget> {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer
            .write_target_bool_vec(self.as_slice())
            .expect("Writing to a byte-vector cannot fail.");
        buffer
    }
}

impl FromBytes for Vec<BoolTarget> {
    fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        let mut buffer = Buffer::new(bytes);
        Ok(buffer.read_target_bool_vec()?)
    }
}

impl ToBytes for HashOutTarget {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer
            .write_target_hash(self)
            .expect("Writing to a byte-vector cannot fail.");
        buffer
    }
}

impl FromBytes for HashOutTarget {
    fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        let mut buffer = Buffer::new(bytes);
        Ok(buffer.read_target_hash()?)
    }
}

impl ToBytes for MerkleProofTarget {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer
            .write_target_merkle_proof(self)
            .expect("Writing to a byte-vector cannot fail.");
        buffer
    }
}

impl FromBytes for MerkleProofTarget {
    fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        let mut buffer = Buffer::new(bytes);
        Ok(buffer.read_target_merkle_proof()?)
    }
}
