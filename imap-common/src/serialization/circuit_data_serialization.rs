use std::marker::PhantomData;

use plonky2::{
    field::extension::Extendable,
    hash::hash_types::RichField,
    plonk::{
        circuit_data::CircuitData,
        config::{AlgebraicHasher, GenericConfig},
    },
    util::serialization::{DefaultGateSerializer, DefaultGeneratorSerializer},
};

use super::{FromBytes, SerializationError, ToBytes};

// Only standard Plonky2 gates are employed by the circuits of this
// workspace, so the default serializers cover every gate and generator.
impl<F, C, const D: usize> ToBytes for CircuitData<F, C, D>
where
    F: RichField + Extendable<D>,
    C: GenericConfig<D, F = F> + 'static,
    C::Hasher: AlgebraicHasher<F>,
{
    fn to_bytes(&self) -> Vec<u8> {
        let generator_serializer = DefaultGeneratorSerializer::<C, D> {
            _phantom: PhantomData,
        };
        self.to_bytes(&DefaultGateSerializer, &generator_serializer)
            .expect("Writing to a byte-vector cannot fail.")
    }
}

impl<F, C, const D: usize> FromBytes for CircuitData<F, C, D>
where
    F: RichField + Extendable<D>,
    C: GenericConfig<D, F = F> + 'static,
    C::Hasher: AlgebraicHasher<F>,
{
    fn from_bytes(bytes: &[u8]) -> Result<Self, SerializationError> {
        let generator_serializer = DefaultGeneratorSerializer::<C, D> {
            _phantom: PhantomData,
        };
        Ok(CircuitData::<F, C, D>::from_bytes(
            bytes,
            &DefaultGateSerializer,
            &generator_serializer,
        )?)
    }
}
