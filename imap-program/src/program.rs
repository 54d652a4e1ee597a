//! The insert program pipeline: compile once (through the artifact
//! cache), then prove any number of chained insertions.

use crate::{
    api::{run_insert_raw, MapState, OutputProjection, Parameters},
    cache::ArtifactCache,
    error::ProgramError,
};
use anyhow::ensure;
use imap_common::{merkle_map::IndexedMerkleMap, C, D, F};
use plonky2::{hash::hash_types::HashOut, plonk::proof::ProofWithPublicInputs};
use std::time::Instant;

/// Lifecycle of a program instance. `Compiling` and `Proving` are the
/// in-flight states of the corresponding calls; `Failed` is entered on
/// compilation or proving failures and left only by an explicit
/// [MapProgram::compile].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgramState {
    Idle,
    Compiling,
    Compiled,
    Proving,
    Proved,
    Failed,
}

/// A defined insert program: an output projection, an artifact cache,
/// and (once compiled) the circuit parameters.
///
/// The program never mutates the caller's map. To chain insertions, the
/// caller adopts each returned [MapState] into its authoritative map
/// before issuing the next public input.
pub struct MapProgram<const HEIGHT: usize, A: ArtifactCache> {
    projection: OutputProjection,
    cache: A,
    params: Option<Parameters<HEIGHT>>,
    state: ProgramState,
}

impl<const HEIGHT: usize, A: ArtifactCache> MapProgram<HEIGHT, A> {
    pub fn new(projection: OutputProjection, cache: A) -> Self {
        Self {
            projection,
            cache,
            params: None,
            state: ProgramState::Idle,
        }
    }

    pub fn state(&self) -> ProgramState {
        self.state
    }

    pub fn projection(&self) -> OutputProjection {
        self.projection
    }

    /// Cache key of this program definition.
    pub fn program_id(&self) -> String {
        format!("map-insert-h{}-{}", HEIGHT, self.projection.tag())
    }

    /// Access to the compiled parameters, e.g. to hand the verifier data
    /// out.
    pub fn params(&self) -> Option<&Parameters<HEIGHT>> {
        self.params.as_ref()
    }

    /// Compiles the program, at most once: a second call on a compiled
    /// program is a no-op, and a cached artifact is reused instead of
    /// rebuilding. On failure the program is left in
    /// [ProgramState::Failed] with no parameters retained.
    pub fn compile(&mut self) -> Result<(), ProgramError> {
        if self.params.is_some() {
            return Ok(());
        }

        self.state = ProgramState::Compiling;
        match self.load_or_build() {
            Ok(params) => {
                self.params = Some(params);
                self.state = ProgramState::Compiled;
                Ok(())
            }
            Err(err) => {
                self.params = None;
                self.state = ProgramState::Failed;
                Err(ProgramError::CompilationFailure(err))
            }
        }
    }

    fn load_or_build(&self) -> anyhow::Result<Parameters<HEIGHT>> {
        let id = self.program_id();
        if let Some(bytes) = self.cache.get(&id)? {
            log::info!("loading compiled parameters for {id} from the cache");
            let params = Parameters::<HEIGHT>::deserialize(&bytes)?;
            ensure!(
                params.projection() == self.projection,
                "cached artifact {id} was compiled for another projection"
            );
            return Ok(params);
        }

        log::info!("compiling {id}");
        let now = Instant::now();
        let params = Parameters::build(self.projection);
        log::info!("compiled {id} in {:?}", now.elapsed());
        self.cache.put(&id, &params.serialize()?)?;

        Ok(params)
    }

    /// Runs the insert method without a proof; available in any state
    /// and never touches the circuit.
    pub fn insert_raw(
        &self,
        old_root: HashOut<F>,
        map: &IndexedMerkleMap<HEIGHT>,
        key: F,
        value: F,
    ) -> Result<MapState, ProgramError> {
        run_insert_raw(self.projection, old_root, map, key, value)
    }

    /// Runs the insert method and produces a proof. Structural aborts
    /// (root mismatch, invalid insertions) return the program to
    /// [ProgramState::Compiled]; proving failures leave it in
    /// [ProgramState::Failed].
    pub fn insert(
        &mut self,
        old_root: HashOut<F>,
        map: &IndexedMerkleMap<HEIGHT>,
        key: F,
        value: F,
    ) -> Result<(MapState, ProofWithPublicInputs<F, C, D>), ProgramError> {
        if !matches!(self.state, ProgramState::Compiled | ProgramState::Proved) {
            return Err(ProgramError::NotCompiled);
        }

        self.state = ProgramState::Proving;
        let result = self
            .params
            .as_ref()
            .ok_or(ProgramError::NotCompiled)
            .and_then(|params| params.generate_proof(old_root, map, key, value));

        match result {
            Ok(output) => {
                self.state = ProgramState::Proved;
                Ok(output)
            }
            Err(err) => {
                self.state = match err {
                    ProgramError::ProvingFailure(_) => ProgramState::Failed,
                    _ => ProgramState::Compiled,
                };
                Err(err)
            }
        }
    }
}
