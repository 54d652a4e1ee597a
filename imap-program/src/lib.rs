//! A provable state-transition program over the indexed Merkle map.
//!
//! The single method, `insert`, takes the expected prior root as public
//! input, the full map plus the new `(key, value)` pair as private
//! witness, and outputs the new root (optionally paired with the new
//! length, depending on the output projection chosen when the program is
//! defined). It can run raw, with no proof, for fast logic checks, or
//! compiled, producing a proof; both paths emit bit-identical outputs.
//!
//! Neither path mutates the caller's map: chaining requires the caller
//! to adopt each output into its authoritative copy explicitly.

pub mod api;
pub mod cache;
pub mod error;
pub mod insert_circuit;
pub mod program;
pub mod public_inputs;

pub use api::{run_insert_raw, MapState, OutputProjection, Parameters};
pub use error::ProgramError;
pub use program::{MapProgram, ProgramState};
