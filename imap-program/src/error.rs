use imap_common::merkle_map::MapError;
use thiserror::Error;

/// Errors surfaced by the insert program, raw or compiled.
#[derive(Debug, Error)]
pub enum ProgramError {
    /// The public input root does not match the witness map root. Raised
    /// before any witness is assigned; the invocation produces no
    /// output.
    #[error("public input root does not match the witness map root")]
    RootMismatch,
    /// Structural insertion failures, raised before any mutation.
    #[error(transparent)]
    Map(#[from] MapError),
    /// Proving was requested before the program was compiled.
    #[error("program is not compiled")]
    NotCompiled,
    #[error("compilation failed: {0:#}")]
    CompilationFailure(anyhow::Error),
    #[error("proving failed: {0:#}")]
    ProvingFailure(anyhow::Error),
}
