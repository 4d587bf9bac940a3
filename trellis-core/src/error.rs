//! Errors.
use thiserror::Error;

/// Errors raised by the core crate.
///
/// Structural errors are fatal for the process by design; callers propagate
/// them with `anyhow` rather than recovering.
#[derive(Debug, Error)]
pub enum TrellisError {
    /// A compressed tape could not be decoded back into items.
    #[error("tape decode failed: {0}")]
    TapeDecode(#[from] bincode::Error),

    /// A compressed tape could not be flushed.
    #[error("tape compression failed: {0}")]
    TapeCompress(#[from] std::io::Error),

    /// A rollout was requested over an empty environment pool.
    #[error("environment pool is empty")]
    EmptyPool,
}
