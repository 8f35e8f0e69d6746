//! Crate-wide error type.

use crate::dom::PatchError;
use thiserror::Error;

/// Result alias for fallible crate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the host.
///
/// Malformed markup and cache pressure are never errors; only a failing
/// patch primitive, an invalid configuration or a failed thread spawn is.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The structural patch primitive failed. The live tree may be partially
    /// updated.
    #[error("patch failed: {0}")]
    Patch(#[from] PatchError),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The refresh ticker thread could not be started.
    #[error("failed to spawn refresh ticker: {0}")]
    Spawn(String),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
