//! Error types for the reactive runtime.
//!
//! Every failure surfaces synchronously to the nearest caller: the
//! `try_autorun` that ran a reaction for the first time, or the write that
//! re-ran it. The runtime never retries and never discards an error.

use crate::reactive::ReactionId;

/// Boxed error produced by a fallible reaction body.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the reactive runtime.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A reaction body returned an error.
    ///
    /// When this comes from a write, the value has already been stored and
    /// the remaining dependents of that write were not run.
    #[error("reaction {reaction} failed: {source}")]
    ReactionFailed {
        reaction: ReactionId,
        #[source]
        source: BoxError,
    },

    /// Nested propagation went deeper than `RuntimeConfig::max_depth`.
    #[error("reaction nesting exceeded the configured limit of {limit}")]
    DepthExceeded { limit: usize },

    /// The key does not exist on the observed object.
    #[error("unknown key `{0}`")]
    UnknownKey(String),

    /// JSON input for an observed object was not a JSON object.
    #[error("expected a JSON object")]
    NotAnObject,

    /// A value could not be converted to or from JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// The reaction that failed, if this is a reaction failure.
    pub fn reaction(&self) -> Option<ReactionId> {
        match self {
            Self::ReactionFailed { reaction, .. } => Some(*reaction),
            _ => None,
        }
    }
}
