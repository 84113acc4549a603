//! Server errors.

use std::io;

/// Errors from starting a tandem host.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// Other socket failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}
