//! Error types for tether operations.

use std::io;

use tether_proto::Rejected;

/// Alias for `Result<T, tether::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the controller client and the agent loop.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The peer answered with a failed reply.
    #[error("request rejected: {message}")]
    Rejected {
        /// Error text sent by the peer.
        message: String,
    },

    /// The peer answered with a reply of the wrong kind.
    #[error("expected {expected} reply, got {got}")]
    UnexpectedReply {
        /// Reply kind the request calls for.
        expected: &'static str,
        /// Reply kind actually received.
        got: &'static str,
    },

    /// A configuration file could not be loaded.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A transport, framing or decode error. The connection is unusable.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<Rejected> for Error {
    fn from(r: Rejected) -> Self {
        Self::Rejected { message: r.message }
    }
}
