//! Session collaborator.
//!
//! The session owns the connection: it delivers one [`Envelope`], returns the
//! correlated [`Response`], and reports transport failures. Application-level
//! failures must come back inside the response, never as a
//! [`TransportError`]. Timeouts and reconnects are the session's business.

use std::{future::Future, time::Duration};

use parley_proto::{Envelope, Response};
use thiserror::Error;

use crate::ids::ClientId;

/// Failure to obtain a response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection is closed.
    #[error("session disconnected")]
    Disconnected,

    /// No response within the session's deadline.
    #[error("no response after {after:?}")]
    Timeout {
        /// How long the session waited
        after: Duration,
    },

    /// Underlying I/O failure.
    #[error("transport I/O error: {0}")]
    Io(String),

    /// Request or response bytes could not be encoded/decoded.
    #[error("transport codec error: {0}")]
    Codec(String),

    /// A response arrived for a different request.
    #[error("response serial {actual:?} does not match request serial {expected}")]
    Correlation {
        /// Serial stamped on the request
        expected: u32,
        /// Serial echoed by the response
        actual: Option<u32>,
    },
}

impl TransportError {
    /// Returns true if the failure may clear up on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Timeout { .. } | Self::Io(_))
    }
}

/// Command channel bound to one authenticated client.
///
/// Implementations must preserve request/response correlation: the future
/// returned by [`Session::send`] resolves with the response to that envelope
/// and no other.
pub trait Session: Send + Sync + 'static {
    /// Id of the local client. Read at call time, never cached by callers.
    fn local_id(&self) -> ClientId;

    /// Deliver an envelope and wait for its response.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] only if no response could be obtained.
    fn send(
        &self,
        envelope: Envelope,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send;
}
