//! Error types for conversation operations.
//!
//! Every operation either applies all of its local state changes or none of
//! them; each variant below is raised before any local mutation.
//!
//! - Local input problems ([`ConversationError::InvalidArgument`]) are raised
//!   synchronously, before any network call.
//! - Envelope invariants ([`ConversationError::Identity`],
//!   [`ConversationError::Protocol`]) indicate a bug in envelope construction.
//! - Server rejections ([`ConversationError::Remote`]) carry the server's
//!   error triple verbatim.
//! - Session failures ([`ConversationError::Transport`]) pass through
//!   unchanged.

use parley_proto::{ErrorPayload, Operation, ProtocolError};
use thiserror::Error;

use crate::{message::Message, session::TransportError};

/// Application-level error reported by the server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("remote operation failed with code {code}{}", reason_suffix(.reason))]
pub struct RemoteError {
    /// Server error code.
    pub code: i32,
    /// Human-readable reason.
    pub reason: Option<String>,
    /// Code set by application hooks on the server.
    pub app_code: Option<i32>,
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
}

impl From<ErrorPayload> for RemoteError {
    fn from(payload: ErrorPayload) -> Self {
        Self { code: payload.code, reason: payload.reason, app_code: payload.app_code }
    }
}

/// Errors from conversation operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    /// Malformed local input.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the input
        reason: String,
    },

    /// A conversation command was about to leave without its conversation id.
    #[error("{operation} command has no conversation id")]
    Identity {
        /// Operation of the offending envelope
        operation: Operation,
    },

    /// Envelope could not be built or encoded.
    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    /// The server rejected the operation.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The session failed to produce a response.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response lacks a field the operation needs.
    #[error("malformed {operation} response: {reason}")]
    MalformedResponse {
        /// Operation the response answers
        operation: Operation,
        /// Missing or undecodable field
        reason: String,
    },
}

impl ConversationError {
    /// Invalid argument with a reason.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument { reason: reason.into() }
    }

    pub(crate) fn malformed(operation: Operation, reason: impl Into<String>) -> Self {
        Self::MalformedResponse { operation, reason: reason.into() }
    }

    /// The server's error triple, if the server rejected the operation.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }

    /// Server error code, if the server rejected the operation.
    pub fn code(&self) -> Option<i32> {
        self.remote().map(|err| err.code)
    }

    /// Returns true if repeating the operation unchanged may succeed.
    ///
    /// Only transient transport failures qualify. Remote rejections are
    /// surfaced to the caller and never retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(err) if err.is_transient())
    }
}

impl From<ProtocolError> for ConversationError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::MissingConversationId { operation } => Self::Identity { operation },
            other => Self::Protocol(other),
        }
    }
}

/// Failed message send.
///
/// Hands the message back unacknowledged: no id or timestamp was assigned, so
/// sending it again reuses the same dedup token.
#[derive(Error, Debug)]
#[error("message send failed: {error}")]
pub struct SendError {
    /// Why the send failed.
    #[source]
    pub error: ConversationError,
    /// The unacknowledged message.
    pub message: Box<Message>,
}

impl SendError {
    pub(crate) fn new(error: ConversationError, message: Message) -> Self {
        Self { error, message: Box::new(message) }
    }

    /// Recover the message for a retry.
    pub fn into_message(self) -> Message {
        *self.message
    }
}
