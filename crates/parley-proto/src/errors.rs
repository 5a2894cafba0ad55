//! Protocol error types.

use thiserror::Error;

use crate::Operation;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while building, encoding or decoding wire types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// CBOR serialization failed.
    #[error("CBOR encode failed: {0}")]
    CborEncode(String),

    /// CBOR deserialization failed.
    #[error("CBOR decode failed: {0}")]
    CborDecode(String),

    /// Encoded envelope exceeds the channel limit.
    #[error("envelope too large: {size} bytes (max {max})")]
    EnvelopeTooLarge {
        /// Actual size in bytes
        size: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// A conversation-scoped command has no conversation id.
    ///
    /// Envelopes are stamped by the sending conversation, so this indicates a
    /// bug in the caller rather than bad input.
    #[error("{operation} command is missing its conversation id")]
    MissingConversationId {
        /// Operation of the offending envelope
        operation: Operation,
    },

    /// The operation requires a payload the envelope does not carry.
    #[error("{operation} envelope is missing its payload")]
    MissingPayload {
        /// Operation of the offending envelope
        operation: Operation,
    },

    /// The envelope carries a payload from the other command family.
    #[error("{operation} envelope carries an unexpected payload")]
    UnexpectedPayload {
        /// Operation of the offending envelope
        operation: Operation,
    },
}

impl ProtocolError {
    /// Returns true if the error is an envelope-shape invariant violation.
    ///
    /// These come from building an envelope incorrectly and never from the
    /// bytes on the wire, so retrying cannot help.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Self::MissingConversationId { .. }
                | Self::MissingPayload { .. }
                | Self::UnexpectedPayload { .. }
        )
    }
}
