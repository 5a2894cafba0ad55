//! Protocol
//!
//! Wire types for the Parley command channel. Every request is an
//! [`Envelope`] tagged with an [`Operation`]; conversation-scoped operations
//! carry a [`ConvCommand`], message sends carry a [`DirectCommand`]. The
//! server answers with a [`Response`] whose ack sub-structures report
//! server-assigned values and application-level errors.
//!
//! Envelopes and responses are CBOR-encoded. Attribute payloads inside a
//! conversation command are JSON text, because the server stores them as
//! opaque JSON objects.
//!
//! # Components
//!
//! - [`Envelope`], [`Operation`]: outgoing request
//! - [`Response`], [`ConvAck`], [`DirectAck`], [`ErrorPayload`]: correlated
//!   reply
//! - [`ConversationData`], [`WireDate`]: conversation snapshots as delivered
//!   by queries and server pushes

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod ack;
mod data;
mod envelope;
pub mod errors;

pub use ack::{ConvAck, DirectAck, ErrorPayload, Response};
pub use data::{Attributes, ConversationData, WireDate};
pub use envelope::{ConvCommand, DirectCommand, Envelope, Operation};
pub use errors::{ProtocolError, Result};
