//! Client
//!
//! Client-side representation of a Parley conversation: a stateful proxy that
//! reads committed conversation state, stages local edits, and issues
//! operations that only take effect locally once the server has confirmed
//! them.
//!
//! # Architecture
//!
//! Two pieces cooperate inside every [`Conversation`]:
//!
//! - The [`PendingOverlay`] holds staged name/attribute edits next to the
//!   committed values and merges them on confirmation.
//! - The round-trip engine stamps an [`Envelope`](parley_proto::Envelope) with
//!   the conversation id, sends it through the bound [`Session`], inspects the
//!   correlated response, and drives a commit, an optimistic transition, or a
//!   typed error.
//!
//! Every operation either applies all of its local changes or none of them.
//!
//! # Components
//!
//! - [`Conversation`]: aggregate root and operation surface
//! - [`PendingOverlay`], [`Pending`], [`StageMode`]: staged edits
//! - [`Message`], [`MessageContent`]: outgoing and received messages
//! - [`Session`], [`ConversationQuery`]: external collaborators
//! - [`ConversationEvent`]: server-pushed changes applied to local state
//! - [`ConversationError`], [`SendError`]: error taxonomy

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod conversation;
mod error;
mod event;
mod ids;
mod message;
mod overlay;
mod query;
mod round_trip;
mod session;
pub mod timestamp;

pub use conversation::Conversation;
pub use error::{ConversationError, RemoteError, SendError};
pub use event::ConversationEvent;
pub use ids::{ClientId, ConversationId, MessageId, Participants};
pub use message::{Message, MessageContent};
pub use overlay::{Pending, PendingOverlay, StageMode};
pub use parley_proto::Attributes;
pub use query::{ConversationQuery, Query};
pub use session::{Session, TransportError};
