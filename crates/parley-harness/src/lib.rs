//! Deterministic loopback collaborators for Parley.
//!
//! [`LoopbackServer`] models the server side of the conversation protocol in
//! memory: membership, mute lists, attribute updates, message ids, and a
//! stepped clock. [`LoopbackSession`] binds one client to a server and
//! implements both [`Session`](parley_client::Session) and
//! [`ConversationQuery`](parley_client::ConversationQuery).
//!
//! Every request and response crosses the CBOR codec, so tests exercise the
//! same bytes a networked session would carry.
//!
//! # Scripting
//!
//! Sessions take a queue of [`Scripted`] outcomes consumed one per request
//! (transport failure, rejection, canned response) and can hold the next
//! response until released, which makes interleavings of concurrent
//! operations reproducible.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod server;
pub mod session;

pub use server::{DateFormat, LoopbackConfig, LoopbackServer, StoredMessage, error_codes};
pub use session::{Hold, LoopbackSession, Scripted};
