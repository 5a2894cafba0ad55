//! Outgoing command envelopes.
//!
//! Two envelope families share the same outer shape. Conversation commands
//! (`update`, `mute`, `unmute`, `count`, `add`, `remove`) carry a
//! [`ConvCommand`] stamped with the target conversation id. Message sends
//! (`direct-message`) carry a [`DirectCommand`] with the serialized body.
//!
//! # Invariants
//!
//! - A conversation-scoped envelope always carries a [`ConvCommand`] whose
//!   `conversation_id` is present and non-empty.
//! - An envelope never carries payloads from both families.
//!
//! Both are checked by [`Envelope::validate`], which [`Envelope::encode`]
//! runs before serializing.

use std::fmt;

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::errors::{ProtocolError, Result};

/// Operation tag of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Commit staged name/attributes
    Update,
    /// Mute the conversation for the sending client
    Mute,
    /// Unmute the conversation for the sending client
    Unmute,
    /// Query the participant count
    Count,
    /// Add participants
    Add,
    /// Remove participants
    Remove,
    /// Send a message into the conversation
    DirectMessage,
}

impl Operation {
    /// Returns true if the operation carries a [`ConvCommand`].
    pub const fn is_conversation_scoped(self) -> bool {
        !matches!(self, Self::DirectMessage)
    }

    /// Wire name of the operation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Mute => "mute",
            Self::Unmute => "unmute",
            Self::Count => "count",
            Self::Add => "add",
            Self::Remove => "remove",
            Self::DirectMessage => "direct-message",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation-scoped command payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvCommand {
    /// Target conversation. Stamped by the sending conversation.
    pub conversation_id: Option<String>,

    /// JSON object text `{"attr"?: {..}, "name"?: ".."}` for `update`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attr_payload: Option<String>,

    /// Participant ids for `add`/`remove`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub member_ids: Vec<String>,
}

impl ConvCommand {
    /// Empty command with no conversation id yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Command carrying an attribute payload.
    pub fn with_attr_payload(payload: impl Into<String>) -> Self {
        Self { attr_payload: Some(payload.into()), ..Self::default() }
    }

    /// Command listing participant ids.
    pub fn with_members(member_ids: Vec<String>) -> Self {
        Self { member_ids, ..Self::default() }
    }

    /// Stamp the conversation id if none is set yet.
    pub fn stamp(&mut self, conversation_id: &str) {
        if self.conversation_id.is_none() {
            self.conversation_id = Some(conversation_id.to_string());
        }
    }
}

/// Message send payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectCommand {
    /// Serialized message body.
    pub body: String,
    /// Target conversation.
    pub conversation_id: String,
    /// Sender asks for delivery receipts.
    pub needs_receipt: bool,
    /// Message is not persisted by the server.
    pub is_transient: bool,
    /// Client-generated token the server uses to drop duplicate sends.
    pub dedup_token: String,
}

/// Outgoing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Operation tag.
    pub operation: Operation,

    /// Correlation serial, stamped by the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<u32>,

    /// Payload for conversation-scoped operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_command: Option<ConvCommand>,

    /// Payload for `direct-message`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_message: Option<DirectCommand>,
}

impl Envelope {
    /// Maximum encoded envelope size (1 MiB).
    pub const MAX_SIZE: usize = 1 << 20;

    /// Conversation-scoped envelope.
    pub fn conversation(operation: Operation, command: ConvCommand) -> Self {
        Self { operation, serial: None, conversation_command: Some(command), direct_message: None }
    }

    /// Message send envelope.
    pub fn direct(command: DirectCommand) -> Self {
        Self {
            operation: Operation::DirectMessage,
            serial: None,
            conversation_command: None,
            direct_message: Some(command),
        }
    }

    /// Conversation id this envelope targets, from whichever payload it has.
    pub fn conversation_id(&self) -> Option<&str> {
        match (&self.conversation_command, &self.direct_message) {
            (Some(cmd), _) => cmd.conversation_id.as_deref(),
            (None, Some(direct)) => Some(direct.conversation_id.as_str()),
            (None, None) => None,
        }
    }

    /// Check the envelope shape invariants.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MissingPayload` if the operation's payload is absent,
    ///   or `update`/`add`/`remove` carry nothing to apply
    /// - `ProtocolError::MissingConversationId` if the target id is absent or
    ///   empty
    /// - `ProtocolError::UnexpectedPayload` if the other family's payload is
    ///   present
    pub fn validate(&self) -> Result<()> {
        let operation = self.operation;

        if operation.is_conversation_scoped() {
            if self.direct_message.is_some() {
                return Err(ProtocolError::UnexpectedPayload { operation });
            }
            let cmd = self
                .conversation_command
                .as_ref()
                .ok_or(ProtocolError::MissingPayload { operation })?;

            if cmd.conversation_id.as_deref().is_none_or(str::is_empty) {
                return Err(ProtocolError::MissingConversationId { operation });
            }

            let has_body = match operation {
                Operation::Update => cmd.attr_payload.is_some(),
                Operation::Add | Operation::Remove => !cmd.member_ids.is_empty(),
                _ => true,
            };
            if !has_body {
                return Err(ProtocolError::MissingPayload { operation });
            }
        } else {
            if self.conversation_command.is_some() {
                return Err(ProtocolError::UnexpectedPayload { operation });
            }
            let direct =
                self.direct_message.as_ref().ok_or(ProtocolError::MissingPayload { operation })?;
            if direct.conversation_id.is_empty() {
                return Err(ProtocolError::MissingConversationId { operation });
            }
        }

        Ok(())
    }

    /// Validate and encode the envelope as CBOR.
    ///
    /// # Errors
    ///
    /// - Any error from [`Envelope::validate`]
    /// - `ProtocolError::CborEncode` if serialization fails
    /// - `ProtocolError::EnvelopeTooLarge` if the encoding exceeds
    ///   [`Envelope::MAX_SIZE`]
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        self.validate()?;

        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;

        if buf.len() > Self::MAX_SIZE {
            return Err(ProtocolError::EnvelopeTooLarge { size: buf.len(), max: Self::MAX_SIZE });
        }

        dst.put_slice(&buf);
        Ok(())
    }

    /// Decode and validate an envelope.
    ///
    /// The size check happens before CBOR parsing begins.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::EnvelopeTooLarge` if `bytes` exceed
    ///   [`Envelope::MAX_SIZE`]
    /// - `ProtocolError::CborDecode` if deserialization fails
    /// - Any error from [`Envelope::validate`]
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > Self::MAX_SIZE {
            return Err(ProtocolError::EnvelopeTooLarge { size: bytes.len(), max: Self::MAX_SIZE });
        }

        let envelope: Self =
            ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }
}
