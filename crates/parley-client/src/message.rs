//! Messages.
//!
//! A [`Message`] starts as a draft carrying content and a dedup token. Sending
//! binds it to one conversation and sender; a successful send assigns the
//! server id and timestamp. An acknowledged message cannot be sent again.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::ConversationError,
    ids::{ClientId, ConversationId, MessageId},
};

/// Message body.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    /// Plain text, sent verbatim.
    Text(String),
    /// Structured content, sent as JSON text.
    Typed(Value),
}

impl MessageContent {
    /// Body as sent on the wire.
    pub fn to_body(&self) -> Result<String, ConversationError> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Typed(value) => serde_json::to_string(value).map_err(|e| {
                ConversationError::invalid_argument(format!("message body is not serializable: {e}"))
            }),
        }
    }
}

/// Outgoing or received message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    content: MessageContent,
    dedup_token: Uuid,
    needs_receipt: bool,
    transient: bool,
    conversation_id: Option<ConversationId>,
    sender_id: Option<ClientId>,
    id: Option<MessageId>,
    timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// Draft message with the given content and a fresh dedup token.
    pub fn new(content: MessageContent) -> Self {
        Self {
            content,
            dedup_token: Uuid::new_v4(),
            needs_receipt: false,
            transient: false,
            conversation_id: None,
            sender_id: None,
            id: None,
            timestamp: None,
        }
    }

    /// Draft text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(MessageContent::Text(text.into()))
    }

    /// Draft structured message.
    ///
    /// # Errors
    ///
    /// - `ConversationError::InvalidArgument` if `content` cannot be
    ///   represented as JSON
    pub fn typed<T: Serialize>(content: &T) -> Result<Self, ConversationError> {
        let value = serde_json::to_value(content).map_err(|e| {
            ConversationError::invalid_argument(format!("message content is not serializable: {e}"))
        })?;
        Ok(Self::new(MessageContent::Typed(value)))
    }

    /// Message received from the server, already acknowledged.
    pub fn received(
        id: MessageId,
        conversation_id: ConversationId,
        sender_id: ClientId,
        timestamp: DateTime<Utc>,
        content: MessageContent,
    ) -> Self {
        Self {
            conversation_id: Some(conversation_id),
            sender_id: Some(sender_id),
            id: Some(id),
            timestamp: Some(timestamp),
            ..Self::new(content)
        }
    }

    /// Ask recipients for delivery receipts.
    #[must_use]
    pub fn with_receipt(mut self, needs_receipt: bool) -> Self {
        self.needs_receipt = needs_receipt;
        self
    }

    /// Mark the message as transient (not stored by the server).
    #[must_use]
    pub fn with_transient(mut self, transient: bool) -> Self {
        self.transient = transient;
        self
    }

    /// Message body.
    pub fn content(&self) -> &MessageContent {
        &self.content
    }

    /// Client-generated token identifying this message across retries.
    pub fn dedup_token(&self) -> Uuid {
        self.dedup_token
    }

    /// Sender asked for delivery receipts.
    pub fn needs_receipt(&self) -> bool {
        self.needs_receipt
    }

    /// Message is not stored by the server.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Conversation the message was sent to.
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        self.conversation_id.as_ref()
    }

    /// Sending client.
    pub fn sender_id(&self) -> Option<&ClientId> {
        self.sender_id.as_ref()
    }

    /// Server-issued id. `None` until acknowledged.
    pub fn id(&self) -> Option<&MessageId> {
        self.id.as_ref()
    }

    /// Server timestamp. `None` until acknowledged.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Returns true once the server has assigned an id.
    pub fn is_acknowledged(&self) -> bool {
        self.id.is_some()
    }

    pub(crate) fn bind(&mut self, conversation_id: ConversationId, sender_id: ClientId) {
        self.conversation_id = Some(conversation_id);
        self.sender_id = Some(sender_id);
    }

    pub(crate) fn acknowledge(&mut self, id: MessageId, timestamp: DateTime<Utc>) {
        self.id = Some(id);
        self.timestamp = Some(timestamp);
    }
}
