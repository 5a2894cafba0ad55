//! Correlated responses.
//!
//! A [`Response`] answers exactly one [`Envelope`](crate::Envelope). The
//! session layer correlates them; this module only describes the shape.
//! Application-level failures travel inside the response (never as transport
//! errors): either as an envelope-level [`ErrorPayload`] or, for message
//! sends, in the error fields of [`DirectAck`].

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::{
    WireDate,
    errors::{ProtocolError, Result},
};

/// Application-level error reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Server error code.
    pub code: i32,
    /// Human-readable reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Error code set by application hooks on the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_code: Option<i32>,
}

impl ErrorPayload {
    /// Error with a code and reason.
    pub fn new(code: i32, reason: impl Into<String>) -> Self {
        Self { code, reason: Some(reason.into()), app_code: None }
    }

    /// Attach an application error code.
    #[must_use]
    pub fn with_app_code(mut self, app_code: i32) -> Self {
        self.app_code = Some(app_code);
        self
    }
}

/// Ack for conversation-scoped operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvAck {
    /// Server timestamp of the update (for `update`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<WireDate>,
    /// Participant count (for `count`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

/// Ack for `direct-message`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectAck {
    /// Server-issued message id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Server time of acceptance, milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_time: Option<i64>,
    /// Error code if the send was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
    /// Rejection reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    /// Rejection code set by application hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_error_code: Option<i32>,
}

impl DirectAck {
    /// Successful ack.
    pub fn accepted(message_id: impl Into<String>, server_time: i64) -> Self {
        Self { message_id: Some(message_id.into()), server_time: Some(server_time), ..Self::default() }
    }

    /// Rejection ack carrying the error triple.
    pub fn rejected(error: &ErrorPayload) -> Self {
        Self {
            error_code: Some(error.code),
            error_reason: error.reason.clone(),
            app_error_code: error.app_code,
            ..Self::default()
        }
    }

    /// The rejection, if the ack carries an error code.
    ///
    /// Only the code decides: a reason or app code without a code is not an
    /// error.
    pub fn error(&self) -> Option<ErrorPayload> {
        self.error_code.map(|code| ErrorPayload {
            code,
            reason: self.error_reason.clone(),
            app_code: self.app_error_code,
        })
    }
}

/// Reply to one envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// Serial of the envelope this answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<u32>,

    /// Envelope-level application error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,

    /// Ack for conversation-scoped operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_ack: Option<ConvAck>,

    /// Ack for `direct-message`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_ack: Option<DirectAck>,
}

impl Response {
    /// Response carrying a conversation ack.
    pub fn conversation(ack: ConvAck) -> Self {
        Self { conversation_ack: Some(ack), ..Self::default() }
    }

    /// Response carrying a message ack.
    pub fn direct(ack: DirectAck) -> Self {
        Self { direct_ack: Some(ack), ..Self::default() }
    }

    /// Envelope-level failure.
    pub fn failure(error: ErrorPayload) -> Self {
        Self { error: Some(error), ..Self::default() }
    }

    /// Encode the response as CBOR.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();
        ciborium::ser::into_writer(self, &mut writer)
            .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode a response.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::EnvelopeTooLarge` if `bytes` exceed
    ///   [`Envelope::MAX_SIZE`](crate::Envelope::MAX_SIZE)
    /// - `ProtocolError::CborDecode` if deserialization fails
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let max = crate::Envelope::MAX_SIZE;
        if bytes.len() > max {
            return Err(ProtocolError::EnvelopeTooLarge { size: bytes.len(), max });
        }
        ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
    }
}
