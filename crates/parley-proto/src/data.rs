//! Conversation snapshots and wire dates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form conversation attributes.
pub type Attributes = Map<String, Value>;

/// Date in one of the server's transport encodings.
///
/// The server emits integer milliseconds in acks, ISO-8601 strings in some
/// query results, and typed objects (`{"__type":"Date","iso":..}`) in
/// storage-backed snapshots. Decoding into a canonical timestamp is left to
/// the consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireDate {
    /// Milliseconds since the Unix epoch.
    Millis(i64),
    /// Typed date object.
    Typed {
        /// Type tag, `"Date"` for dates.
        #[serde(rename = "__type")]
        kind: String,
        /// ISO-8601 representation.
        iso: String,
    },
    /// ISO-8601 string.
    Iso(String),
}

impl WireDate {
    /// Type tag used by typed date objects.
    pub const DATE_TYPE: &'static str = "Date";

    /// Typed date object for an ISO-8601 string.
    pub fn typed(iso: impl Into<String>) -> Self {
        Self::Typed { kind: Self::DATE_TYPE.to_string(), iso: iso.into() }
    }
}

/// Snapshot of a conversation as returned by a query or pushed by the server.
///
/// Accepts both the long field names and the compact ones the server uses in
/// push notifications. Missing collections default to empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationData {
    /// Conversation id.
    #[serde(alias = "objectId")]
    pub id: String,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Custom attributes.
    #[serde(default, alias = "attr")]
    pub attributes: Attributes,

    /// Creator's client id.
    #[serde(default, alias = "c", skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,

    /// Participant ids. May contain duplicates on the wire.
    #[serde(default, alias = "m")]
    pub members: Vec<String>,

    /// Participants who muted the conversation.
    #[serde(default, alias = "mu")]
    pub muted_members: Vec<String>,

    /// Transient conversations do not track membership client-side.
    #[serde(default, alias = "tr")]
    pub transient: bool,

    /// Whether the local client muted the conversation.
    #[serde(default)]
    pub muted: bool,

    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<WireDate>,

    /// Time of the last update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<WireDate>,

    /// Time of the last message.
    #[serde(default, alias = "lm", skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<WireDate>,
}

impl ConversationData {
    /// Snapshot with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn wire_date_accepts_all_encodings() {
        let millis: WireDate = serde_json::from_value(json!(1_500_000_000_000_i64)).unwrap();
        assert_eq!(millis, WireDate::Millis(1_500_000_000_000));

        let iso: WireDate = serde_json::from_value(json!("2017-07-14T02:40:00.000Z")).unwrap();
        assert_eq!(iso, WireDate::Iso("2017-07-14T02:40:00.000Z".into()));

        let typed: WireDate =
            serde_json::from_value(json!({"__type": "Date", "iso": "2017-07-14T02:40:00.000Z"}))
                .unwrap();
        assert_eq!(typed, WireDate::typed("2017-07-14T02:40:00.000Z"));
    }

    #[test]
    fn snapshot_accepts_compact_field_names() {
        let data: ConversationData = serde_json::from_value(json!({
            "objectId": "conv-9",
            "name": "ops",
            "attr": {"color": "red"},
            "c": "alice",
            "m": ["alice", "bob", "alice"],
            "mu": ["bob"],
            "tr": false,
            "lm": {"__type": "Date", "iso": "2020-01-01T00:00:00.000Z"}
        }))
        .unwrap();

        assert_eq!(data.id, "conv-9");
        assert_eq!(data.name.as_deref(), Some("ops"));
        assert_eq!(data.attributes["color"], "red");
        assert_eq!(data.creator.as_deref(), Some("alice"));
        assert_eq!(data.members, vec!["alice", "bob", "alice"]);
        assert_eq!(data.muted_members, vec!["bob"]);
        assert!(data.last_message_at.is_some());
    }

    #[test]
    fn snapshot_defaults_missing_fields() {
        let data: ConversationData = serde_json::from_value(json!({"id": "c"})).unwrap();
        assert_eq!(data, ConversationData::new("c"));
        assert!(!data.transient);
        assert!(data.members.is_empty());
    }
}
