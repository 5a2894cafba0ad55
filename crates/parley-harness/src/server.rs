//! In-memory conversation server.
//!
//! `LoopbackServer` applies envelopes the way a real server would and answers
//! with the matching response. It is synchronous and owns no I/O; a
//! [`LoopbackSession`](crate::LoopbackSession) drives it.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, SecondsFormat};
use parley_proto::{
    Attributes, ConvAck, ConvCommand, ConversationData, DirectAck, DirectCommand, Envelope,
    ErrorPayload, Operation, Response, WireDate,
};
use serde_json::Value;

/// Error codes returned by the loopback server.
pub mod error_codes {
    /// Conversation id is unknown to the server.
    pub const CONVERSATION_NOT_FOUND: i32 = 4401;
    /// Update payload is not a JSON object of `attr`/`name`.
    pub const INVALID_PAYLOAD: i32 = 4402;
    /// Membership change would exceed the configured maximum.
    pub const TOO_MANY_MEMBERS: i32 = 4315;
    /// Envelope failed validation.
    pub const INVALID_COMMAND: i32 = 4400;
}

/// How the server renders dates on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DateFormat {
    /// Milliseconds since the Unix epoch
    Millis,
    /// Bare ISO-8601 string
    Iso,
    /// `{"__type": "Date", "iso": ...}`
    #[default]
    Typed,
}

/// Loopback server configuration.
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// First value of the server clock (ms since the Unix epoch)
    pub clock_start_millis: i64,
    /// Clock advance per stamped event
    pub clock_step_millis: i64,
    /// Prefix of issued message ids
    pub message_id_prefix: String,
    /// Maximum participants per conversation
    pub max_members: usize,
    /// Reject every message with this error code
    pub reject_messages: Option<i32>,
    /// Date rendering for acks and snapshots
    pub date_format: DateFormat,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            clock_start_millis: 1_700_000_000_000,
            clock_step_millis: 1_000,
            message_id_prefix: "msg-".to_string(),
            max_members: 500,
            reject_messages: None,
            date_format: DateFormat::default(),
        }
    }
}

/// Message accepted by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Server-issued id
    pub id: String,
    /// Sender client id
    pub sender: String,
    /// Wire body
    pub body: String,
    /// Acceptance time (ms since the Unix epoch)
    pub server_time: i64,
    /// Client dedup token
    pub dedup_token: String,
}

#[derive(Debug, Clone, Default)]
struct StoredConversation {
    name: Option<String>,
    attributes: Attributes,
    creator: Option<String>,
    members: BTreeSet<String>,
    muted_members: BTreeSet<String>,
    transient: bool,
    created_at: i64,
    updated_at: Option<i64>,
    last_message_at: Option<i64>,
    messages: Vec<StoredMessage>,
}

/// Deterministic in-memory server.
#[derive(Debug)]
pub struct LoopbackServer {
    config: LoopbackConfig,
    conversations: HashMap<String, StoredConversation>,
    /// Dedup token -> index into the owning conversation's messages
    delivered: HashMap<String, (String, usize)>,
    clock: i64,
    next_message: u64,
}

impl Default for LoopbackServer {
    fn default() -> Self {
        Self::new(LoopbackConfig::default())
    }
}

impl LoopbackServer {
    /// Empty server.
    pub fn new(config: LoopbackConfig) -> Self {
        let clock = config.clock_start_millis;
        Self {
            config,
            conversations: HashMap::new(),
            delivered: HashMap::new(),
            clock,
            next_message: 1,
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &LoopbackConfig {
        &self.config
    }

    /// Register a conversation as stored server-side.
    ///
    /// Missing `createdAt` is stamped from the server clock.
    pub fn seed(&mut self, data: ConversationData) {
        let created_at =
            data.created_at.as_ref().and_then(wire_millis).unwrap_or_else(|| self.tick());
        let stored = StoredConversation {
            name: data.name,
            attributes: data.attributes,
            creator: data.creator,
            members: data.members.into_iter().collect(),
            muted_members: data.muted_members.into_iter().collect(),
            transient: data.transient,
            created_at,
            updated_at: data.updated_at.as_ref().and_then(wire_millis),
            last_message_at: data.last_message_at.as_ref().and_then(wire_millis),
            messages: Vec::new(),
        };
        tracing::debug!(conversation_id = %data.id, "conversation seeded");
        self.conversations.insert(data.id, stored);
    }

    /// Snapshot of a stored conversation as seen by `viewer`.
    pub fn snapshot(&self, id: &str, viewer: &str) -> Option<ConversationData> {
        let stored = self.conversations.get(id)?;
        Some(ConversationData {
            name: stored.name.clone(),
            attributes: stored.attributes.clone(),
            creator: stored.creator.clone(),
            members: stored.members.iter().cloned().collect(),
            muted_members: stored.muted_members.iter().cloned().collect(),
            transient: stored.transient,
            muted: stored.muted_members.contains(viewer),
            created_at: Some(self.render(stored.created_at)),
            updated_at: stored.updated_at.map(|t| self.render(t)),
            last_message_at: stored.last_message_at.map(|t| self.render(t)),
            ..ConversationData::new(id)
        })
    }

    /// Snapshots of every stored conversation, ordered by id.
    pub fn snapshots(&self, viewer: &str) -> Vec<ConversationData> {
        let mut ids: Vec<&String> = self.conversations.keys().collect();
        ids.sort();
        ids.into_iter().filter_map(|id| self.snapshot(id, viewer)).collect()
    }

    /// Messages accepted for a conversation, in acceptance order.
    pub fn messages(&self, id: &str) -> Vec<StoredMessage> {
        self.conversations.get(id).map(|c| c.messages.clone()).unwrap_or_default()
    }

    /// Apply one envelope sent by `sender` and build the response.
    ///
    /// The response echoes the envelope's serial.
    pub fn handle(&mut self, sender: &str, envelope: Envelope) -> Response {
        let serial = envelope.serial;
        let operation = envelope.operation;

        let mut response = match self.apply(sender, envelope) {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(%operation, code = error.code, "command refused");
                Response::failure(error)
            },
        };
        response.serial = serial;
        response
    }

    fn apply(&mut self, sender: &str, envelope: Envelope) -> Result<Response, ErrorPayload> {
        envelope
            .validate()
            .map_err(|e| ErrorPayload::new(error_codes::INVALID_COMMAND, e.to_string()))?;

        match (envelope.conversation_command, envelope.direct_message) {
            (Some(command), None) => self.apply_command(sender, envelope.operation, command),
            (None, Some(message)) => self.deliver(sender, message),
            _ => Err(ErrorPayload::new(error_codes::INVALID_COMMAND, "ambiguous envelope")),
        }
    }

    fn apply_command(
        &mut self,
        sender: &str,
        operation: Operation,
        command: ConvCommand,
    ) -> Result<Response, ErrorPayload> {
        let id = command.conversation_id.unwrap_or_default();
        if !self.conversations.contains_key(&id) {
            return Err(not_found(&id));
        }

        let now = self.tick();
        let max_members = self.config.max_members;
        let stored = self.conversations.get_mut(&id).ok_or_else(|| not_found(&id))?;

        let ack = match operation {
            Operation::Update => {
                let payload = command.attr_payload.unwrap_or_default();
                apply_update(stored, &payload)?;
                stored.updated_at = Some(now);
                ConvAck { updated_at: Some(render(self.config.date_format, now)), count: None }
            },
            Operation::Mute => {
                stored.muted_members.insert(sender.to_string());
                ConvAck::default()
            },
            Operation::Unmute => {
                stored.muted_members.remove(sender);
                ConvAck::default()
            },
            Operation::Count => {
                ConvAck { updated_at: None, count: Some(stored.members.len() as u64) }
            },
            Operation::Add => {
                let mut members = stored.members.clone();
                members.extend(command.member_ids);
                if members.len() > max_members {
                    return Err(ErrorPayload::new(
                        error_codes::TOO_MANY_MEMBERS,
                        format!("conversation is limited to {max_members} members"),
                    ));
                }
                stored.members = members;
                ConvAck::default()
            },
            Operation::Remove => {
                for member in &command.member_ids {
                    stored.members.remove(member);
                    stored.muted_members.remove(member);
                }
                ConvAck::default()
            },
            Operation::DirectMessage => {
                return Err(ErrorPayload::new(error_codes::INVALID_COMMAND, "not a command"));
            },
        };

        tracing::debug!(conversation_id = %id, %operation, sender, "command applied");
        Ok(Response::conversation(ack))
    }

    fn deliver(&mut self, sender: &str, message: DirectCommand) -> Result<Response, ErrorPayload> {
        if let Some(code) = self.config.reject_messages {
            return Ok(Response::direct(DirectAck::rejected(&ErrorPayload::new(
                code,
                "message rejected",
            ))));
        }

        if let Some(previous) = self.redelivery(&message.dedup_token) {
            tracing::debug!(message_id = %previous.id, "duplicate message suppressed");
            return Ok(Response::direct(DirectAck::accepted(previous.id, previous.server_time)));
        }

        let id = message.conversation_id;
        if !self.conversations.contains_key(&id) {
            return Err(not_found(&id));
        }

        let server_time = self.tick();
        let message_id = format!("{}{}", self.config.message_id_prefix, self.next_message);
        self.next_message += 1;

        let stored = self.conversations.get_mut(&id).ok_or_else(|| not_found(&id))?;
        stored.last_message_at = Some(server_time);
        stored.messages.push(StoredMessage {
            id: message_id.clone(),
            sender: sender.to_string(),
            body: message.body,
            server_time,
            dedup_token: message.dedup_token.clone(),
        });
        self.delivered.insert(message.dedup_token, (id.clone(), stored.messages.len() - 1));

        tracing::debug!(conversation_id = %id, %message_id, sender, "message accepted");
        Ok(Response::direct(DirectAck::accepted(message_id, server_time)))
    }

    fn redelivery(&self, dedup_token: &str) -> Option<StoredMessage> {
        let (id, index) = self.delivered.get(dedup_token)?;
        self.conversations.get(id)?.messages.get(*index).cloned()
    }

    fn tick(&mut self) -> i64 {
        let now = self.clock;
        self.clock += self.config.clock_step_millis;
        now
    }

    fn render(&self, millis: i64) -> WireDate {
        render(self.config.date_format, millis)
    }
}

fn apply_update(stored: &mut StoredConversation, payload: &str) -> Result<(), ErrorPayload> {
    let invalid = |reason: String| ErrorPayload::new(error_codes::INVALID_PAYLOAD, reason);

    let parsed: Value = serde_json::from_str(payload).map_err(|e| invalid(e.to_string()))?;
    let Value::Object(mut fields) = parsed else {
        return Err(invalid("update payload must be an object".to_string()));
    };

    let attributes = match fields.remove("attr") {
        Some(Value::Object(attributes)) => Some(attributes),
        Some(_) => return Err(invalid("attr must be an object".to_string())),
        None => None,
    };
    let name = match fields.remove("name") {
        Some(Value::String(name)) => Some(name),
        Some(_) => return Err(invalid("name must be a string".to_string())),
        None => None,
    };

    if let Some(attributes) = attributes {
        stored.attributes = attributes;
    }
    if let Some(name) = name {
        stored.name = Some(name);
    }
    Ok(())
}

fn not_found(id: &str) -> ErrorPayload {
    ErrorPayload::new(error_codes::CONVERSATION_NOT_FOUND, format!("conversation {id} not found"))
}

fn render(format: DateFormat, millis: i64) -> WireDate {
    let iso = || {
        DateTime::from_timestamp_millis(millis)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default()
    };
    match format {
        DateFormat::Millis => WireDate::Millis(millis),
        DateFormat::Iso => WireDate::Iso(iso()),
        DateFormat::Typed => WireDate::typed(iso()),
    }
}

fn wire_millis(date: &WireDate) -> Option<i64> {
    match date {
        WireDate::Millis(millis) => Some(*millis),
        WireDate::Iso(iso) | WireDate::Typed { iso, .. } => {
            DateTime::parse_from_rfc3339(iso).ok().map(|t| t.timestamp_millis())
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parley_proto::{ConvCommand, DirectCommand};

    use super::*;

    fn server_with(id: &str, members: &[&str]) -> LoopbackServer {
        let mut server = LoopbackServer::default();
        server.seed(ConversationData {
            members: members.iter().map(|m| (*m).to_string()).collect(),
            ..ConversationData::new(id)
        });
        server
    }

    fn command(operation: Operation, id: &str, command: ConvCommand) -> Envelope {
        let mut command = command;
        command.stamp(id);
        Envelope::conversation(operation, command)
    }

    fn message(id: &str, token: &str) -> Envelope {
        Envelope::direct(DirectCommand {
            body: "hi".to_string(),
            conversation_id: id.to_string(),
            needs_receipt: false,
            is_transient: false,
            dedup_token: token.to_string(),
        })
    }

    #[test]
    fn update_replaces_attributes_and_name() {
        let mut server = server_with("c1", &[]);
        let payload = r#"{"attr":{"topic":"deploys"},"name":"ops"}"#;

        let update = command(Operation::Update, "c1", ConvCommand::with_attr_payload(payload));
        let response = server.handle("alice", update);

        assert!(response.error.is_none());
        assert!(response.conversation_ack.and_then(|a| a.updated_at).is_some());
        let snapshot = server.snapshot("c1", "alice").unwrap();
        assert_eq!(snapshot.name.as_deref(), Some("ops"));
        assert_eq!(snapshot.attributes["topic"], "deploys");
    }

    #[test]
    fn update_with_non_object_payload_is_refused() {
        let mut server = server_with("c1", &[]);
        let update = command(Operation::Update, "c1", ConvCommand::with_attr_payload("[1]"));
        let response = server.handle("alice", update);
        assert_eq!(response.error.map(|e| e.code), Some(error_codes::INVALID_PAYLOAD));
    }

    #[test]
    fn unknown_conversation_is_refused() {
        let mut server = LoopbackServer::default();
        let response = server.handle("alice", command(Operation::Count, "nope", ConvCommand::new()));
        assert_eq!(response.error.map(|e| e.code), Some(error_codes::CONVERSATION_NOT_FOUND));
    }

    #[test]
    fn add_respects_member_limit() {
        let mut server =
            LoopbackServer::new(LoopbackConfig { max_members: 2, ..Default::default() });
        server.seed(ConversationData { members: vec!["a".into()], ..ConversationData::new("c1") });

        let response = server.handle(
            "a",
            command(Operation::Add, "c1", ConvCommand::with_members(vec!["b".into(), "c".into()])),
        );

        assert_eq!(response.error.map(|e| e.code), Some(error_codes::TOO_MANY_MEMBERS));
        assert_eq!(server.snapshot("c1", "a").unwrap().members, vec!["a"]);
    }

    #[test]
    fn count_reflects_membership() {
        let mut server = server_with("c1", &["a", "b"]);
        let remove = ConvCommand::with_members(vec!["b".into()]);
        server.handle("a", command(Operation::Remove, "c1", remove));

        let response = server.handle("a", command(Operation::Count, "c1", ConvCommand::new()));
        assert_eq!(response.conversation_ack.and_then(|a| a.count), Some(1));
    }

    #[test]
    fn mute_is_per_sender() {
        let mut server = server_with("c1", &["a", "b"]);
        server.handle("a", command(Operation::Mute, "c1", ConvCommand::new()));

        assert!(server.snapshot("c1", "a").unwrap().muted);
        assert!(!server.snapshot("c1", "b").unwrap().muted);
    }

    #[test]
    fn messages_get_sequential_ids_and_stepped_clock() {
        let mut server = server_with("c1", &[]);
        let first = server.handle("a", message("c1", "t1")).direct_ack.unwrap();
        let second = server.handle("a", message("c1", "t2")).direct_ack.unwrap();

        assert_eq!(first.message_id.as_deref(), Some("msg-1"));
        assert_eq!(second.message_id.as_deref(), Some("msg-2"));
        assert_eq!(
            second.server_time.unwrap() - first.server_time.unwrap(),
            server.config().clock_step_millis
        );
    }

    #[test]
    fn redelivered_token_returns_original_ack() {
        let mut server = server_with("c1", &[]);
        let first = server.handle("a", message("c1", "t1")).direct_ack.unwrap();
        let again = server.handle("a", message("c1", "t1")).direct_ack.unwrap();

        assert_eq!(first, again);
        assert_eq!(server.messages("c1").len(), 1);
    }

    #[test]
    fn standing_rejection_refuses_messages() {
        let config = LoopbackConfig { reject_messages: Some(4301), ..Default::default() };
        let mut server = LoopbackServer::new(config);
        server.seed(ConversationData::new("c1"));

        let ack = server.handle("a", message("c1", "t1")).direct_ack.unwrap();

        assert_eq!(ack.error().map(|e| e.code), Some(4301));
        assert!(server.messages("c1").is_empty());
    }

    #[test]
    fn serial_is_echoed() {
        let mut server = server_with("c1", &[]);
        let mut envelope = command(Operation::Count, "c1", ConvCommand::new());
        envelope.serial = Some(7);

        assert_eq!(server.handle("a", envelope).serial, Some(7));
    }

    #[test]
    fn dates_render_in_configured_format() {
        assert_eq!(render(DateFormat::Millis, 0), WireDate::Millis(0));
        assert_eq!(render(DateFormat::Iso, 0), WireDate::Iso("1970-01-01T00:00:00.000Z".into()));
        assert_eq!(render(DateFormat::Typed, 0), WireDate::typed("1970-01-01T00:00:00.000Z"));
    }
}
