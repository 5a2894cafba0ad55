//! Message sends: binding, acknowledgment, rejection, and retry.

use futures::executor::block_on;
use parley_client::{Conversation, ConversationError, Message, MessageContent, TransportError};
use parley_harness::{LoopbackConfig, LoopbackSession};
use parley_proto::{ConversationData, DirectAck, Response};
use serde_json::json;

fn setup(config: LoopbackConfig) -> (LoopbackSession, Conversation<LoopbackSession>) {
    let session = LoopbackSession::new("alice", config);
    session.seed(ConversationData::new("c1"));

    let snapshot = session.snapshot("c1").expect("seeded conversation should exist");
    let conversation =
        Conversation::from_snapshot(snapshot, session.clone()).expect("snapshot should load");
    (session, conversation)
}

/// INVARIANT: An accepted send yields an acknowledged message that becomes
/// the conversation's last message.
#[test]
fn accepted_send_acknowledges_message() {
    let (session, conversation) = setup(LoopbackConfig::default());

    let sent = block_on(conversation.send(Message::text("hello"))).expect("send should succeed");

    assert_eq!(sent.id().map(|id| id.as_str()), Some("msg-1"));
    assert_eq!(sent.conversation_id().map(|id| id.as_str()), Some("c1"));
    assert_eq!(sent.sender_id().map(|id| id.as_str()), Some("alice"));
    assert!(sent.is_acknowledged());

    let stored = session.with_server(|server| server.messages("c1"));
    assert_eq!(stored.len(), 1);
    assert_eq!(sent.timestamp().map(|t| t.timestamp_millis()), Some(stored[0].server_time));

    assert_eq!(conversation.last_message(), Some(sent.clone()));
    assert_eq!(conversation.last_message_at(), sent.timestamp());
}

#[test]
fn envelope_carries_message_flags() {
    let (session, conversation) = setup(LoopbackConfig::default());
    let message = Message::text("hello").with_receipt(true).with_transient(true);
    let token = message.dedup_token().to_string();

    block_on(conversation.send(message)).expect("send should succeed");

    let sent = session.sent();
    let command = sent[0].direct_message.clone().expect("send carries a direct message");
    assert!(sent[0].conversation_command.is_none(), "Envelope families never mix");
    assert_eq!(command.conversation_id, "c1");
    assert!(command.needs_receipt);
    assert!(command.is_transient);
    assert_eq!(command.dedup_token, token);
}

#[test]
fn typed_content_is_sent_as_json_text() {
    let (session, conversation) = setup(LoopbackConfig::default());
    let message = Message::typed(&json!({"code": 128_075, "kind": "emoji"}))
        .expect("json is typed content");

    block_on(conversation.send(message)).expect("send should succeed");

    let stored = session.with_server(|server| server.messages("c1"));
    insta::assert_snapshot!(stored[0].body, @r#"{"code":128075,"kind":"emoji"}"#);
}

/// INVARIANT: A rejected send leaves both the message and the conversation
/// untouched.
#[test]
fn rejected_send_returns_unacknowledged_message() {
    let (_session, conversation) =
        setup(LoopbackConfig { reject_messages: Some(4301), ..Default::default() });

    let err = block_on(conversation.send(Message::text("hello")))
        .expect_err("rejected send should fail");

    assert_eq!(err.error.remote().map(|r| r.code), Some(4301));
    insta::assert_snapshot!(
        err,
        @"message send failed: remote operation failed with code 4301: message rejected"
    );

    let message = err.into_message();
    assert_eq!(message.id(), None, "Rejected message must not get an id");
    assert_eq!(message.timestamp(), None, "Rejected message must not get a timestamp");
    assert_eq!(conversation.last_message(), None);
    assert_eq!(conversation.last_message_at(), None);
}

#[test]
fn rejected_send_keeps_previous_last_message() {
    let (session, conversation) = setup(LoopbackConfig::default());
    let first = block_on(conversation.send(Message::text("first"))).expect("send should succeed");

    // Both an id and an error code: the code decides.
    let mut ack = DirectAck::accepted("msg-2", 1_700_000_999_000);
    ack.error_code = Some(4301);
    session.respond_next(Response::direct(ack));

    let err = block_on(conversation.send(Message::text("second")))
        .expect_err("ack with an error code should fail");

    assert_eq!(err.error.remote().map(|r| r.code), Some(4301));
    assert_eq!(err.into_message().id(), None);
    assert_eq!(conversation.last_message(), Some(first.clone()));
    assert_eq!(conversation.last_message_at(), first.timestamp());
}

#[test]
fn retry_reuses_dedup_token() {
    let (session, conversation) = setup(LoopbackConfig::default());
    session.fail_next(TransportError::Disconnected);

    let err = block_on(conversation.send(Message::text("hello"))).expect_err("send should fail");
    assert!(err.error.is_retryable());

    let retried = block_on(conversation.send(err.into_message())).expect("retry should succeed");

    let tokens: Vec<String> = session
        .sent()
        .into_iter()
        .filter_map(|e| e.direct_message.map(|m| m.dedup_token))
        .collect();
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0], tokens[1], "Retry must reuse the dedup token");
    assert_eq!(tokens[1], retried.dedup_token().to_string());
}

#[test]
fn acknowledged_message_cannot_be_sent_again() {
    let (session, conversation) = setup(LoopbackConfig::default());
    let sent = block_on(conversation.send(Message::text("hello"))).expect("send should succeed");

    let err = block_on(conversation.send(sent)).expect_err("re-send should fail");

    assert!(matches!(err.error, ConversationError::InvalidArgument { .. }));
    assert_eq!(session.call_count(), 1, "Re-send must not reach the session");
}

#[test]
fn ack_without_message_id_is_malformed() {
    let (session, conversation) = setup(LoopbackConfig::default());
    let ack = DirectAck { server_time: Some(0), ..DirectAck::default() };
    session.respond_next(Response::direct(ack));

    let err = block_on(conversation.send(Message::text("hello"))).expect_err("send should fail");

    assert!(matches!(err.error, ConversationError::MalformedResponse { .. }));
    assert_eq!(err.message.id(), None);
    assert_eq!(conversation.last_message(), None);
}

#[test]
fn sent_message_keeps_its_content() {
    let (_session, conversation) = setup(LoopbackConfig::default());
    let sent = block_on(conversation.send(Message::text("hello"))).expect("send should succeed");

    assert_eq!(sent.content(), &MessageContent::Text("hello".to_string()));
}
