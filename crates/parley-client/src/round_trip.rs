//! Command round-trip engine.
//!
//! Turns an operation into a correlated request/response exchange. The engine
//! never touches conversation state; it returns the ack the caller needs to
//! drive its transition, or the error that leaves state untouched.

use parley_proto::{ConvAck, ConvCommand, DirectAck, Envelope, Operation, Response};

use crate::{
    error::{ConversationError, RemoteError},
    ids::ConversationId,
    session::Session,
};

/// Conversation-scoped envelope stamped with `id`.
pub(crate) fn conversation_envelope(
    id: &ConversationId,
    operation: Operation,
    mut command: ConvCommand,
) -> Envelope {
    command.stamp(id.as_str());
    Envelope::conversation(operation, command)
}

/// Validate, send, and screen the response for an envelope-level error.
pub(crate) async fn exchange<S: Session>(
    session: &S,
    envelope: Envelope,
) -> Result<Response, ConversationError> {
    envelope.validate()?;

    let operation = envelope.operation;
    let conversation_id = envelope.conversation_id().unwrap_or_default().to_string();
    tracing::debug!(%conversation_id, %operation, "sending command");

    let response = session.send(envelope).await.inspect_err(|e| {
        tracing::debug!(%conversation_id, %operation, error = %e, "command transport failed");
    })?;

    if let Some(error) = response.error {
        tracing::warn!(
            %conversation_id,
            %operation,
            code = error.code,
            reason = error.reason.as_deref().unwrap_or(""),
            "command rejected by server"
        );
        return Err(RemoteError::from(error).into());
    }

    Ok(response)
}

/// Conversation ack of a response. Absent acks read as empty.
pub(crate) fn conversation_ack(response: Response) -> ConvAck {
    response.conversation_ack.unwrap_or_default()
}

/// Message ack of a response, with rejections turned into errors.
pub(crate) fn direct_ack(response: Response) -> Result<DirectAck, ConversationError> {
    let ack = response
        .direct_ack
        .ok_or_else(|| ConversationError::malformed(Operation::DirectMessage, "missing ack"))?;

    if let Some(error) = ack.error() {
        tracing::warn!(code = error.code, app_code = ?error.app_code, "message rejected by server");
        return Err(RemoteError::from(error).into());
    }

    Ok(ack)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parley_proto::ErrorPayload;

    use super::*;
    use crate::{ids::ClientId, session::TransportError};

    /// Session that counts sends and answers each with an empty response.
    #[derive(Default)]
    struct CountingSession {
        sends: AtomicUsize,
    }

    impl Session for CountingSession {
        fn local_id(&self) -> ClientId {
            ClientId::new("alice")
        }

        async fn send(&self, _envelope: Envelope) -> Result<Response, TransportError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(Response::default())
        }
    }

    /// INVARIANT: a conversation command without a conversation id never
    /// reaches the session.
    #[test]
    fn unstamped_command_is_never_sent() {
        let session = CountingSession::default();
        let envelope = Envelope::conversation(Operation::Mute, ConvCommand::new());

        let result = futures::executor::block_on(exchange(&session, envelope));

        assert_eq!(result.unwrap_err(), ConversationError::Identity { operation: Operation::Mute });
        assert_eq!(session.sends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stamped_command_is_sent_once() {
        let session = CountingSession::default();
        let id = ConversationId::new("c42").unwrap();
        let envelope = conversation_envelope(&id, Operation::Mute, ConvCommand::new());

        futures::executor::block_on(exchange(&session, envelope)).unwrap();

        assert_eq!(session.sends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn envelope_is_stamped_with_conversation_id() {
        let id = ConversationId::new("c42").unwrap();
        let envelope = conversation_envelope(&id, Operation::Count, ConvCommand::new());

        assert_eq!(envelope.operation, Operation::Count);
        assert_eq!(envelope.conversation_id(), Some("c42"));
        assert!(envelope.validate().is_ok());
    }

    #[test]
    fn missing_conversation_ack_reads_as_empty() {
        assert_eq!(conversation_ack(Response::default()), ConvAck::default());
    }

    #[test]
    fn missing_direct_ack_is_malformed() {
        assert!(matches!(
            direct_ack(Response::default()),
            Err(ConversationError::MalformedResponse { operation: Operation::DirectMessage, .. })
        ));
    }

    #[test]
    fn rejected_direct_ack_is_remote_error() {
        let payload = ErrorPayload::new(4301, "blocked").with_app_code(9);
        let result = direct_ack(Response::direct(DirectAck::rejected(&payload)));

        let err = result.unwrap_err();
        let remote = err.remote().unwrap();
        assert_eq!(remote.code, 4301);
        assert_eq!(remote.reason.as_deref(), Some("blocked"));
        assert_eq!(remote.app_code, Some(9));
    }
}
