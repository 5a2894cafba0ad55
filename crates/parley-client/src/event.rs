//! Server-pushed conversation events.
//!
//! Events carry changes made elsewhere (another client joined, a message
//! arrived). Applying one mutates local state directly; nothing is sent and
//! no notification is raised.

use crate::{conversation::Conversation, ids::ClientId, message::Message, session::Session};

/// Change observed on the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    /// Participants joined.
    MembersJoined {
        /// Joined participants
        members: Vec<ClientId>,
        /// Who invited them
        invited_by: Option<ClientId>,
    },
    /// Participants left or were removed.
    MembersLeft {
        /// Departed participants
        members: Vec<ClientId>,
        /// Who removed them
        kicked_by: Option<ClientId>,
    },
    /// The local client was removed.
    Kicked {
        /// Who removed the local client
        kicked_by: Option<ClientId>,
    },
    /// A message arrived.
    MessageReceived(Message),
}

impl<S: Session> Conversation<S> {
    /// Apply a server-pushed event to local state.
    ///
    /// Membership events are ignored for transient conversations.
    pub fn apply_event(&self, event: ConversationEvent) {
        let local_id = self.session().local_id();
        let transient = self.is_transient();
        let mut state = self.state();

        match event {
            ConversationEvent::MembersJoined { members, invited_by } => {
                if transient {
                    return;
                }
                tracing::debug!(
                    conversation_id = %self.id(),
                    joined = members.len(),
                    invited_by = ?invited_by,
                    "members joined"
                );
                state.members.extend(members);
            },
            ConversationEvent::MembersLeft { members, kicked_by } => {
                if transient {
                    return;
                }
                tracing::debug!(
                    conversation_id = %self.id(),
                    left = members.len(),
                    kicked_by = ?kicked_by,
                    "members left"
                );
                for member in &members {
                    state.members.remove(member);
                }
            },
            ConversationEvent::Kicked { kicked_by } => {
                if transient {
                    return;
                }
                tracing::debug!(conversation_id = %self.id(), kicked_by = ?kicked_by, "kicked");
                state.members.remove(&local_id);
            },
            ConversationEvent::MessageReceived(message) => {
                tracing::debug!(
                    conversation_id = %self.id(),
                    message_id = ?message.id(),
                    "message received"
                );
                if let Some(timestamp) = message.timestamp() {
                    state.last_message_at = Some(timestamp);
                }
                state.last_message = Some(message);
            },
        }
    }
}
