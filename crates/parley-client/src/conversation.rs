//! Conversation aggregate.
//!
//! A [`Conversation`] is a cheap, clonable handle over shared state. All
//! operations take `&self`, so several of them may be in flight at once on
//! the same conversation.
//!
//! # Concurrency
//!
//! There is no per-conversation serialization. State is locked only for the
//! instant it is read or mutated, never across a round-trip. Consequences:
//!
//! - Concurrent saves race; the last commit to run wins.
//! - An edit staged while a save is in flight is swept into that save's
//!   commit, because the commit reads the staged fields when the response
//!   arrives, not when the save was issued.

use std::{
    collections::BTreeSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use parley_proto::{ConvCommand, ConversationData, DirectCommand, Envelope, Operation, WireDate};
use serde_json::Value;

use crate::{
    Attributes,
    error::{ConversationError, SendError},
    ids::{ClientId, ConversationId, MessageId, Participants},
    message::Message,
    overlay::{Pending, PendingOverlay, StageMode},
    query::{ConversationQuery, Query},
    round_trip::{conversation_ack, conversation_envelope, direct_ack, exchange},
    session::Session,
    timestamp,
};

/// Mutable part of a conversation.
#[derive(Debug)]
pub(crate) struct ConversationState {
    pub(crate) overlay: PendingOverlay,
    pub(crate) members: BTreeSet<ClientId>,
    pub(crate) muted_members: BTreeSet<ClientId>,
    pub(crate) muted: bool,
    pub(crate) created_at: Option<DateTime<Utc>>,
    pub(crate) updated_at: Option<DateTime<Utc>>,
    pub(crate) last_message_at: Option<DateTime<Utc>>,
    pub(crate) last_message: Option<Message>,
}

#[derive(Debug)]
struct Inner<S> {
    id: ConversationId,
    transient: bool,
    creator: Option<ClientId>,
    session: S,
    state: Mutex<ConversationState>,
}

/// Client-side proxy for one conversation.
///
/// # Invariants
///
/// - `id` and `transient` never change after construction.
/// - `members` never holds duplicates.
/// - Transient conversations send membership and mute commands but never
///   apply their local effects.
#[derive(Debug)]
pub struct Conversation<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for Conversation<S> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<S> Conversation<S> {
    /// Build a conversation from a query result or server push.
    ///
    /// Duplicate member ids collapse.
    ///
    /// # Errors
    ///
    /// - `ConversationError::InvalidArgument` if the id is empty or a date
    ///   field cannot be decoded
    pub fn from_snapshot(data: ConversationData, session: S) -> Result<Self, ConversationError> {
        let id = ConversationId::new(data.id)?;

        let state = ConversationState {
            overlay: PendingOverlay::new(data.name, data.attributes),
            members: data.members.into_iter().map(ClientId::from).collect(),
            muted_members: data.muted_members.into_iter().map(ClientId::from).collect(),
            muted: data.muted,
            created_at: decode_snapshot_date("createdAt", data.created_at.as_ref())?,
            updated_at: decode_snapshot_date("updatedAt", data.updated_at.as_ref())?,
            last_message_at: decode_snapshot_date("lastMessageAt", data.last_message_at.as_ref())?,
            last_message: None,
        };

        tracing::debug!(conversation_id = %id, members = state.members.len(), "conversation loaded");

        Ok(Self {
            inner: Arc::new(Inner {
                id,
                transient: data.transient,
                creator: data.creator.map(ClientId::from),
                session,
                state: Mutex::new(state),
            }),
        })
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ConversationState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Conversation id.
    pub fn id(&self) -> &ConversationId {
        &self.inner.id
    }

    /// Transient conversations do not track membership client-side.
    pub fn is_transient(&self) -> bool {
        self.inner.transient
    }

    /// Client that created the conversation.
    pub fn creator(&self) -> Option<&ClientId> {
        self.inner.creator.as_ref()
    }

    /// Bound session.
    pub fn session(&self) -> &S {
        &self.inner.session
    }

    /// Staged name if present, else committed name.
    pub fn current_name(&self) -> Option<String> {
        self.state().overlay.current_name().map(str::to_string)
    }

    /// Staged attributes if present, else committed attributes.
    pub fn current_attributes(&self) -> Attributes {
        self.state().overlay.current_attributes().clone()
    }

    /// Last confirmed name.
    pub fn committed_name(&self) -> Option<String> {
        self.state().overlay.committed_name().map(str::to_string)
    }

    /// Last confirmed attributes.
    pub fn committed_attributes(&self) -> Attributes {
        self.state().overlay.committed_attributes().clone()
    }

    /// Staged name state.
    pub fn pending_name(&self) -> Pending<String> {
        self.state().overlay.pending_name().clone()
    }

    /// Staged attributes state.
    pub fn pending_attributes(&self) -> Pending<Attributes> {
        self.state().overlay.pending_attributes().clone()
    }

    /// Returns true if any edit is waiting for [`Conversation::save`].
    pub fn has_pending_changes(&self) -> bool {
        self.state().overlay.has_staged()
    }

    /// Participants.
    pub fn members(&self) -> BTreeSet<ClientId> {
        self.state().members.clone()
    }

    /// Returns true if `id` is a participant.
    pub fn is_member(&self, id: &ClientId) -> bool {
        self.state().members.contains(id)
    }

    /// Participants who muted the conversation.
    pub fn muted_members(&self) -> BTreeSet<ClientId> {
        self.state().muted_members.clone()
    }

    /// Whether the local client muted the conversation.
    pub fn is_muted(&self) -> bool {
        self.state().muted
    }

    /// Creation time.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.state().created_at
    }

    /// Server time of the last confirmed update.
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.state().updated_at
    }

    /// Time of the last message.
    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        self.state().last_message_at
    }

    /// Last acknowledged or received message.
    pub fn last_message(&self) -> Option<Message> {
        self.state().last_message.clone()
    }

    /// Stage a new name. Takes effect on the next successful save.
    pub fn stage_name(&self, name: impl Into<String>) {
        let name = name.into();
        tracing::debug!(conversation_id = %self.id(), %name, "stage name");
        self.state().overlay.stage_name(name);
    }

    /// Stage a whole attribute map.
    ///
    /// # Errors
    ///
    /// - `ConversationError::InvalidArgument` if `map` is not a JSON object
    pub fn stage_attributes(&self, map: Value, mode: StageMode) -> Result<(), ConversationError> {
        tracing::debug!(conversation_id = %self.id(), ?mode, %map, "stage attributes");
        self.state().overlay.stage_attributes(map, mode)
    }

    /// Stage a single attribute.
    pub fn stage_attribute(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        tracing::debug!(conversation_id = %self.id(), %key, %value, "stage attribute");
        self.state().overlay.stage_attribute(key, value);
    }

    fn envelope(&self, operation: Operation, command: ConvCommand) -> Envelope {
        conversation_envelope(self.id(), operation, command)
    }
}

impl<S: Session> Conversation<S> {
    /// Commit staged edits through the server.
    ///
    /// Resolves immediately, without a network call, when nothing is staged.
    /// On success `updated_at` takes the server's timestamp and every field
    /// staged at the moment the response arrives is committed. On failure
    /// staged edits stay in place for a retry.
    pub async fn save(&self) -> Result<&Self, ConversationError> {
        let payload = self.state().overlay.save_payload();
        let Some(payload) = payload else {
            tracing::debug!(conversation_id = %self.id(), "nothing staged, save skipped");
            return Ok(self);
        };

        let envelope =
            self.envelope(Operation::Update, ConvCommand::with_attr_payload(payload.to_string()));
        let response = exchange(&self.inner.session, envelope).await?;

        let updated_at = conversation_ack(response)
            .updated_at
            .ok_or_else(|| ConversationError::malformed(Operation::Update, "missing updatedAt"))?;
        let updated_at = timestamp::decode_date(&updated_at)
            .map_err(|e| ConversationError::malformed(Operation::Update, e.to_string()))?;

        let mut state = self.state();
        state.updated_at = Some(updated_at);
        state.overlay.commit();
        tracing::debug!(conversation_id = %self.id(), %updated_at, "staged edits committed");
        drop(state);

        Ok(self)
    }

    /// Mute the conversation for the local client.
    pub async fn mute(&self) -> Result<&Self, ConversationError> {
        self.set_muted(true).await
    }

    /// Unmute the conversation for the local client.
    pub async fn unmute(&self) -> Result<&Self, ConversationError> {
        self.set_muted(false).await
    }

    async fn set_muted(&self, muted: bool) -> Result<&Self, ConversationError> {
        let operation = if muted { Operation::Mute } else { Operation::Unmute };
        let local_id = self.inner.session.local_id();

        exchange(&self.inner.session, self.envelope(operation, ConvCommand::new())).await?;

        if self.is_transient() {
            return Ok(self);
        }

        let mut state = self.state();
        state.muted = muted;
        if muted {
            state.muted_members.insert(local_id);
        } else {
            state.muted_members.remove(&local_id);
        }
        tracing::debug!(conversation_id = %self.id(), muted, "mute state applied");
        drop(state);

        Ok(self)
    }

    /// Participant count as reported by the server.
    pub async fn count(&self) -> Result<u64, ConversationError> {
        let response =
            exchange(&self.inner.session, self.envelope(Operation::Count, ConvCommand::new()))
                .await?;

        conversation_ack(response)
            .count
            .ok_or_else(|| ConversationError::malformed(Operation::Count, "missing count"))
    }

    /// Add participants.
    ///
    /// On success the requested ids are unioned into `members`; the server's
    /// acceptance is taken to mean exactly this delta.
    ///
    /// # Errors
    ///
    /// - `ConversationError::InvalidArgument` if no ids are given
    pub async fn add(
        &self,
        participants: impl Into<Participants>,
    ) -> Result<&Self, ConversationError> {
        self.change_members(Operation::Add, participants.into()).await
    }

    /// Remove participants.
    ///
    /// On success the requested ids are subtracted from `members`.
    ///
    /// # Errors
    ///
    /// - `ConversationError::InvalidArgument` if no ids are given
    pub async fn remove(
        &self,
        participants: impl Into<Participants>,
    ) -> Result<&Self, ConversationError> {
        self.change_members(Operation::Remove, participants.into()).await
    }

    async fn change_members(
        &self,
        operation: Operation,
        participants: Participants,
    ) -> Result<&Self, ConversationError> {
        if participants.is_empty() {
            return Err(ConversationError::invalid_argument(format!(
                "{operation} needs at least one participant id"
            )));
        }

        let command = ConvCommand::with_members(participants.to_wire());
        exchange(&self.inner.session, self.envelope(operation, command)).await?;

        if self.is_transient() {
            return Ok(self);
        }

        let mut state = self.state();
        for id in participants {
            if operation == Operation::Add {
                state.members.insert(id);
            } else {
                state.members.remove(&id);
            }
        }
        tracing::debug!(
            conversation_id = %self.id(),
            %operation,
            members = state.members.len(),
            "membership applied"
        );
        drop(state);

        Ok(self)
    }

    /// Send a message into this conversation.
    ///
    /// Takes ownership of the message, binds it to this conversation and the
    /// session's client, and returns it acknowledged (server id and timestamp
    /// assigned). It also becomes the conversation's last message.
    ///
    /// # Errors
    ///
    /// On failure the message comes back inside [`SendError`] without an id
    /// or timestamp, so a retry reuses its dedup token. Sending a message
    /// that was already acknowledged fails with
    /// `ConversationError::InvalidArgument`.
    pub async fn send(&self, mut message: Message) -> Result<Message, SendError> {
        if message.is_acknowledged() {
            return Err(SendError::new(
                ConversationError::invalid_argument("message was already sent"),
                message,
            ));
        }

        message.bind(self.id().clone(), self.inner.session.local_id());

        let body = match message.content().to_body() {
            Ok(body) => body,
            Err(e) => return Err(SendError::new(e, message)),
        };

        let envelope = Envelope::direct(DirectCommand {
            body,
            conversation_id: self.id().as_str().to_string(),
            needs_receipt: message.needs_receipt(),
            is_transient: message.is_transient(),
            dedup_token: message.dedup_token().to_string(),
        });

        match self.deliver(envelope).await {
            Ok((id, timestamp)) => {
                message.acknowledge(id, timestamp);

                let mut state = self.state();
                state.last_message = Some(message.clone());
                state.last_message_at = Some(timestamp);
                tracing::debug!(
                    conversation_id = %self.id(),
                    message_id = ?message.id(),
                    "message acknowledged"
                );
                drop(state);

                Ok(message)
            },
            Err(e) => Err(SendError::new(e, message)),
        }
    }

    async fn deliver(
        &self,
        envelope: Envelope,
    ) -> Result<(MessageId, DateTime<Utc>), ConversationError> {
        let response = exchange(&self.inner.session, envelope).await?;
        let ack = direct_ack(response)?;

        let id = ack.message_id.ok_or_else(|| {
            ConversationError::malformed(Operation::DirectMessage, "missing messageId")
        })?;
        let server_time = ack.server_time.ok_or_else(|| {
            ConversationError::malformed(Operation::DirectMessage, "missing serverTime")
        })?;
        let timestamp = timestamp::from_server_time(server_time)
            .map_err(|e| ConversationError::malformed(Operation::DirectMessage, e.to_string()))?;

        Ok((MessageId::from(id), timestamp))
    }
}

impl<S: Session + ConversationQuery> Conversation<S> {
    /// Ask the query collaborator to refresh this conversation.
    ///
    /// Applying the refreshed data is the collaborator's job; the result is
    /// not merged here.
    pub async fn fetch(&self) -> Result<&Self, ConversationError> {
        let results = self.inner.session.execute(Query::by_id(self.id())).await?;
        tracing::debug!(conversation_id = %self.id(), results = results.len(), "fetched");
        Ok(self)
    }
}

fn decode_snapshot_date(
    field: &str,
    date: Option<&WireDate>,
) -> Result<Option<DateTime<Utc>>, ConversationError> {
    date.map(timestamp::decode_date)
        .transpose()
        .map_err(|e| ConversationError::invalid_argument(format!("snapshot {field}: {e}")))
}
