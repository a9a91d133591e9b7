//! Per-connection session state.
//!
//! A `Session` exists only after authentication succeeds: the user identity
//! is set exactly once at construction. `connect` runs the
//! Authenticated → Active transition, `handle_event` services the Active
//! loop, and `disconnect` tears everything down. Every store call happens
//! outside the registry and router locks.

use crate::broadcast::Broadcaster;
use crate::presence::PresenceRegistry;
use crate::rooms::RoomRouter;
use crate::store::MessageStore;
use murmur_core::events::{
    DeleteMessage, EditMessage, MessageDeleted, MessageEdited, SendMessage, TypingNotice,
    TypingPayload,
};
use murmur_core::{ChatError, ChatResult, ClientEvent, ServerEvent, SharedPostStub};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Session {
    conn_id: u64,
    user_id: String,
    presence: Arc<PresenceRegistry>,
    rooms: Arc<RoomRouter>,
    broadcaster: Arc<Broadcaster>,
    store: Arc<dyn MessageStore>,
    /// Conversations this connection is currently flagged as typing in.
    typing_in: HashSet<String>,
}

impl Session {
    pub fn new(
        conn_id: u64,
        user_id: String,
        presence: Arc<PresenceRegistry>,
        rooms: Arc<RoomRouter>,
        broadcaster: Arc<Broadcaster>,
        store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            conn_id,
            user_id,
            presence,
            rooms,
            broadcaster,
            store,
            typing_in: HashSet::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Authenticated → Active: register presence, auto-join every
    /// conversation the user belongs to, send the online roster to this
    /// connection alone, and announce the online transition iff this is the
    /// user's first connection.
    pub async fn connect(&mut self) -> ChatResult<()> {
        // The online transition is the side effect of registration itself;
        // it fires before any fallible store call so a teardown after a
        // failed auto-join always pairs offline with a prior online.
        let first = self.presence.register(&self.user_id, self.conn_id).await;
        if first {
            self.broadcaster
                .broadcast_global(
                    &ServerEvent::UserOnline(self.user_id.clone()),
                    Some(self.conn_id),
                )
                .await;
        }

        let conversations = self.store.conversations_for(&self.user_id).await?;
        let ids: Vec<String> = conversations.into_iter().map(|c| c.id).collect();
        self.rooms.join_all(&ids, self.conn_id).await;

        let roster = self.presence.snapshot().await;
        self.broadcaster
            .send_to(self.conn_id, ServerEvent::OnlineUsersList(roster))
            .await;

        info!(user = %self.user_id, conn_id = self.conn_id, rooms = ids.len(), "session active");
        Ok(())
    }

    /// Service one inbound event. Failures are confined to this event: the
    /// originating connection gets an `error` frame and the session stays
    /// active.
    pub async fn handle_event(&mut self, event: ClientEvent) {
        let result = match event {
            ClientEvent::JoinConversation(conversation_id) => {
                self.handle_join(&conversation_id).await
            }
            ClientEvent::SendMessage(payload) => self.handle_send(payload).await,
            ClientEvent::EditMessage(payload) => self.handle_edit(payload).await,
            ClientEvent::DeleteMessage(payload) => self.handle_delete(payload).await,
            ClientEvent::Typing(payload) => self.handle_typing(payload, true).await,
            ClientEvent::StopTyping(payload) => self.handle_typing(payload, false).await,
        };

        if let Err(e) = result {
            warn!(
                user = %self.user_id,
                conn_id = self.conn_id,
                error = %e,
                "event handling failed"
            );
            self.send_error(&e).await;
        }
    }

    /// Report a per-event failure to this connection only.
    pub async fn send_error(&self, error: &ChatError) {
        self.broadcaster
            .send_to(self.conn_id, ServerEvent::Error(error.to_string()))
            .await;
    }

    /// Active → Closed: emit stop-typing for any conversation this
    /// connection was still flagged as typing in, leave every room, and
    /// unregister presence (announcing offline iff this was the user's
    /// last connection).
    pub async fn disconnect(&mut self) {
        let still_typing: Vec<String> = self.typing_in.drain().collect();
        for conversation_id in still_typing {
            let targets = self.rooms.subscribers(&conversation_id).await;
            self.broadcaster
                .broadcast(
                    &targets,
                    &ServerEvent::UserStopTyping(TypingNotice {
                        conversation_id,
                        user_id: self.user_id.clone(),
                    }),
                    Some(self.conn_id),
                )
                .await;
        }

        self.rooms.leave_all(self.conn_id).await;
        let last = self.presence.unregister(&self.user_id, self.conn_id).await;
        if last {
            self.broadcaster
                .broadcast_global(&ServerEvent::UserOffline(self.user_id.clone()), None)
                .await;
        }
        self.broadcaster.remove(self.conn_id).await;
        info!(user = %self.user_id, conn_id = self.conn_id, "session closed");
    }

    async fn handle_join(&self, conversation_id: &str) -> ChatResult<()> {
        match self.store.find_conversation(conversation_id).await? {
            Some(conv) if conv.has_participant(&self.user_id) => {
                self.rooms.join(conversation_id, self.conn_id).await;
                Ok(())
            }
            _ => Err(ChatError::NotAParticipant(conversation_id.to_string())),
        }
    }

    async fn handle_send(&mut self, payload: SendMessage) -> ChatResult<()> {
        // Room membership alone is not trusted: re-validate against the
        // store before persisting.
        if !self
            .store
            .is_participant(&payload.conversation_id, &self.user_id)
            .await?
        {
            return Err(ChatError::NotAParticipant(payload.conversation_id));
        }

        let shared_post = payload.shared_post_id.map(|id| SharedPostStub {
            id,
            title: payload.shared_post_title.unwrap_or_default(),
        });

        let message = self
            .store
            .create_message(
                &payload.conversation_id,
                &self.user_id,
                &payload.content,
                shared_post,
            )
            .await?;

        let conversation_id = message.conversation_id.clone();
        let targets = self.rooms.subscribers(&conversation_id).await;
        self.broadcaster
            .broadcast(&targets, &ServerEvent::ReceiveMessage(message), None)
            .await;

        // Sending implies the sender is no longer typing.
        self.typing_in.remove(&conversation_id);
        self.broadcaster
            .broadcast(
                &targets,
                &ServerEvent::UserStopTyping(TypingNotice {
                    conversation_id,
                    user_id: self.user_id.clone(),
                }),
                Some(self.conn_id),
            )
            .await;
        Ok(())
    }

    async fn handle_edit(&self, payload: EditMessage) -> ChatResult<()> {
        let author = self.store.find_message_author(&payload.message_id).await?;
        if author.as_deref() != Some(self.user_id.as_str()) {
            return Err(ChatError::NotMessageAuthor(payload.message_id));
        }

        let updated = self
            .store
            .update_message_content(&payload.message_id, &payload.new_content)
            .await?;

        let targets = self.rooms.subscribers(&payload.conversation_id).await;
        self.broadcaster
            .broadcast(
                &targets,
                &ServerEvent::MessageEdited(MessageEdited {
                    message_id: payload.message_id,
                    new_content: updated.content,
                    is_edited: updated.is_edited,
                    conversation_id: payload.conversation_id,
                }),
                None,
            )
            .await;
        Ok(())
    }

    async fn handle_delete(&self, payload: DeleteMessage) -> ChatResult<()> {
        // Deletion is author-only, same check as edit.
        let author = self.store.find_message_author(&payload.message_id).await?;
        if author.as_deref() != Some(self.user_id.as_str()) {
            return Err(ChatError::NotMessageAuthor(payload.message_id));
        }

        self.store.delete_message(&payload.message_id).await?;

        let targets = self.rooms.subscribers(&payload.conversation_id).await;
        self.broadcaster
            .broadcast(
                &targets,
                &ServerEvent::MessageDeleted(MessageDeleted {
                    deleted_message_id: payload.message_id,
                    conversation_id: payload.conversation_id,
                }),
                None,
            )
            .await;
        Ok(())
    }

    async fn handle_typing(&mut self, payload: TypingPayload, start: bool) -> ChatResult<()> {
        let conversation_id = payload.conversation_id;
        if start {
            self.typing_in.insert(conversation_id.clone());
        } else {
            self.typing_in.remove(&conversation_id);
        }

        let notice = TypingNotice {
            conversation_id: conversation_id.clone(),
            user_id: self.user_id.clone(),
        };
        let event = if start {
            ServerEvent::UserTyping(notice)
        } else {
            ServerEvent::UserStopTyping(notice)
        };

        let targets = self.rooms.subscribers(&conversation_id).await;
        debug!(
            user = %self.user_id,
            conversation = %conversation_id,
            start,
            "typing indicator"
        );
        self.broadcaster
            .broadcast(&targets, &event, Some(self.conn_id))
            .await;
        Ok(())
    }
}
