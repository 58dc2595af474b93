use std::collections::HashSet;

use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use super::interactions::InteractionLedger;
use crate::domain::{
    AccountSummary, Conversation, ConversationDetail, Message, MessageInput, MessageView,
    NewGroup, ParticipantSummary, ReadReceipt, DELETED_MESSAGE_TEXT,
};
use crate::error::{AppError, AppResult};
use crate::repository::Stores;

/// Direct and group conversations
#[derive(Clone)]
pub struct MessagingService {
    stores: Stores,
    ledger: InteractionLedger,
    online_window: Duration,
}

impl MessagingService {
    pub fn new(stores: Stores, ledger: InteractionLedger, online_window: Duration) -> Self {
        Self {
            stores,
            ledger,
            online_window,
        }
    }

    async fn participant_conversation(&self, viewer: Uuid, id: Uuid) -> AppResult<Conversation> {
        let conversation = self
            .stores
            .messaging
            .get_conversation(id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| AppError::not_found("Conversation"))?;
        if !conversation.has_participant(viewer) {
            return Err(AppError::forbidden("Not a participant of this conversation"));
        }
        Ok(conversation)
    }

    /// Existing direct conversation with `other`, or a new one.
    /// There is at most one direct conversation per unordered pair.
    pub async fn open_direct(&self, viewer: Uuid, other: Uuid) -> AppResult<Conversation> {
        if viewer == other {
            return Err(AppError::validation("Cannot start a conversation with yourself"));
        }
        if self.stores.accounts.get_account(other).await?.is_none() {
            return Err(AppError::not_found("User"));
        }
        if let Some(existing) = self
            .stores
            .messaging
            .find_direct_conversation(viewer, other)
            .await?
        {
            return Ok(existing);
        }

        let conversation = self
            .stores
            .messaging
            .insert_conversation(&Conversation::direct(viewer, other, Utc::now()))
            .await?;
        info!(conversation = %conversation.id, a = %viewer, b = %other, "Direct conversation opened");
        Ok(conversation)
    }

    /// Group with the viewer as admin; needs at least two distinct members
    pub async fn create_group(&self, viewer: Uuid, input: NewGroup) -> AppResult<Conversation> {
        input.validate()?;
        let mut members: HashSet<Uuid> = input.participants.into_iter().collect();
        members.insert(viewer);
        if members.len() < 2 {
            return Err(AppError::validation("A group needs at least two participants"));
        }

        let ids: Vec<Uuid> = members.into_iter().collect();
        let known = self.stores.accounts.get_accounts(&ids).await?;
        if known.len() != ids.len() {
            return Err(AppError::not_found("User"));
        }

        let conversation = self
            .stores
            .messaging
            .insert_conversation(&Conversation::group(
                viewer,
                ids,
                input.name.trim().to_string(),
                Utc::now(),
            ))
            .await?;
        info!(conversation = %conversation.id, admin = %viewer, "Group conversation created");
        Ok(conversation)
    }

    /// Messages oldest first. Opening a conversation marks every message
    /// from others as read by the viewer.
    pub async fn conversation_detail(&self, viewer: Uuid, id: Uuid) -> AppResult<ConversationDetail> {
        let conversation = self.participant_conversation(viewer, id).await?;

        let mut messages = self.stores.messaging.list_messages(id).await?;
        for message in messages.iter_mut() {
            if InteractionLedger::is_unread(viewer, message)
                && self.ledger.mark_read_unchecked(viewer, message).await?
            {
                message.read_by.push(ReadReceipt {
                    user_id: viewer,
                    read_at: Utc::now(),
                });
            }
        }

        let now = Utc::now();
        let others: Vec<Uuid> = conversation.others(viewer).collect();
        let accounts = self.stores.accounts.get_accounts(&others).await?;
        let participants = others
            .iter()
            .filter_map(|id| accounts.get(id))
            .map(|account| ParticipantSummary {
                account: AccountSummary::from(account),
                is_online: account.is_online(now, self.online_window),
                last_active: account.last_active,
            })
            .collect();

        Ok(ConversationDetail {
            id: conversation.id,
            is_group: conversation.is_group,
            group_name: conversation.group_name,
            group_admin: conversation.group_admin,
            participants,
            messages: messages
                .into_iter()
                .map(|m| MessageView::for_viewer(m, viewer))
                .collect(),
        })
    }

    /// Text or media is required; the sender is recorded as the first reader
    pub async fn send(
        &self,
        viewer: Uuid,
        conversation_id: Uuid,
        input: MessageInput,
    ) -> AppResult<MessageView> {
        input.validate()?;
        if !input.has_content() {
            return Err(AppError::validation("Message text or media is required"));
        }
        self.participant_conversation(viewer, conversation_id)
            .await?;

        let message = Message::new(conversation_id, viewer, input, Utc::now());
        self.stores.messaging.insert_message(&message).await?;
        info!(conversation = %conversation_id, sender = %viewer, message = %message.id, "Message sent");
        Ok(MessageView::for_viewer(message, viewer))
    }

    /// Sender-only soft delete
    pub async fn delete_message(&self, viewer: Uuid, id: Uuid) -> AppResult<MessageView> {
        let message = self
            .stores
            .messaging
            .get_message(id)
            .await?
            .ok_or_else(|| AppError::not_found("Message"))?;
        if message.sender_id != viewer {
            return Err(AppError::forbidden("Only the sender can delete this message"));
        }
        let deleted = self
            .stores
            .messaging
            .soft_delete_message(id, DELETED_MESSAGE_TEXT, Utc::now())
            .await?
            .ok_or_else(|| AppError::not_found("Message"))?;
        Ok(MessageView::for_viewer(deleted, viewer))
    }
}
