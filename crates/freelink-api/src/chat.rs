use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use freelink_db::models::{InboxRow, NewMessage};
use freelink_db::{Database, now_timestamp};
use freelink_gateway::dispatcher::Dispatcher;
use freelink_types::api::{
    Claims, ConversationSummary, MessageResponse, PageQuery, SendMessageRequest,
};
use freelink_types::events::GatewayEvent;
use freelink_types::models::MessageType;

use crate::convert::{message_response, parse_timestamp, parse_uuid};
use crate::error::ApiError;
use crate::notifier::{NotificationJob, Notifier};
use crate::run_blocking;

pub const MAX_CONTENT_CHARS: usize = 1000;
pub const DEFAULT_HISTORY_SIZE: u32 = 50;
pub const DEFAULT_INBOX_SIZE: u32 = 20;

const UNKNOWN_USER: &str = "Unknown user";

/// Conversation, message and read-state operations shared by the REST handlers.
#[derive(Clone)]
pub struct ChatService {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    notifier: Notifier,
}

impl ChatService {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, notifier: Notifier) -> Self {
        Self {
            db,
            dispatcher,
            notifier,
        }
    }

    /// Idempotent: the same unordered pair always resolves to the same id.
    pub async fn find_or_create_private_conversation(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<Uuid, ApiError> {
        if user_a == user_b {
            return Err(ApiError::bad_request("Cannot start a conversation with yourself"));
        }

        let (a, b) = (user_a.to_string(), user_b.to_string());
        let new_id = Uuid::new_v4().to_string();
        let row = run_blocking(&self.db, move |db| {
            for id in [&a, &b] {
                if db.get_user_by_id(id)?.is_none() {
                    return Ok(Err(ApiError::not_found(format!("User {} not found", id))));
                }
            }
            let (row, created) = db.find_or_create_private_conversation(&new_id, &a, &b, &now_timestamp())?;
            if !created {
                debug!("Reusing conversation {} for {} and {}", row.id, a, b);
            }
            Ok(Ok(row))
        })
        .await??;

        Ok(parse_uuid(&row.id, "conversation id"))
    }

    pub async fn send_message(
        &self,
        sender: &Claims,
        req: SendMessageRequest,
    ) -> Result<MessageResponse, ApiError> {
        let content = req.content.trim().to_string();
        if content.is_empty() {
            return Err(ApiError::bad_request("Message content cannot be empty"));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(ApiError::bad_request(format!(
                "Message content cannot exceed {} characters",
                MAX_CONTENT_CHARS
            )));
        }

        let message_type = req.message_type.unwrap_or_default();
        let attachment_url = req.attachment_url.filter(|url| !url.trim().is_empty());
        match message_type {
            MessageType::System => {
                return Err(ApiError::bad_request("SYSTEM messages cannot be sent by clients"));
            }
            MessageType::File if attachment_url.is_none() => {
                return Err(ApiError::bad_request("FILE messages require an attachmentUrl"));
            }
            _ => {}
        }

        let conversation_id = req.conversation_id;
        let conv = conversation_id.to_string();
        let participants = run_blocking(&self.db, move |db| {
            if db.get_conversation(&conv)?.is_none() {
                return Ok(None);
            }
            Ok(Some(db.get_participants(&conv)?))
        })
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation not found"))?;

        let sender_id = sender.sub.to_string();
        let me = participants
            .iter()
            .find(|p| p.user_id == sender_id)
            .ok_or_else(|| ApiError::bad_request("You are not a participant of this conversation"))?;
        let other = participants
            .iter()
            .find(|p| p.user_id != sender_id)
            .ok_or_else(|| ApiError::bad_request("Conversation has no other participant"))?;

        let message_id = Uuid::new_v4();
        let created_at = now_timestamp();

        {
            let (id, conv, from, to) = (
                message_id.to_string(),
                conversation_id.to_string(),
                sender_id.clone(),
                other.user_id.clone(),
            );
            let (content, attachment_url, created_at) =
                (content.clone(), attachment_url.clone(), created_at.clone());
            run_blocking(&self.db, move |db| {
                db.insert_message(&NewMessage {
                    id: &id,
                    conversation_id: &conv,
                    sender_id: &from,
                    receiver_id: &to,
                    content: &content,
                    attachment_url: attachment_url.as_deref(),
                    message_type: message_type.as_str(),
                    created_at: &created_at,
                })
            })
            .await?;
        }

        let response = MessageResponse {
            id: message_id,
            content,
            sender_id: sender.sub,
            sender_username: me.username.clone(),
            receiver_id: parse_uuid(&other.user_id, "receiver_id"),
            receiver_username: other.username.clone(),
            is_read: false,
            attachment_url,
            message_type,
            created_at: parse_timestamp(&created_at),
            conversation_id,
        };

        let delivered = self
            .dispatcher
            .send_to_user(&other.username, GatewayEvent::MessageCreate(response.clone()))
            .await;
        info!(
            "Message {} from {} to {} ({} live connections)",
            message_id, me.username, other.username, delivered
        );

        let job = NotificationJob::new_message(response.receiver_id, &other.username, &me.username);
        if let Err(e) = self.notifier.enqueue(job) {
            warn!("Could not queue message notification: {:#}", e);
        }

        Ok(response)
    }

    /// Newest first.
    pub async fn get_conversation_messages(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        page: PageQuery,
    ) -> Result<Vec<MessageResponse>, ApiError> {
        let (offset, limit) = page.offset_limit(DEFAULT_HISTORY_SIZE);
        let (conv, user) = (conversation_id.to_string(), user_id.to_string());
        let rows = run_blocking(&self.db, move |db| {
            if let Err(e) = check_participant(db, &conv, &user)? {
                return Ok(Err(e));
            }
            Ok(Ok(db.get_conversation_messages(&conv, offset, limit)?))
        })
        .await??;

        Ok(rows.into_iter().map(message_response).collect())
    }

    /// Marks every unread message addressed to `user_id` in the conversation.
    pub async fn mark_conversation_read(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<usize, ApiError> {
        let (conv, user) = (conversation_id.to_string(), user_id.to_string());
        let updated = run_blocking(&self.db, move |db| {
            if let Err(e) = check_participant(db, &conv, &user)? {
                return Ok(Err(e));
            }
            Ok(Ok(db.mark_conversation_read(&conv, &user)?))
        })
        .await??;

        debug!("{} marked {} messages read in {}", user_id, updated, conversation_id);
        Ok(updated)
    }

    /// Conversations with messages first (latest activity first), then empty
    /// conversations, newest first.
    pub async fn list_conversations(
        &self,
        user_id: Uuid,
        page: PageQuery,
    ) -> Result<Vec<ConversationSummary>, ApiError> {
        let (offset, limit) = page.offset_limit(DEFAULT_INBOX_SIZE);
        let user = user_id.to_string();
        let mut rows = run_blocking(&self.db, move |db| db.list_inbox(&user)).await?;

        rows.sort_by(inbox_order);

        Ok(rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(conversation_summary)
            .collect())
    }

    pub async fn delete_message(&self, user_id: Uuid, message_id: Uuid) -> Result<(), ApiError> {
        let (id, user) = (message_id.to_string(), user_id.to_string());
        run_blocking(&self.db, move |db| {
            let Some(msg) = db.get_message(&id)? else {
                return Ok(Err(ApiError::not_found("Message not found")));
            };
            if msg.sender_id != user {
                return Ok(Err(ApiError::forbidden("You can only delete your own messages")));
            }
            db.delete_message(&id)?;
            Ok(Ok(()))
        })
        .await??;

        info!("{} deleted message {}", user_id, message_id);
        Ok(())
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<i64, ApiError> {
        let user = user_id.to_string();
        run_blocking(&self.db, move |db| db.count_unread_messages(&user)).await
    }
}

/// Inner `Err` is the client-facing failure; the outer one is a storage error.
fn check_participant(db: &Database, conv: &str, user: &str) -> anyhow::Result<Result<(), ApiError>> {
    if db.get_conversation(conv)?.is_none() {
        return Ok(Err(ApiError::not_found("Conversation not found")));
    }
    if !db.is_participant(conv, user)? {
        return Ok(Err(ApiError::forbidden("You are not a participant of this conversation")));
    }
    Ok(Ok(()))
}

fn inbox_order(a: &InboxRow, b: &InboxRow) -> Ordering {
    match (&a.last_message_at, &b.last_message_at) {
        (Some(x), Some(y)) => y.cmp(x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => b.conversation_created_at.cmp(&a.conversation_created_at),
    }
}

fn conversation_summary(row: InboxRow) -> ConversationSummary {
    let (user_id, username) = match (row.other_user_id, row.other_username) {
        (Some(id), Some(name)) => (parse_uuid(&id, "participant id"), name),
        _ => {
            warn!("Conversation {} has no resolvable other participant", row.conversation_id);
            (Uuid::nil(), UNKNOWN_USER.to_string())
        }
    };

    ConversationSummary {
        conversation_id: parse_uuid(&row.conversation_id, "conversation id"),
        user_id,
        username,
        avatar_url: row.other_avatar_url,
        last_message_time: row.last_message_at.as_deref().map(parse_timestamp),
        unread_count: row.unread_count,
    }
}
