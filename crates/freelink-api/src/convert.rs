//! Row -> wire conversions. Corrupt stored values are logged and replaced
//! with defaults instead of failing the whole response.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use freelink_db::models::{MessageRow, NotificationRow, UserRow};
use freelink_types::api::{MessageResponse, NotificationResponse, UserProfile};
use freelink_types::models::{MessageType, NotificationType};

pub(crate) fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::nil()
    })
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt timestamp '{}': {}", raw, e);
        DateTime::default()
    })
}

pub(crate) fn message_response(row: MessageRow) -> MessageResponse {
    let message_type = row.message_type.parse().unwrap_or_else(|e| {
        warn!("Message {}: {}", row.id, e);
        MessageType::Text
    });

    MessageResponse {
        id: parse_uuid(&row.id, "message id"),
        sender_id: parse_uuid(&row.sender_id, "sender_id"),
        receiver_id: parse_uuid(&row.receiver_id, "receiver_id"),
        conversation_id: parse_uuid(&row.conversation_id, "conversation_id"),
        created_at: parse_timestamp(&row.created_at),
        content: row.content,
        sender_username: row.sender_username,
        receiver_username: row.receiver_username,
        is_read: row.is_read,
        attachment_url: row.attachment_url,
        message_type,
    }
}

pub(crate) fn notification_response(row: NotificationRow) -> NotificationResponse {
    let notification_type = row.notification_type.parse().unwrap_or_else(|e| {
        warn!("Notification {}: {}", row.id, e);
        NotificationType::SystemAnnouncement
    });

    NotificationResponse {
        id: parse_uuid(&row.id, "notification id"),
        created_at: parse_timestamp(&row.created_at),
        notification_type,
        title: row.title,
        message: row.message,
        is_read: row.is_read,
        link: row.action_url,
        icon: row.icon,
    }
}

pub(crate) fn user_profile(row: UserRow) -> UserProfile {
    UserProfile {
        id: parse_uuid(&row.id, "user id"),
        created_at: parse_timestamp(&row.created_at),
        username: row.username,
        email: row.email,
        bio: row.bio,
        avatar_url: row.avatar_url,
        github_link: row.github_link,
        skills: row.skills,
        reputation_points: row.reputation_points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_stored_timestamps() {
        let rfc = parse_timestamp("2025-03-01T10:20:30.123456Z");
        assert_eq!(rfc.timestamp_subsec_micros(), 123456);

        // Only the RFC 3339 storage format is accepted.
        assert_eq!(parse_timestamp("2025-03-01 10:20:30"), DateTime::<Utc>::default());
        assert_eq!(parse_timestamp("garbage"), DateTime::<Utc>::default());
    }

    #[test]
    fn corrupt_uuid_becomes_nil() {
        assert_eq!(parse_uuid("not-a-uuid", "test"), Uuid::nil());
    }
}
