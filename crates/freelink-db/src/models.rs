/// Database row types. These map directly to SQLite rows and are kept
/// distinct from the freelink-types wire models.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub github_link: Option<String>,
    pub skills: Vec<String>,
    pub reputation_points: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewUser<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub bio: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub github_link: Option<&'a str>,
    pub skills: &'a [String],
    pub created_at: &'a str,
}

/// Partial profile update; `None` leaves the column untouched.
#[derive(Default)]
pub struct ProfileUpdate<'a> {
    pub bio: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub github_link: Option<&'a str>,
    pub skills: Option<&'a [String]>,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A conversation member joined with their directory record.
#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub user_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Message joined with sender/receiver usernames.
#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub receiver_id: String,
    pub receiver_username: String,
    pub content: String,
    pub is_read: bool,
    pub attachment_url: Option<String>,
    pub message_type: String,
    pub created_at: String,
}

pub struct NewMessage<'a> {
    pub id: &'a str,
    pub conversation_id: &'a str,
    pub sender_id: &'a str,
    pub receiver_id: &'a str,
    pub content: &'a str,
    pub attachment_url: Option<&'a str>,
    pub message_type: &'a str,
    pub created_at: &'a str,
}

/// Unsorted inbox row. `other_*` are `None` when the other participant
/// cannot be resolved.
#[derive(Debug, Clone)]
pub struct InboxRow {
    pub conversation_id: String,
    pub conversation_created_at: String,
    pub other_user_id: Option<String>,
    pub other_username: Option<String>,
    pub other_avatar_url: Option<String>,
    pub last_message_at: Option<String>,
    pub unread_count: i64,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
    pub icon: String,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub created_at: String,
}

pub struct NewNotification<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub notification_type: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub action_url: Option<&'a str>,
    pub icon: &'a str,
    pub created_at: &'a str,
}
