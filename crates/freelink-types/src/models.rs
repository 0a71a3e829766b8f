use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a stored or client-supplied enum tag is not recognised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant: {}", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    #[default]
    Text,
    File,
    /// Server-generated. Clients may not send these.
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::File => "FILE",
            Self::System => "SYSTEM",
        }
    }
}

impl FromStr for MessageType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(Self::Text),
            "FILE" => Ok(Self::File),
            "SYSTEM" => Ok(Self::System),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    ProjectApplication,
    ProjectAccepted,
    ProjectRejected,
    ProjectCompleted,
    NewMessage,
    ReviewReceived,
    BadgeEarned,
    SystemAnnouncement,
    PaymentReceived,
    DeadlineReminder,
}

impl NotificationType {
    pub const ALL: [NotificationType; 10] = [
        Self::ProjectApplication,
        Self::ProjectAccepted,
        Self::ProjectRejected,
        Self::ProjectCompleted,
        Self::NewMessage,
        Self::ReviewReceived,
        Self::BadgeEarned,
        Self::SystemAnnouncement,
        Self::PaymentReceived,
        Self::DeadlineReminder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectApplication => "PROJECT_APPLICATION",
            Self::ProjectAccepted => "PROJECT_ACCEPTED",
            Self::ProjectRejected => "PROJECT_REJECTED",
            Self::ProjectCompleted => "PROJECT_COMPLETED",
            Self::NewMessage => "NEW_MESSAGE",
            Self::ReviewReceived => "REVIEW_RECEIVED",
            Self::BadgeEarned => "BADGE_EARNED",
            Self::SystemAnnouncement => "SYSTEM_ANNOUNCEMENT",
            Self::PaymentReceived => "PAYMENT_RECEIVED",
            Self::DeadlineReminder => "DEADLINE_REMINDER",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ProjectApplication => "Project Application",
            Self::ProjectAccepted => "Application Accepted",
            Self::ProjectRejected => "Application Rejected",
            Self::ProjectCompleted => "Project Completed",
            Self::NewMessage => "New Message",
            Self::ReviewReceived => "Review Received",
            Self::BadgeEarned => "Badge Earned",
            Self::SystemAnnouncement => "System Announcement",
            Self::PaymentReceived => "Payment Received",
            Self::DeadlineReminder => "Deadline Reminder",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ProjectApplication => "When someone applies for your project",
            Self::ProjectAccepted => "When your application is accepted",
            Self::ProjectRejected => "When your application is rejected",
            Self::ProjectCompleted => "When a project is completed",
            Self::NewMessage => "When you receive a new message",
            Self::ReviewReceived => "When you receive a review",
            Self::BadgeEarned => "When you earn a new badge",
            Self::SystemAnnouncement => "Important platform announcements",
            Self::PaymentReceived => "When you receive a payment",
            Self::DeadlineReminder => "Project deadline reminders",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::ProjectApplication => "📝",
            Self::ProjectAccepted => "✅",
            Self::ProjectRejected => "❌",
            Self::ProjectCompleted => "🎉",
            Self::NewMessage => "💬",
            Self::ReviewReceived => "⭐",
            Self::BadgeEarned => "🏆",
            Self::SystemAnnouncement => "📢",
            Self::PaymentReceived => "💰",
            Self::DeadlineReminder => "⏰",
        }
    }
}

impl FromStr for NotificationType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or(UnknownVariant(s.to_string()))
    }
}
