use std::sync::Arc;

use anyhow::{Result, anyhow};
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

use freelink_db::{Database, models::NewNotification, now_timestamp};
use freelink_gateway::dispatcher::Dispatcher;
use freelink_types::api::NotificationResponse;
use freelink_types::events::GatewayEvent;
use freelink_types::models::NotificationType;

use crate::convert::parse_timestamp;

/// A notification waiting to be stored and pushed.
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub user_id: Uuid,
    pub username: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub action_url: Option<String>,
}

impl NotificationJob {
    pub fn new_message(recipient_id: Uuid, recipient_username: &str, sender_name: &str) -> Self {
        Self {
            user_id: recipient_id,
            username: recipient_username.to_string(),
            notification_type: NotificationType::NewMessage,
            title: "New Message".to_string(),
            message: format!("You have a new message from {}", sender_name),
            action_url: Some("/chat".to_string()),
        }
    }
}

/// Handle to the background notification worker. Enqueueing never blocks the
/// caller; the worker persists each job and pushes it to the user's queue.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<NotificationJob>,
}

impl Notifier {
    /// Start the worker on the current Tokio runtime.
    pub fn spawn(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(rx, db, dispatcher));
        Self { tx }
    }

    pub fn enqueue(&self, job: NotificationJob) -> Result<()> {
        self.tx
            .send(job)
            .map_err(|e| anyhow!("notification worker is gone, dropped job for {}", e.0.username))
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<NotificationJob>,
    db: Arc<Database>,
    dispatcher: Dispatcher,
) {
    info!("Notification worker started");
    while let Some(job) = rx.recv().await {
        let user = job.username.clone();
        let kind = job.notification_type;
        // Failures are logged and the job is dropped; there is no retry.
        if let Err(e) = deliver(&db, &dispatcher, job).await {
            error!("Failed to deliver {} notification to {}: {:#}", kind.as_str(), user, e);
        }
    }
    info!("Notification worker stopped");
}

/// Store one notification and push it to the recipient's live connections.
pub async fn deliver(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    job: NotificationJob,
) -> Result<NotificationResponse> {
    let id = Uuid::new_v4();
    let created_at = now_timestamp();
    let kind = job.notification_type;

    let db = db.clone();
    let (row_id, user_id, created) = (id.to_string(), job.user_id.to_string(), created_at.clone());
    let (title, message, action_url) = (job.title.clone(), job.message.clone(), job.action_url.clone());
    tokio::task::spawn_blocking(move || {
        db.insert_notification(&NewNotification {
            id: &row_id,
            user_id: &user_id,
            notification_type: kind.as_str(),
            title: &title,
            message: &message,
            action_url: action_url.as_deref(),
            icon: kind.icon(),
            created_at: &created,
        })
    })
    .await??;

    let notification = NotificationResponse {
        id,
        notification_type: kind,
        title: job.title,
        message: job.message,
        is_read: false,
        created_at: parse_timestamp(&created_at),
        link: job.action_url,
        icon: kind.icon().to_string(),
    };

    let delivered = dispatcher
        .send_to_user(&job.username, GatewayEvent::NotificationCreate(notification.clone()))
        .await;
    debug!("{} notification for {} pushed to {} connections", kind.as_str(), job.username, delivered);

    Ok(notification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::seed_user;
    use std::time::Duration;

    #[tokio::test]
    async fn worker_persists_and_pushes() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let bob = seed_user(&db, "bob");
        let dispatcher = Dispatcher::new();
        let (_, mut bob_rx) = dispatcher.register_user_channel("bob").await;

        let notifier = Notifier::spawn(db.clone(), dispatcher.clone());
        notifier
            .enqueue(NotificationJob::new_message(bob, "bob", "alice"))
            .unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), bob_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let GatewayEvent::NotificationCreate(n) = event else {
            panic!("expected a notification event, got {event:?}");
        };
        assert_eq!(n.notification_type, NotificationType::NewMessage);
        assert_eq!(n.message, "You have a new message from alice");
        assert_eq!(n.link.as_deref(), Some("/chat"));

        let stored = db.list_notifications(&bob.to_string(), None, 0, 10).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, n.id.to_string());
    }

    #[tokio::test]
    async fn unknown_recipient_fails_without_panicking() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let dispatcher = Dispatcher::new();
        let job = NotificationJob::new_message(Uuid::new_v4(), "ghost", "alice");
        assert!(deliver(&db, &dispatcher, job).await.is_err());
    }
}
