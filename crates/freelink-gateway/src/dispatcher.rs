use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::trace;
use uuid::Uuid;

use freelink_types::events::GatewayEvent;

type UserSender = mpsc::UnboundedSender<GatewayEvent>;

/// Routes events to the personal queue of a user, addressed by username.
///
/// A user may hold several live connections (tabs, devices); each gets its own
/// queue. Delivery is best effort: with no live connection the event is dropped.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// username -> (conn_id -> sender)
    user_channels: RwLock<HashMap<String, HashMap<Uuid, UserSender>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a per-connection queue for `username`. Returns (conn_id, receiver).
    pub async fn register_user_channel(
        &self,
        username: &str,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .entry(username.to_string())
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drop one connection's queue. Other connections of the same user stay.
    pub async fn unregister_user_channel(&self, username: &str, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some(conns) = channels.get_mut(username) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                channels.remove(username);
            }
        }
    }

    /// Push an event to every live connection of `username`.
    /// Returns the number of connections that accepted it.
    pub async fn send_to_user(&self, username: &str, event: GatewayEvent) -> usize {
        let channels = self.inner.user_channels.read().await;
        let Some(conns) = channels.get(username) else {
            trace!("{} has no live connection, dropping event", username);
            return 0;
        };

        conns
            .values()
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }

    pub async fn connection_count(&self, username: &str) -> usize {
        self.inner
            .user_channels
            .read()
            .await
            .get(username)
            .map_or(0, HashMap::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freelink_types::events::TypingIndicator;

    fn typing(to: &str) -> GatewayEvent {
        GatewayEvent::Typing(TypingIndicator {
            sender_id: Uuid::new_v4(),
            sender_username: "alice".into(),
            receiver_id: Uuid::new_v4(),
            receiver_username: to.into(),
            typing: true,
        })
    }

    #[tokio::test]
    async fn delivers_only_to_addressed_user() {
        let dispatcher = Dispatcher::new();
        let (_, mut bob_rx) = dispatcher.register_user_channel("bob").await;
        let (_, mut alice_rx) = dispatcher.register_user_channel("alice").await;

        assert_eq!(dispatcher.send_to_user("bob", typing("bob")).await, 1);

        assert!(matches!(bob_rx.try_recv(), Ok(GatewayEvent::Typing(_))));
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn fans_out_to_every_connection_of_a_user() {
        let dispatcher = Dispatcher::new();
        let (_, mut tab1) = dispatcher.register_user_channel("bob").await;
        let (_, mut tab2) = dispatcher.register_user_channel("bob").await;

        assert_eq!(dispatcher.connection_count("bob").await, 2);
        assert_eq!(dispatcher.send_to_user("bob", typing("bob")).await, 2);
        assert!(tab1.try_recv().is_ok());
        assert!(tab2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn offline_user_drops_event() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.send_to_user("nobody", typing("nobody")).await, 0);
    }

    #[tokio::test]
    async fn unregister_only_removes_matching_connection() {
        let dispatcher = Dispatcher::new();
        let (first, _rx1) = dispatcher.register_user_channel("bob").await;
        let (second, mut rx2) = dispatcher.register_user_channel("bob").await;

        dispatcher.unregister_user_channel("bob", first).await;
        assert_eq!(dispatcher.connection_count("bob").await, 1);
        assert_eq!(dispatcher.send_to_user("bob", typing("bob")).await, 1);
        assert!(rx2.try_recv().is_ok());

        dispatcher.unregister_user_channel("bob", second).await;
        assert_eq!(dispatcher.connection_count("bob").await, 0);
        assert!(dispatcher.inner.user_channels.read().await.is_empty());
    }

    #[tokio::test]
    async fn closed_receiver_is_not_counted() {
        let dispatcher = Dispatcher::new();
        let (_, rx) = dispatcher.register_user_channel("bob").await;
        drop(rx);
        assert_eq!(dispatcher.send_to_user("bob", typing("bob")).await, 0);
    }
}
