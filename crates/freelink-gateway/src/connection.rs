use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use freelink_types::events::{GatewayCommand, GatewayEvent, TypingIndicator};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a WebSocket whose bearer token was already validated at the HTTP
/// upgrade. Sends Ready, then pumps the user's personal queue to the socket
/// and client commands to the dispatcher until either side goes away.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    user_id: Uuid,
    username: String,
) {
    let (mut sender, receiver) = socket.split();

    info!("{} ({}) connected to gateway", username, user_id);

    let ready = GatewayEvent::Ready {
        user_id,
        username: username.clone(),
    };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    run_connection_loop(sender, receiver, dispatcher, user_id, username).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    user_id: Uuid,
    username: String,
) {
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(&username).await;
    debug!(
        "{} now has {} live gateway connections",
        username,
        dispatcher.connection_count(&username).await
    );

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward the personal queue to the client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = user_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let dispatcher_recv = dispatcher.clone();
    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&dispatcher_recv, user_id, &username_recv, cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} ({}) bad command: {} -- raw: {}",
                            username_recv,
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister_user_channel(&username, conn_id).await;
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), ()> {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            warn!("Failed to encode gateway event: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

/// Apply one client command. Returns true if something was relayed.
pub(crate) async fn handle_command(
    dispatcher: &Dispatcher,
    user_id: Uuid,
    username: &str,
    cmd: GatewayCommand,
) -> bool {
    match cmd {
        GatewayCommand::Typing(indicator) => relay_typing(dispatcher, user_id, username, indicator).await,
    }
}

/// Forward a typing indicator verbatim to the receiver's queue. No echo to
/// the sender, no debouncing. Indicators that claim another sender id or
/// username are dropped.
async fn relay_typing(
    dispatcher: &Dispatcher,
    user_id: Uuid,
    username: &str,
    indicator: TypingIndicator,
) -> bool {
    if indicator.sender_id != user_id {
        warn!(
            "{} ({}) sent a typing indicator for sender {}, dropping",
            username, user_id, indicator.sender_id
        );
        return false;
    }
    if indicator.sender_username != username {
        warn!(
            "{} ({}) sent a typing indicator as {}, dropping",
            username, user_id, indicator.sender_username
        );
        return false;
    }
    if indicator.receiver_username == username {
        return false;
    }

    let receiver = indicator.receiver_username.clone();
    let delivered = dispatcher.send_to_user(&receiver, GatewayEvent::Typing(indicator)).await;
    debug!("{} -> typing to {} ({} connections)", username, receiver, delivered);
    delivered > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicator(sender_id: Uuid, to: &str, typing: bool) -> TypingIndicator {
        TypingIndicator {
            sender_id,
            sender_username: "alice".into(),
            receiver_id: Uuid::new_v4(),
            receiver_username: to.into(),
            typing,
        }
    }

    #[tokio::test]
    async fn typing_is_relayed_verbatim_to_receiver() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let (_, mut alice_rx) = dispatcher.register_user_channel("alice").await;
        let (_, mut bob_rx) = dispatcher.register_user_channel("bob").await;

        let sent = indicator(alice, "bob", false);
        let cmd = GatewayCommand::Typing(sent.clone());
        assert!(handle_command(&dispatcher, alice, "alice", cmd).await);

        match bob_rx.try_recv() {
            Ok(GatewayEvent::Typing(got)) => assert_eq!(got, sent),
            other => panic!("unexpected event: {other:?}"),
        }
        // No echo back to the sender.
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn spoofed_sender_is_dropped() {
        let dispatcher = Dispatcher::new();
        let (_, mut bob_rx) = dispatcher.register_user_channel("bob").await;

        let cmd = GatewayCommand::Typing(indicator(Uuid::new_v4(), "bob", true));
        assert!(!handle_command(&dispatcher, Uuid::new_v4(), "mallory", cmd).await);
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn borrowed_sender_username_is_dropped() {
        let dispatcher = Dispatcher::new();
        let mallory = Uuid::new_v4();
        let (_, mut bob_rx) = dispatcher.register_user_channel("bob").await;

        // Correct id, but the display name belongs to someone else.
        let cmd = GatewayCommand::Typing(indicator(mallory, "bob", true));
        assert!(!handle_command(&dispatcher, mallory, "mallory", cmd).await);
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn typing_to_offline_user_is_not_delivered() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let cmd = GatewayCommand::Typing(indicator(alice, "bob", true));
        assert!(!handle_command(&dispatcher, alice, "alice", cmd).await);
    }
}
