use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};

use crate::auth::AppState;
use crate::middleware::require_auth;
use crate::{gateway, messages, notifications, users};

/// The REST surface plus the WebSocket handshake at `/ws`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/api/users", post(users::register))
        .route("/api/notifications/types", get(notifications::types))
        .route("/ws", get(gateway::ws_upgrade))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/chat/send", post(messages::send_message))
        .route(
            "/api/chat/conversation/{conversation_id}",
            get(messages::get_conversation_messages),
        )
        .route("/api/chat/read/{conversation_id}", put(messages::mark_conversation_read))
        .route("/api/chat/conversations", get(messages::list_conversations))
        .route("/api/chat/conversation-with", post(messages::conversation_with))
        .route("/api/chat/unread-count", get(messages::unread_count))
        .route("/api/chat/{message_id}", delete(messages::delete_message))
        .route("/api/users/me", get(users::me).put(users::update_me))
        .route("/api/users/{user_id}", get(users::get_user))
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/unread-count", get(notifications::unread_count))
        .route("/api/notifications/mark-all-read", put(notifications::mark_all_read))
        .route("/api/notifications/{notification_id}/read", put(notifications::mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;
    use uuid::Uuid;

    use freelink_db::Database;
    use freelink_gateway::dispatcher::Dispatcher;

    use crate::auth::{AppStateInner, issue_token};

    const SECRET: &str = "test-secret";

    fn app() -> (Router, AppState) {
        let state = AppStateInner::new(
            Database::open_in_memory().unwrap(),
            SECRET.to_string(),
            Dispatcher::new(),
        );
        (router(state.clone()), state)
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Registers a user over HTTP and returns (id, token).
    async fn register(app: &Router, username: &str) -> (Uuid, String) {
        let (status, body) = call(
            app,
            Method::POST,
            "/api/users",
            None,
            Some(json!({ "username": username, "email": format!("{username}@example.com") })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let id: Uuid = body["id"].as_str().unwrap().parse().unwrap();
        (id, issue_token(SECRET, id, username))
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_token() {
        let (app, _) = app();

        let (status, body) = call(&app, Method::GET, "/api/chat/conversations", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let forged = issue_token("other-secret", Uuid::new_v4(), "mallory");
        let (status, _) = call(&app, Method::GET, "/api/chat/unread-count", Some(&forged), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = call(&app, Method::GET, "/api/notifications/types", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn ws_handshake_checks_token_before_upgrade() {
        let (app, _) = app();
        let (alice, _) = register(&app, "alice").await;

        let (status, body) = call(&app, Method::GET, "/ws", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let forged = issue_token("other-secret", alice, "alice");
        let (status, _) = call(&app, Method::GET, &format!("/ws?token={forged}"), None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let ghost = issue_token(SECRET, Uuid::new_v4(), "alice");
        let (status, _) = call(&app, Method::GET, &format!("/ws?token={ghost}"), None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // A good token gets past auth; this plain request then fails the upgrade itself.
        let good = issue_token(SECRET, alice, "alice");
        let (status, _) = call(&app, Method::GET, &format!("/ws?token={good}"), None, None).await;
        assert_ne!(status, StatusCode::UNAUTHORIZED);
        assert!(status.is_client_error());
    }

    #[tokio::test]
    async fn chat_flow_over_http() {
        let (app, state) = app();
        let (_alice, alice_token) = register(&app, "alice").await;
        let (bob, bob_token) = register(&app, "bob").await;
        let (_, mut bob_rx) = state.dispatcher.register_user_channel("bob").await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/chat/conversation-with",
            Some(&alice_token),
            Some(json!({ "userId": bob })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let conversation_id = body["conversationId"].as_str().unwrap().to_string();

        let (status, sent) = call(
            &app,
            Method::POST,
            "/api/chat/send",
            Some(&alice_token),
            Some(json!({ "conversationId": conversation_id, "content": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{sent}");
        assert_eq!(sent["type"], "TEXT");
        assert_eq!(sent["isRead"], false);
        assert_eq!(sent["receiverUsername"], "bob");

        let pushed = bob_rx.recv().await.unwrap();
        let frame = serde_json::to_value(&pushed).unwrap();
        assert_eq!(frame["type"], "MessageCreate");
        assert_eq!(frame["data"]["content"], "hello");

        let (_, unread) = call(&app, Method::GET, "/api/chat/unread-count", Some(&bob_token), None).await;
        assert_eq!(unread["unreadCount"], 1);

        let (_, inbox) = call(&app, Method::GET, "/api/chat/conversations", Some(&bob_token), None).await;
        assert_eq!(inbox[0]["conversationId"], conversation_id.as_str());
        assert_eq!(inbox[0]["username"], "alice");
        assert_eq!(inbox[0]["unreadCount"], 1);

        let uri = format!("/api/chat/read/{conversation_id}");
        let (status, body) = call(&app, Method::PUT, &uri, Some(&bob_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updatedCount"], 1);

        let uri = format!("/api/chat/conversation/{conversation_id}?page=0&size=10");
        let (_, history) = call(&app, Method::GET, &uri, Some(&bob_token), None).await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["isRead"], true);

        let message_id = sent["id"].as_str().unwrap();
        let uri = format!("/api/chat/{message_id}");
        let (status, body) = call(&app, Method::DELETE, &uri, Some(&bob_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "You can only delete your own messages");

        let (status, _) = call(&app, Method::DELETE, &uri, Some(&alice_token), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn error_statuses() {
        let (app, _) = app();
        let (alice, alice_token) = register(&app, "alice").await;
        let (_, carol_token) = register(&app, "carol").await;
        let (bob, _) = register(&app, "bob").await;

        // Duplicate username.
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/users",
            None,
            Some(json!({ "username": "alice", "email": "other@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/chat/conversation-with",
            Some(&alice_token),
            Some(json!({ "userId": alice })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/chat/conversation-with",
            Some(&alice_token),
            Some(json!({ "userId": Uuid::new_v4() })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = call(
            &app,
            Method::POST,
            "/api/chat/conversation-with",
            Some(&alice_token),
            Some(json!({ "userId": bob })),
        )
        .await;
        let conversation_id = body["conversationId"].as_str().unwrap().to_string();

        let uri = format!("/api/chat/conversation/{conversation_id}");
        let (status, _) = call(&app, Method::GET, &uri, Some(&carol_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let uri = format!("/api/chat/conversation/{}", Uuid::new_v4());
        let (status, _) = call(&app, Method::GET, &uri, Some(&alice_token), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, Method::GET, "/api/chat/conversation/not-a-uuid", Some(&alice_token), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/chat/send",
            Some(&alice_token),
            Some(json!({ "conversationId": conversation_id, "content": "x", "messageType": "SYSTEM" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");

        let (status, _) = call(
            &app,
            Method::GET,
            "/api/notifications?type=NOT_A_TYPE",
            Some(&alice_token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn profile_and_notifications() {
        let (app, state) = app();
        let (alice, alice_token) = register(&app, "alice").await;
        let (bob, bob_token) = register(&app, "bob").await;

        let (status, me) = call(
            &app,
            Method::PUT,
            "/api/users/me",
            Some(&alice_token),
            Some(json!({ "bio": "Rust freelancer", "skills": ["rust", "axum"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["bio"], "Rust freelancer");
        assert_eq!(me["skills"], json!(["rust", "axum"]));

        let (status, profile) = call(&app, Method::GET, &format!("/api/users/{alice}"), Some(&bob_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(profile["username"], "alice");

        // Unknown subject with a valid signature.
        let ghost = issue_token(SECRET, Uuid::new_v4(), "ghost");
        let (status, _) = call(&app, Method::GET, "/api/users/me", Some(&ghost), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // A message produces a NEW_MESSAGE notification for bob via the worker.
        let (_, mut bob_rx) = state.dispatcher.register_user_channel("bob").await;
        let conversation_id = state.chat.find_or_create_private_conversation(alice, bob).await.unwrap();
        call(
            &app,
            Method::POST,
            "/api/chat/send",
            Some(&alice_token),
            Some(json!({ "conversationId": conversation_id, "content": "ping" })),
        )
        .await;
        loop {
            let event = bob_rx.recv().await.unwrap();
            if let freelink_types::events::GatewayEvent::NotificationCreate(_) = event {
                break;
            }
        }

        let (_, list) = call(&app, Method::GET, "/api/notifications?type=new_message", Some(&bob_token), None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["type"], "NEW_MESSAGE");
        let notification_id = list[0]["id"].as_str().unwrap().to_string();

        let uri = format!("/api/notifications/{notification_id}/read");
        let (status, _) = call(&app, Method::PUT, &uri, Some(&alice_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, read) = call(&app, Method::PUT, &uri, Some(&bob_token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(read["isRead"], true);

        let (_, count) = call(&app, Method::GET, "/api/notifications/unread-count", Some(&bob_token), None).await;
        assert_eq!(count["unreadCount"], 0);

        let (_, all) = call(&app, Method::PUT, "/api/notifications/mark-all-read", Some(&bob_token), None).await;
        assert_eq!(all["updatedCount"], 0);
    }
}
