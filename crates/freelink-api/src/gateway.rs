use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::rejection::WebSocketUpgradeRejection,
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use freelink_gateway::connection;

use crate::auth::{AppState, decode_token};
use crate::error::ApiError;
use crate::run_blocking;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the token rides
/// in the query string. Rejected with 401 before the upgrade is looked at.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let (user_id, username) = match resolve_user(&state, query.token.as_deref()).await {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let dispatcher = state.dispatcher.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, user_id, username))
}

/// Validates the token and maps its subject to the directory record. The
/// connection is registered under the stored username, never the claim.
async fn resolve_user(state: &AppState, token: Option<&str>) -> Result<(Uuid, String), ApiError> {
    let token = token.ok_or_else(|| ApiError::unauthorized("Missing token"))?;
    let claims = decode_token(&state.jwt_secret, token)?;

    let id = claims.sub.to_string();
    let row = run_blocking(&state.db, move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

    if row.username != claims.username {
        debug!(
            "Token for {} names {}, using the directory username",
            claims.sub, claims.username
        );
    }
    Ok((claims.sub, row.username))
}

#[cfg(test)]
mod tests {
    use super::*;
    use freelink_db::Database;
    use freelink_gateway::dispatcher::Dispatcher;

    use crate::auth::{AppStateInner, issue_token};
    use crate::test_support::seed_user;

    const SECRET: &str = "gateway-secret";

    fn state() -> AppState {
        AppStateInner::new(
            Database::open_in_memory().unwrap(),
            SECRET.to_string(),
            Dispatcher::new(),
        )
    }

    #[tokio::test]
    async fn stored_username_wins_over_claim() {
        let state = state();
        let alice = seed_user(&state.db, "alice");

        let token = issue_token(SECRET, alice, "bob");
        let (id, username) = resolve_user(&state, Some(&token)).await.unwrap();
        assert_eq!(id, alice);
        assert_eq!(username, "alice");
    }

    #[tokio::test]
    async fn unknown_subject_is_unauthorized() {
        let state = state();
        seed_user(&state.db, "bob");

        let token = issue_token(SECRET, Uuid::new_v4(), "bob");
        assert!(matches!(
            resolve_user(&state, Some(&token)).await,
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            resolve_user(&state, None).await,
            Err(ApiError::Unauthorized(_))
        ));
    }
}
