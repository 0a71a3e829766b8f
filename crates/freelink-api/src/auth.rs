use std::sync::Arc;

use jsonwebtoken::{DecodingKey, Validation, decode};

use freelink_db::Database;
use freelink_gateway::dispatcher::Dispatcher;
use freelink_types::api::Claims;

use crate::chat::ChatService;
use crate::error::ApiError;
use crate::notifier::Notifier;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub chat: ChatService,
}

impl AppStateInner {
    /// Wires the shared state and starts the notification worker.
    /// Must be called from inside a Tokio runtime.
    pub fn new(db: Database, jwt_secret: String, dispatcher: Dispatcher) -> AppState {
        let db = Arc::new(db);
        let notifier = Notifier::spawn(db.clone(), dispatcher.clone());
        let chat = ChatService::new(db.clone(), dispatcher.clone(), notifier);
        Arc::new(Self {
            db,
            jwt_secret,
            dispatcher,
            chat,
        })
    }
}

/// Validate an HS256 bearer token and return its claims.
pub fn decode_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| ApiError::unauthorized(format!("Invalid token: {}", e)))
}

/// Mint a token the way the identity service does. Test-only.
#[cfg(test)]
pub(crate) fn issue_token(secret: &str, user_id: uuid::Uuid, username: &str) -> String {
    use jsonwebtoken::{EncodingKey, Header, encode};

    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(1)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
