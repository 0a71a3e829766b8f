pub mod auth;
pub mod chat;
mod convert;
pub mod error;
pub mod gateway;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod notifier;
pub mod routes;
pub mod users;

use std::sync::Arc;

use freelink_db::Database;

use crate::error::ApiError;

/// Run a blocking DB call off the async runtime.
pub(crate) async fn run_blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    Ok(tokio::task::spawn_blocking(move || f(db.as_ref())).await??)
}
