use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use freelink_types::api::{
    Claims, ConversationSummary, ConversationWithRequest, ConversationWithResponse, MessageResponse,
    PageQuery, SendMessageRequest, UnreadCountResponse, UpdatedCountResponse,
};

use crate::auth::AppState;
use crate::error::ApiError;

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<SendMessageRequest>, ApiError>,
) -> Result<Json<MessageResponse>, ApiError> {
    let message = state.chat.send_message(&claims, req).await?;
    Ok(Json(message))
}

pub async fn get_conversation_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, ApiError>,
    WithRejection(Query(page), _): WithRejection<Query<PageQuery>, ApiError>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let messages = state
        .chat
        .get_conversation_messages(claims.sub, conversation_id, page)
        .await?;
    Ok(Json(messages))
}

pub async fn mark_conversation_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(conversation_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<UpdatedCountResponse>, ApiError> {
    let updated_count = state
        .chat
        .mark_conversation_read(claims.sub, conversation_id)
        .await?;
    Ok(Json(UpdatedCountResponse { updated_count }))
}

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(page), _): WithRejection<Query<PageQuery>, ApiError>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let conversations = state.chat.list_conversations(claims.sub, page).await?;
    Ok(Json(conversations))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(message_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<StatusCode, ApiError> {
    state.chat.delete_message(claims.sub, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn conversation_with(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<ConversationWithRequest>, ApiError>,
) -> Result<Json<ConversationWithResponse>, ApiError> {
    let conversation_id = state
        .chat
        .find_or_create_private_conversation(claims.sub, req.user_id)
        .await?;
    Ok(Json(ConversationWithResponse { conversation_id }))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let unread_count = state.chat.unread_count(claims.sub).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}
