use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use axum_extra::extract::WithRejection;
use uuid::Uuid;

use freelink_types::api::{
    Claims, NotificationQuery, NotificationResponse, NotificationTypeInfo, PageQuery,
    UnreadCountResponse, UpdatedCountResponse,
};
use freelink_types::models::NotificationType;

use crate::auth::AppState;
use crate::convert::notification_response;
use crate::error::ApiError;
use crate::run_blocking;

const DEFAULT_PAGE_SIZE: u32 = 20;

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<NotificationQuery>, ApiError>,
) -> Result<Json<Vec<NotificationResponse>>, ApiError> {
    let filter = query
        .notification_type
        .as_deref()
        .map(str::parse::<NotificationType>)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let (offset, limit) = PageQuery {
        page: query.page,
        size: query.size,
    }
    .offset_limit(DEFAULT_PAGE_SIZE);

    let user = claims.sub.to_string();
    let rows = run_blocking(&state.db, move |db| {
        db.list_notifications(&user, filter.map(|t| t.as_str()), offset, limit)
    })
    .await?;

    Ok(Json(rows.into_iter().map(notification_response).collect()))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UnreadCountResponse>, ApiError> {
    let user = claims.sub.to_string();
    let unread_count = run_blocking(&state.db, move |db| db.count_unread_notifications(&user)).await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Path(notification_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let (id, user) = (notification_id.to_string(), claims.sub.to_string());
    let row = run_blocking(&state.db, move |db| {
        let Some(existing) = db.get_notification(&id)? else {
            return Ok(Err(ApiError::not_found("Notification not found")));
        };
        if existing.user_id != user {
            return Ok(Err(ApiError::forbidden("Not your notification")));
        }
        db.mark_notification_read(&id)?;
        Ok(db
            .get_notification(&id)?
            .ok_or_else(|| ApiError::not_found("Notification not found")))
    })
    .await??;

    Ok(Json(notification_response(row)))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UpdatedCountResponse>, ApiError> {
    let user = claims.sub.to_string();
    let updated_count =
        run_blocking(&state.db, move |db| db.mark_all_notifications_read(&user)).await?;
    Ok(Json(UpdatedCountResponse { updated_count }))
}

/// Public catalogue of notification kinds.
pub async fn types() -> Json<Vec<NotificationTypeInfo>> {
    Json(
        NotificationType::ALL
            .iter()
            .copied()
            .map(NotificationTypeInfo::from)
            .collect(),
    )
}
