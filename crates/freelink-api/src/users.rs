use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use axum_extra::extract::WithRejection;
use tracing::info;
use uuid::Uuid;

use freelink_db::models::{NewUser, ProfileUpdate};
use freelink_db::{is_constraint_violation, now_timestamp};
use freelink_types::api::{Claims, RegisterUserRequest, UpdateProfileRequest, UserProfile};

use crate::auth::AppState;
use crate::convert::user_profile;
use crate::error::ApiError;
use crate::run_blocking;

const USERNAME_CHARS: std::ops::RangeInclusive<usize> = 3..=50;
const MAX_BIO_CHARS: usize = 1000;

fn validate_registration(req: &RegisterUserRequest) -> Result<(), ApiError> {
    if !USERNAME_CHARS.contains(&req.username.chars().count()) {
        return Err(ApiError::bad_request("Username must be between 3 and 50 characters"));
    }
    match req.email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => return Err(ApiError::bad_request("Email should be valid")),
    }
    validate_bio(req.bio.as_deref())
}

fn validate_bio(bio: Option<&str>) -> Result<(), ApiError> {
    if bio.is_some_and(|b| b.chars().count() > MAX_BIO_CHARS) {
        return Err(ApiError::bad_request("Bio cannot exceed 1000 characters"));
    }
    Ok(())
}

/// Public: adds a directory record for a user the identity service knows about.
pub async fn register(
    State(state): State<AppState>,
    WithRejection(Json(mut req), _): WithRejection<Json<RegisterUserRequest>, ApiError>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    req.username = req.username.trim().to_string();
    req.email = req.email.trim().to_string();
    validate_registration(&req)?;

    let id = Uuid::new_v4().to_string();
    let row = run_blocking(&state.db, move |db| {
        if db.get_user_by_username(&req.username)?.is_some() {
            return Ok(Err(ApiError::conflict("Username is already taken")));
        }
        if db.get_user_by_email(&req.email)?.is_some() {
            return Ok(Err(ApiError::conflict("Email is already registered")));
        }

        let inserted = db.create_user(&NewUser {
            id: &id,
            username: &req.username,
            email: &req.email,
            bio: req.bio.as_deref(),
            avatar_url: req.avatar_url.as_deref(),
            github_link: req.github_link.as_deref(),
            skills: &req.skills,
            created_at: &now_timestamp(),
        });
        match inserted {
            Ok(()) => {}
            // Lost a race with a concurrent registration.
            Err(e) if is_constraint_violation(&e) => {
                return Ok(Err(ApiError::conflict("Username or email is already registered")));
            }
            Err(e) => return Err(e),
        }

        db.get_user_by_id(&id)?
            .map(Ok)
            .ok_or_else(|| anyhow::anyhow!("user {} vanished after insert", id))
    })
    .await??;

    info!("Registered user {} ({})", row.username, row.id);
    Ok((StatusCode::CREATED, Json(user_profile(row))))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserProfile>, ApiError> {
    let id = claims.sub.to_string();
    let row = run_blocking(&state.db, move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;
    Ok(Json(user_profile(row)))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateProfileRequest>, ApiError>,
) -> Result<Json<UserProfile>, ApiError> {
    validate_bio(req.bio.as_deref())?;

    let id = claims.sub.to_string();
    let row = run_blocking(&state.db, move |db| {
        let update = ProfileUpdate {
            bio: req.bio.as_deref(),
            avatar_url: req.avatar_url.as_deref(),
            github_link: req.github_link.as_deref(),
            skills: req.skills.as_deref(),
        };
        if !db.update_profile(&id, &update)? {
            return Ok(None);
        }
        db.get_user_by_id(&id)
    })
    .await?
    .ok_or_else(|| ApiError::unauthorized("User no longer exists"))?;

    info!("Updated profile of {}", row.username);
    Ok(Json(user_profile(row)))
}

pub async fn get_user(
    State(state): State<AppState>,
    WithRejection(Path(user_id), _): WithRejection<Path<Uuid>, ApiError>,
) -> Result<Json<UserProfile>, ApiError> {
    let id = user_id.to_string();
    let row = run_blocking(&state.db, move |db| db.get_user_by_id(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user_profile(row)))
}
