//! User registration, credential check and lookup

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::api::{ApiJson, ApiQuery, ListQuery, Page, SortField, CREATED_AT, UPDATED_AT};
use crate::caller::Caller;
use crate::chat_db::{is_unique_violation, User};
use crate::credentials::{hash_password, verify_password};
use crate::error::ServerError;
use crate::shared_state::AppState;

const USER_SORT_FIELDS: [SortField; 3] = [CREATED_AT, ("email", "email"), UPDATED_AT];

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub id: String,
    pub email: String,
    pub roles: Vec<String>,
}

/// POST /users/register
pub async fn register(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), ServerError> {
    req.validate()?;
    let password_hash = hash_password(&req.password);

    match state.database.users.create(&req.email, &password_hash, &req.roles) {
        Ok(user) => {
            info!("User {} registered by {}", user.id, caller.user_id);
            Ok((StatusCode::CREATED, Json(user)))
        }
        Err(e) if is_unique_violation(&e) => {
            Err(ServerError::BadRequest(format!("email {} is already registered", req.email)))
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /users/login
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ServerError> {
    req.validate()?;
    let invalid = || ServerError::Unauthorized("invalid credentials".into());

    let credentials = state.database.users.find_credentials_by_email(&req.email)?.ok_or_else(invalid)?;
    if !verify_password(&req.password, &credentials.password_hash) {
        warn!("Failed login for user {}", credentials.user.id);
        return Err(invalid());
    }

    let user = credentials.user;
    Ok(Json(LoginResponse { id: user.id, email: user.email, roles: user.roles }))
}

/// GET /users
pub async fn list_users(
    State(state): State<AppState>,
    _caller: Caller,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> Result<Json<Page<User>>, ServerError> {
    let resolved = query.resolve(&USER_SORT_FIELDS)?;
    let page = state.database.users.list(resolved.request)?;
    Ok(Json(Page::new(resolved, page)))
}

/// GET /users/:id
pub async fn get_user(
    State(state): State<AppState>,
    _caller: Caller,
    Path(user_id): Path<String>,
) -> Result<Json<User>, ServerError> {
    state
        .database
        .users
        .get(&user_id)?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("user {} not found", user_id)))
}
