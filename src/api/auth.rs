use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use super::{ApiError, CurrentUser};
use crate::auth::{clear_session_cookie, hash_password, session_cookie, verify_password};
use crate::db::models::User;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(alias = "password1")]
    pub password: String,
    #[serde(alias = "password2")]
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

fn logged_in(user: &User, token: String) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, session_cookie(&token))],
        Json(serde_json::json!({ "ok": true, "token": token, "user": user })),
    )
}

/// POST /api/auth/register — create an account and log it in.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.password != req.password_confirm {
        return Err(ApiError::BadRequest("Password doesn't match".into()));
    }
    let username = req.username.trim().to_string();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("Error creating account".into()));
    }

    let cost = state.config.password_hash_cost;
    let password = req.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| ApiError::Internal(format!("hash task failed: {}", e)))?
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))?;

    let user = match state.db.create_user(&username, req.email.trim(), &hash) {
        Ok(user) => user,
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            tracing::debug!("register: username {} already taken", username);
            return Err(ApiError::BadRequest("Error creating account".into()));
        }
        Err(e) => return Err(e.into()),
    };
    let token = state.db.create_login_token(&user.id)?;
    tracing::info!(user = %user.username, "registered new account");

    Ok(logged_in(&user, token))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::Unauthorized("Invalid Username or Password".into());

    let password = req.password;
    let Some(user) = state.db.get_user_by_username(req.username.trim())? else {
        // one hash at the verify cost
        let cost = state.config.password_hash_cost;
        let _ = tokio::task::spawn_blocking(move || hash_password(&password, cost)).await;
        tracing::debug!("login: unknown username");
        return Err(invalid());
    };

    let stored = user.password_hash.clone();
    let ok = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .unwrap_or(false);
    if !ok {
        tracing::debug!(user = %user.username, "login: password mismatch");
        return Err(invalid());
    }

    let token = state.db.create_login_token(&user.id)?;
    tracing::info!(user = %user.username, "logged in");
    Ok(logged_in(&user, token))
}

/// POST /api/auth/logout — revoke the presented token.
pub async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    state.db.delete_login_token(&current.token)?;
    tracing::info!(user = %current.user.username, "logged out");
    Ok((
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(serde_json::json!({ "ok": true })),
    ))
}
