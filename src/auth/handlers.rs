use axum::{
    extract::{FromRef, State},
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, RefreshRequest},
        jwt::JwtKeys,
    },
    accounts::repo_types::Account,
    error::{AccountError, AccountResult},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

fn issue_tokens(keys: &JwtKeys, account: Account) -> AccountResult<AuthResponse> {
    let access_token = keys.sign_access(account.id)?;
    let refresh_token = keys.sign_refresh(account.id)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: account.into(),
    })
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AccountResult<Json<AuthResponse>> {
    let account = state
        .accounts
        .authenticate(&payload.email, &payload.password)
        .await?;

    info!(user_id = %account.id, email = %account.email, "user logged in");
    let keys = JwtKeys::from_ref(&state);
    Ok(Json(issue_tokens(&keys, account)?))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AccountResult<Json<AuthResponse>> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys.verify_refresh(&payload.refresh_token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        AccountError::Unauthorized(e.to_string())
    })?;

    let account = state
        .accounts
        .find(claims.sub)
        .await?
        .filter(|a| a.is_active)
        .ok_or_else(|| AccountError::Unauthorized("User not found".into()))?;

    Ok(Json(issue_tokens(&keys, account)?))
}
