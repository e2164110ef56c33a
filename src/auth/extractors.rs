use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::accounts::repo_types::Account;
use crate::auth::claims::TokenKind;
use crate::auth::jwt::JwtKeys;
use crate::state::AppState;

/// Extracts and validates an access token, returning the account ID.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header".to_string(),
            ))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization header".to_string(),
            ))?;

        let claims = match keys.verify(token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired token");
                return Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid or expired token".to_string(),
                ));
            }
        };

        if claims.kind != TokenKind::Access {
            return Err((
                StatusCode::UNAUTHORIZED,
                "Access token required".to_string(),
            ));
        }

        Ok(AuthUser(claims.sub))
    }
}

/// The active account behind the access token.
pub struct CurrentAccount(pub Account);

#[async_trait]
impl FromRequestParts<AppState> for CurrentAccount {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user_id) = AuthUser::from_request_parts(parts, state).await?;

        let account = match state.accounts.find(user_id).await {
            Ok(Some(a)) => a,
            Ok(None) => {
                warn!(user_id = %user_id, "token for unknown account");
                return Err((StatusCode::NOT_FOUND, "User not found".into()));
            }
            Err(e) => {
                error!(error = %e, user_id = %user_id, "load current account failed");
                return Err((StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into()));
            }
        };

        if !account.is_active {
            return Err((StatusCode::BAD_REQUEST, "Inactive user".into()));
        }
        Ok(CurrentAccount(account))
    }
}
