use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    accounts::dto::{
        AccountCreate, AccountPublic, AccountRegister, AccountUpdate, AccountUpdateMe,
        AccountsPublic, Message, Pagination, UpdatePassword,
    },
    auth::extractors::CurrentAccount,
    error::AccountResult,
    state::AppState,
};

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/users/signup", post(register_user))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/me",
            get(read_user_me).patch(update_user_me).delete(delete_user_me),
        )
        .route("/users/me/password", patch(update_password_me))
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(read_users).post(create_user))
        .route(
            "/users/:user_id",
            get(read_user_by_id).patch(update_user).delete(delete_user),
        )
}

#[instrument(skip(state, caller))]
pub async fn read_users(
    State(state): State<AppState>,
    CurrentAccount(caller): CurrentAccount,
    Query(p): Query<Pagination>,
) -> AccountResult<Json<AccountsPublic>> {
    let page = state.accounts.list_accounts(&caller, p.skip, p.limit).await?;
    Ok(Json(AccountsPublic {
        data: page.data.into_iter().map(AccountPublic::from).collect(),
        count: page.count,
    }))
}

#[instrument(skip(state, caller, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    CurrentAccount(caller): CurrentAccount,
    Json(payload): Json<AccountCreate>,
) -> AccountResult<Json<AccountPublic>> {
    let account = state.accounts.create_account(&caller, payload).await?;
    Ok(Json(account.into()))
}

#[instrument(skip(state, payload))]
pub async fn register_user(
    State(state): State<AppState>,
    Json(payload): Json<AccountRegister>,
) -> AccountResult<Json<AccountPublic>> {
    let account = state.accounts.register(payload).await?;
    Ok(Json(account.into()))
}

#[instrument(skip(state, caller))]
pub async fn read_user_me(
    State(state): State<AppState>,
    CurrentAccount(caller): CurrentAccount,
) -> Json<AccountPublic> {
    Json(state.accounts.get_self(&caller).into())
}

#[instrument(skip(state, caller, payload))]
pub async fn update_user_me(
    State(state): State<AppState>,
    CurrentAccount(caller): CurrentAccount,
    Json(payload): Json<AccountUpdateMe>,
) -> AccountResult<Json<AccountPublic>> {
    let account = state.accounts.update_self(&caller, payload).await?;
    Ok(Json(account.into()))
}

#[instrument(skip(state, caller, payload))]
pub async fn update_password_me(
    State(state): State<AppState>,
    CurrentAccount(caller): CurrentAccount,
    Json(payload): Json<UpdatePassword>,
) -> AccountResult<Json<Message>> {
    state.accounts.change_password(&caller, payload).await?;
    Ok(Json(Message::new("Password updated successfully")))
}

#[instrument(skip(state, caller))]
pub async fn delete_user_me(
    State(state): State<AppState>,
    CurrentAccount(caller): CurrentAccount,
) -> AccountResult<Json<Message>> {
    state.accounts.delete_self(&caller).await?;
    Ok(Json(Message::new("User deleted successfully")))
}

#[instrument(skip(state, caller))]
pub async fn read_user_by_id(
    State(state): State<AppState>,
    CurrentAccount(caller): CurrentAccount,
    Path(user_id): Path<Uuid>,
) -> AccountResult<Json<AccountPublic>> {
    let account = state.accounts.get_by_id(&caller, user_id).await?;
    Ok(Json(account.into()))
}

#[instrument(skip(state, caller, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    CurrentAccount(caller): CurrentAccount,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<AccountUpdate>,
) -> AccountResult<Json<AccountPublic>> {
    let account = state.accounts.update_by_id(&caller, user_id, payload).await?;
    Ok(Json(account.into()))
}

#[instrument(skip(state, caller))]
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentAccount(caller): CurrentAccount,
    Path(user_id): Path<Uuid>,
) -> AccountResult<Json<Message>> {
    state.accounts.delete_by_id(&caller, user_id).await?;
    Ok(Json(Message::new("User deleted successfully")))
}
