use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod handlers;
pub mod lifecycle;
pub mod memory;
pub mod pg;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod sweeper;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::public_routes())
        .merge(handlers::me_routes())
        .merge(handlers::admin_routes())
}
