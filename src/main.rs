mod accounts;
mod app;
mod auth;
mod config;
mod error;
mod notify;
mod state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "accountd=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let app_state = state::AppState::init().await?;

    if let Some(first) = app_state.config.first_superuser.clone() {
        let admin = app_state
            .accounts
            .ensure_superuser(&first.email, &first.password)
            .await?;
        tracing::info!(user_id = %admin.id, "first superuser ready");
    }

    app::serve(app::build_app(app_state)).await
}
