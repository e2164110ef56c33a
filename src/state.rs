use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::accounts::memory::MemoryAccountStore;
use crate::accounts::pg::PgAccountStore;
use crate::accounts::repo::AccountStore;
use crate::accounts::services::AccountService;
use crate::auth::password::Argon2Hasher;
use crate::config::{AppConfig, JwtConfig, StoreBackend};
use crate::notify::LogNotifier;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub accounts: AccountService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store: Arc<dyn AccountStore> = match config.store_backend {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .context("DATABASE_URL is not set")?;
                let db = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(10)
                    .connect(url)
                    .await?;
                let store = PgAccountStore::new(db);
                store.migrate().await.context("running migrations")?;
                Arc::new(store)
            }
            StoreBackend::Memory => {
                info!("using in-memory account store");
                Arc::new(MemoryAccountStore::new())
            }
        };

        Ok(Self::from_parts(config, store, Arc::new(Argon2Hasher::default())))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn AccountStore>,
        hasher: Arc<Argon2Hasher>,
    ) -> Self {
        let accounts = AccountService::new(store, hasher, Arc::new(LogNotifier))
            .with_emails(config.project_name.clone(), config.emails_enabled)
            .with_sweep_on_write(config.sweep_on_write);
        Self { config, accounts }
    }

    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            store_backend: StoreBackend::Memory,
            database_url: None,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            project_name: "accountd".into(),
            emails_enabled: false,
            first_superuser: None,
            sweep_on_write: false,
        });

        let hasher = Argon2Hasher::with_cost(1024, 1).expect("argon2 params ok");
        Self::from_parts(config, Arc::new(MemoryAccountStore::new()), Arc::new(hasher))
    }
}
