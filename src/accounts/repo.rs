use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::accounts::repo_types::Account;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already in use: {0}")]
    DuplicateEmail(String),
    #[error("account {0} still owns items")]
    OwnsItems(Uuid),
    #[error("account {0} no longer exists")]
    Missing(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Canonical account records.
///
/// Reads outside a transaction see committed state only. Writes always go
/// through [`AccountTx`], obtained from [`AccountStore::begin`].
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn AccountTx>>;

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Account>>;
    async fn get_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    /// One page ordered by creation time, plus the total number of accounts.
    async fn list(&self, skip: i64, limit: i64) -> StoreResult<(Vec<Account>, i64)>;

    /// Snapshot of every account.
    async fn list_all(&self) -> StoreResult<Vec<Account>>;
}

/// Unit of work over the account tables.
///
/// Dropping a transaction without calling [`AccountTx::commit`] rolls it back.
#[async_trait]
pub trait AccountTx: Send {
    async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<Account>>;
    async fn get_by_email(&mut self, email: &str) -> StoreResult<Option<Account>>;

    async fn insert(&mut self, account: &Account) -> StoreResult<()>;

    /// Overwrites every mutable column of `account`. Returns false if the row is gone.
    async fn update(&mut self, account: &Account) -> StoreResult<bool>;

    /// Sets `has_subscription = false, expiry_date = NULL` and nothing else.
    async fn clear_subscription(&mut self, id: Uuid) -> StoreResult<bool>;

    async fn delete_items_by_owner(&mut self, owner_id: Uuid) -> StoreResult<u64>;
    async fn delete(&mut self, id: Uuid) -> StoreResult<bool>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
