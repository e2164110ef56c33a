use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::accounts::repo::{AccountStore, AccountTx, StoreError, StoreResult};
use crate::accounts::repo_types::Account;

const ACCOUNT_COLUMNS: &str = "id, email, full_name, hashed_password, is_active, is_superuser, \
     is_trial, has_subscription, expiry_date, created_at";

#[derive(Clone)]
pub struct PgAccountStore {
    db: PgPool,
}

impl PgAccountStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }
}

/// Maps a unique violation on `users.email` to [`StoreError::DuplicateEmail`].
fn map_write_error(err: sqlx::Error, email: &str) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::DuplicateEmail(email.to_string());
        }
    }
    StoreError::Database(err)
}

/// Maps a foreign key violation from `items.owner_id` to [`StoreError::OwnsItems`].
fn map_delete_error(err: sqlx::Error, id: Uuid) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23503") {
            return StoreError::OwnsItems(id);
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn begin(&self) -> StoreResult<Box<dyn AccountTx>> {
        let tx = self.db.begin().await?;
        Ok(Box::new(PgAccountTx { tx }))
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(account)
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(account)
    }

    async fn list(&self, skip: i64, limit: i64) -> StoreResult<(Vec<Account>, i64)> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*)::BIGINT FROM users")
            .fetch_one(&self.db)
            .await?;
        let rows = sqlx::query_as::<_, Account>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM users
            ORDER BY created_at ASC, id ASC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.db)
        .await?;
        Ok((rows, count))
    }

    async fn list_all(&self) -> StoreResult<Vec<Account>> {
        let rows = sqlx::query_as::<_, Account>(&format!("SELECT {ACCOUNT_COLUMNS} FROM users"))
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }
}

pub struct PgAccountTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AccountTx for PgAccountTx {
    async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(account)
    }

    async fn get_by_email(&mut self, email: &str) -> StoreResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(account)
    }

    async fn insert(&mut self, account: &Account) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, full_name, hashed_password, is_active, is_superuser,
                               is_trial, has_subscription, expiry_date, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.full_name)
        .bind(&account.hashed_password)
        .bind(account.is_active)
        .bind(account.is_superuser)
        .bind(account.is_trial)
        .bind(account.has_subscription)
        .bind(account.expiry_date)
        .bind(account.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_write_error(e, &account.email))?;
        Ok(())
    }

    async fn update(&mut self, account: &Account) -> StoreResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET email = $2,
                   full_name = $3,
                   hashed_password = $4,
                   is_active = $5,
                   is_superuser = $6,
                   is_trial = $7,
                   has_subscription = $8,
                   expiry_date = $9
             WHERE id = $1
            "#,
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.full_name)
        .bind(&account.hashed_password)
        .bind(account.is_active)
        .bind(account.is_superuser)
        .bind(account.is_trial)
        .bind(account.has_subscription)
        .bind(account.expiry_date)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_write_error(e, &account.email))?;
        Ok(res.rows_affected() == 1)
    }

    async fn clear_subscription(&mut self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query(
            "UPDATE users SET has_subscription = FALSE, expiry_date = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *self.tx)
        .await?;
        Ok(res.rows_affected() == 1)
    }

    async fn delete_items_by_owner(&mut self, owner_id: Uuid) -> StoreResult<u64> {
        let res = sqlx::query("DELETE FROM items WHERE owner_id = $1")
            .bind(owner_id)
            .execute(&mut *self.tx)
            .await?;
        debug!(owner_id = %owner_id, deleted = res.rows_affected(), "items deleted");
        Ok(res.rows_affected())
    }

    async fn delete(&mut self, id: Uuid) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_delete_error(e, id))?;
        Ok(res.rows_affected() == 1)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
