use std::sync::Arc;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::accounts::lifecycle::{evaluate_expiry, ExpiryVerdict};
use crate::accounts::repo::{AccountStore, StoreResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub cleared: usize,
    pub failed: usize,
}

/// Demotes expired subscriptions across the whole account table.
///
/// Concurrent sweeps need no coordination: clearing an already cleared
/// account is a no-op.
#[derive(Clone)]
pub struct Sweeper {
    store: Arc<dyn AccountStore>,
}

impl Sweeper {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    /// Runs a sweep in the background. Nobody has to await the handle;
    /// failures only reach the log.
    pub fn schedule(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            match this.sweep(OffsetDateTime::now_utc()).await {
                Ok(report) if report.cleared > 0 || report.failed > 0 => {
                    info!(
                        scanned = report.scanned,
                        cleared = report.cleared,
                        failed = report.failed,
                        "subscription sweep finished"
                    );
                }
                Ok(report) => debug!(scanned = report.scanned, "subscription sweep found nothing"),
                Err(e) => error!(error = %e, "subscription sweep failed"),
            }
        })
    }

    /// Only loading the snapshot can fail; per-account failures are counted
    /// and the sweep moves on.
    pub async fn sweep(&self, now: OffsetDateTime) -> StoreResult<SweepReport> {
        let accounts = self.store.list_all().await?;
        let mut report = SweepReport {
            scanned: accounts.len(),
            ..Default::default()
        };

        for account in accounts {
            if evaluate_expiry(&account, now) != ExpiryVerdict::ClearSubscription {
                continue;
            }
            match self.clear_one(account.id, now).await {
                Ok(true) => {
                    debug!(user_id = %account.id, "subscription expired");
                    report.cleared += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(error = %e, user_id = %account.id, "failed to clear expired subscription");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// Re-reads the account in its own transaction so a write that landed
    /// after the snapshot is judged on its current state.
    async fn clear_one(&self, id: Uuid, now: OffsetDateTime) -> StoreResult<bool> {
        let mut tx = self.store.begin().await?;
        let Some(current) = tx.get_by_id(id).await? else {
            return Ok(false);
        };
        if evaluate_expiry(&current, now) != ExpiryVerdict::ClearSubscription {
            return Ok(false);
        }
        let cleared = tx.clear_subscription(id).await?;
        tx.commit().await?;
        Ok(cleared)
    }
}

#[cfg(test)]
mod sweeper_tests {
    use super::*;
    use crate::accounts::lifecycle::TRIAL_PERIOD;
    use crate::accounts::memory::MemoryAccountStore;
    use crate::accounts::repo::{AccountTx, StoreError};
    use crate::accounts::repo_types::Account;
    use async_trait::async_trait;
    use time::{macros::datetime, Duration};

    const T0: OffsetDateTime = datetime!(2025-03-01 12:00 UTC);

    fn account(email: &str, has_subscription: bool, expiry: Option<OffsetDateTime>) -> Account {
        Account {
            id: Uuid::new_v4(),
            email: email.into(),
            full_name: None,
            hashed_password: "hash".into(),
            is_active: true,
            is_superuser: false,
            is_trial: expiry.is_some(),
            has_subscription,
            expiry_date: expiry,
            created_at: T0,
        }
    }

    async fn seed(store: &MemoryAccountStore, accounts: &[Account]) {
        let mut tx = store.begin().await.unwrap();
        for a in accounts {
            tx.insert(a).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn sweep_clears_only_expired_subscriptions() {
        let store = MemoryAccountStore::new();
        let expired = account("expired@example.com", true, Some(T0 + TRIAL_PERIOD));
        let active = account("active@example.com", true, Some(T0 + Duration::days(60)));
        let lifetime = account("lifetime@example.com", true, None);
        seed(&store, &[expired.clone(), active.clone(), lifetime.clone()]).await;

        let sweeper = Sweeper::new(Arc::new(store.clone()));
        let report = sweeper.sweep(T0 + Duration::days(31)).await.unwrap();
        assert_eq!(report, SweepReport { scanned: 3, cleared: 1, failed: 0 });

        let after = store.get_by_id(expired.id).await.unwrap().unwrap();
        assert!(!after.has_subscription);
        assert_eq!(after.expiry_date, None);
        assert_eq!(store.get_by_id(active.id).await.unwrap().unwrap(), active);
        assert_eq!(store.get_by_id(lifetime.id).await.unwrap().unwrap(), lifetime);
    }

    #[tokio::test]
    async fn second_sweep_changes_nothing() {
        let store = MemoryAccountStore::new();
        seed(&store, &[account("a@example.com", true, Some(T0))]).await;
        let sweeper = Sweeper::new(Arc::new(store.clone()));

        let first = sweeper.sweep(T0 + Duration::days(1)).await.unwrap();
        let snapshot = store.list_all().await.unwrap();
        let second = sweeper.sweep(T0 + Duration::days(2)).await.unwrap();

        assert_eq!(first.cleared, 1);
        assert_eq!(second.cleared, 0);
        assert_eq!(store.list_all().await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn concurrent_sweeps_converge() {
        let store = MemoryAccountStore::new();
        let accounts: Vec<_> = (0..20)
            .map(|i| account(&format!("u{i}@example.com"), true, Some(T0)))
            .collect();
        seed(&store, &accounts).await;
        let sweeper = Sweeper::new(Arc::new(store.clone()));

        let now = T0 + Duration::hours(1);
        let (a, b) = tokio::join!(sweeper.sweep(now), sweeper.sweep(now));
        assert_eq!(a.unwrap().failed + b.unwrap().failed, 0);
        for a in store.list_all().await.unwrap() {
            assert!(!a.has_subscription);
            assert_eq!(a.expiry_date, None);
        }
    }

    #[tokio::test]
    async fn renewal_after_snapshot_is_not_clobbered() {
        let store = MemoryAccountStore::new();
        let mut a = account("renew@example.com", true, Some(T0));
        seed(&store, &[a.clone()]).await;

        // Renewed between the snapshot and the per-account transaction.
        a.expiry_date = Some(T0 + Duration::days(365));
        let mut tx = store.begin().await.unwrap();
        tx.update(&a).await.unwrap();
        tx.commit().await.unwrap();

        let sweeper = Sweeper::new(Arc::new(store.clone()));
        assert!(!sweeper.clear_one(a.id, T0 + Duration::days(1)).await.unwrap());
        assert_eq!(store.get_by_id(a.id).await.unwrap().unwrap().expiry_date, a.expiry_date);
    }

    /// Fails every transaction for one account, delegates everything else.
    struct FlakyStore {
        inner: MemoryAccountStore,
        broken: Uuid,
    }

    #[async_trait]
    impl AccountStore for FlakyStore {
        async fn begin(&self) -> StoreResult<Box<dyn AccountTx>> {
            Ok(Box::new(FlakyTx {
                inner: self.inner.begin().await?,
                broken: self.broken,
            }))
        }
        async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Account>> {
            self.inner.get_by_id(id).await
        }
        async fn get_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
            self.inner.get_by_email(email).await
        }
        async fn list(&self, skip: i64, limit: i64) -> StoreResult<(Vec<Account>, i64)> {
            self.inner.list(skip, limit).await
        }
        async fn list_all(&self) -> StoreResult<Vec<Account>> {
            self.inner.list_all().await
        }
    }

    struct FlakyTx {
        inner: Box<dyn AccountTx>,
        broken: Uuid,
    }

    #[async_trait]
    impl AccountTx for FlakyTx {
        async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<Account>> {
            self.inner.get_by_id(id).await
        }
        async fn get_by_email(&mut self, email: &str) -> StoreResult<Option<Account>> {
            self.inner.get_by_email(email).await
        }
        async fn insert(&mut self, account: &Account) -> StoreResult<()> {
            self.inner.insert(account).await
        }
        async fn update(&mut self, account: &Account) -> StoreResult<bool> {
            self.inner.update(account).await
        }
        async fn clear_subscription(&mut self, id: Uuid) -> StoreResult<bool> {
            if id == self.broken {
                return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.clear_subscription(id).await
        }
        async fn delete_items_by_owner(&mut self, owner_id: Uuid) -> StoreResult<u64> {
            self.inner.delete_items_by_owner(owner_id).await
        }
        async fn delete(&mut self, id: Uuid) -> StoreResult<bool> {
            self.inner.delete(id).await
        }
        async fn commit(self: Box<Self>) -> StoreResult<()> {
            self.inner.commit().await
        }
    }

    #[tokio::test]
    async fn one_failing_account_does_not_stop_the_sweep() {
        let store = MemoryAccountStore::new();
        let broken = account("broken@example.com", true, Some(T0));
        let fine = account("fine@example.com", true, Some(T0));
        seed(&store, &[broken.clone(), fine.clone()]).await;

        let sweeper = Sweeper::new(Arc::new(FlakyStore {
            inner: store.clone(),
            broken: broken.id,
        }));
        let report = sweeper.sweep(T0 + Duration::days(1)).await.unwrap();
        assert_eq!(report, SweepReport { scanned: 2, cleared: 1, failed: 1 });
        assert!(store.get_by_id(broken.id).await.unwrap().unwrap().has_subscription);
        assert!(!store.get_by_id(fine.id).await.unwrap().unwrap().has_subscription);
    }

    #[tokio::test]
    async fn scheduled_sweep_runs_in_background() {
        let store = MemoryAccountStore::new();
        let a = account("bg@example.com", true, Some(OffsetDateTime::now_utc() - Duration::days(1)));
        seed(&store, &[a.clone()]).await;

        Sweeper::new(Arc::new(store.clone()))
            .schedule()
            .await
            .expect("sweep task panicked");
        assert!(!store.get_by_id(a.id).await.unwrap().unwrap().has_subscription);
    }
}
