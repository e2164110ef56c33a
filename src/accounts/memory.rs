use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::accounts::lifecycle::ExpiryVerdict;
use crate::accounts::repo::{AccountStore, AccountTx, StoreError, StoreResult};
use crate::accounts::repo_types::{Account, Item};

#[derive(Debug, Clone, Default)]
struct Tables {
    accounts: HashMap<Uuid, Account>,
    items: HashMap<Uuid, Item>,
}

impl Tables {
    fn email_taken(&self, email: &str, except: Uuid) -> bool {
        self.accounts
            .values()
            .any(|a| a.email == email && a.id != except)
    }

    fn apply(&mut self, op: &Op) -> StoreResult<()> {
        match op {
            Op::Insert(account) => {
                if self.email_taken(&account.email, account.id) {
                    return Err(StoreError::DuplicateEmail(account.email.clone()));
                }
                self.accounts.insert(account.id, account.clone());
            }
            Op::Update(account) => {
                if self.email_taken(&account.email, account.id) {
                    return Err(StoreError::DuplicateEmail(account.email.clone()));
                }
                let Some(stored) = self.accounts.get_mut(&account.id) else {
                    return Err(StoreError::Missing(account.id));
                };
                let created_at = stored.created_at;
                *stored = account.clone();
                stored.created_at = created_at;
            }
            Op::ClearSubscription(id) => {
                if let Some(stored) = self.accounts.get_mut(id) {
                    ExpiryVerdict::ClearSubscription.apply(stored);
                }
            }
            Op::DeleteItemsByOwner(owner_id) => {
                self.items.retain(|_, item| item.owner_id != *owner_id);
            }
            Op::Delete(id) => {
                if self.items.values().any(|item| item.owner_id == *id) {
                    return Err(StoreError::OwnsItems(*id));
                }
                self.accounts.remove(id);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Op {
    Insert(Account),
    Update(Account),
    ClearSubscription(Uuid),
    DeleteItemsByOwner(Uuid),
    Delete(Uuid),
}

/// In-process account store.
///
/// A transaction stages its writes and applies them all at once on commit,
/// so concurrent transactions resolve as last writer wins.
#[derive(Clone, Default)]
pub struct MemoryAccountStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item owned by `owner_id`, outside of any transaction.
    #[cfg(test)]
    pub async fn insert_item(&self, owner_id: Uuid, title: &str) -> Item {
        let item = Item {
            id: Uuid::new_v4(),
            owner_id,
            title: title.to_string(),
            description: None,
        };
        self.tables.lock().await.items.insert(item.id, item.clone());
        item
    }

    #[cfg(test)]
    pub async fn items_owned_by(&self, owner_id: Uuid) -> Vec<Item> {
        self.tables
            .lock()
            .await
            .items
            .values()
            .filter(|item| item.owner_id == owner_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn begin(&self) -> StoreResult<Box<dyn AccountTx>> {
        Ok(Box::new(MemoryAccountTx {
            tables: self.tables.clone(),
            staged: Vec::new(),
        }))
    }

    async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self.tables.lock().await.accounts.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        Ok(self
            .tables
            .lock()
            .await
            .accounts
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn list(&self, skip: i64, limit: i64) -> StoreResult<(Vec<Account>, i64)> {
        let tables = self.tables.lock().await;
        let mut all: Vec<Account> = tables.accounts.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let count = all.len() as i64;
        let page = all
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, count))
    }

    async fn list_all(&self) -> StoreResult<Vec<Account>> {
        Ok(self.tables.lock().await.accounts.values().cloned().collect())
    }
}

pub struct MemoryAccountTx {
    tables: Arc<Mutex<Tables>>,
    staged: Vec<Op>,
}

impl MemoryAccountTx {
    /// Committed state with this transaction's staged writes on top.
    async fn view(&self) -> Tables {
        let mut view = self.tables.lock().await.clone();
        for op in &self.staged {
            // Conflicts surface again at commit.
            let _ = view.apply(op);
        }
        view
    }
}

#[async_trait]
impl AccountTx for MemoryAccountTx {
    async fn get_by_id(&mut self, id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self.view().await.accounts.remove(&id))
    }

    async fn get_by_email(&mut self, email: &str) -> StoreResult<Option<Account>> {
        Ok(self
            .view()
            .await
            .accounts
            .into_values()
            .find(|a| a.email == email))
    }

    async fn insert(&mut self, account: &Account) -> StoreResult<()> {
        if self.view().await.email_taken(&account.email, account.id) {
            return Err(StoreError::DuplicateEmail(account.email.clone()));
        }
        self.staged.push(Op::Insert(account.clone()));
        Ok(())
    }

    async fn update(&mut self, account: &Account) -> StoreResult<bool> {
        let view = self.view().await;
        if !view.accounts.contains_key(&account.id) {
            return Ok(false);
        }
        if view.email_taken(&account.email, account.id) {
            return Err(StoreError::DuplicateEmail(account.email.clone()));
        }
        self.staged.push(Op::Update(account.clone()));
        Ok(true)
    }

    async fn clear_subscription(&mut self, id: Uuid) -> StoreResult<bool> {
        let exists = self.view().await.accounts.contains_key(&id);
        if exists {
            self.staged.push(Op::ClearSubscription(id));
        }
        Ok(exists)
    }

    async fn delete_items_by_owner(&mut self, owner_id: Uuid) -> StoreResult<u64> {
        let owned = self
            .view()
            .await
            .items
            .values()
            .filter(|item| item.owner_id == owner_id)
            .count();
        self.staged.push(Op::DeleteItemsByOwner(owner_id));
        Ok(owned as u64)
    }

    async fn delete(&mut self, id: Uuid) -> StoreResult<bool> {
        let exists = self.view().await.accounts.contains_key(&id);
        if exists {
            self.staged.push(Op::Delete(id));
        }
        Ok(exists)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let mut tables = self.tables.lock().await;
        let mut next = tables.clone();
        for op in &self.staged {
            next.apply(op)?;
        }
        *tables = next;
        Ok(())
    }
}
