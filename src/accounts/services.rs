use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::accounts::dto::{
    AccountCreate, AccountRegister, AccountUpdate, AccountUpdateMe, UpdatePassword,
};
use crate::accounts::lifecycle::{
    new_subscription, resolve_subscription, SubscriptionDraft, SubscriptionState,
};
use crate::accounts::repo::{AccountStore, StoreError};
use crate::accounts::repo_types::Account;
use crate::accounts::sweeper::Sweeper;
use crate::auth::password::CredentialHasher;
use crate::error::{AccountError, AccountResult, EmailConflict};
use crate::notify::{new_account_email, Notifier};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 40;
const MAX_FULL_NAME_LEN: usize = 255;
const NOT_ENOUGH_PRIVILEGES: &str = "The user doesn't have enough privileges";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(raw: &str) -> AccountResult<String> {
    let email = raw.trim().to_string();
    if !is_valid_email(&email) {
        return Err(AccountError::invalid_argument("Invalid email"));
    }
    Ok(email)
}

fn check_password(password: &str) -> AccountResult<()> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(AccountError::invalid_argument("Password too short"));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(AccountError::invalid_argument("Password too long"));
    }
    Ok(())
}

fn check_full_name(full_name: Option<&str>) -> AccountResult<()> {
    match full_name {
        Some(name) if name.chars().count() > MAX_FULL_NAME_LEN => {
            Err(AccountError::invalid_argument("Full name too long"))
        }
        _ => Ok(()),
    }
}

fn require_superuser(caller: &Account) -> AccountResult<()> {
    if caller.is_superuser {
        Ok(())
    } else {
        Err(AccountError::forbidden(NOT_ENOUGH_PRIVILEGES))
    }
}

/// One page of accounts plus the total count.
#[derive(Debug, Clone)]
pub struct AccountsPage {
    pub data: Vec<Account>,
    pub count: i64,
}

/// Orchestrates every account operation.
///
/// Each write runs in one store transaction. Operations that can change
/// subscription state schedule a background sweep after committing.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    hasher: Arc<dyn CredentialHasher>,
    notifier: Arc<dyn Notifier>,
    sweeper: Sweeper,
    project_name: String,
    emails_enabled: bool,
    sweep_on_write: bool,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        hasher: Arc<dyn CredentialHasher>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            sweeper: Sweeper::new(store.clone()),
            store,
            hasher,
            notifier,
            project_name: "accountd".into(),
            emails_enabled: false,
            sweep_on_write: true,
        }
    }

    pub fn with_emails(mut self, project_name: impl Into<String>, enabled: bool) -> Self {
        self.project_name = project_name.into();
        self.emails_enabled = enabled;
        self
    }

    pub fn with_sweep_on_write(mut self, enabled: bool) -> Self {
        self.sweep_on_write = enabled;
        self
    }

    pub fn sweeper(&self) -> &Sweeper {
        &self.sweeper
    }

    fn schedule_sweep(&self) {
        if self.sweep_on_write {
            // Handle dropped; the sweep outlives the request.
            let _ = self.sweeper.schedule();
        }
    }

    fn hash(&self, password: &str) -> AccountResult<String> {
        Ok(self.hasher.hash(password)?)
    }

    /// Loads the account behind an authenticated token.
    pub async fn find(&self, id: Uuid) -> AccountResult<Option<Account>> {
        Ok(self.store.get_by_id(id).await?)
    }

    #[instrument(skip(self, caller), fields(caller_id = %caller.id))]
    pub async fn list_accounts(
        &self,
        caller: &Account,
        skip: i64,
        limit: i64,
    ) -> AccountResult<AccountsPage> {
        require_superuser(caller)?;
        if skip < 0 || limit < 0 {
            return Err(AccountError::invalid_argument("skip and limit must be non-negative"));
        }
        let (data, count) = self.store.list(skip, limit).await?;
        Ok(AccountsPage { data, count })
    }

    #[instrument(skip(self, caller, data), fields(caller_id = %caller.id))]
    pub async fn create_account(
        &self,
        caller: &Account,
        data: AccountCreate,
    ) -> AccountResult<Account> {
        require_superuser(caller)?;
        let email = normalize_email(&data.email)?;
        check_password(&data.password)?;
        check_full_name(data.full_name.as_deref())?;

        let now = OffsetDateTime::now_utc();
        let subscription = new_subscription(
            SubscriptionDraft {
                is_trial: Some(data.is_trial),
                has_subscription: Some(data.has_subscription || data.is_trial),
                expiry_date: Some(data.expiry_date),
            },
            now,
        );
        let account = Account {
            id: Uuid::new_v4(),
            email,
            full_name: data.full_name,
            hashed_password: self.hash(&data.password)?,
            is_active: data.is_active,
            is_superuser: data.is_superuser,
            is_trial: subscription.is_trial,
            has_subscription: subscription.has_subscription,
            expiry_date: subscription.expiry_date,
            created_at: now,
        };
        let account = self.insert_new(account).await?;
        info!(user_id = %account.id, email = %account.email, "account created");

        if self.emails_enabled {
            let mail = new_account_email(&self.project_name, &account.email);
            if let Err(e) = self
                .notifier
                .send(&account.email, &mail.subject, &mail.body)
                .await
            {
                warn!(error = %e, user_id = %account.id, "welcome notification failed");
            }
        }

        self.schedule_sweep();
        Ok(account)
    }

    /// Public signup. Every new signup starts a fresh trial.
    #[instrument(skip(self, data))]
    pub async fn register(&self, data: AccountRegister) -> AccountResult<Account> {
        let email = normalize_email(&data.email)?;
        check_password(&data.password)?;
        check_full_name(data.full_name.as_deref())?;

        let now = OffsetDateTime::now_utc();
        let subscription = new_subscription(
            SubscriptionDraft {
                is_trial: Some(true),
                ..Default::default()
            },
            now,
        );
        let account = Account {
            id: Uuid::new_v4(),
            email,
            full_name: data.full_name,
            hashed_password: self.hash(&data.password)?,
            is_active: true,
            is_superuser: false,
            is_trial: subscription.is_trial,
            has_subscription: subscription.has_subscription,
            expiry_date: subscription.expiry_date,
            created_at: now,
        };
        let account = self.insert_new(account).await?;
        info!(user_id = %account.id, email = %account.email, "account registered");

        self.schedule_sweep();
        Ok(account)
    }

    async fn insert_new(&self, account: Account) -> AccountResult<Account> {
        let conflict = |e: StoreError| AccountError::from_store(e, EmailConflict::Creation);
        let mut tx = self.store.begin().await?;
        if tx.get_by_email(&account.email).await?.is_some() {
            warn!(email = %account.email, "email already registered");
            return Err(AccountError::Conflict(EmailConflict::Creation));
        }
        tx.insert(&account).await.map_err(conflict)?;
        tx.commit().await.map_err(conflict)?;
        Ok(account)
    }

    pub fn get_self(&self, caller: &Account) -> Account {
        caller.clone()
    }

    #[instrument(skip(self, caller, data), fields(caller_id = %caller.id))]
    pub async fn update_self(
        &self,
        caller: &Account,
        data: AccountUpdateMe,
    ) -> AccountResult<Account> {
        let email = data.email.as_deref().map(normalize_email).transpose()?;
        check_full_name(data.full_name.as_deref())?;

        let mut tx = self.store.begin().await?;
        let mut account = tx
            .get_by_id(caller.id)
            .await?
            .ok_or_else(|| AccountError::not_found("User not found"))?;

        if let Some(email) = email {
            if let Some(existing) = tx.get_by_email(&email).await? {
                if existing.id != account.id {
                    warn!(email = %email, user_id = %account.id, "email taken by another account");
                    return Err(AccountError::Conflict(EmailConflict::Update));
                }
            }
            account.email = email;
        }
        if let Some(full_name) = data.full_name {
            account.full_name = Some(full_name);
        }

        if !tx.update(&account).await? {
            return Err(AccountError::not_found("User not found"));
        }
        tx.commit().await?;
        info!(user_id = %account.id, "profile updated");
        Ok(account)
    }

    #[instrument(skip(self, caller, body), fields(caller_id = %caller.id))]
    pub async fn change_password(
        &self,
        caller: &Account,
        body: UpdatePassword,
    ) -> AccountResult<()> {
        let mut tx = self.store.begin().await?;
        let mut account = tx
            .get_by_id(caller.id)
            .await?
            .ok_or_else(|| AccountError::not_found("User not found"))?;

        if !self
            .hasher
            .verify(&body.current_password, &account.hashed_password)?
        {
            warn!(user_id = %account.id, "password change with wrong current password");
            return Err(AccountError::InvalidCredential("Incorrect password".into()));
        }
        if body.current_password == body.new_password {
            return Err(AccountError::invalid_argument(
                "New password cannot be the same as the current one",
            ));
        }
        check_password(&body.new_password)?;

        account.hashed_password = self.hash(&body.new_password)?;
        if !tx.update(&account).await? {
            return Err(AccountError::not_found("User not found"));
        }
        tx.commit().await?;
        info!(user_id = %account.id, "password updated");
        Ok(())
    }

    #[instrument(skip(self, caller), fields(caller_id = %caller.id))]
    pub async fn delete_self(&self, caller: &Account) -> AccountResult<()> {
        if caller.is_superuser {
            return Err(AccountError::forbidden(
                "Super users are not allowed to delete themselves",
            ));
        }
        self.delete_cascade(caller.id).await?;
        info!(user_id = %caller.id, "account deleted by owner");
        Ok(())
    }

    /// Self or superuser only. A superuser asking for a missing id gets
    /// NotFound; anyone else asking for a foreign id gets Forbidden.
    #[instrument(skip(self, caller), fields(caller_id = %caller.id))]
    pub async fn get_by_id(&self, caller: &Account, id: Uuid) -> AccountResult<Account> {
        if id == caller.id {
            return Ok(caller.clone());
        }
        require_superuser(caller)?;
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| AccountError::not_found("User not found"))
    }

    #[instrument(skip(self, caller, data), fields(caller_id = %caller.id))]
    pub async fn update_by_id(
        &self,
        caller: &Account,
        id: Uuid,
        data: AccountUpdate,
    ) -> AccountResult<Account> {
        require_superuser(caller)?;
        let email = data.email.as_deref().map(normalize_email).transpose()?;
        if let Some(password) = &data.password {
            check_password(password)?;
        }
        check_full_name(data.full_name.as_deref())?;

        let mut tx = self.store.begin().await?;
        let mut account = tx.get_by_id(id).await?.ok_or_else(|| {
            info!(user_id = %id, "update target not found");
            AccountError::not_found("The user with this id does not exist in the system")
        })?;

        if let Some(email) = email {
            if let Some(existing) = tx.get_by_email(&email).await? {
                if existing.id != id {
                    warn!(email = %email, user_id = %id, "email taken by another account");
                    return Err(AccountError::Conflict(EmailConflict::Update));
                }
            }
            account.email = email;
        }

        let before = SubscriptionState::from(&account);
        let after = resolve_subscription(
            before,
            SubscriptionDraft {
                is_trial: data.is_trial,
                has_subscription: data.has_subscription,
                expiry_date: data.expiry_date,
            },
            OffsetDateTime::now_utc(),
        );
        if after != before {
            debug!(user_id = %id, ?before, ?after, "subscription changed");
        }
        after.write_to(&mut account);

        if let Some(password) = &data.password {
            account.hashed_password = self.hash(password)?;
        }
        if let Some(full_name) = data.full_name {
            account.full_name = Some(full_name);
        }
        if let Some(is_active) = data.is_active {
            account.is_active = is_active;
        }
        if let Some(is_superuser) = data.is_superuser {
            account.is_superuser = is_superuser;
        }

        if !tx.update(&account).await? {
            return Err(AccountError::not_found(
                "The user with this id does not exist in the system",
            ));
        }
        tx.commit().await?;
        info!(user_id = %id, caller_id = %caller.id, "account updated");

        self.schedule_sweep();
        Ok(account)
    }

    #[instrument(skip(self, caller), fields(caller_id = %caller.id))]
    pub async fn delete_by_id(&self, caller: &Account, id: Uuid) -> AccountResult<()> {
        require_superuser(caller)?;
        if self.store.get_by_id(id).await?.is_none() {
            return Err(AccountError::not_found("User not found"));
        }
        if id == caller.id {
            return Err(AccountError::forbidden(
                "Super users are not allowed to delete themselves",
            ));
        }
        self.delete_cascade(id).await?;
        info!(user_id = %id, caller_id = %caller.id, "account deleted");
        Ok(())
    }

    /// Items first, then the account, in one transaction.
    async fn delete_cascade(&self, id: Uuid) -> AccountResult<()> {
        let mut tx = self.store.begin().await?;
        let items = tx.delete_items_by_owner(id).await?;
        if !tx.delete(id).await? {
            return Err(AccountError::not_found("User not found"));
        }
        tx.commit().await?;
        debug!(user_id = %id, items, "account and items removed");
        Ok(())
    }

    /// Checks login credentials. Unknown email and wrong password look the same.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> AccountResult<Account> {
        let invalid = || AccountError::Unauthorized("Invalid credentials".into());
        let Some(account) = self.store.get_by_email(email.trim()).await? else {
            warn!(email = %email, "login unknown email");
            return Err(invalid());
        };
        if !self.hasher.verify(password, &account.hashed_password)? {
            warn!(user_id = %account.id, "login invalid password");
            return Err(invalid());
        }
        if !account.is_active {
            return Err(AccountError::invalid_argument("Inactive user"));
        }
        Ok(account)
    }

    /// Creates the bootstrap superuser unless the email is already taken.
    pub async fn ensure_superuser(&self, email: &str, password: &str) -> AccountResult<Account> {
        let email = normalize_email(email)?;
        if let Some(existing) = self.store.get_by_email(&email).await? {
            debug!(user_id = %existing.id, "first superuser already present");
            return Ok(existing);
        }
        let account = Account {
            id: Uuid::new_v4(),
            email,
            full_name: None,
            hashed_password: self.hash(password)?,
            is_active: true,
            is_superuser: true,
            is_trial: false,
            has_subscription: false,
            expiry_date: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let account = self.insert_new(account).await?;
        info!(user_id = %account.id, email = %account.email, "first superuser created");
        Ok(account)
    }
}
