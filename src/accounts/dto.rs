use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::accounts::repo_types::Account;

/// Request body for superuser account creation.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountCreate {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub is_trial: bool,
    #[serde(default)]
    pub has_subscription: bool,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expiry_date: Option<OffsetDateTime>,
}

#[cfg(test)]
impl AccountCreate {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            full_name: None,
            is_active: true,
            is_superuser: false,
            is_trial: false,
            has_subscription: false,
            expiry_date: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Request body for public signup.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountRegister {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
}

/// Partial update applied by a superuser. Absent fields stay untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountUpdate {
    pub email: Option<String>,
    pub password: Option<String>,
    pub full_name: Option<String>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
    pub is_trial: Option<bool>,
    pub has_subscription: Option<bool>,
    /// `None` = absent, `Some(None)` = explicit null.
    #[serde(default, deserialize_with = "present_rfc3339")]
    pub expiry_date: Option<Option<OffsetDateTime>>,
}

fn present_rfc3339<'de, D>(d: D) -> Result<Option<Option<OffsetDateTime>>, D::Error>
where
    D: Deserializer<'de>,
{
    time::serde::rfc3339::option::deserialize(d).map(Some)
}

/// Partial self-service profile update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountUpdateMe {
    pub email: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePassword {
    pub current_password: String,
    pub new_password: String,
}

/// Public part of the account returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct AccountPublic {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub is_trial: bool,
    pub has_subscription: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expiry_date: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Account> for AccountPublic {
    fn from(a: Account) -> Self {
        Self {
            id: a.id,
            email: a.email,
            full_name: a.full_name,
            is_active: a.is_active,
            is_superuser: a.is_superuser,
            is_trial: a.is_trial,
            has_subscription: a.has_subscription,
            expiry_date: a.expiry_date,
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountsPublic {
    pub data: Vec<AccountPublic>,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn update_distinguishes_absent_and_null_expiry() {
        let absent: AccountUpdate = serde_json::from_str(r#"{"is_trial": true}"#).unwrap();
        assert_eq!(absent.expiry_date, None);
        assert_eq!(absent.is_trial, Some(true));

        let null: AccountUpdate = serde_json::from_str(r#"{"expiry_date": null}"#).unwrap();
        assert_eq!(null.expiry_date, Some(None));

        let set: AccountUpdate =
            serde_json::from_str(r#"{"expiry_date": "2030-01-02T03:04:05Z"}"#).unwrap();
        assert_eq!(
            set.expiry_date,
            Some(Some(time::macros::datetime!(2030-01-02 03:04:05 UTC)))
        );
    }

    #[test]
    fn create_defaults_to_active_plain_account() {
        let body: AccountCreate =
            serde_json::from_str(r#"{"email": "a@example.com", "password": "longenough"}"#)
                .unwrap();
        assert!(body.is_active);
        assert!(!body.is_superuser);
        assert!(!body.is_trial);
        assert_eq!(body.expiry_date, None);
    }

    #[test]
    fn public_account_never_carries_the_hash() {
        let account = Account {
            id: Uuid::new_v4(),
            email: "test@example.com".into(),
            full_name: None,
            hashed_password: "$argon2id$secret".into(),
            is_active: true,
            is_superuser: false,
            is_trial: false,
            has_subscription: false,
            expiry_date: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_string(&AccountPublic::from(account)).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains(r#""expiry_date":null"#));
        assert!(!json.contains("argon2"));
    }

    #[test]
    fn pagination_defaults() {
        let p: Pagination = serde_json::from_str("{}").unwrap();
        assert_eq!((p.skip, p.limit), (0, 100));
    }
}
