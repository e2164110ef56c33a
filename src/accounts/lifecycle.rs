//! Trial and subscription rules. Everything here is pure: callers pass `now`
//! and persist whatever comes back.

use time::{Duration, OffsetDateTime};

use crate::accounts::repo_types::Account;

/// Length of a freshly granted trial.
pub const TRIAL_PERIOD: Duration = Duration::days(30);

/// Outcome of judging one account against the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryVerdict {
    Unchanged,
    ClearSubscription,
}

impl ExpiryVerdict {
    pub fn apply(self, account: &mut Account) {
        if self == ExpiryVerdict::ClearSubscription {
            account.has_subscription = false;
            account.expiry_date = None;
        }
    }
}

pub fn evaluate_expiry(account: &Account, now: OffsetDateTime) -> ExpiryVerdict {
    match account.expiry_date {
        Some(expiry) if account.has_subscription && now > expiry => {
            ExpiryVerdict::ClearSubscription
        }
        _ => ExpiryVerdict::Unchanged,
    }
}

/// Expiry after a trial request. An existing expiry is never pushed back.
pub fn grant_trial_if_requested(
    requested: bool,
    existing: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> Option<OffsetDateTime> {
    if requested {
        existing.or(Some(now + TRIAL_PERIOD))
    } else {
        existing
    }
}

/// An explicit `has_subscription = false` drops the expiry.
pub fn clear_on_unsubscribe(
    has_subscription: Option<bool>,
    expiry: Option<OffsetDateTime>,
) -> Option<OffsetDateTime> {
    match has_subscription {
        Some(false) => None,
        _ => expiry,
    }
}

/// Subscription-relevant columns of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionState {
    pub is_trial: bool,
    pub has_subscription: bool,
    pub expiry_date: Option<OffsetDateTime>,
}

impl From<&Account> for SubscriptionState {
    fn from(a: &Account) -> Self {
        Self {
            is_trial: a.is_trial,
            has_subscription: a.has_subscription,
            expiry_date: a.expiry_date,
        }
    }
}

impl SubscriptionState {
    pub fn write_to(self, account: &mut Account) {
        account.is_trial = self.is_trial;
        account.has_subscription = self.has_subscription;
        account.expiry_date = self.expiry_date;
    }
}

/// Requested subscription changes; `None` leaves a column alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionDraft {
    pub is_trial: Option<bool>,
    pub has_subscription: Option<bool>,
    pub expiry_date: Option<Option<OffsetDateTime>>,
}

/// Resolves an update against the stored state.
///
/// Order: explicit expiry, trial grant, subscription flag, unsubscribe clear.
/// A trial grant turns the subscription on unless the same draft turns it off,
/// in which case the expiry ends up empty.
pub fn resolve_subscription(
    current: SubscriptionState,
    draft: SubscriptionDraft,
    now: OffsetDateTime,
) -> SubscriptionState {
    let mut expiry = match draft.expiry_date {
        Some(explicit) => explicit,
        None => current.expiry_date,
    };

    let trial_requested = draft.is_trial == Some(true);
    let granted = trial_requested && expiry.is_none();
    expiry = grant_trial_if_requested(trial_requested, expiry, now);

    let has_subscription = draft
        .has_subscription
        .unwrap_or(current.has_subscription || granted);

    expiry = clear_on_unsubscribe(draft.has_subscription, expiry);
    if !has_subscription {
        expiry = None;
    }

    SubscriptionState {
        is_trial: draft.is_trial.unwrap_or(current.is_trial),
        has_subscription,
        expiry_date: expiry,
    }
}

/// Resolves the subscription of an account that has no stored record yet.
/// A trial request always starts a fresh trial period.
pub fn new_subscription(mut draft: SubscriptionDraft, now: OffsetDateTime) -> SubscriptionState {
    if draft.is_trial == Some(true) {
        draft.expiry_date = None;
    }
    let blank = SubscriptionState {
        is_trial: false,
        has_subscription: false,
        expiry_date: None,
    };
    resolve_subscription(blank, draft, now)
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;
    use time::macros::datetime;
    use uuid::Uuid;

    const T0: OffsetDateTime = datetime!(2025-03-01 12:00 UTC);

    fn account(has_subscription: bool, expiry_date: Option<OffsetDateTime>) -> Account {
        Account {
            id: Uuid::new_v4(),
            email: "trial@example.com".into(),
            full_name: None,
            hashed_password: "x".into(),
            is_active: true,
            is_superuser: false,
            is_trial: true,
            has_subscription,
            expiry_date,
            created_at: T0,
        }
    }

    #[test]
    fn expired_subscription_is_cleared() {
        let mut a = account(true, Some(T0));
        let verdict = evaluate_expiry(&a, T0 + Duration::seconds(1));
        assert_eq!(verdict, ExpiryVerdict::ClearSubscription);
        verdict.apply(&mut a);
        assert!(!a.has_subscription);
        assert_eq!(a.expiry_date, None);
        assert!(a.is_trial);
    }

    #[test]
    fn expiry_instant_itself_is_still_active() {
        let a = account(true, Some(T0));
        assert_eq!(evaluate_expiry(&a, T0), ExpiryVerdict::Unchanged);
    }

    #[test]
    fn accounts_without_subscription_or_expiry_are_untouched() {
        let later = T0 + Duration::days(400);
        assert_eq!(evaluate_expiry(&account(false, Some(T0)), later), ExpiryVerdict::Unchanged);
        assert_eq!(evaluate_expiry(&account(true, None), later), ExpiryVerdict::Unchanged);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let now = T0 + Duration::days(31);
        let mut once = account(true, Some(T0 + TRIAL_PERIOD));
        evaluate_expiry(&once, now).apply(&mut once);
        let mut twice = once.clone();
        evaluate_expiry(&twice, now).apply(&mut twice);
        assert_eq!(once, twice);
        assert!(twice.has_subscription || twice.expiry_date.is_none());
    }

    #[test]
    fn trial_grant_keeps_an_existing_expiry() {
        let existing = Some(T0 + Duration::days(3));
        assert_eq!(grant_trial_if_requested(true, existing, T0), existing);
        assert_eq!(grant_trial_if_requested(true, None, T0), Some(T0 + TRIAL_PERIOD));
        assert_eq!(grant_trial_if_requested(false, None, T0), None);
    }

    #[test]
    fn explicit_unsubscribe_drops_expiry() {
        assert_eq!(clear_on_unsubscribe(Some(false), Some(T0)), None);
        assert_eq!(clear_on_unsubscribe(Some(true), Some(T0)), Some(T0));
        assert_eq!(clear_on_unsubscribe(None, Some(T0)), Some(T0));
    }

    #[test]
    fn new_trial_gets_thirty_days_and_a_subscription() {
        let state = new_subscription(
            SubscriptionDraft {
                is_trial: Some(true),
                ..Default::default()
            },
            T0,
        );
        assert!(state.is_trial);
        assert!(state.has_subscription);
        assert_eq!(state.expiry_date, Some(T0 + TRIAL_PERIOD));
    }

    #[test]
    fn new_trial_replaces_a_supplied_expiry() {
        let supplied = T0 + Duration::days(5);
        let state = new_subscription(
            SubscriptionDraft {
                is_trial: Some(true),
                has_subscription: Some(true),
                expiry_date: Some(Some(supplied)),
            },
            T0,
        );
        assert_eq!(state.expiry_date, Some(T0 + TRIAL_PERIOD));
    }

    #[test]
    fn new_account_without_subscription_has_no_expiry() {
        let state = new_subscription(
            SubscriptionDraft {
                is_trial: Some(false),
                has_subscription: Some(false),
                expiry_date: Some(Some(T0)),
            },
            T0,
        );
        assert_eq!(state.expiry_date, None);
        assert!(!state.has_subscription);
    }

    #[test]
    fn repeated_trial_request_does_not_reset_expiry() {
        let current = SubscriptionState {
            is_trial: true,
            has_subscription: true,
            expiry_date: Some(T0 + Duration::days(2)),
        };
        let draft = SubscriptionDraft {
            is_trial: Some(true),
            ..Default::default()
        };
        let next = resolve_subscription(current, draft, T0 + Duration::days(1));
        assert_eq!(next, current);
    }

    #[test]
    fn unsubscribe_wins_over_trial_grant() {
        let current = SubscriptionState {
            is_trial: false,
            has_subscription: true,
            expiry_date: None,
        };
        let draft = SubscriptionDraft {
            is_trial: Some(true),
            has_subscription: Some(false),
            expiry_date: None,
        };
        let next = resolve_subscription(current, draft, T0);
        assert!(next.is_trial);
        assert!(!next.has_subscription);
        assert_eq!(next.expiry_date, None);
    }

    #[test]
    fn no_subscription_never_keeps_an_expiry() {
        let current = SubscriptionState {
            is_trial: false,
            has_subscription: false,
            expiry_date: None,
        };
        let draft = SubscriptionDraft {
            expiry_date: Some(Some(T0)),
            ..Default::default()
        };
        let next = resolve_subscription(current, draft, T0);
        assert!(!next.has_subscription);
        assert_eq!(next.expiry_date, None);
    }
}
