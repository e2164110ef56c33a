use async_trait::async_trait;
use tracing::info;

/// Outbound notifications (email in production setups).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Writes every notification to the log instead of a mail transport.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(to, subject, body_len = body.len(), "notification sent");
        Ok(())
    }
}

pub struct EmailData {
    pub subject: String,
    pub body: String,
}

pub fn new_account_email(project_name: &str, email_to: &str) -> EmailData {
    EmailData {
        subject: format!("{project_name} - New account for user {email_to}"),
        body: format!(
            "Welcome to {project_name}!\n\n\
             An account has been created for you with the username {email_to}.\n\
             Sign in with the password you were given and change it from your profile."
        ),
    }
}
