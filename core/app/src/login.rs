//! Login flow with offline-aware messaging.

use std::fmt;

use nivelver_common::{Error, Result, User};
use nivelver_storage::CloudStore;
use nivelver_sync::SyncCoordinator;

use crate::reachability::Reachability;

/// Result of a login attempt that passed input validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Credentials matched the local record.
    Welcome { user: User, offline: bool },
    /// Unknown user or wrong password.
    Rejected { offline: bool },
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::Welcome { .. })
    }

    pub fn is_offline(&self) -> bool {
        match self {
            LoginOutcome::Welcome { offline, .. } | LoginOutcome::Rejected { offline } => *offline,
        }
    }

    /// Message shown to the user.
    ///
    /// A rejection while offline may just mean the account was never
    /// pulled to this device, so it asks the user to connect once.
    pub fn message(&self) -> String {
        match self {
            LoginOutcome::Welcome { user, offline: false } => {
                format!("Welcome, {}!", user.username)
            }
            LoginOutcome::Welcome { user, offline: true } => {
                format!("Welcome, {}! (offline mode)", user.username)
            }
            LoginOutcome::Rejected { offline: false } => {
                "Incorrect username or password".to_string()
            }
            LoginOutcome::Rejected { offline: true } => {
                "No connection. Connect once to sign in for the first time.".to_string()
            }
        }
    }
}

impl fmt::Display for LoginOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Check credentials against the local store.
///
/// # Errors
/// - `Validation("Fill in all fields")` if either field is blank
/// - Local storage failures
pub async fn login<C>(
    coordinator: &SyncCoordinator<C>,
    reachability: &dyn Reachability,
    username: &str,
    password: &str,
) -> Result<LoginOutcome>
where
    C: CloudStore + ?Sized + 'static,
{
    let username = username.trim();
    if username.is_empty() || password.trim().is_empty() {
        return Err(Error::Validation("Fill in all fields".to_string()));
    }

    let offline = !reachability.is_reachable().await;
    let outcome = match coordinator.verify_user_password(username, password).await? {
        Some(user) => LoginOutcome::Welcome { user, offline },
        None => LoginOutcome::Rejected { offline },
    };

    tracing::debug!("Login for {}: success={}, offline={}", username, outcome.is_success(), offline);
    Ok(outcome)
}
