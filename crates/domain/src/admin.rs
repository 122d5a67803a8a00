//! Admin identity cache, setup form and login throttling.

use std::collections::HashMap;
use std::time::Duration;

use persistence::identity::MIN_PASSWORD_LEN;
use persistence::{AdminCredentials, AdminProfile, is_valid_email};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;

/// Failed sign-ins allowed per window.
pub const MAX_LOGIN_ATTEMPTS: usize = 5;

/// Length of the login throttling window.
pub const LOGIN_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Errors from admin setup and sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Invalid email address")]
    InvalidEmail,

    /// An admin account exists already; setup runs only once.
    #[error("An admin account already exists")]
    AlreadyConfigured,

    #[error("Too many login attempts. Try again in {retry_after_secs} seconds")]
    TooManyAttempts { retry_after_secs: u64 },
}

/// Local view of the identity service's state.
///
/// Only the profile is ever persisted; `authenticated` always starts false.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCache {
    pub profile: Option<AdminProfile>,
    #[serde(skip)]
    pub authenticated: bool,
}

/// First-run admin account form.
#[derive(Debug)]
pub struct AdminSetupForm {
    pub email: String,
    pub username: Option<String>,
    pub password: SecretString,
    pub confirm_password: SecretString,
}

impl AdminSetupForm {
    /// Validates the form and converts it into identity credentials.
    pub fn into_credentials(self) -> Result<AdminCredentials, AdminError> {
        if self.password.expose_secret() != self.confirm_password.expose_secret() {
            return Err(AdminError::PasswordMismatch);
        }
        if self.password.expose_secret().chars().count() < MIN_PASSWORD_LEN {
            return Err(AdminError::PasswordTooShort {
                min: MIN_PASSWORD_LEN,
            });
        }
        let email = self.email.trim().to_string();
        if !is_valid_email(&email) {
            return Err(AdminError::InvalidEmail);
        }

        Ok(AdminCredentials {
            email,
            password: self.password,
            username: self.username,
        })
    }
}

/// Throttles failed sign-ins per identifier within a sliding window.
#[derive(Debug)]
pub struct LoginRateLimiter {
    max_attempts: usize,
    window: Duration,
    failures: HashMap<String, Vec<Instant>>,
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new(MAX_LOGIN_ATTEMPTS, LOGIN_WINDOW)
    }
}

impl LoginRateLimiter {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            failures: HashMap::new(),
        }
    }

    /// Returns `Err` with the remaining lockout if `identifier` is locked.
    pub fn check(&mut self, identifier: &str) -> Result<(), AdminError> {
        let now = Instant::now();
        let key = identifier.trim().to_lowercase();
        let Some(failures) = self.failures.get_mut(&key) else {
            return Ok(());
        };

        failures.retain(|at| now.duration_since(*at) < self.window);
        if failures.len() < self.max_attempts {
            return Ok(());
        }

        let remaining = failures
            .first()
            .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
            .unwrap_or_default();
        Err(AdminError::TooManyAttempts {
            retry_after_secs: remaining.as_secs().max(1),
        })
    }

    pub fn record_failure(&mut self, identifier: &str) {
        self.failures
            .entry(identifier.trim().to_lowercase())
            .or_default()
            .push(Instant::now());
    }

    /// Forgets failures for `identifier` after a successful sign-in.
    pub fn reset(&mut self, identifier: &str) {
        self.failures.remove(&identifier.trim().to_lowercase());
    }
}
