//! Admin identity service contract, with in-memory and file-backed
//! implementations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::snapshot::{FileSnapshotSlot, SnapshotSlot};

/// Minimum accepted admin password length.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Errors returned by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Unknown account or wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// The account exists but is not an administrator.
    #[error("Access denied. Admin privileges required.")]
    AccessDenied,

    /// An account with this email already exists.
    #[error("Email is already registered")]
    EmailInUse,

    /// The password does not meet the minimum requirements.
    #[error("Password is too weak")]
    WeakPassword,

    /// The email address is malformed.
    #[error("Invalid email address")]
    InvalidEmail,

    /// No admin is signed in.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The identity backend could not be reached.
    #[error("Identity service unavailable: {0}")]
    Unavailable(String),
}

/// Public profile of an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminProfile {
    pub uid: String,
    pub email: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

/// Credentials used to create the first admin account.
#[derive(Debug)]
pub struct AdminCredentials {
    pub email: String,
    pub password: SecretString,
    /// Display name; defaults to `"admin"`.
    pub username: Option<String>,
}

/// Identity operations consumed by the domain store.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Signs an administrator in and returns their profile.
    async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AdminProfile, IdentityError>;

    /// Registers a new administrator and signs them in.
    async fn create_admin(
        &self,
        credentials: AdminCredentials,
    ) -> Result<AdminProfile, IdentityError>;

    /// Ends the current session. Signing out twice is harmless.
    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Returns true while an administrator is signed in.
    async fn is_authenticated(&self) -> bool;

    /// Profile of the signed-in administrator, if any.
    async fn current_admin(&self) -> Option<AdminProfile>;

    /// Returns true if at least one admin account has been created.
    async fn check_admin_exists(&self) -> Result<bool, IdentityError>;

    /// Bearer token of the current session, if any.
    async fn id_token(&self) -> Option<String>;

    /// Returns true if `token` belongs to the current session.
    async fn verify_token(&self, token: &str) -> bool;
}

/// Returns true if `email` looks like `local@domain.tld` with no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Hashes a password with Argon2id.
fn hash_password(password: &SecretString) -> Result<String, IdentityError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| IdentityError::Unavailable(format!("could not hash password: {e}")))
}

fn verify_password(password: &SecretString, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.expose_secret().as_bytes(), &parsed)
        .is_ok()
}

/// An admin account as written to disk. Only the password hash is kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Account {
    #[serde(flatten)]
    profile: AdminProfile,
    password_hash: String,
}

#[derive(Default)]
struct IdentityState {
    accounts: HashMap<String, Account>,
    session: Option<(String, String)>,
    unavailable: bool,
}

/// In-memory identity service for tests and local runs.
#[derive(Clone, Default)]
pub struct InMemoryIdentityService {
    state: Arc<RwLock<IdentityState>>,
}

impl std::fmt::Debug for InMemoryIdentityService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InMemoryIdentityService")
            .field("accounts", &state.accounts.len())
            .field("signed_in", &state.session.is_some())
            .finish()
    }
}

impl InMemoryIdentityService {
    /// Creates a service with no accounts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `Unavailable` (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    /// Number of registered accounts.
    pub fn account_count(&self) -> usize {
        self.read().accounts.len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IdentityState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IdentityState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(state: &IdentityState) -> Result<(), IdentityError> {
        if state.unavailable {
            return Err(IdentityError::Unavailable(
                "identity backend offline".to_string(),
            ));
        }
        Ok(())
    }

    fn accounts(&self) -> Vec<Account> {
        self.read().accounts.values().cloned().collect()
    }

    fn restore_accounts(&self, accounts: Vec<Account>) {
        let mut state = self.write();
        for account in accounts {
            state
                .accounts
                .insert(account.profile.email.to_lowercase(), account);
        }
    }

    /// Drops an account and any session it holds.
    fn forget(&self, email: &str) {
        let key = email.to_lowercase();
        let mut state = self.write();
        state.accounts.remove(&key);
        if state.session.as_ref().is_some_and(|(k, _)| *k == key) {
            state.session = None;
        }
    }

    fn start_session(state: &mut IdentityState, key: &str) -> Result<AdminProfile, IdentityError> {
        let account = state
            .accounts
            .get_mut(key)
            .ok_or(IdentityError::InvalidCredentials)?;
        account.profile.last_login = Some(Utc::now());
        let profile = account.profile.clone();

        state.session = Some((key.to_string(), Uuid::new_v4().simple().to_string()));
        Ok(profile)
    }
}

#[async_trait]
impl IdentityService for InMemoryIdentityService {
    async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AdminProfile, IdentityError> {
        let email = email.trim();
        let key = email.to_lowercase();
        let stored_hash = {
            let state = self.read();
            Self::check_available(&state)?;
            if !is_valid_email(email) {
                return Err(IdentityError::InvalidEmail);
            }
            state.accounts.get(&key).map(|a| a.password_hash.clone())
        };

        let matches = stored_hash.is_some_and(|hash| verify_password(password, &hash));
        if !matches {
            tracing::warn!(%email, "Admin sign-in rejected");
            return Err(IdentityError::InvalidCredentials);
        }

        let mut state = self.write();
        let profile = Self::start_session(&mut state, &key)?;
        tracing::info!(uid = %profile.uid, "Admin signed in");
        Ok(profile)
    }

    async fn create_admin(
        &self,
        credentials: AdminCredentials,
    ) -> Result<AdminProfile, IdentityError> {
        Self::check_available(&self.read())?;

        let email = credentials.email.trim();
        if !is_valid_email(email) {
            return Err(IdentityError::InvalidEmail);
        }
        if credentials.password.expose_secret().chars().count() < MIN_PASSWORD_LEN {
            return Err(IdentityError::WeakPassword);
        }
        let password_hash = hash_password(&credentials.password)?;

        let mut state = self.write();
        let key = email.to_lowercase();
        if state.accounts.contains_key(&key) {
            return Err(IdentityError::EmailInUse);
        }

        let username = credentials
            .username
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| "admin".to_string());

        let profile = AdminProfile {
            uid: Uuid::new_v4().simple().to_string(),
            email: email.to_string(),
            username,
            created_at: Utc::now(),
            last_login: None,
        };
        state.accounts.insert(
            key.clone(),
            Account {
                profile,
                password_hash,
            },
        );

        let profile = Self::start_session(&mut state, &key)?;
        tracing::info!(uid = %profile.uid, "Admin account created");
        Ok(profile)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let mut state = self.write();
        Self::check_available(&state)?;
        state.session = None;
        Ok(())
    }

    async fn is_authenticated(&self) -> bool {
        self.read().session.is_some()
    }

    async fn current_admin(&self) -> Option<AdminProfile> {
        let state = self.read();
        let (key, _) = state.session.as_ref()?;
        state.accounts.get(key).map(|a| a.profile.clone())
    }

    async fn check_admin_exists(&self) -> Result<bool, IdentityError> {
        let state = self.read();
        Self::check_available(&state)?;
        Ok(!state.accounts.is_empty())
    }

    async fn id_token(&self) -> Option<String> {
        self.read().session.as_ref().map(|(_, token)| token.clone())
    }

    async fn verify_token(&self, token: &str) -> bool {
        self.read()
            .session
            .as_ref()
            .is_some_and(|(_, current)| !token.is_empty() && current == token)
    }
}

/// Identity service whose accounts survive restarts.
///
/// Accounts (profile plus Argon2 password hash) live in a JSON file;
/// sessions are held in memory and end with the process.
#[derive(Debug, Clone)]
pub struct FileIdentityService {
    inner: InMemoryIdentityService,
    file: FileSnapshotSlot,
}

impl FileIdentityService {
    /// Loads the accounts stored at `path`. A missing file means no admin
    /// has been set up yet; an unreadable one is an error.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, IdentityError> {
        let file = FileSnapshotSlot::new(path);
        let inner = InMemoryIdentityService::new();

        let raw = file.load().await.map_err(|e| account_file_error(file.path(), e))?;
        if let Some(raw) = raw.filter(|raw| !raw.trim().is_empty()) {
            let accounts: Vec<Account> = serde_json::from_str(&raw)
                .map_err(|e| account_file_error(file.path(), e))?;
            tracing::info!(
                accounts = accounts.len(),
                path = %file.path().display(),
                "Admin accounts loaded"
            );
            inner.restore_accounts(accounts);
        }

        Ok(Self { inner, file })
    }

    /// The file holding the accounts.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    async fn save(&self) -> Result<(), IdentityError> {
        let contents = serde_json::to_string_pretty(&self.inner.accounts())
            .map_err(|e| account_file_error(self.file.path(), e))?;
        self.file
            .save(&contents)
            .await
            .map_err(|e| account_file_error(self.file.path(), e))
    }
}

fn account_file_error(path: &Path, err: impl std::fmt::Display) -> IdentityError {
    IdentityError::Unavailable(format!("admin account file {}: {err}", path.display()))
}

#[async_trait]
impl IdentityService for FileIdentityService {
    async fn sign_in(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<AdminProfile, IdentityError> {
        self.inner.sign_in(email, password).await
    }

    /// The account is only kept once it has been written to disk.
    async fn create_admin(
        &self,
        credentials: AdminCredentials,
    ) -> Result<AdminProfile, IdentityError> {
        let profile = self.inner.create_admin(credentials).await?;
        if let Err(err) = self.save().await {
            tracing::error!(error = %err, "Admin account not persisted, rolling back");
            self.inner.forget(&profile.email);
            return Err(err);
        }
        Ok(profile)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        self.inner.sign_out().await
    }

    async fn is_authenticated(&self) -> bool {
        self.inner.is_authenticated().await
    }

    async fn current_admin(&self) -> Option<AdminProfile> {
        self.inner.current_admin().await
    }

    async fn check_admin_exists(&self) -> Result<bool, IdentityError> {
        self.inner.check_admin_exists().await
    }

    async fn id_token(&self) -> Option<String> {
        self.inner.id_token().await
    }

    async fn verify_token(&self, token: &str) -> bool {
        self.inner.verify_token(token).await
    }
}
