//! User directory abstraction.
//!
//! The server authenticates users and reads their account state through
//! [`UserDirectory`]. [`MemoryDirectory`] keeps accounts in memory with
//! salted password hashes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use selfpass_core::crypto;

/// Workflows a user can be required to complete after logging in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    ChangePassword,
    SetupResponses,
    SetupOtp,
    UpdateProfile,
    ExpiredPassword,
}

impl Workflow {
    pub const ALL: [Self; 5] = [
        Self::ChangePassword,
        Self::SetupResponses,
        Self::SetupOtp,
        Self::UpdateProfile,
        Self::ExpiredPassword,
    ];
}

/// Account state as seen by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserAccount {
    pub username: String,
    pub display_name: String,
    /// An administrator requires a password change at next login.
    pub force_password_change: bool,
    /// The user has not stored challenge responses.
    pub needs_responses: bool,
    /// The user has not enrolled a one-time-password device.
    pub needs_otp: bool,
    /// The user's profile is missing required attributes.
    pub needs_profile_update: bool,
    pub password_expired: bool,
}

impl UserAccount {
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            display_name: username.clone(),
            username,
            force_password_change: false,
            needs_responses: false,
            needs_otp: false,
            needs_profile_update: false,
            password_expired: false,
        }
    }

    fn clear(&mut self, workflow: Workflow) {
        match workflow {
            Workflow::ChangePassword | Workflow::ExpiredPassword => {
                self.force_password_change = false;
                self.password_expired = false;
            }
            Workflow::SetupResponses => self.needs_responses = false,
            Workflow::SetupOtp => self.needs_otp = false,
            Workflow::UpdateProfile => self.needs_profile_update = false,
        }
    }
}

/// An account entry in a users file, as loaded by the server binary.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub force_password_change: bool,
    #[serde(default)]
    pub needs_responses: bool,
    #[serde(default)]
    pub needs_otp: bool,
    #[serde(default)]
    pub needs_profile_update: bool,
    #[serde(default)]
    pub password_expired: bool,
}

impl SeedUser {
    fn into_account(self) -> (UserAccount, String) {
        let mut account = UserAccount::new(self.username);
        if let Some(name) = self.display_name {
            account.display_name = name;
        }
        account.force_password_change = self.force_password_change;
        account.needs_responses = self.needs_responses;
        account.needs_otp = self.needs_otp;
        account.needs_profile_update = self.needs_profile_update;
        account.password_expired = self.password_expired;
        (account, self.password)
    }
}

/// Errors from a user directory.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The account does not exist.
    #[error("unknown user '{0}'")]
    UnknownUser(String),

    /// The directory could not be reached.
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

impl From<DirectoryError> for crate::error::AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::UnknownUser(_) => Self::NotFound(err.to_string()),
            DirectoryError::Unavailable(_) => Self::Internal(err.to_string()),
        }
    }
}

/// Source of user identities and account state.
#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    /// Check a username and password. `Ok(None)` means the credentials were wrong.
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserAccount>, DirectoryError>;

    /// Look up an account without a password, for trusted SSO headers.
    async fn lookup(&self, username: &str) -> Result<Option<UserAccount>, DirectoryError>;

    /// Replace a user's password. Clears forced-change and expiry state.
    async fn set_password(&self, username: &str, password: &str) -> Result<(), DirectoryError>;

    /// Mark a post-login workflow as completed.
    async fn complete_workflow(
        &self,
        username: &str,
        workflow: Workflow,
    ) -> Result<(), DirectoryError>;
}

struct Entry {
    account: UserAccount,
    password_hash: String,
}

/// In-memory directory.
#[derive(Default)]
pub struct MemoryDirectory {
    users: RwLock<HashMap<String, Entry>>,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an account. Usernames match case-insensitively.
    pub async fn insert(&self, account: UserAccount, password: &str) {
        let key = account.username.to_lowercase();
        self.users.write().await.insert(
            key,
            Entry {
                account,
                password_hash: crypto::hash_password(password),
            },
        );
    }
}

impl MemoryDirectory {
    /// Build a directory from a JSON array of [`SeedUser`] entries.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Unavailable`] if the JSON does not parse.
    pub async fn from_json(json: &str) -> Result<Self, DirectoryError> {
        let users: Vec<SeedUser> = serde_json::from_str(json)
            .map_err(|e| DirectoryError::Unavailable(format!("invalid users file: {e}")))?;
        let directory = Self::new();
        for user in users {
            let (account, password) = user.into_account();
            directory.insert(account, &password).await;
        }
        Ok(directory)
    }
}

impl std::fmt::Debug for MemoryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDirectory").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl UserDirectory for MemoryDirectory {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<UserAccount>, DirectoryError> {
        let users = self.users.read().await;
        Ok(users
            .get(&username.to_lowercase())
            .filter(|e| crypto::verify_password(password, &e.password_hash))
            .map(|e| e.account.clone()))
    }

    async fn lookup(&self, username: &str) -> Result<Option<UserAccount>, DirectoryError> {
        let users = self.users.read().await;
        Ok(users.get(&username.to_lowercase()).map(|e| e.account.clone()))
    }

    async fn set_password(&self, username: &str, password: &str) -> Result<(), DirectoryError> {
        let mut users = self.users.write().await;
        let entry = users
            .get_mut(&username.to_lowercase())
            .ok_or_else(|| DirectoryError::UnknownUser(username.to_owned()))?;
        entry.password_hash = crypto::hash_password(password);
        entry.account.clear(Workflow::ChangePassword);
        Ok(())
    }

    async fn complete_workflow(
        &self,
        username: &str,
        workflow: Workflow,
    ) -> Result<(), DirectoryError> {
        let mut users = self.users.write().await;
        let entry = users
            .get_mut(&username.to_lowercase())
            .ok_or_else(|| DirectoryError::UnknownUser(username.to_owned()))?;
        entry.account.clear(workflow);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn authenticate_checks_password_case_insensitive_user() {
        let dir = MemoryDirectory::new();
        dir.insert(UserAccount::new("Alice"), "wonderland").await;

        assert!(dir.authenticate("alice", "wonderland").await.unwrap().is_some());
        assert!(dir.authenticate("ALICE", "wrong").await.unwrap().is_none());
        assert!(dir.authenticate("bob", "wonderland").await.unwrap().is_none());
        assert_eq!(dir.lookup("alice").await.unwrap().unwrap().username, "Alice");
    }

    #[tokio::test]
    async fn seeds_from_json() {
        let dir = MemoryDirectory::from_json(
            r#"[{"username": "gina", "password": "pw", "display_name": "Gina G", "needs_otp": true}]"#,
        )
        .await
        .unwrap();
        let account = dir.authenticate("gina", "pw").await.unwrap().unwrap();
        assert_eq!(account.display_name, "Gina G");
        assert!(account.needs_otp);
        assert!(!account.password_expired);
        assert!(MemoryDirectory::from_json("{").await.is_err());
    }

    #[tokio::test]
    async fn set_password_clears_expiry() {
        let dir = MemoryDirectory::new();
        let mut account = UserAccount::new("carol");
        account.password_expired = true;
        account.needs_otp = true;
        dir.insert(account, "old").await;

        dir.set_password("carol", "new").await.unwrap();
        let account = dir.authenticate("carol", "new").await.unwrap().unwrap();
        assert!(!account.password_expired);
        assert!(account.needs_otp);

        dir.complete_workflow("carol", Workflow::SetupOtp).await.unwrap();
        assert!(!dir.lookup("carol").await.unwrap().unwrap().needs_otp);
        assert!(dir.set_password("nobody", "x").await.is_err());
    }
}
