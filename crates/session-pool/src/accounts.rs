//! Account store
//!
//! The account pool is a single `accounts` collection. Every mutation is a
//! read-modify-write of the whole collection, serialized within the process
//! by a write lock. Writers in other processes remain last-writer-wins.

use std::path::Path;
use std::sync::Arc;

use common::validation::{FieldRule, FieldType, check_object};
use common::{AccountError, AccountErrorKind, Secret, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::kv::KeyValueStore;

/// Key of the account collection.
pub const ACCOUNTS_KEY: &str = "accounts";

const ACCOUNT_RULES: &[FieldRule] = &[
    ("username", FieldType::String, true),
    ("password", FieldType::String, true),
    ("enabled", FieldType::Bool, false),
];

fn default_enabled() -> bool {
    true
}

/// Portal credentials for one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    pub password: Secret<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Account {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Secret::new(password.into()),
            enabled: true,
        }
    }
}

/// Parse and validate an account collection.
///
/// Each record is checked field by field; errors are keyed by array index
/// (`"1.password"`).
pub fn parse_accounts(raw: &str) -> Result<Vec<Account>> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ValidationError::single("$", format!("invalid JSON: {e}")))?;
    let Some(records) = value.as_array() else {
        return Err(ValidationError::single("$", "expected array").into());
    };

    let mut errors = ValidationError::new();
    for (index, record) in records.iter().enumerate() {
        check_object(record, &index.to_string(), ACCOUNT_RULES, &mut errors);
    }
    errors.into_result(())?;

    serde_json::from_value(value).map_err(|e| ValidationError::single("$", e.to_string()).into())
}

/// Operator-managed account pool.
pub struct AccountStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl AccountStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<Account>> {
        match self.kv.get(ACCOUNTS_KEY).await? {
            Some(raw) => parse_accounts(&raw),
            None => Err(AccountError::of(AccountErrorKind::NoAccountsFound).into()),
        }
    }

    async fn save(&self, accounts: &[Account]) -> Result<()> {
        let raw = serde_json::to_string(accounts)
            .map_err(|e| Error::Storage(format!("serializing accounts: {e}")))?;
        self.kv.set(ACCOUNTS_KEY, raw).await
    }

    /// All accounts, enabled or not.
    pub async fn list(&self) -> Result<Vec<Account>> {
        self.load().await
    }

    /// Account by username, or the first enabled account when `username` is
    /// `None`.
    pub async fn get(&self, username: Option<&str>) -> Result<Account> {
        let accounts = self.load().await?;
        let found = match username {
            Some(name) => accounts.into_iter().find(|a| a.username == name),
            None => accounts.into_iter().find(|a| a.enabled),
        };
        found.ok_or_else(|| AccountError::of(AccountErrorKind::NoValidAccount).into())
    }

    /// Add an enabled account. An existing username is replaced (new
    /// password, re-enabled) so usernames stay unique.
    pub async fn add(&self, username: &str, password: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut accounts = self.load().await?;
        let account = Account::new(username, password);
        match accounts.iter_mut().find(|a| a.username == username) {
            Some(existing) => *existing = account,
            None => accounts.push(account),
        }
        self.save(&accounts).await?;
        info!(username, "account added");
        Ok(())
    }

    /// Remove an account. Returns whether it existed.
    pub async fn delete(&self, username: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut accounts = self.load().await?;
        let before = accounts.len();
        accounts.retain(|a| a.username != username);
        let removed = accounts.len() != before;
        if removed {
            self.save(&accounts).await?;
            info!(username, "account deleted");
        }
        Ok(removed)
    }

    /// Mark an account disabled. Disabling twice is not an error.
    /// Returns whether the username exists.
    pub async fn disable(&self, username: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut accounts = self.load().await?;
        let Some(account) = accounts.iter_mut().find(|a| a.username == username) else {
            return Ok(false);
        };
        if account.enabled {
            account.enabled = false;
            self.save(&accounts).await?;
            info!(username, "account disabled");
        } else {
            debug!(username, "account already disabled");
        }
        Ok(true)
    }

    /// Disable `username` and return the next enabled account.
    /// Returns `None` when the username does not exist.
    pub async fn rotate(&self, username: &str) -> Result<Option<Account>> {
        if !self.disable(username).await? {
            return Ok(None);
        }
        self.get(None).await.map(Some)
    }

    /// Enabled accounts in collection order.
    pub async fn enabled(&self) -> Result<Vec<Account>> {
        Ok(self
            .load()
            .await?
            .into_iter()
            .filter(|a| a.enabled)
            .collect())
    }

    /// Replace the collection with the accounts in a seed file.
    pub async fn load_seed(&self, path: &Path) -> Result<usize> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            AccountError::new(
                AccountErrorKind::NoAccountsFound,
                format!("reading account seed {}: {e}", path.display()),
            )
        })?;
        let accounts = parse_accounts(&raw)?;
        if accounts.is_empty() {
            return Err(AccountError::of(AccountErrorKind::NoAccountsFound).into());
        }

        let _guard = self.write_lock.lock().await;
        self.save(&accounts).await?;
        info!(path = %path.display(), accounts = accounts.len(), "loaded account seed");
        Ok(accounts.len())
    }

    /// Keep an existing collection, otherwise seed it from `path`.
    ///
    /// Returns the number of accounts in the pool. Fails when there is
    /// neither a stored collection nor a usable seed.
    pub async fn ensure_seeded(&self, path: &Path) -> Result<usize> {
        match self.load().await {
            Ok(accounts) => {
                info!(accounts = accounts.len(), "using stored account collection");
                Ok(accounts.len())
            }
            Err(e) if e.account_kind() == Some(AccountErrorKind::NoAccountsFound) => {
                self.load_seed(path).await
            }
            Err(e) => Err(e),
        }
    }
}
