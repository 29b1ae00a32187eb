//! File-backed account store.
//!
//! The CLI keeps the signed-in account in a small JSON file so that a device stays signed
//! in between runs. There is no account server behind it: creating an account generates
//! the recovery key locally, and logging in adopts whatever recovery key was received.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use syncpair_core::errors::AccountError;
use syncpair_core::{Account, AccountService, RecoveryKey, RegisteredDevice};
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountFile {
    #[serde(default)]
    account: Option<Account>,
}

pub struct LocalAccountService {
    path: PathBuf,
    current: Mutex<Option<Account>>,
}

impl LocalAccountService {
    /// Open the store at `path`. A missing file means no account.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AccountError> {
        let path = path.into();
        let current = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| AccountError::Storage(e.to_string()))?;
            let file: AccountFile =
                serde_json::from_str(&content).map_err(|e| AccountError::Storage(e.to_string()))?;
            file.account
        } else {
            None
        };
        debug!(path = %path.display(), signed_in = current.is_some(), "opened account store");
        Ok(Self {
            path,
            current: Mutex::new(current),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forget the stored account.
    pub fn sign_out(&self) -> Result<(), AccountError> {
        self.store(None)
    }

    fn store(&self, account: Option<Account>) -> Result<(), AccountError> {
        let content = serde_json::to_string_pretty(&AccountFile {
            account: account.clone(),
        })
        .map_err(|e| AccountError::Storage(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AccountError::Storage(e.to_string()))?;
        }
        std::fs::write(&self.path, content).map_err(|e| AccountError::Storage(e.to_string()))?;
        *self.current.lock() = account;
        Ok(())
    }
}

#[async_trait]
impl AccountService for LocalAccountService {
    fn current_account(&self) -> Option<Account> {
        self.current.lock().clone()
    }

    async fn create_account(
        &self,
        device_name: &str,
        device_type: &str,
    ) -> Result<Account, AccountError> {
        if self.current.lock().is_some() {
            return Err(AccountError::AlreadyExists);
        }

        let mut primary_key = vec![0u8; 32];
        getrandom::getrandom(&mut primary_key)
            .map_err(|e| AccountError::CreateFailed(e.to_string()))?;
        let account = Account {
            user_id: uuid::Uuid::new_v4().to_string(),
            device_id: uuid::Uuid::new_v4().to_string(),
            device_name: device_name.to_string(),
            device_type: device_type.to_string(),
            primary_key,
        };

        self.store(Some(account.clone()))?;
        info!(user_id = %account.user_id, "created local account");
        Ok(account)
    }

    async fn login(
        &self,
        recovery_key: &RecoveryKey,
        device_name: &str,
        device_type: &str,
    ) -> Result<Vec<RegisteredDevice>, AccountError> {
        if self.current.lock().is_some() {
            return Err(AccountError::AlreadyExists);
        }
        if recovery_key.user_id.is_empty() || recovery_key.primary_key.is_empty() {
            return Err(AccountError::LoginRejected("empty recovery key".to_string()));
        }

        let account = Account {
            user_id: recovery_key.user_id.clone(),
            device_id: uuid::Uuid::new_v4().to_string(),
            device_name: device_name.to_string(),
            device_type: device_type.to_string(),
            primary_key: recovery_key.primary_key.clone(),
        };
        let device = account.device();

        self.store(Some(account))?;
        info!(user_id = %recovery_key.user_id, "signed in with recovery key");
        Ok(vec![device])
    }
}
