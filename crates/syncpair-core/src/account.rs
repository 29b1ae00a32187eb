//! Account service seam.
//!
//! The pairing core never touches account storage directly. It asks an [`AccountService`]
//! whether an account exists, creates one for a connect responder, and logs in with a
//! received recovery key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::code::RecoveryKey;
use crate::errors::AccountError;

/// A device attached to a sync account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredDevice {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
}

/// The sync account this device is signed in to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    #[serde(with = "primary_key_b64")]
    pub primary_key: Vec<u8>,
}

mod primary_key_b64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

impl Account {
    /// The account root secret, as shared with a new device.
    pub fn recovery_key(&self) -> RecoveryKey {
        RecoveryKey {
            user_id: self.user_id.clone(),
            primary_key: self.primary_key.clone(),
        }
    }

    /// This device as registered on the account.
    pub fn device(&self) -> RegisteredDevice {
        RegisteredDevice {
            id: self.device_id.clone(),
            name: self.device_name.clone(),
            device_type: self.device_type.clone(),
        }
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("user_id", &self.user_id)
            .field("device_id", &self.device_id)
            .field("device_name", &self.device_name)
            .field("device_type", &self.device_type)
            .field("primary_key", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait AccountService: Send + Sync {
    /// Account this device is signed in to, if any.
    fn current_account(&self) -> Option<Account>;

    /// Create a new account with this device as its first device.
    async fn create_account(&self, device_name: &str, device_type: &str)
        -> Result<Account, AccountError>;

    /// Sign this device in to the account owning `recovery_key`.
    ///
    /// Returns every device registered on the account, this one included.
    async fn login(
        &self,
        recovery_key: &RecoveryKey,
        device_name: &str,
        device_type: &str,
    ) -> Result<Vec<RegisteredDevice>, AccountError>;
}
