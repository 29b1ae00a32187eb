//! Test harness for pairing flows.
//!
//! In-memory stand-ins for the relay and the account backend, so that two controllers can
//! pair with each other inside one process.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use getrandom::getrandom;
use parking_lot::Mutex;

use crate::account::{Account, AccountService, RegisteredDevice};
use crate::code::RecoveryKey;
use crate::errors::{AccountError, TransportError};
use crate::events::{EventReceiver, PairingEvent};
use crate::relay::{PostedSlot, RelayEndpoint, RelayResponse, RelayTransport, SealedSlot};

// ============================================================================
// Relay
// ============================================================================

/// A request seen by [`InMemoryRelay`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayRequest {
    Get { endpoint: RelayEndpoint, id: String },
    Post { endpoint: RelayEndpoint, recipient_id: String },
}

#[derive(Default)]
struct RelayState {
    /// Read-many slots holding base64 sealed boxes.
    slots: HashMap<(RelayEndpoint, String), String>,
    /// Canned GET answers, served before slot contents.
    scripted: HashMap<(RelayEndpoint, String), VecDeque<RelayResponse>>,
    requests: Vec<RelayRequest>,
    post_failure: Option<u16>,
    get_failure: Option<u16>,
    get_delay: Option<Duration>,
    post_delay: Option<Duration>,
}

/// Relay that keeps slots in memory and records every request.
#[derive(Default)]
pub struct InMemoryRelay {
    state: Mutex<RelayState>,
}

impl InMemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue GET answers for one slot. Once drained, the slot is served normally.
    pub fn script_get(&self, endpoint: RelayEndpoint, id: &str, responses: Vec<RelayResponse>) {
        self.state
            .lock()
            .scripted
            .entry((endpoint, id.to_string()))
            .or_default()
            .extend(responses);
    }

    /// Answer every POST with `status` without storing anything.
    pub fn fail_posts(&self, status: u16) {
        self.state.lock().post_failure = Some(status);
    }

    /// Answer every unscripted GET with `status`.
    pub fn fail_gets(&self, status: u16) {
        self.state.lock().get_failure = Some(status);
    }

    /// Hold every GET for `delay` after it is recorded, then answer from the state at that time.
    pub fn delay_gets(&self, delay: Duration) {
        self.state.lock().get_delay = Some(delay);
    }

    /// Hold every POST for `delay` after it is recorded, then store it.
    pub fn delay_posts(&self, delay: Duration) {
        self.state.lock().post_delay = Some(delay);
    }

    pub fn requests(&self) -> Vec<RelayRequest> {
        self.state.lock().requests.clone()
    }

    pub fn get_count(&self, endpoint: RelayEndpoint, id: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| matches!(r, RelayRequest::Get { endpoint: e, id: i } if *e == endpoint && i == id))
            .count()
    }

    pub fn post_count(&self) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| matches!(r, RelayRequest::Post { .. }))
            .count()
    }

    /// Sealed box stored for `id`, if any.
    pub fn slot(&self, endpoint: RelayEndpoint, id: &str) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let encoded = state.slots.get(&(endpoint, id.to_string()))?;
        base64::engine::general_purpose::STANDARD.decode(encoded).ok()
    }
}

#[async_trait]
impl RelayTransport for InMemoryRelay {
    async fn get(&self, endpoint: RelayEndpoint, id: &str) -> Result<RelayResponse, TransportError> {
        let delay = {
            let mut state = self.state.lock();
            state.requests.push(RelayRequest::Get {
                endpoint,
                id: id.to_string(),
            });
            state.get_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();

        let key = (endpoint, id.to_string());
        if let Some(response) = state.scripted.get_mut(&key).and_then(VecDeque::pop_front) {
            return Ok(response);
        }
        if let Some(status) = state.get_failure {
            return Ok(RelayResponse::new(status, Bytes::new()));
        }

        match state.slots.get(&key) {
            Some(encoded) => {
                let body = serde_json::to_vec(&SealedSlot {
                    encrypted_recovery_key: encoded.clone(),
                })
                .map_err(|e| TransportError::Http(e.to_string()))?;
                Ok(RelayResponse::new(200, body))
            }
            None => Ok(RelayResponse::not_found()),
        }
    }

    async fn post(
        &self,
        endpoint: RelayEndpoint,
        body: Bytes,
    ) -> Result<RelayResponse, TransportError> {
        let posted = PostedSlot::parse(endpoint, &body);
        let delay = {
            let mut state = self.state.lock();
            state.requests.push(RelayRequest::Post {
                endpoint,
                recipient_id: posted
                    .as_ref()
                    .map(|p| p.recipient_id.clone())
                    .unwrap_or_default(),
            });
            state.post_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();

        if let Some(status) = state.post_failure {
            return Ok(RelayResponse::new(status, Bytes::new()));
        }

        match posted {
            Ok(posted) => {
                state
                    .slots
                    .insert((endpoint, posted.recipient_id), posted.encrypted_recovery_key);
                Ok(RelayResponse::new(200, Bytes::new()))
            }
            Err(_) => Ok(RelayResponse::new(400, Bytes::new())),
        }
    }
}

// ============================================================================
// Accounts
// ============================================================================

struct StoredAccount {
    primary_key: Vec<u8>,
    devices: Vec<RegisteredDevice>,
}

/// Shared account backend. Each device gets its own [`InMemoryAccountService`] over it.
#[derive(Default)]
pub struct AccountDirectory {
    accounts: Mutex<HashMap<String, StoredAccount>>,
}

impl AccountDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn devices(&self, user_id: &str) -> Vec<RegisteredDevice> {
        self.accounts
            .lock()
            .get(user_id)
            .map(|a| a.devices.clone())
            .unwrap_or_default()
    }
}

/// One device's view of an [`AccountDirectory`].
pub struct InMemoryAccountService {
    directory: Arc<AccountDirectory>,
    current: Mutex<Option<Account>>,
    fail_create: Mutex<bool>,
    logins: Mutex<Vec<RecoveryKey>>,
}

impl InMemoryAccountService {
    pub fn new(directory: Arc<AccountDirectory>) -> Self {
        Self {
            directory,
            current: Mutex::new(None),
            fail_create: Mutex::new(false),
            logins: Mutex::new(Vec::new()),
        }
    }

    /// Service already signed in to a fresh account.
    pub fn with_account(
        directory: Arc<AccountDirectory>,
        device_name: &str,
    ) -> Result<Self, AccountError> {
        let service = Self::new(directory);
        let account = service.register_new(device_name, "desktop")?;
        *service.current.lock() = Some(account);
        Ok(service)
    }

    pub fn fail_account_creation(&self) {
        *self.fail_create.lock() = true;
    }

    /// Recovery keys passed to `login`, including rejected ones.
    pub fn login_attempts(&self) -> Vec<RecoveryKey> {
        self.logins.lock().clone()
    }

    fn register_new(&self, device_name: &str, device_type: &str) -> Result<Account, AccountError> {
        let mut primary_key = vec![0u8; 32];
        getrandom(&mut primary_key).map_err(|e| AccountError::CreateFailed(e.to_string()))?;
        let account = Account {
            user_id: uuid::Uuid::new_v4().to_string(),
            device_id: uuid::Uuid::new_v4().to_string(),
            device_name: device_name.to_string(),
            device_type: device_type.to_string(),
            primary_key: primary_key.clone(),
        };
        self.directory.accounts.lock().insert(
            account.user_id.clone(),
            StoredAccount {
                primary_key,
                devices: vec![account.device()],
            },
        );
        Ok(account)
    }
}

#[async_trait]
impl AccountService for InMemoryAccountService {
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
        if *self.fail_create.lock() {
            return Err(AccountError::CreateFailed("backend unavailable".into()));
        }
        let account = self.register_new(device_name, device_type)?;
        *self.current.lock() = Some(account.clone());
        Ok(account)
    }

    async fn login(
        &self,
        recovery_key: &RecoveryKey,
        device_name: &str,
        device_type: &str,
    ) -> Result<Vec<RegisteredDevice>, AccountError> {
        self.logins.lock().push(recovery_key.clone());
        if self.current.lock().is_some() {
            return Err(AccountError::AlreadyExists);
        }

        let device = RegisteredDevice {
            id: uuid::Uuid::new_v4().to_string(),
            name: device_name.to_string(),
            device_type: device_type.to_string(),
        };
        let devices = {
            let mut accounts = self.directory.accounts.lock();
            let stored = accounts
                .get_mut(&recovery_key.user_id)
                .filter(|a| a.primary_key == recovery_key.primary_key)
                .ok_or_else(|| AccountError::LoginRejected("unknown recovery key".into()))?;
            stored.devices.push(device.clone());
            stored.devices.clone()
        };

        *self.current.lock() = Some(Account {
            user_id: recovery_key.user_id.clone(),
            device_id: device.id,
            device_name: device.name,
            device_type: device.device_type,
            primary_key: recovery_key.primary_key.clone(),
        });
        Ok(devices)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Take every event already delivered.
pub fn drain_events(rx: &mut EventReceiver) -> Vec<PairingEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Wait for the next event matching `pred`, returning it and everything received before it.
pub async fn wait_for_event<F>(rx: &mut EventReceiver, pred: F) -> Option<Vec<PairingEvent>>
where
    F: Fn(&PairingEvent) -> bool,
{
    let mut seen = Vec::new();
    while let Some(event) = rx.recv().await {
        let done = pred(&event);
        seen.push(event);
        if done {
            return Some(seen);
        }
    }
    None
}
