//! Key pollers.
//!
//! A poller repeatedly GETs its own relay slot until a sealed payload shows up, opens it
//! with its key pair and hands back the decoded payload. 404 means "nothing yet"; every
//! other failure ends the loop. Polling stops cooperatively: a request already in flight
//! is allowed to finish but its result is discarded.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use syncpair_crypto::{Crypter, EphemeralKeyPair};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::code::{ExchangeMessage, PairingCode, RecoveryKey};
use crate::errors::{CryptoError, PairingError, StateError, TransportError};
use crate::relay::{RelayEndpoint, RelayTransport, SealedSlot};

/// Delay between two GETs of the same slot.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A payload a poller can wait for.
pub trait PollPayload: Sized + Send + 'static {
    /// Extract the payload from an unsealed pairing code.
    fn from_code(code: PairingCode) -> Result<Self, CryptoError>;
}

impl PollPayload for ExchangeMessage {
    fn from_code(code: PairingCode) -> Result<Self, CryptoError> {
        match code {
            PairingCode::ExchangeResponse(message) => Ok(message),
            other => Err(CryptoError::UnexpectedPayload(other.kind())),
        }
    }
}

impl PollPayload for RecoveryKey {
    fn from_code(code: PairingCode) -> Result<Self, CryptoError> {
        match code {
            PairingCode::RecoveryKey(key) => Ok(key),
            other => Err(CryptoError::UnexpectedPayload(other.kind())),
        }
    }
}

/// Waits for the peer's [`ExchangeMessage`] on `/exchange/{own key id}`.
pub type ExchangeKeyPoller = KeyPoller<ExchangeMessage>;

/// Waits for a [`RecoveryKey`] on `/exchange/{id}` or `/connect/{id}`.
pub type RecoveryKeyPoller = KeyPoller<RecoveryKey>;

pub struct KeyPoller<T> {
    endpoint: RelayEndpoint,
    key_pair: Arc<EphemeralKeyPair>,
    relay: Arc<dyn RelayTransport>,
    crypter: Arc<dyn Crypter>,
    interval: Duration,
    cancel: CancellationToken,
    polling: AtomicBool,
    _payload: PhantomData<fn() -> T>,
}

/// Clears the re-entrance flag when a poll loop exits, however it exits.
struct PollingGuard<'a>(&'a AtomicBool);

impl Drop for PollingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: PollPayload> KeyPoller<T> {
    pub fn new(
        endpoint: RelayEndpoint,
        key_pair: Arc<EphemeralKeyPair>,
        relay: Arc<dyn RelayTransport>,
        crypter: Arc<dyn Crypter>,
    ) -> Self {
        Self {
            endpoint,
            key_pair,
            relay,
            crypter,
            interval: DEFAULT_POLL_INTERVAL,
            cancel: CancellationToken::new(),
            polling: AtomicBool::new(false),
            _payload: PhantomData,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Slot id this poller reads.
    pub fn id(&self) -> &str {
        &self.key_pair.id
    }

    pub fn endpoint(&self) -> RelayEndpoint {
        self.endpoint
    }

    /// Token cancelled by [`KeyPoller::stop_polling`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop polling. Idempotent; takes effect at the next check of the loop.
    pub fn stop_polling(&self) {
        if !self.cancel.is_cancelled() {
            debug!(endpoint = %self.endpoint, id = %self.key_pair.id, "stop polling");
        }
        self.cancel.cancel();
    }

    /// Poll until a payload arrives, polling is stopped, or a request fails.
    ///
    /// Returns `Ok(None)` when stopped. Calling this while the same poller is already
    /// polling fails with [`StateError::AlreadyPolling`].
    pub async fn poll_for_payload(&self) -> Result<Option<T>, PairingError> {
        if self.polling.swap(true, Ordering::AcqRel) {
            return Err(StateError::AlreadyPolling.into());
        }
        let _guard = PollingGuard(&self.polling);

        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }

            debug!(endpoint = %self.endpoint, id = %self.key_pair.id, "polling relay");
            let result = self.relay.get(self.endpoint, &self.key_pair.id).await;

            if self.cancel.is_cancelled() {
                debug!(endpoint = %self.endpoint, id = %self.key_pair.id, "discarding response after stop");
                return Ok(None);
            }

            let response = result?;
            match response.status {
                404 => {}
                _ if response.is_success() => {
                    return self.open(&response.body).map(Some);
                }
                status => {
                    warn!(endpoint = %self.endpoint, id = %self.key_pair.id, status, "relay poll failed");
                    return Err(TransportError::UnexpectedStatus(status).into());
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(None),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    fn open(&self, body: &[u8]) -> Result<T, PairingError> {
        let sealed = SealedSlot::parse(body)?.sealed_bytes()?;
        let plain = self.crypter.unseal(
            &sealed,
            &self.key_pair.public_key,
            self.key_pair.secret_key(),
        )?;
        let code =
            PairingCode::from_json(&plain).map_err(|e| CryptoError::Payload(e.to_string()))?;
        Ok(T::from_code(code)?)
    }
}

impl<T> Drop for KeyPoller<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
