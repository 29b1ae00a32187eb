//! Pairing controller.
//!
//! Orchestrates the two pairing flows between a device that holds an account and one that
//! wants to join it:
//!
//! - **Exchange**: the initiator shows an exchange invite. The responder enters it, posts an
//!   exchange response carrying a fresh public key and waits. The initiator seals the
//!   recovery key for that key and posts it back. The responder logs in.
//! - **Connect**: the initiator shows a connect invite carrying its public key and waits.
//!   The responder enters it, creates an account if it has none, and posts the sealed
//!   recovery key. The initiator logs in.
//!
//! A controller runs at most one session per role. Starting a role again stops the session
//! it replaces. Sessions poll until stopped, so callers must stop them when the UI goes
//! away; dropping the controller stops both.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use syncpair_crypto::Crypter;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::account::{AccountService, RegisteredDevice};
use crate::code::{ConnectCode, ExchangeKey, ExchangeMessage, PairingCode, RecoveryKey};
use crate::errors::{AccountError, ActivationError, CodeError, PairingError};
use crate::events::{EventReceiver, EventSink, PairingEvent};
use crate::link::{self, PairingLink};
use crate::poller::{ExchangeKeyPoller, RecoveryKeyPoller, DEFAULT_POLL_INTERVAL};
use crate::relay::{RelayEndpoint, RelayTransport};
use crate::transmitter::KeyTransmitter;

/// Controller settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingConfig {
    /// Name shown to the peer and registered with the account.
    pub device_name: String,
    pub device_type: String,
    /// Where the user started pairing from. Logged when a connect creates an account.
    pub source: Option<String>,
    pub poll_interval: Duration,
    /// Offer to switch accounts instead of failing when a recovery key belongs to another
    /// account than the one signed in.
    pub seamless_account_switching: bool,
    /// Host pairing links must be on. `None` accepts any host.
    pub link_host: Option<String>,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            device_name: "Unnamed device".to_string(),
            device_type: "desktop".to_string(),
            source: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            seamless_account_switching: false,
            link_host: None,
        }
    }
}

/// One role's live poll.
struct PairingSession {
    key_id: String,
    cancel: CancellationToken,
    generation: u64,
    /// `None` when the poll runs inline in `code_entered`.
    task: Option<JoinHandle<()>>,
}

impl PairingSession {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && self.task.as_ref().map_or(true, |t| !t.is_finished())
    }

    fn stop(self, role: &str) {
        info!(role, key_id = %self.key_id, "stopping pairing session");
        self.cancel.cancel();
    }
}

type SessionSlot = Arc<Mutex<Option<PairingSession>>>;

/// Remove the session in `slot` if it is still the one started as `generation`.
fn clear_session(slot: &SessionSlot, generation: u64) {
    let mut slot = slot.lock();
    if slot.as_ref().map(|s| s.generation) == Some(generation) {
        *slot = None;
    }
}

struct Inner {
    relay: Arc<dyn RelayTransport>,
    crypter: Arc<dyn Crypter>,
    accounts: Arc<dyn AccountService>,
    transmitter: KeyTransmitter,
    config: PairingConfig,
    events: EventSink,
}

pub struct PairingController {
    inner: Arc<Inner>,
    exchanging: SessionSlot,
    connecting: SessionSlot,
    generation: AtomicU64,
}

impl PairingController {
    /// Create a controller and the receiver its events are delivered to.
    pub fn new(
        relay: Arc<dyn RelayTransport>,
        crypter: Arc<dyn Crypter>,
        accounts: Arc<dyn AccountService>,
        config: PairingConfig,
    ) -> (Self, EventReceiver) {
        let (events, rx) = EventSink::channel();
        (Self::with_event_sink(relay, crypter, accounts, config, events), rx)
    }

    pub fn with_event_sink(
        relay: Arc<dyn RelayTransport>,
        crypter: Arc<dyn Crypter>,
        accounts: Arc<dyn AccountService>,
        config: PairingConfig,
        events: EventSink,
    ) -> Self {
        let transmitter = KeyTransmitter::new(relay.clone(), crypter.clone());
        Self {
            inner: Arc::new(Inner {
                relay,
                crypter,
                accounts,
                transmitter,
                config,
                events,
            }),
            exchanging: Arc::new(Mutex::new(None)),
            connecting: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &PairingConfig {
        &self.inner.config
    }

    /// Encoded recovery key of the signed-in account, or an empty string.
    pub fn recovery_code(&self) -> String {
        self.inner
            .accounts
            .current_account()
            .and_then(|account| PairingCode::RecoveryKey(account.recovery_key()).encode().ok())
            .unwrap_or_default()
    }

    /// Pairing link for `code` under `base`, naming this device.
    pub fn pairing_link(&self, code: &str, base: &Url) -> Result<Url, CodeError> {
        PairingLink::new(code, Some(self.inner.config.device_name.clone())).to_url(base)
    }

    pub fn is_exchanging(&self) -> bool {
        self.exchanging.lock().as_ref().is_some_and(PairingSession::is_active)
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting.lock().as_ref().is_some_and(PairingSession::is_active)
    }

    // ============================================================================
    // Exchange mode
    // ============================================================================

    /// Show an exchange invite and wait in the background for a peer to answer it.
    ///
    /// Returns the code to display. Must be called within a Tokio runtime.
    pub fn start_exchange_mode(&self) -> Result<String, PairingError> {
        let key_pair = Arc::new(self.inner.crypter.generate_key_pair());
        let code = PairingCode::ExchangeInvite(ExchangeKey {
            key_id: key_pair.id.clone(),
            public_key: key_pair.public_key.clone(),
        })
        .encode()?;

        let poller = Arc::new(
            ExchangeKeyPoller::new(
                RelayEndpoint::Exchange,
                key_pair,
                self.inner.relay.clone(),
                self.inner.crypter.clone(),
            )
            .with_interval(self.inner.config.poll_interval),
        );

        let inner = self.inner.clone();
        let (key_id, cancel) = (poller.id().to_string(), poller.cancellation_token());
        self.spawn_session(&self.exchanging, "exchange", key_id, cancel, async move {
            inner.run_exchange_initiator(poller).await;
        });
        Ok(code)
    }

    /// Stop the exchange session, if any. Idempotent.
    pub fn stop_exchange_mode(&self) {
        if let Some(session) = self.exchanging.lock().take() {
            session.stop("exchange");
        }
    }

    // ============================================================================
    // Connect mode
    // ============================================================================

    /// Show a connect invite and wait in the background for the recovery key.
    ///
    /// Refused when this device is already signed in. Must be called within a Tokio runtime.
    pub fn start_connect_mode(&self) -> Result<String, PairingError> {
        if self.inner.accounts.current_account().is_some() {
            return Err(AccountError::AlreadyExists.into());
        }

        let key_pair = Arc::new(self.inner.crypter.generate_key_pair());
        let code = PairingCode::ConnectInvite(ConnectCode {
            device_id: key_pair.id.clone(),
            secret_key: key_pair.public_key.clone(),
        })
        .encode()?;

        let poller = Arc::new(
            RecoveryKeyPoller::new(
                RelayEndpoint::Connect,
                key_pair,
                self.inner.relay.clone(),
                self.inner.crypter.clone(),
            )
            .with_interval(self.inner.config.poll_interval),
        );

        let inner = self.inner.clone();
        let (key_id, cancel) = (poller.id().to_string(), poller.cancellation_token());
        self.spawn_session(&self.connecting, "connect", key_id, cancel, async move {
            inner.run_connect_initiator(poller).await;
        });
        Ok(code)
    }

    /// Stop the connect session, if any. Idempotent.
    pub fn stop_connect_mode(&self) {
        if let Some(session) = self.connecting.lock().take() {
            session.stop("connect");
        }
    }

    // ============================================================================
    // Entered codes
    // ============================================================================

    /// Handle a code the user scanned or pasted: a bare code or a pairing link.
    ///
    /// Returns `true` when the flow the code starts completed successfully. Failures are
    /// reported as error events.
    pub async fn code_entered(&self, code: &str) -> bool {
        let code = match link::decode_entered(code, self.inner.config.link_host.as_deref()) {
            Ok(code) => code,
            Err(e) => {
                warn!(error = %e, "entered code not recognized");
                self.inner
                    .events
                    .error(ActivationError::UnableToRecognizeCode, Some(e.into()));
                return false;
            }
        };

        info!(kind = code.kind(), "pairing code recognized");
        self.inner.events.emit(PairingEvent::CodeRecognized);

        match code {
            PairingCode::ExchangeInvite(key) => self.answer_exchange(key).await,
            PairingCode::RecoveryKey(key) => self.inner.complete_or_report(&key).await,
            PairingCode::ConnectInvite(invite) => self.inner.answer_connect(invite).await,
            PairingCode::ExchangeResponse(_) => {
                self.inner.events.error(
                    ActivationError::UnableToRecognizeCode,
                    Some(CodeError::Unsupported("exchangeMessage").into()),
                );
                false
            }
        }
    }

    /// Log in with `recovery_key` and report the account's devices.
    pub async fn complete_login(
        &self,
        recovery_key: &RecoveryKey,
    ) -> Result<Vec<RegisteredDevice>, PairingError> {
        self.inner.login(recovery_key).await
    }

    /// Responder side of the exchange flow. Polls inline, registered as the exchange session.
    async fn answer_exchange(&self, invite: ExchangeKey) -> bool {
        let inner = &self.inner;
        let key_pair = Arc::new(inner.crypter.generate_key_pair());
        let target = PairingCode::ExchangeInvite(invite);
        let response = PairingCode::ExchangeResponse(ExchangeMessage {
            key_id: key_pair.id.clone(),
            public_key: key_pair.public_key.clone(),
            device_name: inner.config.device_name.clone(),
        });

        let poller = RecoveryKeyPoller::new(
            RelayEndpoint::Exchange,
            key_pair,
            inner.relay.clone(),
            inner.crypter.clone(),
        )
        .with_interval(inner.config.poll_interval);

        // Registered before posting; a stop during the POST must prevent polling.
        let generation = self.install_session(
            &self.exchanging,
            "exchange",
            PairingSession {
                key_id: poller.id().to_string(),
                cancel: poller.cancellation_token(),
                generation: self.next_generation(),
                task: None,
            },
        );

        let sent = inner.transmitter.send(&target, &response).await;
        if poller.is_stopped() {
            clear_session(&self.exchanging, generation);
            debug!("exchange answer stopped while posting the response");
            return false;
        }
        if let Err(e) = sent {
            clear_session(&self.exchanging, generation);
            warn!(error = %e, "failed to answer exchange invite");
            inner
                .events
                .error(ActivationError::FailedToTransmitExchangeKey, Some(e));
            return false;
        }

        let result = poller.poll_for_payload().await;
        clear_session(&self.exchanging, generation);

        match result {
            Ok(Some(key)) => {
                inner.events.emit(PairingEvent::RecoveryKeyReceived);
                inner.complete_or_report(&key).await
            }
            Ok(None) => {
                debug!("exchange answer stopped before the recovery key arrived");
                false
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch exchanged recovery key");
                inner
                    .events
                    .error(ActivationError::FailedToFetchExchangeRecoveryKey, Some(e));
                false
            }
        }
    }

    // ============================================================================
    // Sessions
    // ============================================================================

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Replace the session in `slot`, stopping the previous one. Returns the new generation.
    fn install_session(&self, slot: &SessionSlot, role: &str, session: PairingSession) -> u64 {
        let generation = session.generation;
        info!(role, key_id = %session.key_id, "pairing session started");
        if let Some(previous) = slot.lock().replace(session) {
            previous.stop(role);
        }
        generation
    }

    fn spawn_session<F>(
        &self,
        slot: &SessionSlot,
        role: &'static str,
        key_id: String,
        cancel: CancellationToken,
        run: F,
    ) where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation();
        let finished = slot.clone();

        // Hold the slot while spawning so the task cannot clear it before it is installed.
        let mut guard = slot.lock();
        if let Some(previous) = guard.take() {
            previous.stop(role);
        }
        let task = tokio::spawn(async move {
            run.await;
            clear_session(&finished, generation);
        });
        info!(role, key_id = %key_id, "pairing session started");
        *guard = Some(PairingSession {
            key_id,
            cancel,
            generation,
            task: Some(task),
        });
    }
}

impl Drop for PairingController {
    fn drop(&mut self) {
        self.stop_exchange_mode();
        self.stop_connect_mode();
    }
}

impl Inner {
    /// Initiator side of the exchange flow.
    async fn run_exchange_initiator(&self, poller: Arc<ExchangeKeyPoller>) {
        let message = match poller.poll_for_payload().await {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("exchange mode stopped before a peer answered");
                return;
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch peer public key");
                self.events
                    .error(ActivationError::FailedToFetchPublicKey, Some(e));
                return;
            }
        };

        info!(peer = %message.device_name, "peer answered exchange invite");
        self.events.emit(PairingEvent::WillBeginTransmittingRecoveryKey);
        if let Err(e) = self
            .transmit_recovery_key(&PairingCode::ExchangeResponse(message))
            .await
        {
            warn!(error = %e, "failed to transmit recovery key to exchange peer");
            self.events
                .error(ActivationError::FailedToTransmitExchangeRecoveryKey, Some(e));
        }
        self.events.emit(PairingEvent::DidFinishTransmittingRecoveryKey);
        poller.stop_polling();
    }

    /// Initiator side of the connect flow.
    async fn run_connect_initiator(&self, poller: Arc<RecoveryKeyPoller>) {
        let key = match poller.poll_for_payload().await {
            Ok(Some(key)) => key,
            Ok(None) => {
                debug!("connect mode stopped before the recovery key arrived");
                return;
            }
            Err(e) => {
                warn!(error = %e, "failed to fetch connect recovery key");
                self.events
                    .error(ActivationError::FailedToFetchConnectRecoveryKey, Some(e));
                return;
            }
        };

        self.events.emit(PairingEvent::RecoveryKeyReceived);
        self.complete_or_report(&key).await;
    }

    /// Responder side of the connect flow.
    async fn answer_connect(&self, invite: ConnectCode) -> bool {
        let mut show_sync_enabled = true;

        if self.accounts.current_account().is_none() {
            match self
                .accounts
                .create_account(&self.config.device_name, &self.config.device_type)
                .await
            {
                Ok(account) => {
                    info!(
                        user_id = %account.user_id,
                        source = self.config.source.as_deref().unwrap_or("unknown"),
                        "account created for connect"
                    );
                    self.events.emit(PairingEvent::AccountCreated);
                    show_sync_enabled = false;
                }
                Err(e) => {
                    warn!(error = %e, "failed to create account for connect");
                    self.events
                        .error(ActivationError::FailedToCreateAccount, Some(e.into()));
                    return false;
                }
            }
        }

        match self
            .transmit_recovery_key(&PairingCode::ConnectInvite(invite))
            .await
        {
            Ok(()) => {
                self.events
                    .emit(PairingEvent::AccountConnectionCompleted { show_sync_enabled });
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to transmit recovery key to connecting device");
                self.events
                    .error(ActivationError::FailedToTransmitConnectRecoveryKey, Some(e));
                false
            }
        }
    }

    async fn transmit_recovery_key(&self, target: &PairingCode) -> Result<(), PairingError> {
        let account = self
            .accounts
            .current_account()
            .ok_or(AccountError::NotFound)?;
        self.transmitter
            .send(target, &PairingCode::RecoveryKey(account.recovery_key()))
            .await
    }

    async fn login(&self, recovery_key: &RecoveryKey) -> Result<Vec<RegisteredDevice>, PairingError> {
        let devices = self
            .accounts
            .login(
                recovery_key,
                &self.config.device_name,
                &self.config.device_type,
            )
            .await?;
        info!(user_id = %recovery_key.user_id, devices = devices.len(), "logged in");
        self.events.emit(PairingEvent::LoginCompleted {
            devices: devices.clone(),
        });
        Ok(devices)
    }

    /// Log in, turning a failure into the matching event.
    async fn complete_or_report(&self, recovery_key: &RecoveryKey) -> bool {
        let err = match self.login(recovery_key).await {
            Ok(_) => return true,
            Err(e) => e,
        };

        let signed_in = self.accounts.current_account().is_some();
        warn!(error = %err, signed_in, "login with recovery key failed");
        if signed_in && self.config.seamless_account_switching {
            self.events.emit(PairingEvent::TwoAccountsFoundDuringRecovery {
                recovery_key: recovery_key.clone(),
            });
        } else if signed_in {
            self.events
                .error(ActivationError::FoundExistingAccount, Some(err));
        } else {
            self.events.error(ActivationError::FailedToLogIn, Some(err));
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::{
        drain_events, wait_for_event, AccountDirectory, InMemoryAccountService, InMemoryRelay,
        RelayRequest,
    };
    use syncpair_crypto::{BoxCrypter, EphemeralKeyPair};

    struct Device {
        controller: PairingController,
        events: EventReceiver,
        accounts: Arc<InMemoryAccountService>,
    }

    fn device(
        relay: &Arc<InMemoryRelay>,
        accounts: InMemoryAccountService,
        config: PairingConfig,
    ) -> Device {
        let accounts = Arc::new(accounts);
        let (controller, events) =
            PairingController::new(relay.clone(), Arc::new(BoxCrypter), accounts.clone(), config);
        Device {
            controller,
            events,
            accounts,
        }
    }

    fn fresh_device(relay: &Arc<InMemoryRelay>, config: PairingConfig) -> Device {
        device(relay, InMemoryAccountService::new(AccountDirectory::new()), config)
    }

    fn config(name: &str) -> PairingConfig {
        PairingConfig {
            device_name: name.to_string(),
            ..PairingConfig::default()
        }
    }

    fn error_kinds(events: &[PairingEvent]) -> Vec<ActivationError> {
        events.iter().filter_map(PairingEvent::error_kind).collect()
    }

    #[tokio::test]
    async fn test_unparseable_code() {
        let relay = Arc::new(InMemoryRelay::new());
        let mut dev = fresh_device(&relay, config("Phone"));

        assert!(!dev.controller.code_entered("not-base64!!").await);

        let events = drain_events(&mut dev.events);
        assert_eq!(events.len(), 1);
        assert_eq!(error_kinds(&events), vec![ActivationError::UnableToRecognizeCode]);
        assert!(relay.requests().is_empty());
        assert!(dev.accounts.login_attempts().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_response_is_not_usable() {
        let relay = Arc::new(InMemoryRelay::new());
        let mut dev = fresh_device(&relay, config("Phone"));
        let code = PairingCode::ExchangeResponse(ExchangeMessage {
            key_id: "k".into(),
            public_key: vec![1u8; 32],
            device_name: "Laptop".into(),
        })
        .encode()
        .unwrap();

        assert!(!dev.controller.code_entered(&code).await);
        let events = drain_events(&mut dev.events);
        assert_eq!(events[0], PairingEvent::CodeRecognized);
        assert_eq!(error_kinds(&events), vec![ActivationError::UnableToRecognizeCode]);
        assert!(relay.requests().is_empty());
    }

    #[tokio::test]
    async fn test_recovery_code_logs_in() {
        let relay = Arc::new(InMemoryRelay::new());
        let directory = AccountDirectory::new();
        let laptop = InMemoryAccountService::with_account(directory.clone(), "Laptop").unwrap();
        let recovery = laptop.current_account().unwrap().recovery_key();
        let mut phone = device(&relay, InMemoryAccountService::new(directory.clone()), config("Phone"));

        let code = PairingCode::RecoveryKey(recovery.clone()).encode().unwrap();
        assert!(phone.controller.code_entered(&code).await);

        assert_eq!(phone.accounts.login_attempts(), vec![recovery.clone()]);
        let events = drain_events(&mut phone.events);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], PairingEvent::CodeRecognized);
        assert_eq!(
            events[1],
            PairingEvent::LoginCompleted {
                devices: directory.devices(&recovery.user_id)
            }
        );
        assert!(relay.requests().is_empty());
    }

    #[tokio::test]
    async fn test_recovery_code_from_link() {
        let relay = Arc::new(InMemoryRelay::new());
        let directory = AccountDirectory::new();
        let laptop = device(
            &relay,
            InMemoryAccountService::with_account(directory.clone(), "Laptop").unwrap(),
            config("Laptop"),
        );
        let mut phone = device(&relay, InMemoryAccountService::new(directory), config("Phone"));

        let base = Url::parse("https://syncpair.io/").unwrap();
        let link = laptop
            .controller
            .pairing_link(&laptop.controller.recovery_code(), &base)
            .unwrap();
        assert!(phone.controller.code_entered(link.as_str()).await);
        assert!(matches!(
            drain_events(&mut phone.events).last(),
            Some(PairingEvent::LoginCompleted { .. })
        ));
    }

    #[tokio::test]
    async fn test_login_failure_without_account() {
        let relay = Arc::new(InMemoryRelay::new());
        let mut phone = fresh_device(&relay, config("Phone"));
        let unknown = RecoveryKey {
            user_id: "nobody".into(),
            primary_key: vec![0u8; 32],
        };

        let code = PairingCode::RecoveryKey(unknown).encode().unwrap();
        assert!(!phone.controller.code_entered(&code).await);
        assert_eq!(
            error_kinds(&drain_events(&mut phone.events)),
            vec![ActivationError::FailedToLogIn]
        );
    }

    #[tokio::test]
    async fn test_login_failure_with_account() {
        let relay = Arc::new(InMemoryRelay::new());
        let directory = AccountDirectory::new();
        let other = InMemoryAccountService::with_account(directory.clone(), "Other").unwrap();
        let code = PairingCode::RecoveryKey(other.current_account().unwrap().recovery_key())
            .encode()
            .unwrap();
        let mut phone = device(
            &relay,
            InMemoryAccountService::with_account(directory, "Phone").unwrap(),
            config("Phone"),
        );

        assert!(!phone.controller.code_entered(&code).await);
        let events = drain_events(&mut phone.events);
        assert_eq!(error_kinds(&events), vec![ActivationError::FoundExistingAccount]);
        assert!(!events
            .iter()
            .any(|e| matches!(e, PairingEvent::TwoAccountsFoundDuringRecovery { .. })));
    }

    #[tokio::test]
    async fn test_login_failure_with_account_and_switching() {
        let relay = Arc::new(InMemoryRelay::new());
        let directory = AccountDirectory::new();
        let other = InMemoryAccountService::with_account(directory.clone(), "Other").unwrap();
        let recovery = other.current_account().unwrap().recovery_key();
        let mut phone = device(
            &relay,
            InMemoryAccountService::with_account(directory, "Phone").unwrap(),
            PairingConfig {
                seamless_account_switching: true,
                ..config("Phone")
            },
        );

        let code = PairingCode::RecoveryKey(recovery.clone()).encode().unwrap();
        assert!(!phone.controller.code_entered(&code).await);
        let events = drain_events(&mut phone.events);
        assert!(error_kinds(&events).is_empty());
        assert_eq!(
            events.last(),
            Some(&PairingEvent::TwoAccountsFoundDuringRecovery {
                recovery_key: recovery
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_exchange_mode_is_quiet_before_data() {
        let relay = Arc::new(InMemoryRelay::new());
        let mut dev = fresh_device(&relay, config("Laptop"));

        let code = dev.controller.start_exchange_mode().unwrap();
        assert!(!code.is_empty());
        assert!(matches!(
            PairingCode::decode(&code),
            Ok(PairingCode::ExchangeInvite(_))
        ));
        assert!(dev.controller.is_exchanging());

        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 3).await;
        assert!(drain_events(&mut dev.events).is_empty());
        let invite = PairingCode::decode(&code).unwrap();
        assert!(relay.get_count(RelayEndpoint::Exchange, invite.recipient_id()) >= 3);

        dev.controller.stop_exchange_mode();
        dev.controller.stop_exchange_mode();
        assert!(!dev.controller.is_exchanging());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_exchange_mode_stops_polling() {
        let relay = Arc::new(InMemoryRelay::new());
        let dev = fresh_device(&relay, config("Laptop"));
        let code = PairingCode::decode(&dev.controller.start_exchange_mode().unwrap()).unwrap();
        let id = code.recipient_id().to_string();

        tokio::time::sleep(DEFAULT_POLL_INTERVAL / 2).await;
        dev.controller.stop_exchange_mode();
        let polled = relay.get_count(RelayEndpoint::Exchange, &id);
        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 4).await;
        assert_eq!(relay.get_count(RelayEndpoint::Exchange, &id), polled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_while_answering_exchange_prevents_polling() {
        let relay = Arc::new(InMemoryRelay::new());
        relay.delay_posts(Duration::from_secs(10));
        let mut phone = fresh_device(&relay, config("Phone"));
        let initiator = EphemeralKeyPair::generate();
        let code = PairingCode::ExchangeInvite(ExchangeKey {
            key_id: initiator.id.clone(),
            public_key: initiator.public_key.clone(),
        })
        .encode()
        .unwrap();

        let answer = phone.controller.code_entered(&code);
        let stop = async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            assert!(phone.controller.is_exchanging());
            phone.controller.stop_exchange_mode();
            assert!(!phone.controller.is_exchanging());
        };
        let (handled, ()) = tokio::join!(answer, stop);
        assert!(!handled);

        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 12).await;
        assert_eq!(relay.post_count(), 1);
        assert!(!relay
            .requests()
            .iter()
            .any(|r| matches!(r, RelayRequest::Get { .. })));
        assert_eq!(drain_events(&mut phone.events), vec![PairingEvent::CodeRecognized]);
        assert!(!phone.controller.is_exchanging());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_connect_discards_recovery_key_in_flight() {
        let relay = Arc::new(InMemoryRelay::new());
        relay.delay_gets(Duration::from_secs(10));
        let directory = AccountDirectory::new();
        let laptop = device(
            &relay,
            InMemoryAccountService::with_account(directory.clone(), "Laptop").unwrap(),
            config("Laptop"),
        );
        let mut phone = device(&relay, InMemoryAccountService::new(directory), config("Phone"));

        let code = phone.controller.start_connect_mode().unwrap();
        let id = PairingCode::decode(&code).unwrap().recipient_id().to_string();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(relay.get_count(RelayEndpoint::Connect, &id), 1);

        // The key lands while the first GET is still pending.
        assert!(laptop.controller.code_entered(&code).await);
        assert!(relay.slot(RelayEndpoint::Connect, &id).is_some());
        phone.controller.stop_connect_mode();

        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 12).await;
        assert_eq!(relay.get_count(RelayEndpoint::Connect, &id), 1);
        assert!(drain_events(&mut phone.events).is_empty());
        assert!(phone.accounts.login_attempts().is_empty());
        assert!(phone.accounts.current_account().is_none());
        assert!(!phone.controller.is_connecting());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarting_exchange_replaces_session() {
        let relay = Arc::new(InMemoryRelay::new());
        let dev = fresh_device(&relay, config("Laptop"));
        let first = PairingCode::decode(&dev.controller.start_exchange_mode().unwrap()).unwrap();
        let second = PairingCode::decode(&dev.controller.start_exchange_mode().unwrap()).unwrap();
        assert_ne!(first.recipient_id(), second.recipient_id());

        tokio::time::sleep(DEFAULT_POLL_INTERVAL / 2).await;
        let before = relay.get_count(RelayEndpoint::Exchange, first.recipient_id());
        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 3).await;
        assert_eq!(relay.get_count(RelayEndpoint::Exchange, first.recipient_id()), before);
        assert!(relay.get_count(RelayEndpoint::Exchange, second.recipient_id()) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exchange_transmit_failure_still_finishes() {
        let relay = Arc::new(InMemoryRelay::new());
        let directory = AccountDirectory::new();
        let mut laptop = device(
            &relay,
            InMemoryAccountService::with_account(directory, "Laptop").unwrap(),
            config("Laptop"),
        );
        let invite = PairingCode::decode(&laptop.controller.start_exchange_mode().unwrap()).unwrap();

        // Peer answers the invite, then the relay starts refusing writes.
        let peer = EphemeralKeyPair::generate();
        let answer = PairingCode::ExchangeResponse(ExchangeMessage {
            key_id: peer.id.clone(),
            public_key: peer.public_key.clone(),
            device_name: "Phone".into(),
        });
        KeyTransmitter::new(relay.clone(), Arc::new(BoxCrypter))
            .send(&invite, &answer)
            .await
            .unwrap();
        relay.fail_posts(500);

        let events = wait_for_event(&mut laptop.events, |e| {
            *e == PairingEvent::DidFinishTransmittingRecoveryKey
        })
        .await
        .unwrap();
        assert_eq!(
            events.iter().map(PairingEvent::name).collect::<Vec<_>>(),
            vec![
                "will_begin_transmitting_recovery_key",
                "error",
                "did_finish_transmitting_recovery_key"
            ]
        );
        assert_eq!(
            error_kinds(&events),
            vec![ActivationError::FailedToTransmitExchangeRecoveryKey]
        );

        // The poller is stopped and does not come back.
        let polled = relay.get_count(RelayEndpoint::Exchange, invite.recipient_id());
        tokio::time::sleep(DEFAULT_POLL_INTERVAL * 3).await;
        assert_eq!(relay.get_count(RelayEndpoint::Exchange, invite.recipient_id()), polled);
        assert!(drain_events(&mut laptop.events).is_empty());
        assert!(!laptop.controller.is_exchanging());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exchange_poll_error() {
        let relay = Arc::new(InMemoryRelay::new());
        relay.fail_gets(500);
        let mut dev = fresh_device(&relay, config("Laptop"));
        dev.controller.start_exchange_mode().unwrap();

        let events = wait_for_event(&mut dev.events, PairingEvent::is_error).await.unwrap();
        assert_eq!(error_kinds(&events), vec![ActivationError::FailedToFetchPublicKey]);
    }

    #[tokio::test]
    async fn test_connect_mode_refused_when_signed_in() {
        let relay = Arc::new(InMemoryRelay::new());
        let dev = device(
            &relay,
            InMemoryAccountService::with_account(AccountDirectory::new(), "Laptop").unwrap(),
            config("Laptop"),
        );
        assert_eq!(
            dev.controller.start_connect_mode(),
            Err(PairingError::Account(AccountError::AlreadyExists))
        );
        assert!(!dev.controller.is_connecting());
    }

    #[tokio::test]
    async fn test_connect_responder_creates_account() {
        let relay = Arc::new(InMemoryRelay::new());
        let mut laptop = fresh_device(&relay, config("Laptop"));
        let peer = EphemeralKeyPair::generate();
        let code = PairingCode::ConnectInvite(ConnectCode {
            device_id: peer.id.clone(),
            secret_key: peer.public_key.clone(),
        })
        .encode()
        .unwrap();

        assert!(laptop.controller.code_entered(&code).await);
        assert_eq!(
            drain_events(&mut laptop.events),
            vec![
                PairingEvent::CodeRecognized,
                PairingEvent::AccountCreated,
                PairingEvent::AccountConnectionCompleted {
                    show_sync_enabled: false
                },
            ]
        );
        assert!(relay.slot(RelayEndpoint::Connect, &peer.id).is_some());
        assert!(!laptop.controller.recovery_code().is_empty());
    }

    #[tokio::test]
    async fn test_connect_responder_create_failure() {
        let relay = Arc::new(InMemoryRelay::new());
        let accounts = InMemoryAccountService::new(AccountDirectory::new());
        accounts.fail_account_creation();
        let mut laptop = device(&relay, accounts, config("Laptop"));
        let peer = EphemeralKeyPair::generate();
        let code = PairingCode::ConnectInvite(ConnectCode {
            device_id: peer.id.clone(),
            secret_key: peer.public_key.clone(),
        })
        .encode()
        .unwrap();

        assert!(!laptop.controller.code_entered(&code).await);
        assert_eq!(
            error_kinds(&drain_events(&mut laptop.events)),
            vec![ActivationError::FailedToCreateAccount]
        );
        assert_eq!(relay.post_count(), 0);
    }

    #[tokio::test]
    async fn test_recovery_code_empty_without_account() {
        let relay = Arc::new(InMemoryRelay::new());
        let dev = fresh_device(&relay, config("Phone"));
        assert_eq!(dev.controller.recovery_code(), "");
    }
}
