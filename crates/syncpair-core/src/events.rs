//! Lifecycle events delivered to the UI.
//!
//! Events flow over an unbounded channel to a single consumer. Emitting never blocks and a
//! dropped receiver is not an error.

use tokio::sync::mpsc;
use tracing::debug;

use crate::account::RegisteredDevice;
use crate::code::RecoveryKey;
use crate::errors::{ActivationError, PairingError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// An entered code decoded. Always precedes events of the flow it starts.
    CodeRecognized,
    WillBeginTransmittingRecoveryKey,
    /// Follows `WillBeginTransmittingRecoveryKey` exactly once, whatever the outcome.
    DidFinishTransmittingRecoveryKey,
    RecoveryKeyReceived,
    AccountCreated,
    AccountConnectionCompleted {
        show_sync_enabled: bool,
    },
    LoginCompleted {
        devices: Vec<RegisteredDevice>,
    },
    /// Login failed because another account is signed in. Awaits the user's choice.
    TwoAccountsFoundDuringRecovery {
        recovery_key: RecoveryKey,
    },
    Error {
        kind: ActivationError,
        source: Option<PairingError>,
    },
}

impl PairingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PairingEvent::CodeRecognized => "code_recognized",
            PairingEvent::WillBeginTransmittingRecoveryKey => "will_begin_transmitting_recovery_key",
            PairingEvent::DidFinishTransmittingRecoveryKey => "did_finish_transmitting_recovery_key",
            PairingEvent::RecoveryKeyReceived => "recovery_key_received",
            PairingEvent::AccountCreated => "account_created",
            PairingEvent::AccountConnectionCompleted { .. } => "account_connection_completed",
            PairingEvent::LoginCompleted { .. } => "login_completed",
            PairingEvent::TwoAccountsFoundDuringRecovery { .. } => {
                "two_accounts_found_during_recovery"
            }
            PairingEvent::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, PairingEvent::Error { .. })
    }

    /// Error kind, if this is an error event.
    pub fn error_kind(&self) -> Option<ActivationError> {
        match self {
            PairingEvent::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type EventReceiver = mpsc::UnboundedReceiver<PairingEvent>;

#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<PairingEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: PairingEvent) {
        debug!(event = event.name(), "pairing event");
        if self.tx.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }

    pub fn error(&self, kind: ActivationError, source: Option<PairingError>) {
        self.emit(PairingEvent::Error { kind, source });
    }
}
