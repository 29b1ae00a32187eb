//! Error types for syncpair core.
//!
//! Two layers:
//! - [`PairingError`] and its per-category enums describe *what* failed, for logs and
//!   diagnostics.
//! - [`ActivationError`] names *which step* of a pairing flow failed. It is the coarse kind
//!   a UI renders to the user.

use syncpair_crypto::SealError;
use thiserror::Error;

// ============================================================================
// Category errors
// ============================================================================

/// Pairing code could not be used.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodeError {
    /// Not base64, not JSON, or a known case with a broken shape
    #[error("malformed pairing code: {0}")]
    Malformed(String),

    /// Valid JSON, but zero or more than one known case populated
    #[error("unrecognized pairing code")]
    Unrecognized,

    /// A well-formed code of a kind that cannot be used here
    #[error("unsupported pairing code: {0}")]
    Unsupported(&'static str),

    /// Serializing a code failed
    #[error("failed to encode pairing code: {0}")]
    Encode(String),
}

/// Relay request failed. A 404 while polling is not an error and never produces this.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Request could not be sent or the response could not be read
    #[error("http error: {0}")]
    Http(String),

    /// Relay answered with a status the flow does not accept
    #[error("unexpected status code {0}")]
    UnexpectedStatus(u16),

    /// Relay answered 2xx with an unusable body
    #[error("invalid relay response: {0}")]
    InvalidResponse(String),
}

/// Sealing, unsealing or decoding a sealed payload failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error(transparent)]
    Seal(#[from] SealError),

    /// Unsealed bytes are not a pairing code
    #[error("sealed payload is not a pairing code: {0}")]
    Payload(String),

    /// Unsealed a pairing code of the wrong kind for this poller
    #[error("sealed payload has unexpected kind: {0}")]
    UnexpectedPayload(&'static str),

    /// Target code carries no public key to seal for
    #[error("pairing code has no public key: {0}")]
    NoRecipientKey(&'static str),
}

/// Account service rejected an operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("an account already exists on this device")]
    AlreadyExists,

    #[error("no account on this device")]
    NotFound,

    #[error("account creation failed: {0}")]
    CreateFailed(String),

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("account storage failed: {0}")]
    Storage(String),
}

/// Programmer misuse.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// `poll_for_payload` called while the same poller is already polling
    #[error("poller is already polling")]
    AlreadyPolling,
}

// ============================================================================
// Unified error
// ============================================================================

/// Unified error type for pairing operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PairingError {
    #[error("code error: {0}")]
    Code(#[from] CodeError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("account error: {0}")]
    Account(#[from] AccountError),

    #[error("state error: {0}")]
    State(#[from] StateError),
}

impl From<SealError> for PairingError {
    fn from(e: SealError) -> Self {
        PairingError::Crypto(CryptoError::Seal(e))
    }
}

impl PairingError {
    /// Short category name, safe to show or log.
    pub fn category(&self) -> &'static str {
        match self {
            PairingError::Code(_) => "code",
            PairingError::Transport(_) => "transport",
            PairingError::Crypto(_) => "crypto",
            PairingError::Account(_) => "account",
            PairingError::State(_) => "state",
        }
    }
}

// ============================================================================
// Flow step errors
// ============================================================================

/// Which step of a pairing flow failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivationError {
    UnableToRecognizeCode,

    // Exchange initiator
    FailedToFetchPublicKey,
    FailedToTransmitExchangeRecoveryKey,

    // Exchange responder
    FailedToTransmitExchangeKey,
    FailedToFetchExchangeRecoveryKey,

    // Connect initiator
    FailedToFetchConnectRecoveryKey,

    // Connect responder
    FailedToCreateAccount,
    FailedToTransmitConnectRecoveryKey,

    // Completion path
    FailedToLogIn,
    FoundExistingAccount,
}

impl ActivationError {
    /// Stable machine-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            ActivationError::UnableToRecognizeCode => "unable_to_recognize_code",
            ActivationError::FailedToFetchPublicKey => "failed_to_fetch_public_key",
            ActivationError::FailedToTransmitExchangeRecoveryKey => {
                "failed_to_transmit_exchange_recovery_key"
            }
            ActivationError::FailedToTransmitExchangeKey => "failed_to_transmit_exchange_key",
            ActivationError::FailedToFetchExchangeRecoveryKey => {
                "failed_to_fetch_exchange_recovery_key"
            }
            ActivationError::FailedToFetchConnectRecoveryKey => {
                "failed_to_fetch_connect_recovery_key"
            }
            ActivationError::FailedToCreateAccount => "failed_to_create_account",
            ActivationError::FailedToTransmitConnectRecoveryKey => {
                "failed_to_transmit_connect_recovery_key"
            }
            ActivationError::FailedToLogIn => "failed_to_log_in",
            ActivationError::FoundExistingAccount => "found_existing_account",
        }
    }
}

impl std::fmt::Display for ActivationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            ActivationError::UnableToRecognizeCode => "this code was not recognized",
            ActivationError::FailedToFetchPublicKey
            | ActivationError::FailedToTransmitExchangeRecoveryKey
            | ActivationError::FailedToTransmitExchangeKey
            | ActivationError::FailedToFetchExchangeRecoveryKey
            | ActivationError::FailedToFetchConnectRecoveryKey
            | ActivationError::FailedToTransmitConnectRecoveryKey => {
                "unable to sync with the other device"
            }
            ActivationError::FailedToCreateAccount => "unable to create a sync account",
            ActivationError::FailedToLogIn => "unable to sign in with this recovery code",
            ActivationError::FoundExistingAccount => {
                "this device is already syncing with another account"
            }
        };
        f.write_str(message)
    }
}
