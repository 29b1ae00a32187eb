//! syncpair core - pairing a new device with an existing sync account.
//!
//! This crate implements:
//! - The pairing code codec (exchange invite/response, connect invite, recovery key)
//! - Relay access: sealed-payload transmitter and cooperative key pollers
//! - The pairing controller that orchestrates exchange and connect flows
//! - Error taxonomy and the lifecycle event vocabulary
//!
//! The relay only ever sees sealed boxes; key material never leaves a device unsealed.

#![forbid(unsafe_code)]

// Wire formats
pub mod code;
pub mod link;

// Relay access
pub mod relay;
pub mod poller;
pub mod transmitter;

// Orchestration
pub mod account;
pub mod controller;
pub mod events;

// Supporting modules
pub mod errors;
pub mod harness;

// Optional transport implementations
#[cfg(feature = "http-relay")]
pub mod http_relay;

#[cfg(test)]
mod proptests;

pub use account::{Account, AccountService, RegisteredDevice};
pub use code::{ConnectCode, ExchangeKey, ExchangeMessage, PairingCode, RecoveryKey};
pub use controller::{PairingConfig, PairingController};
pub use errors::{ActivationError, PairingError};
pub use events::{EventReceiver, EventSink, PairingEvent};
