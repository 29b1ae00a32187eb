//! syncpair - command-line device pairing for sync accounts
//!
//! This crate provides a command-line interface for:
//! - Showing exchange and connect codes and waiting for the other device
//! - Entering a code or pairing link shown by the other device
//! - Inspecting codes and printing this device's recovery code
//! - Managing the CLI configuration file

pub mod account;
pub mod cli;
pub mod config;
pub mod output;
pub mod runner;

#[cfg(test)]
mod proptests;

pub use cli::Cli;
pub use config::{CliOverrides, Config};
pub use output::{JsonResponse, OutputFormat, OutputFormatter};

use syncpair_core::{ActivationError, PairingEvent};

/// Exit codes for CLI operations
///
/// Exit codes provide machine-readable status for scripting and automation:
/// - 0: Success - pairing step completed
/// - 1: General error - unspecified error occurred
/// - 2: Login failed - the recovery key was rejected
/// - 3: Timeout - the other device did not answer in time
/// - 4: Connection failed - the relay could not be reached or refused a request
/// - 5: Invalid input - bad arguments or an unrecognized code
/// - 6: No account - this device is not signed in
/// - 7: Account exists - this device is already signed in to an account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully (exit code 0)
    Success = 0,
    /// General error (exit code 1)
    GeneralError = 1,
    /// Login failed (exit code 2)
    LoginFailed = 2,
    /// Operation timed out (exit code 3)
    Timeout = 3,
    /// Relay request failed (exit code 4)
    ConnectionFailed = 4,
    /// Invalid input provided (exit code 5)
    InvalidInput = 5,
    /// Device not signed in (exit code 6)
    NoAccount = 6,
    /// Device already signed in (exit code 7)
    AccountExists = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<ActivationError> for ExitCode {
    fn from(kind: ActivationError) -> Self {
        match kind {
            ActivationError::UnableToRecognizeCode => ExitCode::InvalidInput,
            ActivationError::FailedToFetchPublicKey
            | ActivationError::FailedToTransmitExchangeRecoveryKey
            | ActivationError::FailedToTransmitExchangeKey
            | ActivationError::FailedToFetchExchangeRecoveryKey
            | ActivationError::FailedToFetchConnectRecoveryKey
            | ActivationError::FailedToTransmitConnectRecoveryKey => ExitCode::ConnectionFailed,
            ActivationError::FailedToCreateAccount => ExitCode::GeneralError,
            ActivationError::FailedToLogIn => ExitCode::LoginFailed,
            ActivationError::FoundExistingAccount => ExitCode::AccountExists,
        }
    }
}

impl ExitCode {
    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Exit code for a flow that ended with `event`, if it ends one.
    pub fn for_event(event: &PairingEvent) -> Option<Self> {
        match event {
            PairingEvent::Error { kind, .. } => Some((*kind).into()),
            PairingEvent::TwoAccountsFoundDuringRecovery { .. } => Some(ExitCode::AccountExists),
            _ => None,
        }
    }

    /// Get the exit code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::LoginFailed => "LOGIN_FAILED",
            ExitCode::Timeout => "TIMEOUT",
            ExitCode::ConnectionFailed => "CONNECTION_FAILED",
            ExitCode::InvalidInput => "INVALID_INPUT",
            ExitCode::NoAccount => "NO_ACCOUNT",
            ExitCode::AccountExists => "ACCOUNT_EXISTS",
        }
    }

    /// Get a human-readable description of the exit code
    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Operation completed successfully",
            ExitCode::GeneralError => "An unspecified error occurred",
            ExitCode::LoginFailed => "The recovery key was rejected",
            ExitCode::Timeout => "The other device did not answer in time",
            ExitCode::ConnectionFailed => "The relay could not be reached or refused a request",
            ExitCode::InvalidInput => "Invalid arguments or unrecognized code",
            ExitCode::NoAccount => "This device is not signed in",
            ExitCode::AccountExists => "This device is already signed in to an account",
        }
    }
}

#[cfg(test)]
mod exit_code_tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success as i32, 0);
        assert_eq!(ExitCode::GeneralError as i32, 1);
        assert_eq!(ExitCode::LoginFailed as i32, 2);
        assert_eq!(ExitCode::Timeout as i32, 3);
        assert_eq!(ExitCode::ConnectionFailed as i32, 4);
        assert_eq!(ExitCode::InvalidInput as i32, 5);
        assert_eq!(ExitCode::NoAccount as i32, 6);
        assert_eq!(ExitCode::AccountExists as i32, 7);
    }

    #[test]
    fn test_exit_code_names() {
        assert_eq!(ExitCode::Success.name(), "SUCCESS");
        assert_eq!(ExitCode::LoginFailed.name(), "LOGIN_FAILED");
        assert_eq!(ExitCode::AccountExists.name(), "ACCOUNT_EXISTS");
        assert!(!ExitCode::NoAccount.description().is_empty());
    }

    #[test]
    fn test_exit_code_for_events() {
        let err = PairingEvent::Error {
            kind: ActivationError::UnableToRecognizeCode,
            source: None,
        };
        assert_eq!(ExitCode::for_event(&err), Some(ExitCode::InvalidInput));
        assert_eq!(ExitCode::for_event(&PairingEvent::CodeRecognized), None);
        assert_eq!(
            ExitCode::from(ActivationError::FailedToFetchConnectRecoveryKey),
            ExitCode::ConnectionFailed
        );
        assert_eq!(
            ExitCode::from(ActivationError::FoundExistingAccount),
            ExitCode::AccountExists
        );
    }
}
