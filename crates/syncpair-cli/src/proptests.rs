//! Property-based tests for syncpair-cli
//!
//! These tests verify correctness properties using proptest.

use proptest::prelude::*;
use syncpair_core::ActivationError;

use crate::config::{CliOverrides, Config};
use crate::output::{JsonResponse, OutputFormat};
use crate::ExitCode;

const ACTIVATION_ERRORS: [ActivationError; 10] = [
    ActivationError::UnableToRecognizeCode,
    ActivationError::FailedToFetchPublicKey,
    ActivationError::FailedToTransmitExchangeRecoveryKey,
    ActivationError::FailedToTransmitExchangeKey,
    ActivationError::FailedToFetchExchangeRecoveryKey,
    ActivationError::FailedToFetchConnectRecoveryKey,
    ActivationError::FailedToTransmitConnectRecoveryKey,
    ActivationError::FailedToCreateAccount,
    ActivationError::FailedToLogIn,
    ActivationError::FoundExistingAccount,
];

fn output_format() -> impl Strategy<Value = OutputFormat> {
    prop_oneof![
        Just(OutputFormat::Table),
        Just(OutputFormat::Json),
        Just(OutputFormat::Quiet),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Flags given on the command line always win over the file, and an
    // unset flag leaves the file's value alone.
    #[test]
    fn test_overrides_take_precedence(
        format in output_format(),
        verbose in any::<bool>(),
        port in 1024u16..65535,
        name in proptest::option::of("[A-Za-z][A-Za-z0-9 ]{0,20}"),
    ) {
        let url = format!("http://127.0.0.1:{port}/sync");
        let overrides = CliOverrides {
            output_format: Some(format.to_string()),
            verbose: verbose.then_some(true),
            debug: None,
            relay_url: Some(url.clone()),
            device_name: name.clone(),
            account_file: None,
        };
        let config = Config::default().with_overrides(&overrides);

        prop_assert_eq!(config.output.format.parse::<OutputFormat>().unwrap(), format);
        prop_assert_eq!(config.output.verbose, verbose);
        prop_assert_eq!(&config.relay.base_url, &url);
        match name {
            Some(name) => prop_assert_eq!(config.device_name(), name.trim().to_string()),
            None => prop_assert_eq!(config.device_name(), "syncpair CLI"),
        }
        prop_assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_formats_fail_validation(format in "[a-z]{1,10}") {
        prop_assume!(!["table", "json", "quiet"].contains(&format.as_str()));
        let mut config = Config::default();
        config.output.format = format.clone();
        prop_assert!(config.validate().is_err());
        prop_assert!(format.parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_every_failure_maps_to_nonzero_exit(index in 0usize..ACTIVATION_ERRORS.len()) {
        let code = ExitCode::from(ACTIVATION_ERRORS[index]);
        prop_assert_ne!(code, ExitCode::Success);
        prop_assert_ne!(i32::from(code), 0);
    }

    #[test]
    fn test_error_response_shape(message in ".{0,64}", command in "[a-z-]{1,16}") {
        let response = JsonResponse::error_with_command(&message, &command);
        let json = serde_json::to_value(&response).unwrap();
        prop_assert_eq!(json["success"].as_bool(), Some(false));
        prop_assert_eq!(json["command"].as_str(), Some(command.as_str()));
        prop_assert_eq!(json["error"].as_str(), Some(message.as_str()));
    }
}
