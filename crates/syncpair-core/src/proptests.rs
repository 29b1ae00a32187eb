//! Property-based tests for the pairing code codec.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::code::{ConnectCode, ExchangeKey, ExchangeMessage, PairingCode, RecoveryKey};
    use crate::errors::CodeError;
    use crate::link::PairingLink;

    fn id() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9-]{1,40}"
    }

    fn key() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(any::<u8>(), 0..64)
    }

    fn pairing_code() -> impl Strategy<Value = PairingCode> {
        prop_oneof![
            (id(), key()).prop_map(|(key_id, public_key)| {
                PairingCode::ExchangeInvite(ExchangeKey { key_id, public_key })
            }),
            (id(), key(), "\\PC{0,30}").prop_map(|(key_id, public_key, device_name)| {
                PairingCode::ExchangeResponse(ExchangeMessage {
                    key_id,
                    public_key,
                    device_name,
                })
            }),
            (id(), key()).prop_map(|(device_id, secret_key)| {
                PairingCode::ConnectInvite(ConnectCode {
                    device_id,
                    secret_key,
                })
            }),
            (id(), key()).prop_map(|(user_id, primary_key)| {
                PairingCode::RecoveryKey(RecoveryKey {
                    user_id,
                    primary_key,
                })
            }),
        ]
    }

    // Any code survives encode/decode, and the encoded form has exactly one top-level key.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn test_codec_round_trip(code in pairing_code()) {
            let encoded = code.encode().unwrap();
            prop_assert_eq!(PairingCode::decode(&encoded).unwrap(), code.clone());

            let json: serde_json::Value = serde_json::from_slice(&code.to_json().unwrap()).unwrap();
            let object = json.as_object().unwrap();
            prop_assert_eq!(object.len(), 1);
            prop_assert!(object.contains_key(code.kind()));
        }

        #[test]
        fn test_link_carries_code(code in pairing_code(), name in "[a-zA-Z ]{1,20}") {
            let base = url::Url::parse("https://example.com/").unwrap();
            let link = PairingLink::new(code.encode().unwrap(), Some(name));
            let parsed = PairingLink::from_url(&link.to_url(&base).unwrap(), Some("example.com")).unwrap();
            prop_assert_eq!(PairingCode::decode(&parsed.code).unwrap(), code);
            prop_assert_eq!(parsed.device_name, link.device_name);
        }
    }

    // Merging two codes into one object never decodes to either of them.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_two_cases_unrecognized(a in pairing_code(), b in pairing_code()) {
            prop_assume!(a.kind() != b.kind());
            let mut merged: serde_json::Map<String, serde_json::Value> =
                serde_json::from_slice(&a.to_json().unwrap()).unwrap();
            let other: serde_json::Map<String, serde_json::Value> =
                serde_json::from_slice(&b.to_json().unwrap()).unwrap();
            merged.extend(other);

            let bytes = serde_json::to_vec(&merged).unwrap();
            prop_assert_eq!(PairingCode::from_json(&bytes), Err(CodeError::Unrecognized));
        }

        #[test]
        fn test_decode_never_panics(text in "\\PC{0,200}") {
            let _ = PairingCode::decode(&text);
        }
    }
}
