//! Pairing code codec.
//!
//! A pairing code is base64 of a UTF-8 JSON object with exactly one top-level key:
//!
//! ```text
//! {"exchange_key":    {"keyId": "...", "publicKey": "<b64>"}}
//! {"exchangeMessage": {"keyId": "...", "publicKey": "<b64>", "deviceName": "..."}}
//! {"connect":         {"deviceId": "...", "secretKey": "<b64>"}}
//! {"recovery":        {"userId": "...", "primaryKey": "<b64>"}}
//! ```
//!
//! Key spelling is shared with other clients and must not change. The same JSON (without
//! the outer base64) is what gets sealed and posted to the relay.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::errors::CodeError;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

mod b64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::B64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        super::B64.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// "I want to exchange keys, here is mine."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeKey {
    pub key_id: String,
    #[serde(with = "b64_bytes")]
    pub public_key: Vec<u8>,
}

/// A peer's answer to an [`ExchangeKey`] invite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeMessage {
    pub key_id: String,
    #[serde(with = "b64_bytes")]
    pub public_key: Vec<u8>,
    pub device_name: String,
}

/// "Send the account secret straight to my device."
///
/// `secret_key` carries the inviting device's public sealing key; the field name is part of
/// the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectCode {
    pub device_id: String,
    #[serde(with = "b64_bytes")]
    pub secret_key: Vec<u8>,
}

/// The account root secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryKey {
    pub user_id: String,
    #[serde(with = "b64_bytes")]
    pub primary_key: Vec<u8>,
}

impl std::fmt::Debug for RecoveryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryKey")
            .field("user_id", &self.user_id)
            .field("primary_key", &"<redacted>")
            .finish()
    }
}

/// One of the four codes two devices exchange while pairing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingCode {
    ExchangeInvite(ExchangeKey),
    ExchangeResponse(ExchangeMessage),
    ConnectInvite(ConnectCode),
    RecoveryKey(RecoveryKey),
}

/// JSON shape on the wire. Exactly one field may be populated.
#[derive(Default, Serialize, Deserialize)]
struct WireCode {
    #[serde(rename = "exchange_key", default, skip_serializing_if = "Option::is_none")]
    exchange_key: Option<ExchangeKey>,
    #[serde(rename = "exchangeMessage", default, skip_serializing_if = "Option::is_none")]
    exchange_message: Option<ExchangeMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    connect: Option<ConnectCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recovery: Option<RecoveryKey>,
}

impl From<&PairingCode> for WireCode {
    fn from(code: &PairingCode) -> Self {
        let mut wire = WireCode::default();
        match code {
            PairingCode::ExchangeInvite(k) => wire.exchange_key = Some(k.clone()),
            PairingCode::ExchangeResponse(m) => wire.exchange_message = Some(m.clone()),
            PairingCode::ConnectInvite(c) => wire.connect = Some(c.clone()),
            PairingCode::RecoveryKey(r) => wire.recovery = Some(r.clone()),
        }
        wire
    }
}

impl TryFrom<WireCode> for PairingCode {
    type Error = CodeError;

    fn try_from(wire: WireCode) -> Result<Self, Self::Error> {
        let WireCode {
            exchange_key,
            exchange_message,
            connect,
            recovery,
        } = wire;

        let mut cases = [
            exchange_key.map(PairingCode::ExchangeInvite),
            exchange_message.map(PairingCode::ExchangeResponse),
            connect.map(PairingCode::ConnectInvite),
            recovery.map(PairingCode::RecoveryKey),
        ]
        .into_iter()
        .flatten();

        match (cases.next(), cases.next()) {
            (Some(code), None) => Ok(code),
            // Never pick one of several populated cases.
            _ => Err(CodeError::Unrecognized),
        }
    }
}

impl PairingCode {
    /// Wire name of the populated case.
    pub fn kind(&self) -> &'static str {
        match self {
            PairingCode::ExchangeInvite(_) => "exchange_key",
            PairingCode::ExchangeResponse(_) => "exchangeMessage",
            PairingCode::ConnectInvite(_) => "connect",
            PairingCode::RecoveryKey(_) => "recovery",
        }
    }

    /// Relay slot identifier of the device this code points at.
    pub fn recipient_id(&self) -> &str {
        match self {
            PairingCode::ExchangeInvite(k) => &k.key_id,
            PairingCode::ExchangeResponse(m) => &m.key_id,
            PairingCode::ConnectInvite(c) => &c.device_id,
            PairingCode::RecoveryKey(r) => &r.user_id,
        }
    }

    /// Public key a payload for this code's owner is sealed to.
    pub fn recipient_public_key(&self) -> Option<&[u8]> {
        match self {
            PairingCode::ExchangeInvite(k) => Some(&k.public_key),
            PairingCode::ExchangeResponse(m) => Some(&m.public_key),
            PairingCode::ConnectInvite(c) => Some(&c.secret_key),
            PairingCode::RecoveryKey(_) => None,
        }
    }

    /// JSON bytes, the form that gets sealed.
    pub fn to_json(&self) -> Result<Vec<u8>, CodeError> {
        serde_json::to_vec(&WireCode::from(self)).map_err(|e| CodeError::Encode(e.to_string()))
    }

    /// Parse JSON bytes produced by [`PairingCode::to_json`].
    pub fn from_json(json: &[u8]) -> Result<Self, CodeError> {
        let value: serde_json::Value =
            serde_json::from_slice(json).map_err(|e| CodeError::Malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(CodeError::Unrecognized);
        }
        let wire: WireCode =
            serde_json::from_value(value).map_err(|e| CodeError::Malformed(e.to_string()))?;
        wire.try_into()
    }

    /// Base64 text form shown as QR or copied by the user.
    pub fn encode(&self) -> Result<String, CodeError> {
        Ok(B64.encode(self.to_json()?))
    }

    /// Decode text pasted or scanned by the user.
    ///
    /// Accepts standard and URL-safe base64, padded or not, and surrounding whitespace.
    pub fn decode(code: &str) -> Result<Self, CodeError> {
        let trimmed = code.trim();
        let json = B64
            .decode(trimmed)
            .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(trimmed))
            .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(trimmed))
            .map_err(|e| CodeError::Malformed(format!("not base64: {e}")))?;
        Self::from_json(&json)
    }
}
