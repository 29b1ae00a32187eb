//! Relay access.
//!
//! The relay is a dumb keyed store: a device POSTs a sealed box for a recipient id and the
//! recipient GETs it by its own id. Bodies are JSON:
//!
//! ```text
//! POST /exchange  {"keyId": "...",    "encryptedRecoveryKey": "<b64>"}
//! POST /connect   {"deviceId": "...", "encryptedRecoveryKey": "<b64>"}
//! GET  /exchange/{keyId}   -> 200 {"encryptedRecoveryKey": "<b64>"} | 404
//! GET  /connect/{deviceId} -> 200 {"encryptedRecoveryKey": "<b64>"} | 404
//! ```
//!
//! The connect body names its recipient `deviceId`, after the field of the connect code it
//! answers. Relays that expect `keyId` on both endpoints are not compatible with this client.

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::code::PairingCode;
use crate::errors::TransportError;

/// Relay slot family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelayEndpoint {
    Exchange,
    Connect,
}

impl RelayEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            RelayEndpoint::Exchange => "exchange",
            RelayEndpoint::Connect => "connect",
        }
    }

    /// Name of the recipient id field in POST bodies.
    pub fn id_field(&self) -> &'static str {
        match self {
            RelayEndpoint::Exchange => "keyId",
            RelayEndpoint::Connect => "deviceId",
        }
    }

    /// Endpoint a payload for the owner of `target` is posted to.
    pub fn for_target(target: &PairingCode) -> Option<Self> {
        match target {
            PairingCode::ExchangeInvite(_) | PairingCode::ExchangeResponse(_) => {
                Some(RelayEndpoint::Exchange)
            }
            PairingCode::ConnectInvite(_) => Some(RelayEndpoint::Connect),
            PairingCode::RecoveryKey(_) => None,
        }
    }
}

impl std::fmt::Display for RelayEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// Raw relay answer. Non-success statuses are returned, not mapped to errors, so that
/// pollers can treat 404 as "not yet".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RelayResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(404, Bytes::new())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport to the relay.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// GET `/{endpoint}/{id}`.
    async fn get(&self, endpoint: RelayEndpoint, id: &str) -> Result<RelayResponse, TransportError>;

    /// POST a JSON body to `/{endpoint}`.
    async fn post(&self, endpoint: RelayEndpoint, body: Bytes)
        -> Result<RelayResponse, TransportError>;
}

/// Body of a successful GET.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SealedSlot {
    pub encrypted_recovery_key: String,
}

impl SealedSlot {
    pub fn from_sealed(sealed: &[u8]) -> Self {
        Self {
            encrypted_recovery_key: base64::engine::general_purpose::STANDARD.encode(sealed),
        }
    }

    pub fn parse(body: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(body).map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }

    /// Sealed box bytes.
    pub fn sealed_bytes(&self) -> Result<Vec<u8>, TransportError> {
        base64::engine::general_purpose::STANDARD
            .decode(self.encrypted_recovery_key.trim())
            .map_err(|e| TransportError::InvalidResponse(format!("sealed box is not base64: {e}")))
    }
}

/// Build the POST body for `recipient_id` on `endpoint`.
pub fn post_body(
    endpoint: RelayEndpoint,
    recipient_id: &str,
    sealed: &[u8],
) -> Result<Bytes, TransportError> {
    let mut body = serde_json::Map::new();
    body.insert(endpoint.id_field().into(), recipient_id.into());
    body.insert(
        "encryptedRecoveryKey".into(),
        SealedSlot::from_sealed(sealed).encrypted_recovery_key.into(),
    );
    serde_json::to_vec(&body)
        .map(Bytes::from)
        .map_err(|e| TransportError::Http(format!("failed to encode request: {e}")))
}

/// Parsed POST body, as seen by a relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedSlot {
    pub recipient_id: String,
    pub encrypted_recovery_key: String,
}

impl PostedSlot {
    pub fn parse(endpoint: RelayEndpoint, body: &[u8]) -> Result<Self, TransportError> {
        let value: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        let field = |name: &str| {
            value
                .get(name)
                .and_then(|v| v.as_str())
                .map(str::to_owned)
                .ok_or_else(|| TransportError::InvalidResponse(format!("missing {name}")))
        };
        Ok(Self {
            recipient_id: field(endpoint.id_field())?,
            encrypted_recovery_key: field("encryptedRecoveryKey")?,
        })
    }
}
