use std::sync::Arc;

use syncpair_crypto::Crypter;
use tracing::{info, warn};

use crate::code::PairingCode;
use crate::errors::{CryptoError, PairingError, TransportError};
use crate::relay::{post_body, RelayEndpoint, RelayTransport};

/// Seals pairing codes for a peer and drops them at the peer's relay slot.
///
/// One attempt per call. A failed POST is reported to the caller and never retried here.
#[derive(Clone)]
pub struct KeyTransmitter {
    relay: Arc<dyn RelayTransport>,
    crypter: Arc<dyn Crypter>,
}

impl KeyTransmitter {
    pub fn new(relay: Arc<dyn RelayTransport>, crypter: Arc<dyn Crypter>) -> Self {
        Self { relay, crypter }
    }

    /// Seal `payload` for the owner of `target` and POST it keyed by the target's id.
    ///
    /// `target` must carry a public key: an exchange invite, an exchange response or a
    /// connect invite.
    pub async fn send(&self, target: &PairingCode, payload: &PairingCode) -> Result<(), PairingError> {
        let (endpoint, public_key) = RelayEndpoint::for_target(target)
            .zip(target.recipient_public_key())
            .ok_or(CryptoError::NoRecipientKey(target.kind()))?;
        let recipient = target.recipient_id();

        let sealed = self.crypter.seal(&payload.to_json()?, public_key)?;
        let body = post_body(endpoint, recipient, &sealed)?;

        let response = self.relay.post(endpoint, body).await?;
        if !response.is_success() {
            warn!(%endpoint, recipient, status = response.status, "relay rejected sealed payload");
            return Err(TransportError::UnexpectedStatus(response.status).into());
        }

        info!(%endpoint, recipient, payload = payload.kind(), "sealed payload transmitted");
        Ok(())
    }
}
