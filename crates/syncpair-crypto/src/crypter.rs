use crate::keys::EphemeralKeyPair;
use crate::sealed_box::{self, SealError};

/// Seal/unseal and key generation as consumed by the pairing core.
///
/// Implementations must be usable from background poll tasks.
pub trait Crypter: Send + Sync {
    /// Seal `data` so only the holder of `recipient_public_key`'s secret can read it.
    fn seal(&self, data: &[u8], recipient_public_key: &[u8]) -> Result<Vec<u8>, SealError>;

    /// Open a box sealed to (`public_key`, `secret_key`).
    fn unseal(
        &self,
        sealed: &[u8],
        public_key: &[u8],
        secret_key: &[u8],
    ) -> Result<Vec<u8>, SealError>;

    /// Fresh key pair for one pairing attempt.
    fn generate_key_pair(&self) -> EphemeralKeyPair;
}

/// Default [`Crypter`] backed by [`sealed_box`].
#[derive(Debug, Default, Clone, Copy)]
pub struct BoxCrypter;

impl Crypter for BoxCrypter {
    fn seal(&self, data: &[u8], recipient_public_key: &[u8]) -> Result<Vec<u8>, SealError> {
        sealed_box::seal(data, recipient_public_key)
    }

    fn unseal(
        &self,
        sealed: &[u8],
        public_key: &[u8],
        secret_key: &[u8],
    ) -> Result<Vec<u8>, SealError> {
        sealed_box::open(sealed, public_key, secret_key)
    }

    fn generate_key_pair(&self) -> EphemeralKeyPair {
        EphemeralKeyPair::generate()
    }
}
