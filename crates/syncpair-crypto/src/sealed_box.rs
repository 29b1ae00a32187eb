//! Sealed boxes: X25519 + HKDF-SHA256 + ChaCha20Poly1305.
//!
//! A sealed box is `ephemeral_pub (32) || ciphertext || tag (16)`. Only the holder of the
//! recipient secret key can open it, and the sender stays anonymous. The relay only ever
//! sees these bytes.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use hkdf::Hkdf;
use rand_core::OsRng;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey, StaticSecret};

pub const PUBLIC_KEY_LEN: usize = 32;
pub const SECRET_KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;

/// Bytes added to a plaintext by [`seal`].
pub const SEAL_OVERHEAD: usize = PUBLIC_KEY_LEN + TAG_LEN;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SealError {
    #[error("invalid key bytes: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },
    #[error("sealed box too short: {0} bytes")]
    Truncated(usize),
    #[error("key agreement produced a non-contributory secret")]
    WeakKey,
    #[error("encryption failed")]
    EncryptFailed,
    #[error("decryption failed")]
    DecryptFailed,
}

fn key_array(bytes: &[u8]) -> Result<[u8; 32], SealError> {
    bytes.try_into().map_err(|_| SealError::InvalidKeyLength {
        expected: PUBLIC_KEY_LEN,
        actual: bytes.len(),
    })
}

fn kdf_key_nonce(
    shared_secret: &[u8; 32],
    eph_pub: &[u8; 32],
    recipient_pub: &[u8; 32],
) -> ([u8; 32], [u8; 12]) {
    // Salt binds the derived key to both public halves of this box.
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(eph_pub);
    salt[32..].copy_from_slice(recipient_pub);
    let hk = Hkdf::<Sha256>::new(Some(&salt), shared_secret);

    let mut key = [0u8; 32];
    hk.expand(b"syncpair_box_v1_key", &mut key)
        .expect("32 bytes is a valid HKDF-SHA256 output length");

    let mut nonce = [0u8; 12];
    hk.expand(b"syncpair_box_v1_nonce", &mut nonce)
        .expect("12 bytes is a valid HKDF-SHA256 output length");

    (key, nonce)
}

/// Seal `plaintext` to `recipient_pub` (X25519, 32 bytes).
pub fn seal(plaintext: &[u8], recipient_pub: &[u8]) -> Result<Vec<u8>, SealError> {
    let recipient = key_array(recipient_pub)?;

    let eph = EphemeralSecret::random_from_rng(OsRng);
    let eph_pub = X25519PublicKey::from(&eph);

    let shared = eph.diffie_hellman(&X25519PublicKey::from(recipient));
    if !shared.was_contributory() {
        return Err(SealError::WeakKey);
    }

    let (key, nonce) = kdf_key_nonce(shared.as_bytes(), eph_pub.as_bytes(), &recipient);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    let ct = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: eph_pub.as_bytes(),
            },
        )
        .map_err(|_| SealError::EncryptFailed)?;

    let mut out = Vec::with_capacity(PUBLIC_KEY_LEN + ct.len());
    out.extend_from_slice(eph_pub.as_bytes());
    out.extend_from_slice(&ct);
    Ok(out)
}

/// Open a sealed box addressed to the key pair (`recipient_pub`, `recipient_secret`).
pub fn open(
    sealed: &[u8],
    recipient_pub: &[u8],
    recipient_secret: &[u8],
) -> Result<Vec<u8>, SealError> {
    if sealed.len() < SEAL_OVERHEAD {
        return Err(SealError::Truncated(sealed.len()));
    }
    let recipient = key_array(recipient_pub)?;
    let secret = StaticSecret::from(key_array(recipient_secret)?);

    let (eph_bytes, ct) = sealed.split_at(PUBLIC_KEY_LEN);
    let eph_pub = key_array(eph_bytes)?;

    let shared = secret.diffie_hellman(&X25519PublicKey::from(eph_pub));
    if !shared.was_contributory() {
        return Err(SealError::WeakKey);
    }

    let (key, nonce) = kdf_key_nonce(shared.as_bytes(), &eph_pub, &recipient);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
    cipher
        .decrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: ct,
                aad: &eph_pub,
            },
        )
        .map_err(|_| SealError::DecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::EphemeralKeyPair;

    #[test]
    fn test_seal_open_round_trip() {
        let recipient = EphemeralKeyPair::generate();
        let plaintext = b"{\"recovery\":{}}";

        let sealed = seal(plaintext, &recipient.public_key).unwrap();
        assert_eq!(sealed.len(), plaintext.len() + SEAL_OVERHEAD);

        let opened = open(&sealed, &recipient.public_key, recipient.secret_key()).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_open_with_wrong_key_fails() {
        let recipient = EphemeralKeyPair::generate();
        let other = EphemeralKeyPair::generate();

        let sealed = seal(b"secret", &recipient.public_key).unwrap();
        let result = open(&sealed, &other.public_key, other.secret_key());
        assert_eq!(result, Err(SealError::DecryptFailed));
    }

    #[test]
    fn test_tampered_box_fails() {
        let recipient = EphemeralKeyPair::generate();
        let mut sealed = seal(b"secret", &recipient.public_key).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        let result = open(&sealed, &recipient.public_key, recipient.secret_key());
        assert_eq!(result, Err(SealError::DecryptFailed));
    }

    #[test]
    fn test_truncated_box_rejected() {
        let recipient = EphemeralKeyPair::generate();
        let result = open(&[0u8; 10], &recipient.public_key, recipient.secret_key());
        assert_eq!(result, Err(SealError::Truncated(10)));
    }

    #[test]
    fn test_bad_public_key_length() {
        let result = seal(b"x", &[1u8; 31]);
        assert_eq!(
            result,
            Err(SealError::InvalidKeyLength {
                expected: 32,
                actual: 31
            })
        );
    }

    #[test]
    fn test_low_order_point_rejected() {
        // The all-zero point yields an all-zero shared secret.
        let result = seal(b"x", &[0u8; 32]);
        assert_eq!(result, Err(SealError::WeakKey));
    }
}
