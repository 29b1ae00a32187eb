use rand_core::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// Key pair generated for a single pairing attempt.
///
/// Only `id` and `public_key` ever leave the device. The secret half is zeroized on drop and
/// is redacted from `Debug` output.
#[derive(Clone)]
pub struct EphemeralKeyPair {
    /// Relay slot identifier for this attempt.
    pub id: String,
    /// X25519 public key (32 bytes).
    pub public_key: Vec<u8>,
    secret_key: Zeroizing<[u8; 32]>,
}

impl EphemeralKeyPair {
    /// Generate a fresh key pair with a random identifier.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            public_key: public.as_bytes().to_vec(),
            secret_key: Zeroizing::new(secret.to_bytes()),
        }
    }

    pub fn secret_key(&self) -> &[u8] {
        self.secret_key.as_ref()
    }
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("id", &self.id)
            .field("public_key_len", &self.public_key.len())
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_produces_distinct_pairs() {
        let a = EphemeralKeyPair::generate();
        let b = EphemeralKeyPair::generate();
        assert_ne!(a.id, b.id);
        assert_ne!(a.public_key, b.public_key);
        assert_eq!(a.public_key.len(), 32);
        assert_eq!(a.secret_key().len(), 32);
    }

    #[test]
    fn test_public_key_matches_secret() {
        let pair = EphemeralKeyPair::generate();
        let secret: [u8; 32] = pair.secret_key().try_into().unwrap();
        let derived = X25519PublicKey::from(&StaticSecret::from(secret));
        assert_eq!(derived.as_bytes().as_slice(), pair.public_key.as_slice());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let pair = EphemeralKeyPair::generate();
        let rendered = format!("{pair:?}");
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains(&pair.id));
    }
}
