//! Property-based tests for syncpair-crypto.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::keys::EphemeralKeyPair;
    use crate::sealed_box::{open, seal, SealError, SEAL_OVERHEAD};

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // Any plaintext sealed to a key pair opens with that pair and only that pair.
        #[test]
        fn test_sealed_box_opens_only_for_recipient(
            plaintext in prop::collection::vec(any::<u8>(), 0..512)
        ) {
            let recipient = EphemeralKeyPair::generate();
            let stranger = EphemeralKeyPair::generate();

            let sealed = seal(&plaintext, &recipient.public_key).unwrap();
            prop_assert_eq!(sealed.len(), plaintext.len() + SEAL_OVERHEAD);

            let opened = open(&sealed, &recipient.public_key, recipient.secret_key()).unwrap();
            prop_assert_eq!(opened, plaintext);

            let denied = open(&sealed, &stranger.public_key, stranger.secret_key());
            prop_assert_eq!(denied, Err(SealError::DecryptFailed));
        }

        // Flipping any single byte of a box makes it unopenable.
        #[test]
        fn test_sealed_box_detects_bit_flips(
            plaintext in prop::collection::vec(any::<u8>(), 1..128),
            index in any::<prop::sample::Index>(),
        ) {
            let recipient = EphemeralKeyPair::generate();
            let mut sealed = seal(&plaintext, &recipient.public_key).unwrap();
            let i = index.index(sealed.len());
            sealed[i] ^= 0x80;

            prop_assert!(open(&sealed, &recipient.public_key, recipient.secret_key()).is_err());
        }
    }
}
