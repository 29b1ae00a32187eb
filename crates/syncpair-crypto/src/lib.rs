//! Cryptographic building blocks for syncpair.
//!
//! - `sealed_box`: anonymous sealing to an X25519 public key
//! - `keys`: per-attempt ephemeral key pairs
//! - `crypter`: the `Crypter` seam used by the pairing core

#![forbid(unsafe_code)]

pub mod crypter;
pub mod keys;
pub mod sealed_box;

#[cfg(test)]
mod proptests;

pub use crypter::{BoxCrypter, Crypter};
pub use keys::EphemeralKeyPair;
pub use sealed_box::SealError;
