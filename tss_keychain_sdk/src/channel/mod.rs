//! Per-party channel keys used to move secret sub-shares over a transport
//! that is trusted for delivery but not for confidentiality.

mod ecies;
pub use ecies::*;

use crate::{exception::*, secret::SecretHex};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

/// Compressed SEC1 channel public key, hex encoded.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelPublicKey(String);

impl ChannelPublicKey {
    pub fn new(hex: impl Into<String>) -> Self {
        ChannelPublicKey(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelKeypair {
    pub label: String,
    pub public_key: ChannelPublicKey,
    pub private_key: SecretHex,
}

pub trait SecureChannel: Send + Sync {
    fn generate_channel_keypair(&self, label: &str) -> Outcome<ChannelKeypair>;

    /// Encrypts `secret` so that only the holder of `recipient`'s private key
    /// can read it.
    fn wrap(&self, secret: &[u8], recipient: &ChannelPublicKey) -> Outcome<String>;

    /// Fails with [`KeychainError::Decryption`] if `ciphertext` was not
    /// wrapped for `keypair` or was altered in transit.
    fn unwrap(&self, ciphertext: &str, keypair: &ChannelKeypair) -> Outcome<Zeroizing<Vec<u8>>>;

    fn sign(&self, message: &[u8], keypair: &ChannelKeypair) -> Outcome<String>;

    /// Fails with [`KeychainError::KeychainIntegrity`] on a bad signature.
    fn verify(&self, message: &[u8], signature: &str, signer: &ChannelPublicKey) -> Outcome<()>;
}
