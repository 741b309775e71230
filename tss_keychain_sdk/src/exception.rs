//! Errors raised while creating and reconciling TSS keychains.
//!
//! None of these are retried. A ceremony that hits any of them is aborted
//! and the error is handed back to the wallet-creation workflow.

use thiserror::Error;

pub type Outcome<T> = std::result::Result<T, KeychainError>;

#[derive(Debug, Error)]
pub enum KeychainError {
    /// A required share, public component or sub-share is absent.
    #[error("missing share: {0}")]
    MissingShare(String),

    /// A wrapped cross-share could not be opened with the supplied channel key.
    #[error("cross-share does not belong to this channel: {0}")]
    ChannelMismatch(String),

    /// Raw failure of the secure channel to unwrap a payload.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The recomputed common keychain (or an embedded chain code) disagrees
    /// with what was published.
    #[error("keychain integrity violated: {0}")]
    KeychainIntegrity(String),

    #[error("malformed OVC envelope: {0}")]
    Schema(String),

    #[error("OVC envelope is at state {found}, expected state {expected}")]
    StateMismatch { expected: u32, found: u32 },

    #[error("passphrase encryption failed: {0}")]
    Passphrase(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("keychain storage failed: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl KeychainError {
    /// A share that fails to unwrap was addressed to another channel or
    /// damaged in transit.
    pub(crate) fn into_channel_mismatch(self) -> Self {
        match self {
            KeychainError::Decryption(msg) => KeychainError::ChannelMismatch(msg),
            other => other,
        }
    }
}

impl From<hex::FromHexError> for KeychainError {
    fn from(err: hex::FromHexError) -> Self {
        KeychainError::Encoding(err.to_string())
    }
}

impl From<serde_json::Error> for KeychainError {
    fn from(err: serde_json::Error) -> Self {
        KeychainError::Encoding(err.to_string())
    }
}

/// Returns early with `$err` unless `$cond` holds.
#[macro_export]
macro_rules! assert_throw {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err);
        }
    };
}
