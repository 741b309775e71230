//! Passphrase encryption of signing material at rest.
//!
//! The key is derived with Argon2id from the passphrase and a random salt,
//! then the payload is sealed with AES-256-GCM. The result is a small JSON
//! document `{"v":1,"salt":..,"iv":..,"ct":..}` with hex fields.

use crate::{
    aes::{aes_decrypt, aes_encrypt, AeadPack, AES_KEY_LEN, NONCE_LEN},
    exception::*,
    util::{array_from_hex, bytes_from_hex},
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub const SALT_LEN: usize = 16;
const ENVELOPE_VERSION: u32 = 1;

pub trait PassphraseCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str, passphrase: &str) -> Outcome<String>;

    /// Fails with [`KeychainError::Passphrase`] on a wrong passphrase.
    fn decrypt(&self, ciphertext: &str, passphrase: &str) -> Outcome<Zeroizing<String>>;
}

/// Argon2id cost parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        KdfParams {
            memory_kib: 65536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct SealedEnvelope {
    v: u32,
    salt: String,
    iv: String,
    ct: String,
}

#[derive(Clone, Debug, Default)]
pub struct Argon2AesCipher {
    params: KdfParams,
}

impl Argon2AesCipher {
    pub fn new(params: KdfParams) -> Self {
        Argon2AesCipher { params }
    }

    fn derive_key(&self, passphrase: &str, salt: &[u8]) -> Outcome<Zeroizing<[u8; AES_KEY_LEN]>> {
        let params = Params::new(
            self.params.memory_kib,
            self.params.iterations,
            self.params.parallelism,
            Some(AES_KEY_LEN),
        )
        .map_err(|e| KeychainError::Passphrase(format!("invalid Argon2 params: {e}")))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = Zeroizing::new([0u8; AES_KEY_LEN]);
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, key.as_mut_slice())
            .map_err(|e| KeychainError::Passphrase(format!("key derivation failed: {e}")))?;
        Ok(key)
    }
}

impl PassphraseCipher for Argon2AesCipher {
    fn encrypt(&self, plaintext: &str, passphrase: &str) -> Outcome<String> {
        assert_throw!(
            !passphrase.is_empty(),
            KeychainError::Passphrase("passphrase must not be empty".to_owned())
        );
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let key = self.derive_key(passphrase, &salt)?;
        let pack = aes_encrypt(&key, plaintext.as_bytes(), &[])?;

        let sealed = SealedEnvelope {
            v: ENVELOPE_VERSION,
            salt: hex::encode(salt),
            iv: hex::encode(pack.nonce),
            ct: hex::encode(pack.ciphertext),
        };
        Ok(serde_json::to_string(&sealed)?)
    }

    fn decrypt(&self, ciphertext: &str, passphrase: &str) -> Outcome<Zeroizing<String>> {
        let sealed: SealedEnvelope = serde_json::from_str(ciphertext)
            .map_err(|e| KeychainError::Passphrase(format!("not a sealed payload: {e}")))?;
        assert_throw!(
            sealed.v == ENVELOPE_VERSION,
            KeychainError::Passphrase(format!("unsupported sealed payload version {}", sealed.v))
        );
        let salt = bytes_from_hex("salt", &sealed.salt)?;
        let pack = AeadPack {
            ciphertext: bytes_from_hex("ciphertext", &sealed.ct)?,
            nonce: array_from_hex::<NONCE_LEN>("iv", &sealed.iv)?,
        };

        let key = self.derive_key(passphrase, &salt)?;
        let plaintext = aes_decrypt(&key, &pack, &[])
            .map_err(|_| KeychainError::Passphrase("wrong passphrase".to_owned()))?;
        let text = std::str::from_utf8(&plaintext)
            .map_err(|_| KeychainError::Passphrase("sealed payload is not text".to_owned()))?;
        Ok(Zeroizing::new(text.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Argon2AesCipher {
        Argon2AesCipher::new(KdfParams {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        })
    }

    #[test]
    fn round_trip_and_wrong_passphrase() {
        let cipher = cheap();
        let sealed = cipher.encrypt("{\"userShare\":1}", "correct horse").unwrap();
        let value: serde_json::Value = serde_json::from_str(&sealed).unwrap();
        assert_eq!(value["v"], 1);
        assert_eq!(value["salt"].as_str().unwrap().len(), SALT_LEN * 2);

        assert_eq!(cipher.decrypt(&sealed, "correct horse").unwrap().as_str(), "{\"userShare\":1}");
        assert!(matches!(
            cipher.decrypt(&sealed, "battery staple"),
            Err(KeychainError::Passphrase(_))
        ));
    }

    #[test]
    fn rejects_empty_passphrase_and_garbage() {
        let cipher = cheap();
        assert!(cipher.encrypt("x", "").is_err());
        assert!(cipher.decrypt("not json", "p").is_err());
    }
}
