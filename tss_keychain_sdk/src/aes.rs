use crate::exception::*;
use aes_gcm::{
    aead::{Aead, NewAead, Payload},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

pub const AES_KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

#[derive(Clone, PartialEq, Debug)]
pub struct AeadPack {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
}

/// AES-256-GCM with a fresh random nonce. `aad` is authenticated but not
/// encrypted.
pub fn aes_encrypt(key: &[u8; AES_KEY_LEN], plaintext: &[u8], aad: &[u8]) -> Outcome<AeadPack> {
    let aes_key = aes_gcm::Key::from_slice(key.as_slice());
    let cipher = Aes256Gcm::new(aes_key);

    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let payload = Payload {
        msg: plaintext,
        aad,
    };
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), payload)
        .map_err(|_| KeychainError::Internal("AES-GCM encryption failed".to_owned()))?;

    Ok(AeadPack { ciphertext, nonce })
}

/// Fails with [`KeychainError::Decryption`] when the key, nonce, aad or
/// ciphertext do not match what [`aes_encrypt`] produced.
pub fn aes_decrypt(
    key: &[u8; AES_KEY_LEN],
    pack: &AeadPack,
    aad: &[u8],
) -> Outcome<Zeroizing<Vec<u8>>> {
    let aes_key = aes_gcm::Key::from_slice(key.as_slice());
    let gcm = Aes256Gcm::new(aes_key);

    let payload = Payload {
        msg: pack.ciphertext.as_slice(),
        aad,
    };
    let out = gcm
        .decrypt(Nonce::from_slice(&pack.nonce), payload)
        .map_err(|_| KeychainError::Decryption("AES-GCM tag mismatch".to_owned()))?;
    Ok(Zeroizing::new(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrypt_needs_the_same_key_and_aad() {
        let key = [3u8; AES_KEY_LEN];
        let pack = aes_encrypt(&key, b"sub-share", b"aad").unwrap();
        assert_eq!(aes_decrypt(&key, &pack, b"aad").unwrap().as_slice(), b"sub-share");
        assert!(aes_decrypt(&[4u8; AES_KEY_LEN], &pack, b"aad").is_err());
        assert!(aes_decrypt(&key, &pack, b"other").is_err());

        let mut tampered = pack.clone();
        tampered.ciphertext[0] ^= 1;
        assert!(matches!(
            aes_decrypt(&key, &tampered, b"aad"),
            Err(KeychainError::Decryption(_))
        ));
    }
}
