use super::{ChannelKeypair, ChannelPublicKey, SecureChannel};
use crate::{
    aes::{aes_decrypt, aes_encrypt, AeadPack, AES_KEY_LEN, NONCE_LEN},
    exception::*,
    secret::SecretHex,
    util::bytes_from_hex,
};
use k256::{
    ecdh::diffie_hellman,
    ecdsa::{
        signature::{Signer, Verifier},
        Signature, SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
    NonZeroScalar, PublicKey, SecretKey,
};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

const EPHEMERAL_PUB_LEN: usize = 33;
const TAG_LEN: usize = 16;

/// ECIES over secp256k1: ECDH with a fresh ephemeral key, SHA-256 of the
/// shared x-coordinate as the AES-256-GCM key, the recipient's public key as
/// associated data.
///
/// Wire form is `hex(ephemeralPub ‖ nonce ‖ ciphertext)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct EciesChannel;

impl EciesChannel {
    fn aes_key(secret: &NonZeroScalar, public: &PublicKey) -> Zeroizing<[u8; AES_KEY_LEN]> {
        let shared = diffie_hellman(secret, public.as_affine());
        let mut key = Zeroizing::new([0u8; AES_KEY_LEN]);
        key.copy_from_slice(&Sha256::digest(shared.raw_secret_bytes()));
        key
    }

    fn secret_key(keypair: &ChannelKeypair) -> Outcome<SecretKey> {
        let bytes = Zeroizing::new(bytes_from_hex("channel private key", keypair.private_key.expose())?);
        SecretKey::from_slice(&bytes).map_err(|_| {
            KeychainError::Encoding(format!("{} channel private key is not a scalar", keypair.label))
        })
    }
}

fn public_key(key: &ChannelPublicKey) -> Outcome<PublicKey> {
    let bytes = bytes_from_hex("channel public key", key.as_str())?;
    PublicKey::from_sec1_bytes(&bytes)
        .map_err(|_| KeychainError::Encoding(format!("not a channel public key: {key}")))
}

fn compressed(public: &PublicKey) -> Vec<u8> {
    public.to_encoded_point(true).as_bytes().to_vec()
}

impl SecureChannel for EciesChannel {
    fn generate_channel_keypair(&self, label: &str) -> Outcome<ChannelKeypair> {
        let secret = SecretKey::random(&mut OsRng);
        Ok(ChannelKeypair {
            label: label.to_owned(),
            public_key: ChannelPublicKey::new(hex::encode(compressed(&secret.public_key()))),
            private_key: SecretHex::from_bytes(&secret.to_bytes()),
        })
    }

    fn wrap(&self, secret: &[u8], recipient: &ChannelPublicKey) -> Outcome<String> {
        let recipient_key = public_key(recipient)?;
        let ephemeral = NonZeroScalar::random(&mut OsRng);
        let ephemeral_pub = PublicKey::from_secret_scalar(&ephemeral);

        let key = Self::aes_key(&ephemeral, &recipient_key);
        let pack = aes_encrypt(&key, secret, &compressed(&recipient_key))?;

        let mut out = compressed(&ephemeral_pub);
        out.extend_from_slice(&pack.nonce);
        out.extend_from_slice(&pack.ciphertext);
        Ok(hex::encode(out))
    }

    fn unwrap(&self, ciphertext: &str, keypair: &ChannelKeypair) -> Outcome<Zeroizing<Vec<u8>>> {
        let bytes = hex::decode(ciphertext)
            .map_err(|err| KeychainError::Decryption(format!("wrapped share: {err}")))?;
        if bytes.len() < EPHEMERAL_PUB_LEN + NONCE_LEN + TAG_LEN {
            return Err(KeychainError::Decryption(format!(
                "wrapped share is too short ({} bytes)",
                bytes.len()
            )));
        }
        let (ephemeral_pub, rest) = bytes.split_at(EPHEMERAL_PUB_LEN);
        let (nonce, ct) = rest.split_at(NONCE_LEN);

        let ephemeral_pub = PublicKey::from_sec1_bytes(ephemeral_pub)
            .map_err(|_| KeychainError::Decryption("bad ephemeral key".to_owned()))?;
        let own_secret = Self::secret_key(keypair)?;
        let own_public = public_key(&keypair.public_key)?;

        let key = Self::aes_key(&own_secret.to_nonzero_scalar(), &ephemeral_pub);
        let mut pack = AeadPack {
            ciphertext: ct.to_vec(),
            nonce: [0u8; NONCE_LEN],
        };
        pack.nonce.copy_from_slice(nonce);
        aes_decrypt(&key, &pack, &compressed(&own_public)).map_err(|_| {
            KeychainError::Decryption(format!("share was not wrapped for {}", keypair.label))
        })
    }

    fn sign(&self, message: &[u8], keypair: &ChannelKeypair) -> Outcome<String> {
        let signing_key = SigningKey::from(Self::secret_key(keypair)?);
        let signature: Signature = signing_key.sign(message);
        Ok(hex::encode(signature.to_bytes()))
    }

    fn verify(&self, message: &[u8], signature: &str, signer: &ChannelPublicKey) -> Outcome<()> {
        let verifying_key = VerifyingKey::from(public_key(signer)?);
        let signature = bytes_from_hex("signature", signature)
            .ok()
            .and_then(|bytes| Signature::from_slice(&bytes).ok())
            .ok_or_else(|| KeychainError::KeychainIntegrity("malformed signature".to_owned()))?;
        verifying_key.verify(message, &signature).map_err(|_| {
            KeychainError::KeychainIntegrity(format!("signature does not verify under {signer}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_unwrap_with_the_right_key() {
        let channel = EciesChannel;
        let user = channel.generate_channel_keypair("user").unwrap();
        let wrapped = channel.wrap(b"secret sub-share", &user.public_key).unwrap();
        assert_eq!(channel.unwrap(&wrapped, &user).unwrap().as_slice(), b"secret sub-share");
    }

    #[test]
    fn unwrap_with_another_key_fails() {
        let channel = EciesChannel;
        let user = channel.generate_channel_keypair("user").unwrap();
        let backup = channel.generate_channel_keypair("backup").unwrap();
        let wrapped = channel.wrap(b"secret", &user.public_key).unwrap();
        assert!(matches!(
            channel.unwrap(&wrapped, &backup),
            Err(KeychainError::Decryption(_))
        ));
    }

    #[test]
    fn tampered_payload_fails() {
        let channel = EciesChannel;
        let user = channel.generate_channel_keypair("user").unwrap();
        let wrapped = channel.wrap(b"secret", &user.public_key).unwrap();
        let mut chars: Vec<char> = wrapped.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '0' { '1' } else { '0' };
        let tampered: String = chars.into_iter().collect();
        assert!(matches!(
            channel.unwrap(&tampered, &user),
            Err(KeychainError::Decryption(_))
        ));
        assert!(channel.unwrap("abcd", &user).is_err());
    }

    #[test]
    fn signatures_bind_message_and_key() {
        let channel = EciesChannel;
        let platform = channel.generate_channel_keypair("bitgo").unwrap();
        let other = channel.generate_channel_keypair("user").unwrap();
        let sig = channel.sign(b"bundle", &platform).unwrap();
        assert!(channel.verify(b"bundle", &sig, &platform.public_key).is_ok());
        assert!(matches!(
            channel.verify(b"bundle!", &sig, &platform.public_key),
            Err(KeychainError::KeychainIntegrity(_))
        ));
        assert!(channel.verify(b"bundle", &sig, &other.public_key).is_err());
        assert!(channel.verify(b"bundle", "00", &platform.public_key).is_err());
    }
}
