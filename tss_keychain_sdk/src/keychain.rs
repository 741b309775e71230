//! Records exchanged during a ceremony and the durable keychains it yields.

use crate::{
    channel::{ChannelKeypair, ChannelPublicKey, SecureChannel},
    exception::*,
    party::Party,
    passphrase::PassphraseCipher,
    primitive::{
        common_keychain, KeyShare, CHAIN_CODE_HEX_LEN, PUBLIC_COMPONENT_HEX_LEN, SUB_SHARE_HEX_LEN,
    },
    secret::SecretHex,
    util::{is_hex_of_len, split_hex},
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// One sub-share in transit from `from` to `to`.
///
/// `publicShare` is `publicComponent ‖ chainCode` in the clear.
/// `privateShare` is `subShare ‖ chainCode` wrapped for the recipient's
/// channel key. `privateShareProof`, when present, is the sender's channel
/// signature over the unwrapped `privateShare`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossShare {
    pub from: Party,
    pub to: Party,
    pub public_share: String,
    pub private_share: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_share_proof: Option<String>,
}

/// The plaintext of a cross-share's `privateShare`.
#[derive(Debug)]
pub struct OpenedShare {
    pub sub_share: SecretHex,
    pub chain_code: String,
}

impl OpenedShare {
    fn payload(&self) -> Zeroizing<String> {
        Zeroizing::new(format!("{}{}", self.sub_share.expose(), self.chain_code))
    }
}

impl CrossShare {
    /// Wraps the sub-share of `share` addressed to `to`. With a `signer` the
    /// plaintext is also signed so the recipient can attribute it.
    pub fn seal(
        channel: &dyn SecureChannel,
        share: &KeyShare,
        to: Party,
        recipient: &ChannelPublicKey,
        signer: Option<&ChannelKeypair>,
    ) -> Outcome<CrossShare> {
        let payload = Zeroizing::new(format!(
            "{}{}",
            share.sub_share_for(to).expose(),
            share.chain_code
        ));
        let private_share = channel.wrap(payload.as_bytes(), recipient)?;
        let private_share_proof = match signer {
            Some(keypair) => Some(channel.sign(payload.as_bytes(), keypair)?),
            None => None,
        };
        Ok(CrossShare {
            from: share.owner,
            to,
            public_share: format!("{}{}", share.public_component, share.chain_code),
            private_share,
            private_share_proof,
        })
    }

    /// Unwraps `privateShare` with the recipient's channel keypair.
    pub fn open(&self, channel: &dyn SecureChannel, keypair: &ChannelKeypair) -> Outcome<OpenedShare> {
        let plaintext = channel.unwrap(&self.private_share, keypair)?;
        let text = std::str::from_utf8(&plaintext).map_err(|_| {
            KeychainError::Decryption(format!("{} to {} share is not hex text", self.from, self.to))
        })?;
        let (sub_share, chain_code) = split_hex("private share", text, SUB_SHARE_HEX_LEN)?;
        assert_throw!(
            is_hex_of_len(sub_share, SUB_SHARE_HEX_LEN) && is_hex_of_len(chain_code, CHAIN_CODE_HEX_LEN),
            KeychainError::MissingShare(format!("{} to {} private share is malformed", self.from, self.to))
        );
        Ok(OpenedShare {
            sub_share: SecretHex::new(sub_share.to_owned()),
            chain_code: chain_code.to_owned(),
        })
    }

    /// Checks `privateShareProof` against the sender's channel key.
    pub fn verify_proof(
        &self,
        channel: &dyn SecureChannel,
        opened: &OpenedShare,
        sender: &ChannelPublicKey,
    ) -> Outcome<()> {
        let proof = self.private_share_proof.as_deref().ok_or_else(|| {
            KeychainError::KeychainIntegrity(format!("{} to {} share carries no proof", self.from, self.to))
        })?;
        channel.verify(opened.payload().as_bytes(), proof, sender)
    }

    /// Checks that both halves of the public share are present and well formed.
    pub fn validate(&self) -> Outcome<()> {
        assert_throw!(
            is_hex_of_len(&self.public_share, PUBLIC_COMPONENT_HEX_LEN + CHAIN_CODE_HEX_LEN),
            KeychainError::MissingShare(format!("{} to {} share has no public share", self.from, self.to))
        );
        assert_throw!(
            !self.private_share.is_empty(),
            KeychainError::MissingShare(format!("{} to {} share has no private share", self.from, self.to))
        );
        Ok(())
    }

    pub fn public_component(&self) -> Outcome<&str> {
        Ok(split_hex("public share", &self.public_share, PUBLIC_COMPONENT_HEX_LEN)?.0)
    }

    /// Chain code carried in the clear on the public share.
    pub fn chain_code(&self) -> Outcome<&str> {
        Ok(split_hex("public share", &self.public_share, PUBLIC_COMPONENT_HEX_LEN)?.1)
    }
}

/// One contributing party's part of a signing material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningShare {
    #[serde(rename = "pub")]
    pub public: String,
    #[serde(rename = "priv")]
    pub private: SecretHex,
    pub chain_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<SecretHex>,
}

/// What a party needs to take part in threshold signing later on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SigningMaterial {
    pub user_share: SigningShare,
    pub backup_share: SigningShare,
    pub platform_share: SigningShare,
}

impl SigningMaterial {
    /// Recomputes `aggregatePublic ‖ aggregateChainCode` from the three shares.
    pub fn common_keychain(&self) -> Outcome<String> {
        common_keychain(
            [
                self.user_share.public.as_str(),
                self.backup_share.public.as_str(),
                self.platform_share.public.as_str(),
            ],
            [
                self.user_share.chain_code.as_str(),
                self.backup_share.chain_code.as_str(),
                self.platform_share.chain_code.as_str(),
            ],
        )
    }

    pub fn to_json(&self) -> Outcome<Zeroizing<String>> {
        Ok(Zeroizing::new(serde_json::to_string(self)?))
    }

    pub fn from_json(json: &str) -> Outcome<SigningMaterial> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    #[default]
    Tss,
}

/// Create request handed to the keychain store, which assigns the id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeychainDescriptor {
    pub source: Party,
    #[serde(default)]
    pub key_type: KeyType,
    pub common_keychain: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_shares: Vec<CrossShare>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_prv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_passcode_encryption_code: Option<String>,
    #[serde(
        rename = "walletHSMGPGPublicKeySigs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub wallet_hsm_gpg_public_key_sigs: Option<String>,
}

impl KeychainDescriptor {
    pub fn new(source: Party, common_keychain: String) -> Self {
        KeychainDescriptor {
            source,
            key_type: KeyType::Tss,
            common_keychain,
            key_shares: Vec::new(),
            encrypted_prv: None,
            enterprise: None,
            original_passcode_encryption_code: None,
            wallet_hsm_gpg_public_key_sigs: None,
        }
    }
}

/// A stored keychain. Only the platform's record carries `keyShares`; only
/// the user and backup records carry `encryptedPrv`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keychain {
    pub id: String,
    #[serde(flatten)]
    pub descriptor: KeychainDescriptor,
}

impl Keychain {
    pub fn from_descriptor(id: String, descriptor: KeychainDescriptor) -> Self {
        Keychain { id, descriptor }
    }

    pub fn source(&self) -> Party {
        self.descriptor.source
    }

    pub fn common_keychain(&self) -> &str {
        &self.descriptor.common_keychain
    }

    pub fn key_shares(&self) -> &[CrossShare] {
        &self.descriptor.key_shares
    }

    pub fn encrypted_prv(&self) -> Option<&str> {
        self.descriptor.encrypted_prv.as_deref()
    }

    pub fn key_share(&self, from: Party, to: Party) -> Option<&CrossShare> {
        self.key_shares().iter().find(|s| s.from == from && s.to == to)
    }

    /// Copy of the record without its encrypted signing material.
    pub fn without_encrypted_prv(&self) -> Keychain {
        let mut keychain = self.clone();
        keychain.descriptor.encrypted_prv = None;
        keychain
    }

    /// Decrypts `encryptedPrv` and checks that the material still matches
    /// this record's common keychain.
    pub fn decrypt_signing_material(
        &self,
        cipher: &dyn PassphraseCipher,
        passphrase: &str,
    ) -> Outcome<SigningMaterial> {
        let sealed = self.encrypted_prv().ok_or_else(|| {
            KeychainError::MissingShare(format!("{} keychain {} has no encryptedPrv", self.source(), self.id))
        })?;
        let json = cipher.decrypt(sealed, passphrase)?;
        let material = SigningMaterial::from_json(&json)?;
        assert_throw!(
            material.common_keychain()? == self.common_keychain(),
            KeychainError::KeychainIntegrity(format!(
                "signing material of {} keychain {} does not match its common keychain",
                self.source(),
                self.id
            ))
        );
        Ok(material)
    }
}

/// The three keychains produced by one ceremony.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeychainsTriplet {
    pub user_keychain: Keychain,
    pub backup_keychain: Keychain,
    pub bitgo_keychain: Keychain,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::EciesChannel,
        passphrase::{Argon2AesCipher, KdfParams},
        primitive::{Secp256k1ShareGenerator, ShareGenerator},
    };

    #[test]
    fn seal_and_open_cross_share() {
        let channel = EciesChannel;
        let user_channel = channel.generate_channel_keypair("user").unwrap();
        let platform_channel = channel.generate_channel_keypair("bitgo").unwrap();
        let share = Secp256k1ShareGenerator.generate(Party::User).unwrap();

        let cross = CrossShare::seal(
            &channel,
            &share,
            Party::Platform,
            &platform_channel.public_key,
            Some(&user_channel),
        )
        .unwrap();
        assert_eq!(cross.public_component().unwrap(), share.public_component);
        assert_eq!(cross.chain_code().unwrap(), share.chain_code);

        let opened = cross.open(&channel, &platform_channel).unwrap();
        assert_eq!(&opened.sub_share, share.sub_share_for(Party::Platform));
        assert_eq!(opened.chain_code, share.chain_code);
        assert!(cross.verify_proof(&channel, &opened, &user_channel.public_key).is_ok());
        assert!(cross.verify_proof(&channel, &opened, &platform_channel.public_key).is_err());
        assert!(cross.open(&channel, &user_channel).is_err());
    }

    #[test]
    fn keychain_wire_names() {
        let mut descriptor = KeychainDescriptor::new(Party::Platform, "ab".repeat(65));
        descriptor.wallet_hsm_gpg_public_key_sigs = Some("sig".to_owned());
        let keychain = Keychain::from_descriptor("id-1".to_owned(), descriptor);
        let value = serde_json::to_value(&keychain).unwrap();
        assert_eq!(value["id"], "id-1");
        assert_eq!(value["source"], "bitgo");
        assert_eq!(value["keyType"], "tss");
        assert_eq!(value["walletHSMGPGPublicKeySigs"], "sig");
        assert!(value.get("encryptedPrv").is_none());
        assert!(value.get("keyShares").is_none());

        let back: Keychain = serde_json::from_value(value).unwrap();
        assert_eq!(back, keychain);
    }

    #[test]
    fn decrypt_signing_material_checks_the_common_keychain() {
        let generator = Secp256k1ShareGenerator;
        let share = |owner| {
            let s = generator.generate(owner).unwrap();
            SigningShare {
                public: s.public_component.clone(),
                private: s.sub_share_for(Party::User).clone(),
                chain_code: s.chain_code.clone(),
                seed: None,
            }
        };
        let material = SigningMaterial {
            user_share: share(Party::User),
            backup_share: share(Party::Backup),
            platform_share: share(Party::Platform),
        };
        let cipher = Argon2AesCipher::new(KdfParams {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        });

        let mut descriptor = KeychainDescriptor::new(Party::User, material.common_keychain().unwrap());
        descriptor.encrypted_prv = Some(cipher.encrypt(&material.to_json().unwrap(), "pw").unwrap());
        let keychain = Keychain::from_descriptor("u".to_owned(), descriptor);
        assert_eq!(keychain.decrypt_signing_material(&cipher, "pw").unwrap(), material);
        assert!(keychain.decrypt_signing_material(&cipher, "nope").is_err());

        let mut forged = keychain.clone();
        forged.descriptor.common_keychain = "00".repeat(65);
        assert!(matches!(
            forged.decrypt_signing_material(&cipher, "pw"),
            Err(KeychainError::KeychainIntegrity(_))
        ));
        assert!(keychain
            .without_encrypted_prv()
            .decrypt_signing_material(&cipher, "pw")
            .is_err());
    }
}
