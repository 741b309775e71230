//! The custody platform's side of keychain creation.

use crate::{
    channel::{ChannelKeypair, ChannelPublicKey, SecureChannel},
    exception::*,
    keychain::*,
    party::{Party, Recipient},
    passphrase::PassphraseCipher,
    primitive::{common_keychain, KeyShare, ShareGenerator},
    store::KeychainStore,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use zeroize::Zeroizing;

/// What the platform needs from the two participants.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformKeychainRequest {
    pub user_to_platform: CrossShare,
    pub backup_to_platform: CrossShare,
    pub user_channel_public_key: ChannelPublicKey,
    pub backup_channel_public_key: ChannelPublicKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enterprise: Option<String>,
}

/// The ceremony's view of the custody platform.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn channel_public_key(&self) -> ChannelPublicKey;

    /// Aggregates the two to-platform shares into the platform keychain.
    /// The returned record carries `keyShares` and no secret material.
    async fn create_platform_keychain(&self, request: PlatformKeychainRequest) -> Outcome<Keychain>;

    async fn add_keychain(&self, descriptor: KeychainDescriptor) -> Outcome<Keychain>;
}

/// What `walletHSMGPGPublicKeySigs` vouches for: the participants' channel
/// keys, the published common keychain and both platform-to-party shares.
pub struct SignatureBundle<'a> {
    pub user_channel: &'a ChannelPublicKey,
    pub backup_channel: &'a ChannelPublicKey,
    pub common_keychain: &'a str,
    pub to_user: &'a CrossShare,
    pub to_backup: &'a CrossShare,
}

impl SignatureBundle<'_> {
    /// Fields joined with `.`, which never occurs in hex.
    pub fn message(&self) -> Vec<u8> {
        [
            self.user_channel.as_str(),
            self.backup_channel.as_str(),
            self.common_keychain,
            self.to_user.public_share.as_str(),
            self.to_user.private_share.as_str(),
            self.to_backup.public_share.as_str(),
            self.to_backup.private_share.as_str(),
        ]
        .join(".")
        .into_bytes()
    }

    pub fn sign(&self, channel: &dyn SecureChannel, platform: &ChannelKeypair) -> Outcome<String> {
        channel.sign(&self.message(), platform)
    }

    /// Fails with [`KeychainError::KeychainIntegrity`] when the signature is
    /// absent or was not made by `platform` over this exact bundle.
    pub fn verify(
        &self,
        channel: &dyn SecureChannel,
        signature: Option<&str>,
        platform: &ChannelPublicKey,
    ) -> Outcome<()> {
        assert_throw!(
            self.to_user.from == Party::Platform
                && self.to_user.to == Party::User
                && self.to_backup.from == Party::Platform
                && self.to_backup.to == Party::Backup,
            KeychainError::KeychainIntegrity("signature bundle shares are misaddressed".to_owned())
        );
        let signature = signature.ok_or_else(|| {
            KeychainError::KeychainIntegrity("bitgo keychain carries no signature bundle".to_owned())
        })?;
        channel.verify(&self.message(), signature, platform)
    }
}

pub struct PlatformAggregator {
    channel_keypair: ChannelKeypair,
    generator: Arc<dyn ShareGenerator>,
    channel: Arc<dyn SecureChannel>,
    cipher: Arc<dyn PassphraseCipher>,
    store: Arc<dyn KeychainStore>,
    passphrase: Zeroizing<String>,
}

impl PlatformAggregator {
    pub fn new(
        generator: Arc<dyn ShareGenerator>,
        channel: Arc<dyn SecureChannel>,
        cipher: Arc<dyn PassphraseCipher>,
        store: Arc<dyn KeychainStore>,
        passphrase: &str,
    ) -> Outcome<Self> {
        let channel_keypair = channel.generate_channel_keypair(&Party::Platform.to_string())?;
        Ok(Self::with_channel_keypair(
            channel_keypair,
            generator,
            channel,
            cipher,
            store,
            passphrase,
        ))
    }

    /// Reuses a platform channel keypair, so shares wrapped for it in an
    /// earlier run can still be opened.
    pub fn with_channel_keypair(
        channel_keypair: ChannelKeypair,
        generator: Arc<dyn ShareGenerator>,
        channel: Arc<dyn SecureChannel>,
        cipher: Arc<dyn PassphraseCipher>,
        store: Arc<dyn KeychainStore>,
        passphrase: &str,
    ) -> Self {
        PlatformAggregator {
            channel_keypair,
            generator,
            channel,
            cipher,
            store,
            passphrase: Zeroizing::new(passphrase.to_owned()),
        }
    }

    fn check_incoming(share: &CrossShare, from: Party) -> Outcome<()> {
        assert_throw!(
            share.from == from && share.to == Party::Platform,
            KeychainError::MissingShare(format!(
                "expected the {from} to bitgo share, got {} to {}",
                share.from, share.to
            ))
        );
        share.validate()
    }

    fn signing_share(incoming: &CrossShare, opened: OpenedShare) -> Outcome<SigningShare> {
        Ok(SigningShare {
            public: incoming.public_component()?.to_owned(),
            private: opened.sub_share,
            chain_code: incoming.chain_code()?.to_owned(),
            seed: None,
        })
    }

    fn own_signing_share(own: &KeyShare) -> SigningShare {
        SigningShare {
            public: own.public_component.clone(),
            private: own.sub_share(Recipient::Own).clone(),
            chain_code: own.chain_code.clone(),
            seed: own.seed.clone(),
        }
    }
}

#[async_trait]
impl PlatformClient for PlatformAggregator {
    fn channel_public_key(&self) -> ChannelPublicKey {
        self.channel_keypair.public_key.clone()
    }

    #[tracing::instrument(skip_all)]
    async fn create_platform_keychain(&self, request: PlatformKeychainRequest) -> Outcome<Keychain> {
        let PlatformKeychainRequest {
            user_to_platform,
            backup_to_platform,
            user_channel_public_key,
            backup_channel_public_key,
            enterprise,
        } = request;
        Self::check_incoming(&user_to_platform, Party::User)?;
        Self::check_incoming(&backup_to_platform, Party::Backup)?;

        let channel = self.channel.as_ref();
        let opened_user = user_to_platform
            .open(channel, &self.channel_keypair)
            .map_err(KeychainError::into_channel_mismatch)?;
        let opened_backup = backup_to_platform
            .open(channel, &self.channel_keypair)
            .map_err(KeychainError::into_channel_mismatch)?;
        user_to_platform.verify_proof(channel, &opened_user, &user_channel_public_key)?;
        backup_to_platform.verify_proof(channel, &opened_backup, &backup_channel_public_key)?;

        let own = self.generator.generate(Party::Platform)?;
        let common = common_keychain(
            [
                user_to_platform.public_component()?,
                backup_to_platform.public_component()?,
                own.public_component.as_str(),
            ],
            [
                user_to_platform.chain_code()?,
                backup_to_platform.chain_code()?,
                own.chain_code.as_str(),
            ],
        )?;

        let to_user = CrossShare::seal(channel, &own, Party::User, &user_channel_public_key, None)?;
        let to_backup =
            CrossShare::seal(channel, &own, Party::Backup, &backup_channel_public_key, None)?;
        let signatures = SignatureBundle {
            user_channel: &user_channel_public_key,
            backup_channel: &backup_channel_public_key,
            common_keychain: &common,
            to_user: &to_user,
            to_backup: &to_backup,
        }
        .sign(channel, &self.channel_keypair)?;

        let material = SigningMaterial {
            user_share: Self::signing_share(&user_to_platform, opened_user)?,
            backup_share: Self::signing_share(&backup_to_platform, opened_backup)?,
            platform_share: Self::own_signing_share(&own),
        };
        let json = material.to_json()?;
        drop(material);
        let cipher = self.cipher.clone();
        let passphrase = self.passphrase.clone();
        let encrypted_prv = tokio::task::spawn_blocking(move || cipher.encrypt(&json, &passphrase))
            .await
            .map_err(|err| KeychainError::Internal(format!("encryption task failed: {err}")))??;

        let mut descriptor = KeychainDescriptor::new(Party::Platform, common);
        descriptor.key_shares = vec![to_user, to_backup];
        descriptor.encrypted_prv = Some(encrypted_prv);
        descriptor.enterprise = enterprise;
        descriptor.wallet_hsm_gpg_public_key_sigs = Some(signatures);

        let keychain = self.store.add_keychain(descriptor).await?;
        tracing::info!(keychain_id = %keychain.id, "bitgo keychain created");
        Ok(keychain.without_encrypted_prv())
    }

    async fn add_keychain(&self, descriptor: KeychainDescriptor) -> Outcome<Keychain> {
        self.store.add_keychain(descriptor).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::EciesChannel,
        passphrase::{Argon2AesCipher, KdfParams},
        primitive::Secp256k1ShareGenerator,
        store::InMemoryKeychainStore,
    };

    fn cheap_cipher() -> Arc<Argon2AesCipher> {
        Arc::new(Argon2AesCipher::new(KdfParams {
            memory_kib: 256,
            iterations: 1,
            parallelism: 1,
        }))
    }

    struct Participants {
        channel: EciesChannel,
        user: KeyShare,
        backup: KeyShare,
        user_channel: ChannelKeypair,
        backup_channel: ChannelKeypair,
    }

    impl Participants {
        fn new() -> Self {
            let channel = EciesChannel;
            Participants {
                user: Secp256k1ShareGenerator.generate(Party::User).unwrap(),
                backup: Secp256k1ShareGenerator.generate(Party::Backup).unwrap(),
                user_channel: channel.generate_channel_keypair("user").unwrap(),
                backup_channel: channel.generate_channel_keypair("backup").unwrap(),
                channel,
            }
        }

        fn request(&self, platform: &ChannelPublicKey) -> PlatformKeychainRequest {
            PlatformKeychainRequest {
                user_to_platform: CrossShare::seal(
                    &self.channel,
                    &self.user,
                    Party::Platform,
                    platform,
                    Some(&self.user_channel),
                )
                .unwrap(),
                backup_to_platform: CrossShare::seal(
                    &self.channel,
                    &self.backup,
                    Party::Platform,
                    platform,
                    Some(&self.backup_channel),
                )
                .unwrap(),
                user_channel_public_key: self.user_channel.public_key.clone(),
                backup_channel_public_key: self.backup_channel.public_key.clone(),
                enterprise: Some("ent-1".to_owned()),
            }
        }
    }

    fn aggregator(store: Arc<InMemoryKeychainStore>) -> PlatformAggregator {
        PlatformAggregator::new(
            Arc::new(Secp256k1ShareGenerator),
            Arc::new(EciesChannel),
            cheap_cipher(),
            store,
            "platform secret",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn creates_platform_keychain_without_secrets() {
        let store = Arc::new(InMemoryKeychainStore::new());
        let platform = aggregator(store.clone());
        let parties = Participants::new();

        let keychain = platform
            .create_platform_keychain(parties.request(&platform.channel_public_key()))
            .await
            .unwrap();
        assert_eq!(keychain.source(), Party::Platform);
        assert!(keychain.encrypted_prv().is_none());
        assert!(keychain.key_share(Party::Platform, Party::User).is_some());
        assert!(keychain.key_share(Party::Platform, Party::Backup).is_some());
        assert_eq!(keychain.descriptor.enterprise.as_deref(), Some("ent-1"));

        let sigs = keychain.descriptor.wallet_hsm_gpg_public_key_sigs.as_deref().unwrap();
        let to_user = keychain.key_share(Party::Platform, Party::User).unwrap();
        let to_backup = keychain.key_share(Party::Platform, Party::Backup).unwrap();
        let bundle = SignatureBundle {
            user_channel: &parties.user_channel.public_key,
            backup_channel: &parties.backup_channel.public_key,
            common_keychain: keychain.common_keychain(),
            to_user,
            to_backup,
        };
        assert!(bundle.verify(&parties.channel, Some(sigs), &platform.channel_public_key()).is_ok());
        assert!(matches!(
            bundle.verify(&parties.channel, None, &platform.channel_public_key()),
            Err(KeychainError::KeychainIntegrity(_))
        ));

        // The signature does not carry over to a different common keychain.
        let mut other = keychain.common_keychain().to_owned();
        let last = other.pop().unwrap();
        other.push(if last == '0' { '1' } else { '0' });
        let moved = SignatureBundle { common_keychain: &other, ..bundle };
        assert!(moved.verify(&parties.channel, Some(sigs), &platform.channel_public_key()).is_err());

        // The stored record keeps the platform's material, sealed.
        let stored = store.get_keychain(&keychain.id).await.unwrap().unwrap();
        let material = stored
            .decrypt_signing_material(cheap_cipher().as_ref(), "platform secret")
            .unwrap();
        assert_eq!(&material.user_share.private, parties.user.sub_share_for(Party::Platform));
        assert_eq!(material.common_keychain().unwrap(), keychain.common_keychain());
    }

    #[tokio::test]
    async fn rejects_missing_and_misaddressed_shares() {
        let store = Arc::new(InMemoryKeychainStore::new());
        let platform = aggregator(store.clone());
        let parties = Participants::new();

        let mut request = parties.request(&platform.channel_public_key());
        request.backup_to_platform.public_share.clear();
        assert!(matches!(
            platform.create_platform_keychain(request).await,
            Err(KeychainError::MissingShare(_))
        ));

        let mut request = parties.request(&platform.channel_public_key());
        request.user_to_platform.private_share.clear();
        assert!(matches!(
            platform.create_platform_keychain(request).await,
            Err(KeychainError::MissingShare(_))
        ));

        let mut request = parties.request(&platform.channel_public_key());
        request.user_to_platform = request.backup_to_platform.clone();
        assert!(matches!(
            platform.create_platform_keychain(request).await,
            Err(KeychainError::MissingShare(_))
        ));

        let wrong_channel = parties.channel.generate_channel_keypair("bitgo").unwrap();
        let request = parties.request(&wrong_channel.public_key);
        assert!(matches!(
            platform.create_platform_keychain(request).await,
            Err(KeychainError::ChannelMismatch(_))
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn rejects_a_forged_share_proof() {
        let platform = aggregator(Arc::new(InMemoryKeychainStore::new()));
        let parties = Participants::new();
        let mut request = parties.request(&platform.channel_public_key());
        request.user_channel_public_key = parties.backup_channel.public_key.clone();
        assert!(matches!(
            platform.create_platform_keychain(request).await,
            Err(KeychainError::KeychainIntegrity(_))
        ));
    }
}
