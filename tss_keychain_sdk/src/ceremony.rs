//! Live three-party keychain creation.
//!
//! ```text
//! START -> SHARES_GENERATED -> PLATFORM_KEYCHAIN_CREATED
//!       -> USER_KEYCHAIN_CREATED -> BACKUP_KEYCHAIN_CREATED -> COMPLETE
//! ```
//!
//! The platform keychain must exist before either participant builds its
//! signing material. The two participants then run as independent tasks
//! joined with `try_join!`. Each task checks the platform's signature bundle
//! before it builds anything, and the participant keychains are stored only
//! once both tasks have passed verification.

use crate::{
    aggregator::{PlatformClient, PlatformKeychainRequest, SignatureBundle},
    builder::{build_signing_material, BuildInput},
    channel::{ChannelKeypair, ChannelPublicKey, SecureChannel},
    exception::*,
    keychain::*,
    party::{Party, Role},
    passphrase::PassphraseCipher,
    primitive::{CounterpartShare, KeyShare, ShareGenerator},
};
use std::{fmt, sync::Arc};
use tracing::{error, info};
use zeroize::Zeroizing;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CeremonyStage {
    Start,
    SharesGenerated,
    PlatformKeychainCreated,
    UserKeychainCreated,
    BackupKeychainCreated,
    Complete,
}

impl fmt::Display for CeremonyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CeremonyStage::Start => "START",
            CeremonyStage::SharesGenerated => "SHARES_GENERATED",
            CeremonyStage::PlatformKeychainCreated => "PLATFORM_KEYCHAIN_CREATED",
            CeremonyStage::UserKeychainCreated => "USER_KEYCHAIN_CREATED",
            CeremonyStage::BackupKeychainCreated => "BACKUP_KEYCHAIN_CREATED",
            CeremonyStage::Complete => "COMPLETE",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Default)]
pub struct CreateKeychainsParams {
    pub passphrase: String,
    pub enterprise: Option<String>,
    pub original_passcode_encryption_code: Option<String>,
}

impl fmt::Debug for CreateKeychainsParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateKeychainsParams")
            .field("passphrase", &"[redacted]")
            .field("enterprise", &self.enterprise)
            .finish()
    }
}

/// What the platform published, as both participant tasks see it.
struct PublishedKeychain {
    common_keychain: String,
    to_user: CrossShare,
    to_backup: CrossShare,
    signatures: Option<String>,
    user_channel: ChannelPublicKey,
    backup_channel: ChannelPublicKey,
    platform_channel: ChannelPublicKey,
}

impl PublishedKeychain {
    fn verify_signatures(&self, channel: &dyn SecureChannel) -> Outcome<()> {
        SignatureBundle {
            user_channel: &self.user_channel,
            backup_channel: &self.backup_channel,
            common_keychain: &self.common_keychain,
            to_user: &self.to_user,
            to_backup: &self.to_backup,
        }
        .verify(channel, self.signatures.as_deref(), &self.platform_channel)
    }

    fn share_for(&self, role: Role) -> &CrossShare {
        match role {
            Role::User => &self.to_user,
            Role::Backup => &self.to_backup,
        }
    }
}

/// Everything one participant task owns.
struct ParticipantJob {
    role: Role,
    own: KeyShare,
    counterpart: CounterpartShare,
    channel_keypair: ChannelKeypair,
    published: Arc<PublishedKeychain>,
}

pub struct Ceremony {
    generator: Arc<dyn ShareGenerator>,
    channel: Arc<dyn SecureChannel>,
    cipher: Arc<dyn PassphraseCipher>,
    platform: Arc<dyn PlatformClient>,
}

impl Ceremony {
    pub fn new(
        generator: Arc<dyn ShareGenerator>,
        channel: Arc<dyn SecureChannel>,
        cipher: Arc<dyn PassphraseCipher>,
        platform: Arc<dyn PlatformClient>,
    ) -> Self {
        Ceremony {
            generator,
            channel,
            cipher,
            platform,
        }
    }

    /// Runs the whole ceremony. On any failure no triplet is returned.
    #[tracing::instrument(skip_all, fields(enterprise = ?params.enterprise))]
    pub async fn create_keychains(&self, params: CreateKeychainsParams) -> Outcome<KeychainsTriplet> {
        assert_throw!(
            !params.passphrase.is_empty(),
            KeychainError::Passphrase("a passphrase is required".to_owned())
        );
        match self.run(params).await {
            Ok(triplet) => {
                info!(stage = %CeremonyStage::Complete, "keychains created");
                Ok(triplet)
            }
            Err(err) => {
                error!(error = %err, "ceremony aborted");
                Err(err)
            }
        }
    }

    async fn run(&self, params: CreateKeychainsParams) -> Outcome<KeychainsTriplet> {
        info!(stage = %CeremonyStage::Start);
        let channel = self.channel.as_ref();
        let user_channel = channel.generate_channel_keypair(&Party::User.to_string())?;
        let backup_channel = channel.generate_channel_keypair(&Party::Backup.to_string())?;
        let user = self.generator.generate(Party::User)?;
        let backup = self.generator.generate(Party::Backup)?;
        info!(stage = %CeremonyStage::SharesGenerated);

        let platform_key = self.platform.channel_public_key();
        let request = PlatformKeychainRequest {
            user_to_platform: CrossShare::seal(
                channel,
                &user,
                Party::Platform,
                &platform_key,
                Some(&user_channel),
            )?,
            backup_to_platform: CrossShare::seal(
                channel,
                &backup,
                Party::Platform,
                &platform_key,
                Some(&backup_channel),
            )?,
            user_channel_public_key: user_channel.public_key.clone(),
            backup_channel_public_key: backup_channel.public_key.clone(),
            enterprise: params.enterprise.clone(),
        };
        let bitgo_keychain = self.platform.create_platform_keychain(request).await?;
        info!(stage = %CeremonyStage::PlatformKeychainCreated, keychain_id = %bitgo_keychain.id);

        let platform_share_for = |role: Role| {
            bitgo_keychain
                .key_share(Party::Platform, role.party())
                .cloned()
                .ok_or_else(|| {
                    KeychainError::MissingShare(format!("bitgo keychain has no share for {role}"))
                })
        };
        let published = Arc::new(PublishedKeychain {
            common_keychain: bitgo_keychain.common_keychain().to_owned(),
            to_user: platform_share_for(Role::User)?,
            to_backup: platform_share_for(Role::Backup)?,
            signatures: bitgo_keychain.descriptor.wallet_hsm_gpg_public_key_sigs.clone(),
            user_channel: user_channel.public_key.clone(),
            backup_channel: backup_channel.public_key.clone(),
            platform_channel: platform_key,
        });
        let user_job = ParticipantJob {
            role: Role::User,
            counterpart: backup.counterpart_view()?,
            own: user,
            channel_keypair: user_channel,
            published: published.clone(),
        };
        let backup_job = ParticipantJob {
            role: Role::Backup,
            counterpart: user_job.own.counterpart_view()?,
            own: backup,
            channel_keypair: backup_channel,
            published,
        };

        let passphrase = Zeroizing::new(params.passphrase);
        let (user_prv, backup_prv) = tokio::try_join!(
            self.seal_participant(user_job, passphrase.clone()),
            self.seal_participant(backup_job, passphrase.clone()),
        )?;

        let common = bitgo_keychain.common_keychain().to_owned();
        let mut user_descriptor = KeychainDescriptor::new(Party::User, common.clone());
        user_descriptor.encrypted_prv = Some(user_prv);
        user_descriptor.enterprise = params.enterprise.clone();
        user_descriptor.original_passcode_encryption_code = params.original_passcode_encryption_code;
        let mut backup_descriptor = KeychainDescriptor::new(Party::Backup, common);
        backup_descriptor.encrypted_prv = Some(backup_prv);
        backup_descriptor.enterprise = params.enterprise;

        // User first, then backup. A failed backup write leaves the user
        // keychain behind; its id goes into the error.
        let user_keychain = self.platform.add_keychain(user_descriptor).await?;
        info!(stage = %CeremonyStage::UserKeychainCreated, keychain_id = %user_keychain.id);
        let backup_keychain = self
            .platform
            .add_keychain(backup_descriptor)
            .await
            .map_err(|err| {
                KeychainError::Storage(format!(
                    "backup keychain not stored, user keychain {} is orphaned: {err}",
                    user_keychain.id
                ))
            })?;
        info!(stage = %CeremonyStage::BackupKeychainCreated, keychain_id = %backup_keychain.id);

        Ok(KeychainsTriplet {
            user_keychain,
            backup_keychain,
            bitgo_keychain,
        })
    }

    /// Builds and verifies one participant's signing material off the async
    /// runtime and returns it sealed under the passphrase.
    async fn seal_participant(
        &self,
        job: ParticipantJob,
        passphrase: Zeroizing<String>,
    ) -> Outcome<String> {
        let channel = self.channel.clone();
        let cipher = self.cipher.clone();
        let role = job.role;
        tokio::task::spawn_blocking(move || {
            job.published.verify_signatures(channel.as_ref())?;
            let material = build_signing_material(
                channel.as_ref(),
                BuildInput {
                    role: job.role,
                    own: &job.own,
                    counterpart: &job.counterpart,
                    platform_share: job.published.share_for(job.role),
                    channel_keypair: &job.channel_keypair,
                    common_keychain: &job.published.common_keychain,
                },
            )?;
            cipher.encrypt(&material.to_json()?, &passphrase)
        })
        .await
        .map_err(|err| KeychainError::Internal(format!("{role} task failed: {err}")))?
    }
}
