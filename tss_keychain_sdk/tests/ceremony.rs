use async_trait::async_trait;
use std::sync::Arc;
use tss_keychain_sdk::prelude::*;

const PASSPHRASE: &str = "wallet passphrase";

fn cheap_cipher() -> Arc<Argon2AesCipher> {
    Arc::new(Argon2AesCipher::new(KdfParams {
        memory_kib: 256,
        iterations: 1,
        parallelism: 1,
    }))
}

fn platform(store: Arc<InMemoryKeychainStore>) -> PlatformAggregator {
    PlatformAggregator::new(
        Arc::new(Secp256k1ShareGenerator),
        Arc::new(EciesChannel),
        cheap_cipher(),
        store,
        "platform passphrase",
    )
    .unwrap()
}

fn ceremony(platform: Arc<dyn PlatformClient>) -> Ceremony {
    Ceremony::new(
        Arc::new(Secp256k1ShareGenerator),
        Arc::new(EciesChannel),
        cheap_cipher(),
        platform,
    )
}

fn params() -> CreateKeychainsParams {
    CreateKeychainsParams {
        passphrase: PASSPHRASE.to_owned(),
        enterprise: Some("enterprise-1".to_owned()),
        original_passcode_encryption_code: Some("123456".to_owned()),
    }
}

/// Hands the ceremony a platform keychain whose records were altered after
/// aggregation.
struct TamperingPlatform {
    inner: PlatformAggregator,
    tamper: fn(&mut Keychain),
}

#[async_trait]
impl PlatformClient for TamperingPlatform {
    fn channel_public_key(&self) -> ChannelPublicKey {
        self.inner.channel_public_key()
    }

    async fn create_platform_keychain(&self, request: PlatformKeychainRequest) -> Outcome<Keychain> {
        let mut keychain = self.inner.create_platform_keychain(request).await?;
        (self.tamper)(&mut keychain);
        Ok(keychain)
    }

    async fn add_keychain(&self, descriptor: KeychainDescriptor) -> Outcome<Keychain> {
        self.inner.add_keychain(descriptor).await
    }
}

/// Stores the user keychain but refuses the backup's.
struct FailingBackupWrites {
    inner: PlatformAggregator,
}

#[async_trait]
impl PlatformClient for FailingBackupWrites {
    fn channel_public_key(&self) -> ChannelPublicKey {
        self.inner.channel_public_key()
    }

    async fn create_platform_keychain(&self, request: PlatformKeychainRequest) -> Outcome<Keychain> {
        self.inner.create_platform_keychain(request).await
    }

    async fn add_keychain(&self, descriptor: KeychainDescriptor) -> Outcome<Keychain> {
        if descriptor.source == Party::Backup {
            return Err(KeychainError::Storage("disk full".to_owned()));
        }
        self.inner.add_keychain(descriptor).await
    }
}

fn flip_last_hex_char(hex: &mut String) {
    let last = hex.pop().unwrap();
    hex.push(if last == '0' { '1' } else { '0' });
}

#[tokio::test]
async fn all_parties_agree_on_the_common_keychain() {
    let store = Arc::new(InMemoryKeychainStore::new());
    let ceremony = ceremony(Arc::new(platform(store.clone())));
    let triplet = ceremony.create_keychains(params()).await.unwrap();

    let cipher = cheap_cipher();
    let user = triplet
        .user_keychain
        .decrypt_signing_material(cipher.as_ref(), PASSPHRASE)
        .unwrap();
    let backup = triplet
        .backup_keychain
        .decrypt_signing_material(cipher.as_ref(), PASSPHRASE)
        .unwrap();

    let published = triplet.bitgo_keychain.common_keychain();
    assert_eq!(published.len(), 130);
    assert_eq!(user.common_keychain().unwrap(), published);
    assert_eq!(backup.common_keychain().unwrap(), published);
    assert_eq!(triplet.user_keychain.common_keychain(), published);
    assert_eq!(triplet.backup_keychain.common_keychain(), published);

    // Both participants hold the same public parts.
    assert_eq!(user.user_share.public, backup.user_share.public);
    assert_eq!(user.platform_share.public, backup.platform_share.public);
    assert!(user.user_share.seed.is_some());
    assert!(backup.backup_share.seed.is_some());

    assert_eq!(triplet.user_keychain.source(), Party::User);
    assert_eq!(triplet.backup_keychain.source(), Party::Backup);
    assert_eq!(triplet.bitgo_keychain.source(), Party::Platform);
    assert!(triplet.bitgo_keychain.encrypted_prv().is_none());
    assert_eq!(triplet.bitgo_keychain.key_shares().len(), 2);
    assert!(triplet.user_keychain.key_shares().is_empty());
    assert_eq!(
        triplet.user_keychain.descriptor.original_passcode_encryption_code.as_deref(),
        Some("123456")
    );
    assert!(triplet.backup_keychain.descriptor.original_passcode_encryption_code.is_none());
    assert_eq!(store.len().await, 3);
}

#[tokio::test]
async fn backup_failure_persists_no_participant_keychain() {
    let store = Arc::new(InMemoryKeychainStore::new());
    let tampering = TamperingPlatform {
        inner: platform(store.clone()),
        tamper: |keychain| {
            let share = keychain
                .descriptor
                .key_shares
                .iter_mut()
                .find(|s| s.to == Party::Backup)
                .unwrap();
            flip_last_hex_char(&mut share.public_share);
        },
    };
    let result = ceremony(Arc::new(tampering)).create_keychains(params()).await;
    assert!(matches!(result, Err(KeychainError::KeychainIntegrity(_))));
    // Only the platform's own record exists; the user keychain was not stored.
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn tampered_private_share_aborts_the_ceremony() {
    let store = Arc::new(InMemoryKeychainStore::new());
    let tampering = TamperingPlatform {
        inner: platform(store.clone()),
        tamper: |keychain| {
            let share = keychain
                .descriptor
                .key_shares
                .iter_mut()
                .find(|s| s.to == Party::User)
                .unwrap();
            flip_last_hex_char(&mut share.private_share);
        },
    };
    let result = ceremony(Arc::new(tampering)).create_keychains(params()).await;
    assert!(matches!(
        result,
        Err(KeychainError::ChannelMismatch(_)) | Err(KeychainError::KeychainIntegrity(_))
    ));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn forged_common_keychain_is_an_integrity_error() {
    let tampering = TamperingPlatform {
        inner: platform(Arc::new(InMemoryKeychainStore::new())),
        tamper: |keychain| flip_last_hex_char(&mut keychain.descriptor.common_keychain),
    };
    let result = ceremony(Arc::new(tampering)).create_keychains(params()).await;
    assert!(matches!(result, Err(KeychainError::KeychainIntegrity(_))));
}

#[tokio::test]
async fn corrupted_signature_bundle_aborts_the_ceremony() {
    let store = Arc::new(InMemoryKeychainStore::new());
    let tampering = TamperingPlatform {
        inner: platform(store.clone()),
        tamper: |keychain| {
            let sigs = keychain.descriptor.wallet_hsm_gpg_public_key_sigs.as_mut().unwrap();
            flip_last_hex_char(sigs);
        },
    };
    let result = ceremony(Arc::new(tampering)).create_keychains(params()).await;
    assert!(matches!(result, Err(KeychainError::KeychainIntegrity(_))));
    assert_eq!(store.len().await, 1);

    let stripping = TamperingPlatform {
        inner: platform(store.clone()),
        tamper: |keychain| keychain.descriptor.wallet_hsm_gpg_public_key_sigs = None,
    };
    let result = ceremony(Arc::new(stripping)).create_keychains(params()).await;
    assert!(matches!(result, Err(KeychainError::KeychainIntegrity(_))));
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn failed_backup_write_names_the_orphaned_user_keychain() {
    let store = Arc::new(InMemoryKeychainStore::new());
    let failing = FailingBackupWrites {
        inner: platform(store.clone()),
    };
    let result = ceremony(Arc::new(failing)).create_keychains(params()).await;
    match result {
        Err(KeychainError::Storage(message)) => {
            assert!(message.contains("orphaned"), "{message}");
            assert!(message.contains("disk full"), "{message}");
        }
        other => panic!("expected a storage error, got {other:?}"),
    }
    // The platform record and the orphaned user keychain.
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn passphrase_is_required() {
    let store = Arc::new(InMemoryKeychainStore::new());
    let ceremony = ceremony(Arc::new(platform(store.clone())));
    let mut params = params();
    params.passphrase.clear();
    assert!(matches!(
        ceremony.create_keychains(params).await,
        Err(KeychainError::Passphrase(_))
    ));
    assert!(store.is_empty().await);
}
