use super::{
    OvcEnvelope, PlatformSection, PlatformShares, PlatformToOvc, PlatformToOvcShare,
    STATE_OVC_SHARES,
};
use crate::{
    aggregator::{PlatformClient, PlatformKeychainRequest},
    exception::*,
    keychain::Keychain,
    party::Party,
};

#[derive(Clone, Debug)]
pub struct OvcIngestOutcome {
    pub platform_keychain_id: String,
    pub envelope: OvcEnvelope,
}

fn outgoing_share(keychain: &Keychain, to: Party) -> Outcome<PlatformToOvc> {
    let share = keychain.key_share(Party::Platform, to).ok_or_else(|| {
        KeychainError::MissingShare(format!("bitgo keychain {} has no share for {to}", keychain.id))
    })?;
    Ok(PlatformToOvc {
        bitgo_to_ovc_share: PlatformToOvcShare::from_cross_share(share),
    })
}

/// Platform round: turns a state 0 envelope into a state 1 envelope carrying
/// the platform keychain's outgoing shares.
#[tracing::instrument(skip_all, fields(coin = %envelope.coin, state = envelope.state))]
pub async fn ingest_round_zero(
    platform: &dyn PlatformClient,
    envelope: &OvcEnvelope,
) -> Outcome<OvcIngestOutcome> {
    assert_throw!(
        envelope.state == STATE_OVC_SHARES,
        KeychainError::StateMismatch {
            expected: STATE_OVC_SHARES,
            found: envelope.state,
        }
    );
    assert_throw!(
        envelope.platform.is_none(),
        KeychainError::Schema("state 0 envelope already has a platform section".to_owned())
    );
    envelope.validate()?;

    let request = PlatformKeychainRequest {
        user_to_platform: envelope.ovc.user.ovc_to_bitgo_share.to_cross_share(Party::User)?,
        backup_to_platform: envelope.ovc.backup.ovc_to_bitgo_share.to_cross_share(Party::Backup)?,
        user_channel_public_key: envelope.ovc.user.gpg_pub_key.clone(),
        backup_channel_public_key: envelope.ovc.backup.gpg_pub_key.clone(),
        enterprise: None,
    };
    let keychain = platform.create_platform_keychain(request).await?;

    let signatures = keychain
        .descriptor
        .wallet_hsm_gpg_public_key_sigs
        .clone()
        .ok_or_else(|| {
            KeychainError::MissingShare(format!("bitgo keychain {} has no signature bundle", keychain.id))
        })?;
    let mut answered = envelope.clone();
    answered.platform = Some(PlatformSection {
        common_keychain: keychain.common_keychain().to_owned(),
        wallet_hsm_gpg_public_key_sigs: signatures,
        ovc: PlatformShares {
            user: outgoing_share(&keychain, Party::User)?,
            backup: outgoing_share(&keychain, Party::Backup)?,
        },
    });
    answered.state += 1;
    tracing::info!(keychain_id = %keychain.id, "OVC shares ingested");

    Ok(OvcIngestOutcome {
        platform_keychain_id: keychain.id,
        envelope: answered,
    })
}
