use super::{
    OvcContribution, OvcContributions, OvcEnvelope, OvcToPlatformShare, STATE_OVC_SHARES,
    STATE_PLATFORM_SHARES,
};
use crate::{
    aggregator::SignatureBundle,
    builder::{build_signing_material, BuildInput},
    channel::{ChannelKeypair, ChannelPublicKey, SecureChannel},
    exception::*,
    keychain::{CrossShare, SigningMaterial},
    party::{Party, Role},
    primitive::{CounterpartShare, KeyShare, ShareGenerator},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What one OVC keeps between rounds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OvcPartyState {
    pub role: Role,
    pub own: KeyShare,
    pub counterpart: CounterpartShare,
    pub channel_keypair: ChannelKeypair,
    pub platform_channel_key: ChannelPublicKey,
}

impl OvcPartyState {
    /// Generates both OVCs' shares and channel keys and performs the
    /// exchange between OVC-1 and OVC-2 that precedes round 0.
    pub fn pair(
        generator: &dyn ShareGenerator,
        channel: &dyn SecureChannel,
        platform_channel_key: &ChannelPublicKey,
    ) -> Outcome<(OvcPartyState, OvcPartyState)> {
        let user = generator.generate(Party::User)?;
        let backup = generator.generate(Party::Backup)?;
        let user_state = OvcPartyState {
            role: Role::User,
            counterpart: backup.counterpart_view()?,
            channel_keypair: channel.generate_channel_keypair(&Party::User.to_string())?,
            platform_channel_key: platform_channel_key.clone(),
            own: user,
        };
        let backup_state = OvcPartyState {
            role: Role::Backup,
            counterpart: user_state.own.counterpart_view()?,
            channel_keypair: channel.generate_channel_keypair(&Party::Backup.to_string())?,
            platform_channel_key: platform_channel_key.clone(),
            own: backup,
        };
        Ok((user_state, backup_state))
    }
}

pub struct OvcParty {
    channel: Arc<dyn SecureChannel>,
}

impl OvcParty {
    pub fn new(channel: Arc<dyn SecureChannel>) -> Self {
        OvcParty { channel }
    }

    /// Round 0 output of one OVC: its channel key and its signed share for
    /// the platform.
    pub fn contribute(&self, state: &OvcPartyState) -> Outcome<OvcContribution> {
        let share = CrossShare::seal(
            self.channel.as_ref(),
            &state.own,
            Party::Platform,
            &state.platform_channel_key,
            Some(&state.channel_keypair),
        )?;
        Ok(OvcContribution {
            gpg_pub_key: state.channel_keypair.public_key.clone(),
            ovc_to_bitgo_share: OvcToPlatformShare::from_cross_share(&share)?,
        })
    }

    /// Imports the platform's answer and builds this OVC's signing material.
    #[tracing::instrument(skip_all, fields(role = %state.role))]
    pub fn complete(&self, state: &OvcPartyState, envelope: &OvcEnvelope) -> Outcome<SigningMaterial> {
        assert_throw!(
            envelope.state == STATE_PLATFORM_SHARES,
            KeychainError::StateMismatch {
                expected: STATE_PLATFORM_SHARES,
                found: envelope.state,
            }
        );
        envelope.validate()?;
        let platform = envelope
            .platform
            .as_ref()
            .ok_or_else(|| KeychainError::Schema("envelope has no platform section".to_owned()))?;

        let party = state.role.party();
        let own_contribution = envelope
            .ovc
            .get(party)
            .ok_or_else(|| KeychainError::Schema(format!("no OVC-{} contribution", party.index())))?;
        assert_throw!(
            own_contribution.gpg_pub_key == state.channel_keypair.public_key,
            KeychainError::ChannelMismatch(format!(
                "envelope was not produced with this {} OVC's channel key",
                state.role
            ))
        );

        let channel = self.channel.as_ref();
        let to_user = platform.ovc.user.bitgo_to_ovc_share.to_cross_share(Party::User)?;
        let to_backup = platform.ovc.backup.bitgo_to_ovc_share.to_cross_share(Party::Backup)?;
        SignatureBundle {
            user_channel: &envelope.ovc.user.gpg_pub_key,
            backup_channel: &envelope.ovc.backup.gpg_pub_key,
            common_keychain: &platform.common_keychain,
            to_user: &to_user,
            to_backup: &to_backup,
        }
        .verify(
            channel,
            Some(&platform.wallet_hsm_gpg_public_key_sigs),
            &state.platform_channel_key,
        )?;

        let platform_share = match party {
            Party::Backup => to_backup,
            _ => to_user,
        };

        let material = build_signing_material(
            channel,
            BuildInput {
                role: state.role,
                own: &state.own,
                counterpart: &state.counterpart,
                platform_share: &platform_share,
                channel_keypair: &state.channel_keypair,
                common_keychain: &platform.common_keychain,
            },
        )?;
        tracing::info!("signing material built");
        Ok(material)
    }
}

/// Packages both OVC contributions into a round 0 envelope.
pub fn assemble_round_zero(
    coin: &str,
    user: OvcContribution,
    backup: OvcContribution,
) -> Outcome<OvcEnvelope> {
    let envelope = OvcEnvelope {
        state: STATE_OVC_SHARES,
        coin: coin.to_owned(),
        ovc: OvcContributions { user, backup },
        platform: None,
    };
    envelope.validate()?;
    Ok(envelope)
}
