//! Assembly of a participant's signing material.
//!
//! A participant holds its own [`KeyShare`], the public part of its
//! counterpart's share with the one sub-share addressed to it, and the
//! cross-share the platform wrapped for it. From these it recomputes the
//! common keychain itself and refuses to produce material unless the result
//! matches what the platform published byte for byte.

use crate::{
    channel::{ChannelKeypair, SecureChannel},
    exception::*,
    keychain::{CrossShare, SigningMaterial, SigningShare},
    party::{Party, Recipient, Role},
    primitive::{common_keychain, CounterpartShare, KeyShare},
};

pub struct BuildInput<'a> {
    pub role: Role,
    pub own: &'a KeyShare,
    pub counterpart: &'a CounterpartShare,
    /// The platform-to-`role` cross-share.
    pub platform_share: &'a CrossShare,
    pub channel_keypair: &'a ChannelKeypair,
    /// The platform-published common keychain.
    pub common_keychain: &'a str,
}

pub fn build_signing_material(
    channel: &dyn SecureChannel,
    input: BuildInput<'_>,
) -> Outcome<SigningMaterial> {
    let BuildInput {
        role,
        own,
        counterpart,
        platform_share,
        channel_keypair,
        common_keychain: published,
    } = input;

    assert_throw!(
        own.owner == role.party(),
        KeychainError::MissingShare(format!("{role} cannot build from the {} share", own.owner))
    );
    counterpart.ensure_for(role)?;
    assert_throw!(
        platform_share.from == Party::Platform && platform_share.to == role.party(),
        KeychainError::MissingShare(format!(
            "expected the bitgo to {role} share, got {} to {}",
            platform_share.from, platform_share.to
        ))
    );
    platform_share.validate()?;

    let opened = platform_share
        .open(channel, channel_keypair)
        .map_err(KeychainError::into_channel_mismatch)?;
    let platform_pub = platform_share.public_component()?;

    let recomputed = common_keychain(
        [
            own.public_component.as_str(),
            counterpart.public_component.as_str(),
            platform_pub,
        ],
        [
            own.chain_code.as_str(),
            counterpart.chain_code.as_str(),
            opened.chain_code.as_str(),
        ],
    )?;
    assert_throw!(
        recomputed == published,
        KeychainError::KeychainIntegrity(format!(
            "{role} recomputed common keychain {recomputed}, platform published {published}"
        ))
    );
    // Only the platform share is cross-checked against its outer chain code.
    assert_throw!(
        opened.chain_code == platform_share.chain_code()?,
        KeychainError::KeychainIntegrity(format!(
            "bitgo to {role} share embeds a chain code that differs from its public share"
        ))
    );

    let own_share = SigningShare {
        public: own.public_component.clone(),
        private: own.sub_share(Recipient::Own).clone(),
        chain_code: own.chain_code.clone(),
        seed: own.seed.clone(),
    };
    let counterpart_share = SigningShare {
        public: counterpart.public_component.clone(),
        private: counterpart.sub_share.clone(),
        chain_code: counterpart.chain_code.clone(),
        seed: None,
    };
    let platform_signing_share = SigningShare {
        public: platform_pub.to_owned(),
        private: opened.sub_share,
        chain_code: opened.chain_code,
        seed: None,
    };

    let (user_share, backup_share) = match role {
        Role::User => (own_share, counterpart_share),
        Role::Backup => (counterpart_share, own_share),
    };
    Ok(SigningMaterial {
        user_share,
        backup_share,
        platform_share: platform_signing_share,
    })
}
