//! Threshold share generation and the aggregation law every party relies on.
//!
//! A [`KeyShare`] is one party's local output of key generation: its public
//! component, a chain code, an optional seed, and three secret sub-shares
//! (one per recipient). Two things must hold for any three shares of the same
//! ceremony:
//!
//! - [`aggregate_public`] and [`aggregate_chain_code`] are deterministic and
//!   independent of the order the shares are given in.
//! - Every party that performs the computation arrives at the same
//!   [`common_keychain`].

mod secp256k1;
pub use secp256k1::*;

use crate::{
    exception::*,
    party::{Party, Recipient, Role},
    secret::SecretHex,
    util::{array_from_hex, bytes_from_hex, is_hex_of_len},
};
use k256::{
    elliptic_curve::{group::Curve, sec1::ToEncodedPoint},
    ProjectivePoint, PublicKey,
};
use serde::{Deserialize, Serialize};

/// Compressed SEC1 point, hex encoded.
pub const PUBLIC_COMPONENT_HEX_LEN: usize = 66;
pub const CHAIN_CODE_HEX_LEN: usize = 64;
pub const SUB_SHARE_HEX_LEN: usize = 64;
pub const COMMON_KEYCHAIN_HEX_LEN: usize = PUBLIC_COMPONENT_HEX_LEN + CHAIN_CODE_HEX_LEN;

/// Source of fresh key shares.
pub trait ShareGenerator: Send + Sync {
    fn generate(&self, owner: Party) -> Outcome<KeyShare>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "KeyShareRecord")]
pub struct KeyShare {
    pub owner: Party,
    pub public_component: String,
    secret_sub_shares: [SecretHex; 3],
    pub chain_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<SecretHex>,
}

/// Wire form of a [`KeyShare`]; deserialization goes through
/// [`KeyShare::new`] so a stored share is checked like a fresh one.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyShareRecord {
    owner: Party,
    public_component: String,
    secret_sub_shares: [SecretHex; 3],
    chain_code: String,
    #[serde(default)]
    seed: Option<SecretHex>,
}

impl TryFrom<KeyShareRecord> for KeyShare {
    type Error = KeychainError;

    fn try_from(record: KeyShareRecord) -> Outcome<Self> {
        KeyShare::new(
            record.owner,
            record.public_component,
            record.secret_sub_shares,
            record.chain_code,
            record.seed,
        )
    }
}

impl KeyShare {
    /// `secret_sub_shares` must be laid out by [`Recipient::position`].
    pub fn new(
        owner: Party,
        public_component: String,
        secret_sub_shares: [SecretHex; 3],
        chain_code: String,
        seed: Option<SecretHex>,
    ) -> Outcome<Self> {
        assert_throw!(
            is_hex_of_len(&public_component, PUBLIC_COMPONENT_HEX_LEN),
            KeychainError::MissingShare(format!("{owner} share has no valid public component"))
        );
        assert_throw!(
            is_hex_of_len(&chain_code, CHAIN_CODE_HEX_LEN),
            KeychainError::MissingShare(format!("{owner} share has no valid chain code"))
        );
        for slot in Recipient::ALL {
            let sub_share = &secret_sub_shares[slot.position()];
            assert_throw!(
                is_hex_of_len(sub_share.expose(), SUB_SHARE_HEX_LEN),
                KeychainError::MissingShare(format!("{owner} share is missing its {slot:?} sub-share"))
            );
        }
        Ok(KeyShare {
            owner,
            public_component,
            secret_sub_shares,
            chain_code,
            seed,
        })
    }

    pub fn sub_share(&self, slot: Recipient) -> &SecretHex {
        &self.secret_sub_shares[slot.position()]
    }

    /// Sub-share addressed to `recipient`.
    pub fn sub_share_for(&self, recipient: Party) -> &SecretHex {
        self.sub_share(self.owner.recipient_slot(recipient))
    }

    /// What the counterpart of a participant may learn of this share: the
    /// public part and the one sub-share addressed to it.
    pub fn counterpart_view(&self) -> Outcome<CounterpartShare> {
        let counterpart = match self.owner {
            Party::User => Party::Backup,
            Party::Backup => Party::User,
            Party::Platform => {
                return Err(KeychainError::MissingShare(
                    "platform share has no participant counterpart".to_owned(),
                ))
            }
        };
        Ok(CounterpartShare {
            owner: self.owner,
            public_component: self.public_component.clone(),
            chain_code: self.chain_code.clone(),
            sub_share: self.sub_share_for(counterpart).clone(),
        })
    }
}

/// The public half of a counterpart's share plus the single sub-share it
/// addressed to us.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterpartShare {
    pub owner: Party,
    pub public_component: String,
    pub chain_code: String,
    pub sub_share: SecretHex,
}

impl CounterpartShare {
    /// Checks that this is the counterpart share meant for `role`.
    pub fn ensure_for(&self, role: Role) -> Outcome<()> {
        assert_throw!(
            self.owner == role.counterpart().party(),
            KeychainError::MissingShare(format!(
                "expected the {} share addressed to {role}, got the {} share",
                role.counterpart(),
                self.owner
            ))
        );
        assert_throw!(
            is_hex_of_len(self.sub_share.expose(), SUB_SHARE_HEX_LEN),
            KeychainError::MissingShare(format!("{} to {role} sub-share", self.owner))
        );
        Ok(())
    }
}

/// Sum of the given public components, as a compressed point.
pub fn aggregate_public(components: &[&str]) -> Outcome<String> {
    let mut sum = ProjectivePoint::IDENTITY;
    for component in components {
        sum += decode_point(component)?;
    }
    encode_point(&sum)
}

/// Sum of the given 32-byte big-endian chain codes, modulo 2^256.
pub fn aggregate_chain_code(chain_codes: &[&str]) -> Outcome<String> {
    let mut acc = [0u8; 32];
    for chain_code in chain_codes {
        let addend: [u8; 32] = array_from_hex("chain code", chain_code)?;
        let mut carry = 0u16;
        for (a, b) in acc.iter_mut().zip(addend.iter()).rev() {
            let sum = *a as u16 + *b as u16 + carry;
            *a = sum as u8;
            carry = sum >> 8;
        }
    }
    Ok(hex::encode(acc))
}

/// `aggregatePublic ‖ aggregateChainCode` over the three parties' shares.
pub fn common_keychain(public_components: [&str; 3], chain_codes: [&str; 3]) -> Outcome<String> {
    let public = aggregate_public(&public_components)?;
    let chain_code = aggregate_chain_code(&chain_codes)?;
    Ok(public + &chain_code)
}

pub(crate) fn decode_point(component: &str) -> Outcome<ProjectivePoint> {
    let bytes = bytes_from_hex("public component", component)?;
    let public_key = PublicKey::from_sec1_bytes(&bytes)
        .map_err(|_| KeychainError::Encoding(format!("not a curve point: {component}")))?;
    Ok(public_key.to_projective())
}

pub(crate) fn encode_point(point: &ProjectivePoint) -> Outcome<String> {
    let public_key = PublicKey::from_affine(point.to_affine())
        .map_err(|_| KeychainError::Encoding("point at infinity".to_owned()))?;
    Ok(hex::encode(public_key.to_encoded_point(true).as_bytes()))
}
