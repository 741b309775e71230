use crate::{channel::ChannelPublicKey, exception::*, keychain::CrossShare, party::Party};
use serde::{Deserialize, Serialize};

/// The hand-carried document. Parsing is strict: unknown or missing fields
/// are rejected.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OvcEnvelope {
    pub state: u32,
    pub coin: String,
    pub ovc: OvcContributions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<PlatformSection>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OvcContributions {
    #[serde(rename = "1")]
    pub user: OvcContribution,
    #[serde(rename = "2")]
    pub backup: OvcContribution,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OvcContribution {
    /// The OVC's channel public key.
    pub gpg_pub_key: ChannelPublicKey,
    pub ovc_to_bitgo_share: OvcToPlatformShare,
}

/// An OVC-to-platform share. `i` is the recipient index, `j` the sender's.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OvcToPlatformShare {
    pub i: u8,
    pub j: u8,
    pub public_share: String,
    pub private_share: String,
    pub u_sig: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlatformSection {
    pub common_keychain: String,
    #[serde(rename = "walletHSMGPGPublicKeySigs")]
    pub wallet_hsm_gpg_public_key_sigs: String,
    pub ovc: PlatformShares,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformShares {
    #[serde(rename = "1")]
    pub user: PlatformToOvc,
    #[serde(rename = "2")]
    pub backup: PlatformToOvc,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlatformToOvc {
    pub bitgo_to_ovc_share: PlatformToOvcShare,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PlatformToOvcShare {
    pub i: u8,
    pub j: u8,
    pub public_share: String,
    pub private_share: String,
}

fn check_indices(what: &str, i: u8, j: u8, to: Party, from: Party) -> Outcome<()> {
    assert_throw!(
        i == to.index() && j == from.index(),
        KeychainError::Schema(format!(
            "{what} has i={i}, j={j}, expected i={}, j={}",
            to.index(),
            from.index()
        ))
    );
    Ok(())
}

impl OvcToPlatformShare {
    pub fn from_cross_share(share: &CrossShare) -> Outcome<Self> {
        let u_sig = share.private_share_proof.clone().ok_or_else(|| {
            KeychainError::MissingShare(format!("{} to {} share carries no proof", share.from, share.to))
        })?;
        Ok(OvcToPlatformShare {
            i: share.to.index(),
            j: share.from.index(),
            public_share: share.public_share.clone(),
            private_share: share.private_share.clone(),
            u_sig,
        })
    }

    pub fn to_cross_share(&self, from: Party) -> Outcome<CrossShare> {
        check_indices("ovcToBitgoShare", self.i, self.j, Party::Platform, from)?;
        Ok(CrossShare {
            from,
            to: Party::Platform,
            public_share: self.public_share.clone(),
            private_share: self.private_share.clone(),
            private_share_proof: Some(self.u_sig.clone()),
        })
    }
}

impl PlatformToOvcShare {
    pub fn from_cross_share(share: &CrossShare) -> Self {
        PlatformToOvcShare {
            i: share.to.index(),
            j: share.from.index(),
            public_share: share.public_share.clone(),
            private_share: share.private_share.clone(),
        }
    }

    pub fn to_cross_share(&self, to: Party) -> Outcome<CrossShare> {
        check_indices("bitgoToOvcShare", self.i, self.j, to, Party::Platform)?;
        Ok(CrossShare {
            from: Party::Platform,
            to,
            public_share: self.public_share.clone(),
            private_share: self.private_share.clone(),
            private_share_proof: None,
        })
    }
}

impl OvcContributions {
    pub fn get(&self, party: Party) -> Option<&OvcContribution> {
        match party {
            Party::User => Some(&self.user),
            Party::Backup => Some(&self.backup),
            Party::Platform => None,
        }
    }
}

impl PlatformShares {
    pub fn get(&self, party: Party) -> Option<&PlatformToOvcShare> {
        match party {
            Party::User => Some(&self.user.bitgo_to_ovc_share),
            Party::Backup => Some(&self.backup.bitgo_to_ovc_share),
            Party::Platform => None,
        }
    }
}

impl OvcEnvelope {
    /// Parses and validates an envelope. Any structural problem is a
    /// [`KeychainError::Schema`].
    pub fn from_json(json: &str) -> Outcome<OvcEnvelope> {
        let envelope: OvcEnvelope =
            serde_json::from_str(json).map_err(|err| KeychainError::Schema(err.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    pub fn to_json(&self) -> Outcome<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks what serde cannot: a coin is named and every share is
    /// addressed between the parties its position implies.
    pub fn validate(&self) -> Outcome<()> {
        assert_throw!(
            !self.coin.trim().is_empty(),
            KeychainError::Schema("no coin set".to_owned())
        );
        for party in [Party::User, Party::Backup] {
            if let Some(contribution) = self.ovc.get(party) {
                let share = &contribution.ovc_to_bitgo_share;
                check_indices("ovcToBitgoShare", share.i, share.j, Party::Platform, party)?;
                assert_throw!(
                    !contribution.gpg_pub_key.as_str().is_empty(),
                    KeychainError::Schema(format!("gpgPubKey of OVC-{} is missing", party.index()))
                );
            }
            if let Some(share) = self.platform.as_ref().and_then(|p| p.ovc.get(party)) {
                check_indices("bitgoToOvcShare", share.i, share.j, party, Party::Platform)?;
            }
        }
        Ok(())
    }
}
