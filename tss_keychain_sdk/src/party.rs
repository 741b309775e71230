//! Ceremony participants and the positions their sub-shares occupy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three ceremony participants.
///
/// The platform is tagged `bitgo` on the wire, matching the keychain records
/// the custody platform already stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    User,
    Backup,
    #[serde(rename = "bitgo")]
    Platform,
}

impl Party {
    /// Evaluation index of the party in the 2-of-3 sharing (user 1, backup 2, platform 3).
    pub fn index(self) -> u8 {
        match self {
            Party::User => 1,
            Party::Backup => 2,
            Party::Platform => 3,
        }
    }

    pub fn from_index(index: u8) -> Option<Party> {
        match index {
            1 => Some(Party::User),
            2 => Some(Party::Backup),
            3 => Some(Party::Platform),
            _ => None,
        }
    }

    /// Slot that a sub-share addressed to `recipient` occupies in a share
    /// owned by `self`.
    ///
    /// For the participants this is the natural own/counterpart/platform
    /// layout. A platform-owned share keeps its own sub-share in `Own`, the
    /// user's in `Counterpart` and the backup's in the last slot.
    pub fn recipient_slot(self, recipient: Party) -> Recipient {
        match (self, recipient) {
            (owner, to) if owner == to => Recipient::Own,
            (Party::Platform, Party::User) => Recipient::Counterpart,
            (Party::Platform, _) => Recipient::Platform,
            (_, Party::Platform) => Recipient::Platform,
            _ => Recipient::Counterpart,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Party::User => "user",
            Party::Backup => "backup",
            Party::Platform => "bitgo",
        };
        f.write_str(name)
    }
}

/// Fixed position of a secret sub-share inside a [`KeyShare`](crate::KeyShare).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recipient {
    Own = 0,
    Counterpart = 1,
    Platform = 2,
}

impl Recipient {
    pub const ALL: [Recipient; 3] = [Recipient::Own, Recipient::Counterpart, Recipient::Platform];

    pub fn position(self) -> usize {
        self as usize
    }
}

/// Role of a non-platform participant; only these build signing material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Backup,
}

impl Role {
    pub fn party(self) -> Party {
        match self {
            Role::User => Party::User,
            Role::Backup => Party::Backup,
        }
    }

    pub fn counterpart(self) -> Role {
        match self {
            Role::User => Role::Backup,
            Role::Backup => Role::User,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.party().fmt(f)
    }
}
