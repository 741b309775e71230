//! Threshold (2-of-3) keychain creation for a user device, a backup agent
//! and the custody platform.
//!
//! Every party independently recomputes the common keychain and refuses to
//! produce signing material unless it matches what the platform published.
//! The live flow is [`ceremony::Ceremony`]; the air-gapped flow is in [`ovc`].

#[macro_use]
pub mod exception;

pub mod aes;
pub mod aggregator;
pub mod builder;
pub mod ceremony;
pub mod channel;
pub mod keychain;
pub mod ovc;
pub mod party;
pub mod passphrase;
pub mod primitive;
pub mod secret;
pub mod store;
pub mod util;

pub use primitive::KeyShare;

pub mod prelude {
    pub use crate::aggregator::{PlatformAggregator, PlatformClient, PlatformKeychainRequest};
    pub use crate::ceremony::{Ceremony, CeremonyStage, CreateKeychainsParams};
    pub use crate::channel::{ChannelKeypair, ChannelPublicKey, EciesChannel, SecureChannel};
    pub use crate::exception::{KeychainError, Outcome};
    pub use crate::keychain::*;
    pub use crate::ovc::{
        assemble_round_zero, ingest_round_zero, OvcEnvelope, OvcIngestOutcome, OvcParty,
        OvcPartyState,
    };
    pub use crate::party::{Party, Role};
    pub use crate::passphrase::{Argon2AesCipher, KdfParams, PassphraseCipher};
    pub use crate::primitive::{KeyShare, Secp256k1ShareGenerator, ShareGenerator};
    pub use crate::store::{InMemoryKeychainStore, KeychainStore};
}
