//! Offline-vault (OVC) reconciliation.
//!
//! The same ceremony as [`crate::ceremony`], carried across air-gapped rounds
//! in a JSON envelope. OVC-1 holds the user key and OVC-2 the backup key.
//!
//! | state | produced by | contents                                              |
//! |-------|-------------|-------------------------------------------------------|
//! | 0     | both OVCs   | channel keys and the two OVC-to-platform shares       |
//! | 1     | platform    | the above plus `platform`: common keychain, signature |
//! |       |             | bundle and the two platform-to-OVC shares             |
//!
//! Each step returns a new envelope and leaves its input untouched.

mod envelope;
mod party;
mod platform;

pub use envelope::*;
pub use party::*;
pub use platform::*;

/// State of an envelope carrying both OVC contributions.
pub const STATE_OVC_SHARES: u32 = 0;
/// State of an envelope the platform has answered.
pub const STATE_PLATFORM_SHARES: u32 = 1;
