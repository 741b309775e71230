//! Structure of the configuration file.
//!
#![allow(non_snake_case)]

use serde::{Deserialize, Serialize};
use tss_keychain_sdk::passphrase::KdfParams;

#[derive(Serialize, Deserialize, Debug)]
pub struct KeychainPeerConfig {
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub platform: PlatformConfig,
    pub kdf: KdfConfig,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoggingConfig {
    pub Level: String,
    pub Dir: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StoreConfig {
    pub Dir: String,
}

#[derive(Serialize, Deserialize)]
pub struct PlatformConfig {
    pub Passphrase: String,
    #[serde(default)]
    pub Enterprise: Option<String>,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("Passphrase", &"[redacted]")
            .field("Enterprise", &self.Enterprise)
            .finish()
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct KdfConfig {
    pub MemoryKiB: u32,
    pub Iterations: u32,
    pub Parallelism: u32,
}

impl KdfConfig {
    pub fn params(&self) -> KdfParams {
        KdfParams {
            memory_kib: self.MemoryKiB,
            iterations: self.Iterations,
            parallelism: self.Parallelism,
        }
    }
}

pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_decodes() {
        let conf: KeychainPeerConfig =
            toml::from_str(include_str!("../keychain_peer.toml")).unwrap();
        assert!(LOG_LEVELS.contains(&conf.logging.Level.as_str()));
        assert_eq!(conf.kdf.params(), KdfParams::default());
        assert!(!format!("{:?}", conf.platform).contains(&conf.platform.Passphrase));
    }
}
