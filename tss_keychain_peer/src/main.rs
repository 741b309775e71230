//! Operator tool around the keychain SDK: a live ceremony against an
//! in-process platform, and the offline-vault rounds over JSON files.

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tss_keychain_sdk::prelude::*;

mod config;
use config::{KeychainPeerConfig, LOG_LEVELS};
mod store;
use store::FileKeychainStore;

const CONF_PATH: &str = "keychain_peer.toml";
const PLATFORM_CHANNEL_FILE: &str = "bitgo_channel.sealed";
const ROUND_ZERO_FILE: &str = "round0.json";

#[derive(Parser)]
#[command(name = "keychain_peer", about = "Creates 2-of-3 TSS keychains")]
struct Cli {
    #[arg(long, default_value = CONF_PATH)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the live ceremony and writes the keychain triplet.
    Ceremony {
        #[arg(long)]
        passphrase: String,
        #[arg(long)]
        enterprise: Option<String>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Produces the round 0 envelope and the sealed state of both OVCs.
    OvcInit {
        #[arg(long)]
        coin: String,
        #[arg(long)]
        passphrase: String,
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Platform round: answers a round 0 envelope.
    OvcPlatform {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Imports the platform's answer into one OVC.
    OvcComplete {
        #[arg(long, value_enum)]
        role: RoleArg,
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        passphrase: String,
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    User,
    Backup,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::User => Role::User,
            RoleArg::Backup => Role::Backup,
        }
    }
}

fn init_tracer(dir: &str, level: &str) -> Result<WorkerGuard> {
    let appender = tracing_appender::rolling::daily(dir, "keychain_peer.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(level).context("Invalid log level")?)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let conf_str = tokio::fs::read_to_string(&cli.config).await.with_context(|| {
        format!(
            "`{}` not found. Originally, this file accompanies the executable.",
            cli.config.display()
        )
    })?;
    let conf: KeychainPeerConfig = toml::from_str(&conf_str).with_context(|| {
        format!(
            "Cannot decode `{}`. DO NOT rename or remove any field.",
            cli.config.display()
        )
    })?;
    ensure!(
        LOG_LEVELS.contains(&conf.logging.Level.as_str()),
        "Logging level must be one of {LOG_LEVELS:?}"
    );
    ensure!(!conf.platform.Passphrase.is_empty(), "Platform passphrase is empty");
    let _guard = init_tracer(&conf.logging.Dir, &conf.logging.Level)?;

    let peer = Peer::new(conf).await?;
    match cli.command {
        Command::Ceremony {
            passphrase,
            enterprise,
            out,
        } => peer.ceremony(passphrase, enterprise, &out).await,
        Command::OvcInit {
            coin,
            passphrase,
            out_dir,
        } => peer.ovc_init(&coin, &passphrase, &out_dir).await,
        Command::OvcPlatform { input, output } => peer.ovc_platform(&input, &output).await,
        Command::OvcComplete {
            role,
            state,
            input,
            passphrase,
            out,
        } => {
            peer.ovc_complete(role.into(), &state, &input, &passphrase, &out)
                .await
        }
    }
}

struct Peer {
    conf: KeychainPeerConfig,
    cipher: Arc<Argon2AesCipher>,
    channel: Arc<EciesChannel>,
    store: Arc<FileKeychainStore>,
}

impl Peer {
    async fn new(conf: KeychainPeerConfig) -> Result<Self> {
        let store = FileKeychainStore::open(&conf.store.Dir)
            .await
            .context("Cannot open keychain store")?;
        Ok(Peer {
            cipher: Arc::new(Argon2AesCipher::new(conf.kdf.params())),
            channel: Arc::new(EciesChannel),
            store: Arc::new(store),
            conf,
        })
    }

    /// The platform keeps one channel keypair across runs, sealed under its
    /// passphrase in the store directory.
    async fn platform_channel(&self) -> Result<ChannelKeypair> {
        let path = Path::new(&self.conf.store.Dir).join(PLATFORM_CHANNEL_FILE);
        let passphrase = &self.conf.platform.Passphrase;
        if path.exists() {
            let sealed = tokio::fs::read_to_string(&path).await?;
            let json = self
                .cipher
                .decrypt(&sealed, passphrase)
                .context("Cannot unseal the platform channel key")?;
            return Ok(serde_json::from_str(&json)?);
        }
        let keypair = self.channel.generate_channel_keypair(&Party::Platform.to_string())?;
        let sealed = self.cipher.encrypt(&serde_json::to_string(&keypair)?, passphrase)?;
        tokio::fs::write(&path, sealed).await?;
        tracing::info!(path = %path.display(), "platform channel key created");
        Ok(keypair)
    }

    async fn platform(&self) -> Result<PlatformAggregator> {
        Ok(PlatformAggregator::with_channel_keypair(
            self.platform_channel().await?,
            Arc::new(Secp256k1ShareGenerator),
            self.channel.clone(),
            self.cipher.clone(),
            self.store.clone(),
            &self.conf.platform.Passphrase,
        ))
    }

    async fn ceremony(&self, passphrase: String, enterprise: Option<String>, out: &Path) -> Result<()> {
        let ceremony = Ceremony::new(
            Arc::new(Secp256k1ShareGenerator),
            self.channel.clone(),
            self.cipher.clone(),
            Arc::new(self.platform().await?),
        );
        let triplet = ceremony
            .create_keychains(CreateKeychainsParams {
                passphrase,
                enterprise: enterprise.or_else(|| self.conf.platform.Enterprise.clone()),
                original_passcode_encryption_code: None,
            })
            .await?;
        tokio::fs::write(out, serde_json::to_string_pretty(&triplet)?).await?;
        println!("{}", triplet.bitgo_keychain.common_keychain());
        Ok(())
    }

    async fn ovc_init(&self, coin: &str, passphrase: &str, out_dir: &Path) -> Result<()> {
        let platform_key = self.platform_channel().await?.public_key;
        let (user, backup) =
            OvcPartyState::pair(&Secp256k1ShareGenerator, self.channel.as_ref(), &platform_key)?;
        let party = OvcParty::new(self.channel.clone());
        let envelope = assemble_round_zero(coin, party.contribute(&user)?, party.contribute(&backup)?)?;

        tokio::fs::create_dir_all(out_dir).await?;
        tokio::fs::write(out_dir.join(ROUND_ZERO_FILE), envelope.to_json()?).await?;
        for state in [&user, &backup] {
            let sealed = self.cipher.encrypt(&serde_json::to_string(state)?, passphrase)?;
            let name = format!("ovc{}.state", state.role.party().index());
            tokio::fs::write(out_dir.join(name), sealed).await?;
        }
        tracing::info!(coin, dir = %out_dir.display(), "round 0 written");
        Ok(())
    }

    async fn ovc_platform(&self, input: &Path, output: &Path) -> Result<()> {
        let envelope = OvcEnvelope::from_json(&tokio::fs::read_to_string(input).await?)?;
        let platform = self.platform().await?;
        let outcome = ingest_round_zero(&platform, &envelope).await?;
        tokio::fs::write(output, outcome.envelope.to_json()?).await?;
        println!("{}", outcome.platform_keychain_id);
        Ok(())
    }

    async fn ovc_complete(
        &self,
        role: Role,
        state: &Path,
        input: &Path,
        passphrase: &str,
        out: &Path,
    ) -> Result<()> {
        let sealed = tokio::fs::read_to_string(state).await?;
        let state: OvcPartyState = serde_json::from_str(&self.cipher.decrypt(&sealed, passphrase)?)?;
        ensure!(state.role == role, "State file belongs to the {} OVC", state.role);

        let envelope = OvcEnvelope::from_json(&tokio::fs::read_to_string(input).await?)?;
        let material = OvcParty::new(self.channel.clone()).complete(&state, &envelope)?;
        let sealed = self.cipher.encrypt(&material.to_json()?, passphrase)?;
        tokio::fs::write(out, sealed).await?;
        tracing::info!(%role, "signing material written");
        Ok(())
    }
}
