//! `delegated-fs`: operator commands for a delegated storage node.
//!
//! Local commands (`nonce`, `get`, `hashes`, `stats`) only read the `SQLite`
//! index. `snapshot` and `recover` also talk to the pinning service, and
//! `issue` signs a delegation certificate with the authorization service key.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand};
use delegated_fs_core::{
    canonicalize_address, snapshot_len, DelegatedFs, DelegatedFsOptions, DelegationOutcome,
    EngineConfig, LocalIndex, PinataStore, PinningConfig, SqliteIndex, AUTH_SERVICE_ADDRESS_ENV,
    DEFAULT_MAX_DATA_LENGTH, MAX_DATA_LENGTH_ENV, VERIFY_ON_RECOVER_ENV,
};
use eyre::{eyre, WrapErr};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "delegated-fs", version, about = "Delegated storage engine operator CLI")]
struct Cli {
    /// Path of the `SQLite` local index.
    #[arg(long, env = "DELEGATED_FS_DB", default_value = "delegated-fs.sqlite")]
    db: PathBuf,

    /// Address of the trusted authorization service.
    #[arg(long, env = AUTH_SERVICE_ADDRESS_ENV)]
    auth_service_address: Option<String>,

    /// Payload ceiling applied by the engine.
    #[arg(long, env = MAX_DATA_LENGTH_ENV, default_value_t = DEFAULT_MAX_DATA_LENGTH)]
    max_data_length: usize,

    /// Whether `recover` re-checks every record's delegation chain.
    #[arg(
        long,
        env = VERIFY_ON_RECOVER_ENV,
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    verify_on_recover: bool,

    /// Gateway blobs are downloaded from.
    #[arg(long, env = "IPFS_URL")]
    gateway_url: Option<String>,

    /// Pinning API base URL.
    #[arg(long, env = "PINATA_API_URL")]
    pinata_api_url: Option<String>,

    /// Pinning API token.
    #[arg(long, env = "PINATA_JWT", hide_env_values = true)]
    pinata_jwt: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload the current index as a root snapshot and print its hash.
    Snapshot,
    /// Rebuild the local index from a root snapshot.
    Recover {
        /// Root hash printed by `snapshot`.
        root: String,
        /// Accept recovered records without re-checking their delegation,
        /// overriding `--verify-on-recover`.
        #[arg(long)]
        skip_verify: bool,
    },
    /// Print the stored nonce for a pair, -1 if none.
    Nonce { user: String, app: String },
    /// Print the stored record for a pair.
    Get { user: String, app: String },
    /// Print the `user -> app -> hash` mapping.
    Hashes,
    /// Sign a delegation certificate with the authorization service key.
    Issue {
        user: String,
        delegated: String,
        app: String,
        /// Issue a failure notice with this tag instead of a grant.
        #[arg(long)]
        error: Option<String>,
        /// Hex private key of the authorization service.
        #[arg(long, env = "DELEGATED_FS_SIGNER_KEY", hide_env_values = true)]
        signer_key: String,
    },
    /// Print record counts.
    Stats,
}

impl Cli {
    fn options(&self) -> DelegatedFsOptions {
        DelegatedFsOptions {
            max_data_length: self.max_data_length,
            verify_on_recover: self.verify_on_recover,
        }
    }

    fn engine_config(&self) -> eyre::Result<EngineConfig> {
        let address = self
            .auth_service_address
            .as_deref()
            .ok_or_else(|| eyre!("--auth-service-address (DELEGATED_FS_AUTH_SERVICE_ADDRESS) is required"))?;
        Ok(EngineConfig {
            trusted_auth_service_address: canonicalize_address(address)?,
            options: self.options(),
        })
    }

    fn pinning_config(&self) -> eyre::Result<PinningConfig> {
        let gateway_url = self
            .gateway_url
            .clone()
            .ok_or_else(|| eyre!("--gateway-url (IPFS_URL) is required"))?;
        let jwt = self
            .pinata_jwt
            .clone()
            .ok_or_else(|| eyre!("--pinata-jwt (PINATA_JWT) is required"))?;
        let mut config = PinningConfig::new(gateway_url, jwt);
        if let Some(api_url) = &self.pinata_api_url {
            config = config.with_api_url(api_url.clone());
        }
        Ok(config)
    }

    fn engine(&self, index: Arc<SqliteIndex>) -> eyre::Result<DelegatedFs> {
        let store = Arc::new(PinataStore::new(self.pinning_config()?));
        Ok(DelegatedFs::new(&self.engine_config()?, index, store))
    }
}

fn open_index(path: &Path) -> eyre::Result<Arc<SqliteIndex>> {
    let index = SqliteIndex::open(path)
        .wrap_err_with(|| format!("failed to open index at {}", path.display()))?;
    Ok(Arc::new(index))
}

fn init_tracing() -> eyre::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

async fn run(cli: &Cli) -> eyre::Result<String> {
    match &cli.command {
        Command::Snapshot => {
            let engine = cli.engine(open_index(&cli.db)?)?;
            Ok(engine.upload_root_snapshot().await?)
        }
        Command::Recover { root, skip_verify } => {
            let engine = cli.engine(open_index(&cli.db)?)?;
            let restored = if *skip_verify {
                engine.recover_from_root_with(root, false).await?
            } else {
                engine.recover_from_root(root).await?
            };
            Ok(format!("recovered {restored} records"))
        }
        Command::Nonce { user, app } => {
            let index = open_index(&cli.db)?;
            let nonce = index
                .get_nonce(&canonicalize_address(user)?, &canonicalize_address(app)?)
                .await?;
            Ok(nonce.to_string())
        }
        Command::Get { user, app } => {
            let index = open_index(&cli.db)?;
            let record = index
                .get_record(&canonicalize_address(user)?, &canonicalize_address(app)?)
                .await?;
            Ok(serde_json::to_string_pretty(&record)?)
        }
        Command::Hashes => {
            let index = open_index(&cli.db)?;
            Ok(serde_json::to_string_pretty(&index.list_all_hashes().await?)?)
        }
        Command::Issue {
            user,
            delegated,
            app,
            error,
            signer_key,
        } => {
            let signer: PrivateKeySigner = signer_key
                .trim()
                .parse()
                .wrap_err("invalid authorization service key")?;
            tracing::info!("issuing as {}", signer.address());
            let outcome = error
                .clone()
                .map_or(DelegationOutcome::Success, DelegationOutcome::Failure);
            let signature =
                DelegatedFs::issue_delegation_signature(user, delegated, app, &signer, outcome)
                    .await?;
            Ok(signature.to_string())
        }
        Command::Stats => {
            let index = open_index(&cli.db)?;
            let hashes = index.list_all_hashes().await?;
            Ok(serde_json::json!({
                "records": index.record_count()?,
                "users": hashes.len(),
                "pairs": snapshot_len(&hashes),
            })
            .to_string())
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    let output = run(&cli).await?;
    println!("{output}");
    Ok(())
}
