//! GNOT balance lookup CLI
//!
//! Usage:
//!   gnot-lookup --dataset-url https://example.com/airdrop.json query g1...
//!   gnot-lookup --mode persistent --data-dir ./data sync
//!   gnot-lookup resync
//!   gnot-lookup status
//!
//! Ctrl-C during an import stops it after the batch in flight.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lookup_client::{
    channel_sink, BalanceStore, CoordinatorBuilder, LoadCoordinator, LoadEvent, LoadState,
    LookupError, PersistentStore, Phase, QueryOutcome,
};
use lookup_core::constants::DISPLAY_DENOM;
use lookup_core::{format_amount, is_valid_address, LookupConfig, StorageMode};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gnot-lookup")]
#[command(about = "Look up GNOT airdrop balances")]
struct Args {
    /// JSON config file; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage mode: memory or persistent
    #[arg(long, global = true)]
    mode: Option<StorageMode>,

    /// Dataset URL or local path
    #[arg(long, global = true, env = "GNOT_DATASET_URL")]
    dataset_url: Option<String>,

    /// Directory of the persistent store
    #[arg(long, global = true, env = "GNOT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Records per import transaction
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Expected dataset version tag
    #[arg(long, global = true)]
    dataset_version: Option<String>,

    /// Print events and results as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up one or more addresses
    Query {
        #[arg(required = true)]
        addresses: Vec<String>,
    },
    /// Load the dataset, reusing local data when its version matches
    Sync,
    /// Discard local data and import from scratch
    Resync,
    /// Show what the persistent store holds
    Status,
}

impl Args {
    fn lookup_config(&self) -> anyhow::Result<LookupConfig> {
        let mut config = match &self.config {
            Some(path) => LookupConfig::load(path)
                .with_context(|| format!("failed to read config {}", path.display()))?,
            None => LookupConfig::default(),
        };

        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(url) = &self.dataset_url {
            config.dataset_url = url.clone();
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(version) = &self.dataset_version {
            config.dataset_version = version.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.lookup_config()?;

    match args.command {
        Command::Status => status(&config),
        Command::Query { addresses } => {
            let (coordinator, mut events) = start(config)?;
            coordinator.initialize()?;
            query_all(&coordinator, &mut events, &addresses, args.json).await?;
            coordinator.wait().await;
            Ok(())
        }
        Command::Sync => {
            let (coordinator, mut events) = start(config)?;
            coordinator.initialize()?;
            follow_load(&mut events, args.json).await?;
            coordinator.wait().await;
            Ok(())
        }
        Command::Resync => {
            let (coordinator, mut events) = start(config)?;
            coordinator.resync().await?;
            follow_load(&mut events, args.json).await?;
            coordinator.wait().await;
            Ok(())
        }
    }
}

/// Build the coordinator and route Ctrl-C to `stop`
fn start(config: LookupConfig) -> anyhow::Result<(LoadCoordinator, UnboundedReceiver<LoadEvent>)> {
    let (sink, events) = channel_sink();
    let coordinator = CoordinatorBuilder::new(config).sink(sink).build()?;

    let stopper = coordinator.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && stopper.stop() {
            tracing::warn!("Interrupted, stopping after the current batch");
        }
    });

    Ok((coordinator, events))
}

fn status(config: &LookupConfig) -> anyhow::Result<()> {
    if config.mode == StorageMode::Memory {
        println!("Memory mode keeps nothing between runs");
        return Ok(());
    }

    let path = config.store_path();
    if !path.exists() {
        println!("No local store at {}", path.display());
        return Ok(());
    }

    let store = PersistentStore::open(&path)?;
    let version = store.stored_version()?;
    let count = store.len()?;
    println!("Store:    {}", path.display());
    println!(
        "Version:  {} (expected {})",
        version.as_deref().unwrap_or("none"),
        config.dataset_version
    );
    println!("Balances: {}", count);
    Ok(())
}

/// Render status events until the load reaches a terminal phase
async fn follow_load(events: &mut UnboundedReceiver<LoadEvent>, json: bool) -> anyhow::Result<()> {
    let pb = if json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(0)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40}] {pos}/{len} ({eta}) {msg}")?,
    );

    while let Some(event) = events.recv().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        }

        let LoadEvent::Status(status) = event else {
            continue;
        };
        match status.phase {
            Phase::Loading | Phase::Parsing => pb.set_message(status.message),
            Phase::Syncing => {
                pb.set_length(status.total);
                pb.set_position(status.processed);
                pb.set_message(status.message);
            }
            Phase::Complete => {
                pb.finish_with_message(status.message);
                return Ok(());
            }
            Phase::Stopped => {
                pb.abandon_with_message(status.message);
                return Ok(());
            }
            Phase::Error => {
                pb.abandon();
                bail!(status.message);
            }
        }
    }
    Ok(())
}

async fn query_all(
    coordinator: &LoadCoordinator,
    events: &mut UnboundedReceiver<LoadEvent>,
    addresses: &[String],
    json: bool,
) -> anyhow::Result<()> {
    let mut invalid = 0usize;

    for address in addresses {
        if !is_valid_address(address) {
            let err = LookupError::InvalidAddress(address.clone());
            tracing::warn!(code = err.code(), "{}", err);
            invalid += 1;
            continue;
        }

        let answer = match coordinator.query(address) {
            // The load already failed; surface its error event
            Err(LookupError::NotReady) => {
                follow_load(events, json).await?;
                bail!(LookupError::NotReady);
            }
            answer => answer?,
        };

        let outcome = match answer {
            QueryOutcome::NotFoundPending => {
                tracing::info!(%address, "Not loaded yet, waiting for the import");
                match await_resolution(events, address, json).await? {
                    Some(outcome) => outcome,
                    None => {
                        println!("{}: lookup interrupted", address);
                        continue;
                    }
                }
            }
            outcome => outcome,
        };
        print_outcome(address, outcome, json)?;
    }

    if matches!(coordinator.state(), LoadState::Loading { .. }) {
        tracing::info!("Waiting for the import to finish");
        follow_load(events, json).await?;
    }

    if invalid > 0 {
        bail!("{} invalid address(es)", invalid);
    }
    Ok(())
}

/// Wait for the pending query on `address`; `None` when the load stopped
async fn await_resolution(
    events: &mut UnboundedReceiver<LoadEvent>,
    address: &str,
    json: bool,
) -> anyhow::Result<Option<QueryOutcome>> {
    while let Some(event) = events.recv().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        }
        match event {
            LoadEvent::QueryResolved {
                address: resolved,
                outcome,
            } if resolved == address => return Ok(Some(outcome)),
            LoadEvent::Status(status) => match status.phase {
                Phase::Stopped => return Ok(None),
                Phase::Error => bail!(status.message),
                _ => tracing::debug!(
                    processed = status.processed,
                    total = status.total,
                    "{}",
                    status.message
                ),
            },
            LoadEvent::QueryResolved { .. } => {}
        }
    }
    Ok(None)
}

fn print_outcome(address: &str, outcome: QueryOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        let line = serde_json::json!({ "address": address, "outcome": outcome });
        println!("{}", line);
        return Ok(());
    }

    match outcome {
        QueryOutcome::Found(amount) => {
            println!("{}: {} {}", address, format_amount(amount), DISPLAY_DENOM)
        }
        QueryOutcome::NotFoundFinal => println!("{}: not in the airdrop", address),
        QueryOutcome::NotFoundPending => println!("{}: still loading", address),
    }
    Ok(())
}
