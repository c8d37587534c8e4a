//! `weaverd` CLI: operate a file-backed Weaver slot store as an authorized caller.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use weaver_core::{FileJournal, Gatekeeper, SlotStore, StoreError, SystemClock};
use weaver_spec::{CallerId, SlotKey, SlotValue, Status, KEY_BYTES, VALUE_BYTES};

use crate::config::WeaverConfig;

/// Weaver command line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase output verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// JSON configuration file.
    #[arg(long, env = "WEAVER_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,
    /// Journal file holding the slot image.
    #[arg(long, env = "WEAVER_STATE", value_name = "PATH")]
    state: Option<PathBuf>,
    /// Hex identity allowed to use the store.
    #[arg(long, env = "WEAVER_AUTHORIZED_CALLER", value_name = "HEX")]
    authorized_caller: Option<String>,
    /// Hex identity of the invoking client.
    #[arg(long, env = "WEAVER_CALLER", value_name = "HEX")]
    caller: String,
    /// Subcommand.
    #[command(subcommand)]
    command: Commands,
}

/// Store operations.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Print slot geometry.
    Info,
    /// Store a key and value in a slot, clearing its lockout.
    Write {
        /// Slot id.
        #[arg(short, long)]
        slot: u32,
        /// Key as hex.
        #[arg(short, long)]
        key: String,
        /// Value as hex.
        #[arg(long)]
        value: String,
    },
    /// Read a slot with a key.
    Read {
        /// Slot id.
        #[arg(short, long)]
        slot: u32,
        /// Key as hex.
        #[arg(short, long)]
        key: String,
    },
    /// Show a slot's failure count and remaining backoff.
    Status {
        /// Slot id.
        #[arg(short, long)]
        slot: u32,
    },
    /// Clear only a slot's value.
    EraseValue {
        /// Slot id.
        #[arg(short, long)]
        slot: u32,
    },
    /// Reset one slot.
    Erase {
        /// Slot id.
        #[arg(short, long)]
        slot: u32,
    },
    /// Reset every slot.
    EraseAll,
}

#[derive(Serialize)]
struct InfoReport {
    slot_count: usize,
    key_bytes: usize,
    value_bytes: usize,
}

#[derive(Serialize)]
struct ReadReport {
    slot: u32,
    #[serde(flatten)]
    status: Status,
    code: u8,
    payload: String,
}

#[derive(Serialize)]
struct SlotReport {
    slot: u32,
    failure_count: u32,
    remaining_backoff: u32,
}

#[derive(Serialize)]
struct OkReport<'a> {
    op: &'a str,
    #[serde(flatten)]
    status: Status,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let file_config = match &cli.config {
        Some(path) => WeaverConfig::load(path)?,
        None => WeaverConfig::default(),
    };
    let settings = file_config.resolve(cli.state.clone(), cli.authorized_caller.clone())?;
    let caller =
        CallerId::from_hex(&cli.caller).map_err(|e| anyhow!("--caller: {e}"))?;

    let store = SlotStore::open(
        FileJournal::new(&settings.state_path),
        Arc::new(SystemClock),
    )
    .with_context(|| format!("open store {}", settings.state_path.display()))?;
    let gate = Gatekeeper::new(Arc::new(store), settings.authorized);
    let store = gate
        .acquire(&caller)
        .ok_or_else(|| anyhow!("caller {caller} is not authorized for this store"))?;

    run(&store, cli.command)
}

fn run(store: &SlotStore, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Info => print_json(&InfoReport {
            slot_count: store.slot_count(),
            key_bytes: KEY_BYTES,
            value_bytes: VALUE_BYTES,
        }),
        Commands::Write { slot, key, value } => {
            let key = parse_key(&key)?;
            let value = SlotValue::from_hex(&value)
                .map_err(|e| anyhow!("value must be {VALUE_BYTES} hex bytes: {e}"))?;
            store.write(slot, &key, &value).map_err(store_error)?;
            info!(slot, "slot written");
            print_json(&OkReport {
                op: "write",
                status: Status::Success,
            })
        }
        Commands::Read { slot, key } => {
            let key = parse_key(&key)?;
            let outcome = store.read(slot, &key).map_err(store_error)?;
            let status = outcome.to_status();
            print_json(&ReadReport {
                slot,
                status,
                code: status.code(),
                payload: hex::encode(outcome.payload()),
            })
        }
        Commands::Status { slot } => print_json(&SlotReport {
            slot,
            failure_count: store.failure_count(slot).map_err(store_error)?,
            remaining_backoff: store.remaining_backoff(slot).map_err(store_error)?,
        }),
        Commands::EraseValue { slot } => {
            store.erase_value(slot).map_err(store_error)?;
            print_json(&OkReport {
                op: "erase_value",
                status: Status::Success,
            })
        }
        Commands::Erase { slot } => {
            store.erase(slot).map_err(store_error)?;
            print_json(&OkReport {
                op: "erase",
                status: Status::Success,
            })
        }
        Commands::EraseAll => {
            store.erase_all().map_err(store_error)?;
            info!("all slots erased");
            print_json(&OkReport {
                op: "erase_all",
                status: Status::Success,
            })
        }
    }
}

fn parse_key(hex_key: &str) -> anyhow::Result<SlotKey> {
    SlotKey::from_hex(hex_key).map_err(|e| anyhow!("key must be {KEY_BYTES} hex bytes: {e}"))
}

fn store_error(err: StoreError) -> anyhow::Error {
    match err.status() {
        Some(status) => anyhow!("{err} (status code {:#04x})", status.code()),
        None => anyhow::Error::new(err),
    }
}

fn print_json<T: Serialize>(report: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(report)?);
    Ok(())
}
