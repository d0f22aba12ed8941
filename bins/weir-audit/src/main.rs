//! weir-audit — consistency audits for the Weir state engine.
//!
//! Two run modes over a RocksDB chaindata directory: `state-stages`
//! churns the pipeline forward and back in bounded windows while
//! verifying the audit trail, and `check-changes` independently
//! replays finalized blocks against it. Both finish the in-flight
//! block on Ctrl+C and report the resumable position.
//!
//! The block source is the deterministic synthetic workload derived
//! from `--seed`/`--blocks`; run `check-changes` against a chaindata a
//! `state-stages` run populated with the same seed.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use weir_core::error::{StoreError, WeirError};
use weir_core::kv::KvBackend;
use weir_core::synthetic::SyntheticChain;
use weir_store::rocks::RocksKv;
use weir_verify::compare::compare_backends;
use weir_verify::{
    parse_byte_size, ReplayConfig, ReplayVerifier, SmallStepConfig, SmallStepSync,
};

/// Weir consistency-audit tool.
#[derive(Parser)]
#[command(name = "weir-audit", version, about = "Consistency audits for the Weir state engine")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move the state stages forward in bounded windows, unwinding at
    /// the stop block and verifying change sets and history indices on
    /// every window.
    StateStages(StateStagesArgs),
    /// Re-execute finalized blocks in read-only mode and check their
    /// outputs against the persisted change sets and receipt digests.
    CheckChanges(CheckChangesArgs),
}

#[derive(Args)]
struct SourceArgs {
    /// Chaindata directory.
    #[arg(long)]
    chaindata: PathBuf,

    /// Seed of the synthetic reference workload.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Number of blocks the synthetic source chain carries.
    #[arg(long, default_value_t = 1024)]
    blocks: u64,
}

#[derive(Args)]
struct StateStagesArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Stop block; 0 runs to the source head.
    #[arg(long, default_value_t = 0)]
    block: u64,

    /// Blocks to unwind at the stop boundary.
    #[arg(long, default_value_t = 0)]
    unwind: u64,

    /// Forward window size per iteration.
    #[arg(long, default_value_t = 1000)]
    unwind_every: u64,

    /// Transaction batch size, e.g. "512kb".
    #[arg(long, default_value = "8mb")]
    batch_size: String,

    /// Reference chaindata for a final whole-state comparison.
    #[arg(long)]
    reference_chaindata: Option<PathBuf>,

    /// Skip writing receipts.
    #[arg(long)]
    no_receipts: bool,
}

#[derive(Args)]
struct CheckChangesArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// First block to replay.
    #[arg(long, default_value_t = 1)]
    block: u64,

    /// Persist recomputed receipts.
    #[arg(long)]
    write_receipts: bool,

    /// Skip change-set comparison, digests only.
    #[arg(long)]
    no_check: bool,

    /// Receipt batch flush threshold, e.g. "4mb".
    #[arg(long, default_value = "4mb")]
    batch_size: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format);

    let interrupt = Arc::new(AtomicBool::new(false));
    spawn_interrupt_listener(interrupt.clone());

    let result = match cli.command {
        Commands::StateStages(args) => run_state_stages(args, interrupt).await,
        Commands::CheckChanges(args) => run_check_changes(args, interrupt).await,
    };

    if let Err(e) = result {
        error!("{e}");
        process::exit(1);
    }
}

/// Convert the termination signal into a cooperative cancellation flag
/// the oracles poll between blocks.
fn spawn_interrupt_listener(flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, finishing the current block...");
            flag.store(true, Ordering::Relaxed);
        }
    });
}

fn open_source(args: &SourceArgs) -> Result<(Arc<RocksKv>, Arc<SyntheticChain>), WeirError> {
    let backend = Arc::new(RocksKv::open(&args.chaindata)?);
    let chain = Arc::new(SyntheticChain::generate(args.seed, args.blocks)?);
    info!(
        chaindata = %args.chaindata.display(),
        seed = args.seed,
        blocks = args.blocks,
        "source opened"
    );
    Ok((backend, chain))
}

async fn run_state_stages(
    args: StateStagesArgs,
    interrupt: Arc<AtomicBool>,
) -> Result<(), WeirError> {
    let config = SmallStepConfig {
        stop_block: args.block,
        unwind_depth: args.unwind,
        unwind_every: args.unwind_every,
        batch_size: parse_byte_size(&args.batch_size)?,
        write_receipts: !args.no_receipts,
    };
    let (backend, chain) = open_source(&args.source)?;
    let reference = match &args.reference_chaindata {
        Some(path) => Some(Arc::new(RocksKv::open(path)?)),
        None => None,
    };
    let mut sync = SmallStepSync::new(chain, config, interrupt)?;

    run_blocking(move || {
        let outcome = sync.run(backend.clone() as Arc<dyn KvBackend>)?;
        if outcome.interrupted {
            info!(progress = outcome.progress, "interrupted; rerun to resume from here");
            return Ok(());
        }
        if let Some(reference) = reference {
            info!("comparing whole state against the reference chaindata");
            compare_backends(&*backend, &*reference)?;
            info!("reference comparison clean");
        }
        Ok(())
    })
    .await
}

async fn run_check_changes(
    args: CheckChangesArgs,
    interrupt: Arc<AtomicBool>,
) -> Result<(), WeirError> {
    let config = ReplayConfig {
        start_block: args.block,
        check_changes: !args.no_check,
        write_receipts: args.write_receipts,
        batch_size: parse_byte_size(&args.batch_size)?,
    };
    let (backend, chain) = open_source(&args.source)?;
    let verifier = ReplayVerifier::new(chain, config, interrupt);

    run_blocking(move || {
        let outcome = verifier.run(backend as Arc<dyn KvBackend>)?;
        if outcome.interrupted {
            info!(next_block = outcome.next_block, "interrupted; resume with --block");
        }
        Ok(())
    })
    .await
}

/// Run an oracle on the blocking pool; the async side only waits for
/// the signal listener and the result.
async fn run_blocking<F>(work: F) -> Result<(), WeirError>
where
    F: FnOnce() -> Result<(), WeirError> + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) => Err(StoreError::Backend(format!("audit worker failed: {e}")).into()),
    }
}

/// Initialize tracing subscriber with the given log level and output
/// format.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
