use billing_engine::application::engine::BillingEngine;
use billing_engine::config::{self, BillingConfig, ConfigOverrides};
use billing_engine::domain::clock;
use billing_engine::domain::ports::BillingStoreBox;
use billing_engine::error::Result as BillingResult;
use billing_engine::infrastructure::in_memory::InMemoryBillingStore;
use billing_engine::interfaces::csv::command_reader::{
    BillingCommand, CommandReader, CommandType,
};
use billing_engine::interfaces::csv::loan_writer::{self, LoanWriter};
use chrono::Utc;
use clap::Parser;
use hourglass_rs::{SafeTimeProvider, TimeSource};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input billing commands CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset (e.g. "debug")
    #[arg(long)]
    log_level: Option<String>,

    /// Consecutive missed installments that make a loan delinquent
    #[arg(long)]
    delinquency_threshold: Option<u32>,
}

fn init_tracing(config: &BillingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<&Path>) -> BillingResult<BillingStoreBox> {
    use billing_engine::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => Ok(Box::new(RocksDBStore::open(path)?)),
        None => Ok(Box::new(InMemoryBillingStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<&Path>) -> BillingResult<BillingStoreBox> {
    if db_path.is_some() {
        warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Box::new(InMemoryBillingStore::new()))
}

async fn apply(
    engine: &BillingEngine,
    time: &SafeTimeProvider,
    command: BillingCommand,
) -> BillingResult<()> {
    if let Some(day) = command.date {
        clock::move_to_day(time, day)?;
    }
    match command.r#type {
        CommandType::Create => {
            engine.create_loan(command.loan_request()).await?;
        }
        CommandType::Payment => {
            let receipt = engine
                .make_payment(&command.loan, command.payment_amount()?)
                .await?;
            debug!(
                loan_id = %command.loan,
                outstanding = %receipt.outstanding,
                delinquent = receipt.delinquent,
                "payment receipt"
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        log_level: cli.log_level,
        delinquency_threshold: cli.delinquency_threshold,
    };
    let config = config::build_config(cli.config.as_deref(), &overrides)?;
    init_tracing(&config);

    let store = open_store(cli.db_path.as_deref())?;
    // Replays run on a controllable clock that each row's date moves.
    let time = Arc::new(SafeTimeProvider::new(TimeSource::Test(Utc::now())));
    let engine = BillingEngine::with_clock(store, config, time.clone());

    // Process commands
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = CommandReader::new(file);
    for command in reader.commands() {
        match command {
            Ok(command) => {
                let loan = command.loan.clone();
                if let Err(e) = apply(&engine, &time, command).await {
                    warn!(loan_id = %loan, error = %e, "Error processing command");
                }
            }
            Err(e) => {
                warn!(error = %e, "Error reading command");
            }
        }
    }

    // Output final state
    let summaries = loan_writer::summarize(&engine).await?;
    let stdout = io::stdout();
    let mut writer = LoanWriter::new(stdout.lock());
    writer.write_summaries(summaries)?;

    Ok(())
}
