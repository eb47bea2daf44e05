use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use transfer_engine::Engine;
use transfer_engine::csv::{CsvError, read_accounts, read_transfers, write_accounts, write_logs};
use transfer_engine::store::AccountStore;

#[derive(Parser, Debug)]
#[command(author, version, about = "Apply a batch of idempotent transfers to a set of accounts")]
struct Args {
    /// Opening accounts: id,holder,balance,status
    #[arg(long)]
    accounts: PathBuf,

    /// Transfer requests: from,to,amount,key,remarks
    #[arg(long)]
    transfers: PathBuf,

    /// What to print once all transfers are applied
    #[arg(long, value_enum, default_value_t = Output::Accounts)]
    output: Output,

    /// Print the ledger history of one account instead, newest first
    #[arg(long, conflicts_with = "output")]
    history: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Output {
    Accounts,
    Ledger,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), CsvError> {
    let engine = Engine::default();

    for result in read_accounts(&args.accounts)? {
        match result {
            Ok(account) => {
                if let Err(e) = engine.ledger().create(account) {
                    warn!("{e}");
                }
            }
            Err(e) => warn!("{e}"),
        }
    }

    let transfers = read_transfers(&args.transfers)?;
    let (tx_sender, tx_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in transfers {
            match result {
                Ok(request) => {
                    if tx_sender.send(request).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("{e}"),
            }
        }
    });

    let summary = engine.run(ReceiverStream::new(tx_receiver)).await;
    info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        rejected = summary.rejected,
        "batch complete"
    );

    let stdout = io::stdout();
    match (args.history, args.output) {
        (Some(account), _) => {
            let history = engine.history(&account).unwrap_or_else(|e| {
                warn!("{e}");
                Vec::new()
            });
            write_logs(stdout.lock(), &history)
        }
        (None, Output::Accounts) => write_accounts(stdout.lock(), &engine.ledger().accounts()),
        (None, Output::Ledger) => write_logs(stdout.lock(), &engine.ledger().logs()),
    }
}
