//! Tournament CLI
//!
//! Runs the tournament service with a console transport: participant commands
//! are read from stdin, messages to participants are written to stdout.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use rps_core::{KeyValueStore, Participant, ParticipantId, Vault};
use rps_tournament::observability::init_tracing;
use rps_tournament::{
    leaderboard, Command, ConsoleNotifier, Dispatcher, PendingInvoice, RunSummary, Schedule,
    SimulatedWallet, TournamentConfig, TournamentEngine,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

fn print_usage() {
    println!("Rock-Paper-Scissors Tournament");
    println!();
    println!("Usage:");
    println!("  rps-tournament run [--config FILE] [--capacity N] [--round-time S]");
    println!("                     [--ticket-price P] [--db PATH] [--seed N] [--verbose]");
    println!("  rps-tournament leaderboard [--db PATH]");
    println!("  rps-tournament help");
    println!();
    println!("Console input while running:");
    println!("  <id> <command> [arg]  - command from participant <id>, e.g. `7 buyticket`");
    println!("  pay <reference>       - mark a simulated invoice as paid");
    println!("  launch                - start a tournament now");
}

struct RunArgs {
    config: TournamentConfig,
    verbose: bool,
}

fn parse_value<T: std::str::FromStr>(flag: &str, value: Option<&String>) -> Result<T> {
    let value = value.with_context(|| format!("{flag} needs a value"))?;
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid value for {flag}: {value}"))
}

fn parse_run_args(args: &[String]) -> Result<RunArgs> {
    let mut config = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).context("--config needs a value")?;
            TournamentConfig::load(Path::new(path))?
        }
        None => TournamentConfig::default(),
    };
    let mut verbose = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => i += 1,
            "--capacity" | "-c" => {
                config.capacity = parse_value(&args[i], args.get(i + 1))?;
                i += 1;
            }
            "--round-time" | "-r" => {
                config.round_time_secs = parse_value(&args[i], args.get(i + 1))?;
                i += 1;
            }
            "--ticket-price" | "-p" => {
                config.ticket_price = parse_value(&args[i], args.get(i + 1))?;
                i += 1;
            }
            "--db" => {
                config.db_path = parse_value::<PathBuf>(&args[i], args.get(i + 1))?;
                i += 1;
            }
            "--seed" => {
                config.seed = Some(parse_value(&args[i], args.get(i + 1))?);
                i += 1;
            }
            "--verbose" | "-v" => verbose = true,
            other => bail!("unknown option: {other}"),
        }
        i += 1;
    }

    config.validate()?;
    Ok(RunArgs { config, verbose })
}

fn db_path(args: &[String]) -> PathBuf {
    args.iter()
        .position(|a| a == "--db")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| TournamentConfig::default().db_path)
}

fn show_leaderboard(args: &[String]) -> Result<()> {
    let path = db_path(args).join("participants.json");
    let store: Vault<ParticipantId, Participant> =
        Vault::open(&path).with_context(|| format!("can't open {}", path.display()))?;
    let participants: Vec<Participant> = store.all()?.into_iter().map(|(_, p)| p).collect();
    let standings = leaderboard::rank(&participants);
    print!("{}", leaderboard::render(&standings, standings.len()));
    Ok(())
}

async fn run(args: RunArgs) -> Result<()> {
    let RunArgs { config, verbose } = args;
    init_tracing(verbose);

    let db = config.db_path.clone();
    let participants: Arc<Vault<ParticipantId, Participant>> =
        Arc::new(Vault::open(db.join("participants.json")).context("can't open participants")?);
    let flags: Arc<Vault<String, String>> =
        Arc::new(Vault::open(db.join("flags.json")).context("can't open flags")?);
    let invoices: Arc<Vault<ParticipantId, PendingInvoice>> =
        Arc::new(Vault::open(db.join("invoices.json")).context("can't open invoices")?);
    info!(db = %db.display(), participants = participants.all()?.len(), "database loaded");

    let notifier = Arc::new(ConsoleNotifier);
    let wallet = Arc::new(SimulatedWallet::new());
    let engine = Arc::new(
        TournamentEngine::new(
            config.clone(),
            participants.clone(),
            flags,
            notifier.clone(),
            wallet.clone(),
        )
        .with_report_path(db.join("last_run.json")),
    );
    let dispatcher = Arc::new(Dispatcher::new(
        participants,
        invoices,
        engine.clone(),
        notifier,
        wallet.clone(),
    ));

    dispatcher.resume_pending().await?;

    let restoring = engine.clone();
    tokio::spawn(async move {
        match restoring.restore().await {
            Ok(RunSummary::NothingToRestore) => {}
            Ok(summary) => info!(?summary, "interrupted tournament finished"),
            Err(e) => error!(%e, "can't restore tournament"),
        }
    });
    tokio::spawn(Schedule::new(config.schedule_period()).drive(engine.clone()));

    info!("reading commands from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        match head {
            "pay" => match wallet.mark_paid(rest.trim()) {
                Ok(()) => info!(reference = rest.trim(), "invoice marked paid"),
                Err(e) => warn!(%e, "can't mark invoice paid"),
            },
            "launch" => {
                let engine = engine.clone();
                tokio::spawn(async move {
                    match engine.trigger().await {
                        Ok(summary) => info!(?summary, "manual launch done"),
                        Err(e) => error!(%e, "manual launch failed"),
                    }
                });
            }
            id => match id.parse::<ParticipantId>() {
                Ok(id) => {
                    let command = if rest.trim().is_empty() {
                        Command::Help
                    } else {
                        rest.parse().unwrap_or(Command::Help)
                    };
                    let dispatcher = dispatcher.clone();
                    tokio::spawn(async move { dispatcher.handle(id, command).await });
                }
                Err(_) => warn!(line, "expected `<id> <command>`, `pay <reference>` or `launch`"),
            },
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return Ok(());
    }

    match args[1].as_str() {
        "run" => run(parse_run_args(&args[2..])?).await,
        "leaderboard" => show_leaderboard(&args[2..]),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            Ok(())
        }
    }
}
