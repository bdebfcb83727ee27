//! KillCore CLI
//!
//! Usage:
//!   killcore init [--force] [--tickers tickers.json]
//!   killcore round [--recorded [--graded]]
//!   killcore grade
//!   killcore daemon [--interval-secs 10]
//!
//! Config is read from `--config`, `KILLCORE_CONFIG_PATH` or `killcore.toml`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use killcore_backend::agent::TickerStats;
use killcore_backend::runner::{Daemon, RoundReport, RoundRunner};
use killcore_backend::simulator::PaperSimulator;
use killcore_backend::KillcoreConfig;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "killcore")]
#[command(about = "Self-evolving trading agent: simulate, grade and mutate one round at a time")]
struct Args {
    /// Config file (TOML)
    #[arg(long, env = "KILLCORE_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Override the state directory
    #[arg(long, env = "KILLCORE_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Fixed RNG seed for reproducible rounds
    #[arg(long, env = "KILLCORE_SEED")]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a fresh agent
    Init {
        /// Replace an existing agent
        #[arg(long)]
        force: bool,

        /// JSON array of ticker stats used to pick the symbol
        #[arg(long)]
        tickers: Option<PathBuf>,

        /// Also write the effective config to this path
        #[arg(long)]
        write_config: Option<PathBuf>,
    },

    /// Run one round
    Round {
        /// Evolve on the performance file already in the state directory
        /// instead of simulating
        #[arg(long)]
        recorded: bool,

        /// Take the grade from the stored self-evaluation instead of
        /// grading memory
        #[arg(long, requires = "recorded")]
        graded: bool,
    },

    /// Grade stored memory and print the self-evaluation
    Grade,

    /// Run rounds on an interval until interrupted
    Daemon {
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Stop after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("killcore_backend=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => KillcoreConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => KillcoreConfig::from_env(),
    };
    if let Some(dir) = args.state_dir {
        config.runner.state_dir = dir;
    }
    if args.seed.is_some() {
        config.runner.seed = args.seed;
    }

    let mut rng = match config.runner.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    match args.command {
        Command::Init {
            force,
            tickers,
            write_config,
        } => {
            if let Some(path) = write_config {
                config
                    .save(&path)
                    .with_context(|| format!("Failed to write config to {}", path.display()))?;
                info!("Wrote config to {}", path.display());
            }
            let tickers = tickers.map(load_tickers).transpose()?;
            let mut runner =
                RoundRunner::new(config.clone(), PaperSimulator::new(config.simulator));
            let agent = runner
                .exclusive(|r| r.initialize_agent(tickers.as_deref(), force, &mut rng))
                .context("Agent initialization aborted")?;
            println!("{}", serde_json::to_string_pretty(&agent)?);
        }
        Command::Round { recorded, graded } => {
            let mut runner =
                RoundRunner::new(config.clone(), PaperSimulator::new(config.simulator));
            let report = runner
                .exclusive(|r| match (recorded, graded) {
                    (true, true) => r.ingest_graded(&mut rng),
                    (true, false) => r.ingest_recorded(&mut rng),
                    _ => r.run_round(&mut rng),
                })
                .context("Round aborted")?;
            print_report(&report);
        }
        Command::Grade => {
            let runner = RoundRunner::new(config.clone(), PaperSimulator::new(config.simulator));
            let (evaluation, maturity) = runner.evaluate()?;
            println!("{}", serde_json::to_string_pretty(&evaluation)?);
            println!(
                "maturity {} ({}/7) -> {:?}",
                maturity.stars(),
                maturity.score,
                maturity.recommendation
            );
            for check in &maturity.checks {
                let mark = if check.passed { "ok " } else { "-- " };
                println!("  {}{}: {}", mark, check.name, check.detail);
            }
        }
        Command::Daemon {
            interval_secs,
            max_cycles,
        } => {
            let interval =
                Duration::from_secs(interval_secs.unwrap_or(config.runner.interval_secs));
            let lock_path = config.runner.lock_path.clone();
            let runner = RoundRunner::new(config.clone(), PaperSimulator::new(config.simulator));
            let mut daemon = Daemon::new(runner, lock_path, interval);
            if let Some(max) = max_cycles {
                daemon = daemon.with_max_cycles(max);
            }
            // Install the handler before the first cycle so an interrupt
            // mid-round waits for the round and its lock release.
            let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        let _ = stop_tx.send(());
                    }
                    Err(e) => {
                        error!("Failed to listen for ctrl-c: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            });
            let shutdown = async {
                let _ = stop_rx.await;
            };
            let summary = daemon.run(&mut rng, shutdown).await;
            info!(
                "Daemon finished: {} cycles, {} completed, {} skipped, {} failed",
                summary.cycles, summary.completed, summary.skipped, summary.failed
            );
        }
    }

    Ok(())
}

fn load_tickers(path: PathBuf) -> Result<Vec<TickerStats>> {
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read tickers from {}", path.display()))?;
    let tickers = serde_json::from_str(&contents).context("Invalid ticker JSON")?;
    Ok(tickers)
}

fn print_report(report: &RoundReport) {
    println!(
        "round {} | generation {} | live rounds {} | regime {} | grade {} (score {}){}",
        report.round,
        report.generation,
        report.live_rounds,
        report.regime,
        report.grade.grade,
        report.grade.score,
        if report.frozen { " | frozen" } else { "" }
    );
    println!(
        "return {:+.2}% | drawdown {:.2}% | win rate {:.1}%",
        report.performance.return_pct, report.performance.drawdown, report.performance.win_rate
    );
    for line in &report.intent {
        println!("  - {}", line);
    }
    println!("archived to {}", report.archive_dir.display());
}
