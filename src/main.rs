use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use raidguard::activity::{ActivityKind, ManualClock, SqliteActivityStore, SystemClock};
use raidguard::dispatch::{execute, LogDispatcher};
use raidguard::{AntiSpamEngine, Config, GuardEvent};

/// Flood and raid protection engine for chat communities.
#[derive(Parser, Debug)]
#[command(name = "raidguard", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate a config file, then print the effective limits.
    Check {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create the durable activity tables.
    InitDb {
        #[arg(short, long)]
        path: PathBuf,
    },
    /// Run JSON-lines events through the engine and print the resulting actions.
    ///
    /// A line may carry an RFC 3339 `at` field; the event is then processed
    /// as if it arrived at that instant. Lines without one use the wall clock.
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        /// Event file (defaults to stdin).
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Account id whose own messages are never counted.
        #[arg(long)]
        self_id: Option<u64>,
    },
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Check { config } => {
            let config = Config::load(&config)?;
            init_tracing(&config.log.level);
            let message = config.message_limit()?;
            let join = config.join_limit()?;
            println!(
                "message limit: {} per {:?} ({})",
                message.threshold,
                message.window,
                if config.enable_message_limit { "enabled" } else { "disabled" }
            );
            println!("join limit: {} per {:?}", join.threshold, join.window);
            println!("storage: {:?}", config.storage.backend);
            Ok(())
        }
        Command::InitDb { path } => {
            init_tracing("info");
            SqliteActivityStore::open(&path, ActivityKind::Message, Arc::new(SystemClock))
                .with_context(|| format!("Failed to initialize activity DB: {}", path.display()))?;
            tracing::info!("Activity tables ready at {}", path.display());
            Ok(())
        }
        Command::Replay {
            config,
            input,
            self_id,
        } => {
            let config = Config::load(&config)?;
            init_tracing(&config.log.level);
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let mut engine = AntiSpamEngine::from_config(&config, clock.clone())?;
            if let Some(id) = self_id {
                engine = engine.with_self_id(id);
            }
            tracing::info!(backend = ?config.storage.backend, "engine ready");

            let mut out = std::io::stdout().lock();
            match input {
                Some(path) => {
                    let file = tokio::fs::File::open(&path)
                        .await
                        .with_context(|| format!("Failed to open events: {}", path.display()))?;
                    replay(&engine, &clock, BufReader::new(file), &path, &mut out).await
                }
                None => {
                    let stdin = BufReader::new(tokio::io::stdin());
                    replay(&engine, &clock, stdin, Path::new("<stdin>"), &mut out).await
                }
            }
        }
    }
}

/// One replay input line.
#[derive(Debug, Deserialize)]
struct ReplayLine {
    /// Arrival time; the wall clock when absent.
    #[serde(default)]
    at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    event: GuardEvent,
}

async fn replay<R, W>(
    engine: &AntiSpamEngine,
    clock: &ManualClock,
    reader: R,
    source: &Path,
    out: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let ReplayLine { at, event } = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("{}:{line_no}: skipping malformed event: {e}", source.display());
                continue;
            }
        };
        clock.set(at.unwrap_or_else(Utc::now));

        let plan = engine
            .decide(&event)
            .with_context(|| format!("{}:{line_no}: event not processed", source.display()))?;
        for action in &plan.actions {
            writeln!(out, "{}", serde_json::to_string(action)?)?;
        }
        execute(&plan, &LogDispatcher).await;
    }
    Ok(())
}
