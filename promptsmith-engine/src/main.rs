//! Promptsmith command line
//!
//! `run` drives one session to completion against an OpenAI-compatible
//! endpoint, printing every turn and asking on stdin when an agent needs
//! more input. `list` and `export` inspect persisted sessions.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use promptsmith_engine::core::ledger::TurnFilter;
use promptsmith_engine::core::session::{SessionStatus, SessionSummary};
use promptsmith_engine::storage::StorageManager;
use promptsmith_engine::{config::Config, HttpTextGenerator, LogFormat, Orchestrator};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Consecutive failed turns tolerated before `run` gives up
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

#[derive(Parser)]
#[command(name = "promptsmith")]
#[command(about = "Collaborative prompt refinement with three role-playing agents")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a collaboration session to completion
    Run {
        /// What the final prompt should achieve
        #[arg(long)]
        requirements: String,

        /// Review rounds before forced convergence
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Questions the agents may put to the user
        #[arg(long)]
        max_interventions: Option<u32>,
    },
    /// List persisted sessions
    List,
    /// Print a session snapshot as JSON
    Export {
        session_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format.as_str().to_string();
    }

    init_tracing(&config);
    info!("Configuration loaded successfully");

    let storage = Arc::new(StorageManager::new(&config.database).await.map_err(|e| {
        error!("Failed to open database: {}", e);
        e
    })?);
    let generator = Arc::new(HttpTextGenerator::new(&config.llm)?);
    if config.llm.api_key.is_none() {
        warn!("No llm.api_key configured; requests are sent without authorization");
    }

    let orchestrator = Orchestrator::builder(generator)
        .settings(config.orchestration.clone())
        .persistence(storage)
        .build()?;

    match cli.command {
        Command::Run {
            requirements,
            max_iterations,
            max_interventions,
        } => {
            let max_iterations = max_iterations.unwrap_or(config.orchestration.max_iterations);
            let max_interventions =
                max_interventions.unwrap_or(config.orchestration.max_interventions);
            run(&orchestrator, &requirements, max_iterations, max_interventions).await
        }
        Command::List => {
            for summary in orchestrator.list().await? {
                println!(
                    "{}  {:<22} iteration {}/{}  {} turn(s)",
                    summary.session_id,
                    summary.state.as_str(),
                    summary.current_iteration,
                    summary.max_iterations,
                    summary.turn_count
                );
            }
            Ok(())
        }
        Command::Export { session_id } => {
            let snapshot = orchestrator.export(session_id).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
    }
}

fn init_tracing(config: &Config) {
    let level = &config.logging.level;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "promptsmith={0},promptsmith_engine={0},promptsmith_core={0},\
             promptsmith_storage={0},promptsmith_prompts={0}",
            level
        ))
    });

    let (plain, json) = if config.logging.format == "json" {
        (
            None,
            Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
    } else {
        (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();
}

async fn run(
    orchestrator: &Orchestrator,
    requirements: &str,
    max_iterations: u32,
    max_interventions: u32,
) -> anyhow::Result<()> {
    let mut summary = orchestrator
        .start(requirements, max_iterations, max_interventions)
        .await?;
    let session_id = summary.session_id;
    println!("Session {}", session_id);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = 0;
    let mut failures = 0;

    loop {
        printed = print_new_turns(orchestrator, session_id, printed).await?;

        match summary.status {
            SessionStatus::Completed => break,
            SessionStatus::Failed => bail!(
                "Session {} failed: {}",
                session_id,
                summary.last_error.unwrap_or_default()
            ),
            _ => {}
        }

        if summary.last_error.is_some() {
            failures += 1;
            if failures >= MAX_CONSECUTIVE_FAILURES {
                bail!(
                    "Giving up on session {} after {} failed turns",
                    session_id,
                    failures
                );
            }
        } else {
            failures = 0;
        }

        let answer = if summary.requires_user_input {
            prompt_user(&summary, &mut stdin).await?
        } else {
            None
        };
        summary = orchestrator.advance(session_id, answer).await?;
    }

    println!("\n=== FINAL PROMPT ===\n{}", summary.final_artifact.unwrap_or_default());
    Ok(())
}

async fn print_new_turns(
    orchestrator: &Orchestrator,
    session_id: Uuid,
    printed: u64,
) -> anyhow::Result<u64> {
    let mut last = printed;
    for turn in orchestrator.turns(session_id, &TurnFilter::default()).await? {
        if turn.sequence <= printed {
            continue;
        }
        if turn.is_failure() {
            let detail = turn
                .metadata
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            println!("\n[{}] {} failed: {}", turn.sequence, turn.speaker(), detail);
        } else {
            println!(
                "\n[{}] {} ({}, confidence {:.2})\n{}",
                turn.sequence,
                turn.speaker(),
                turn.category.as_str(),
                turn.confidence,
                turn.content
            );
        }
        last = turn.sequence;
    }
    Ok(last)
}

async fn prompt_user<R>(
    summary: &SessionSummary,
    stdin: &mut tokio::io::Lines<R>,
) -> anyhow::Result<Option<String>>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    println!(
        "\nYour answer ({} of {} interventions used, empty line to skip):",
        summary.user_intervention_count, summary.max_interventions
    );
    let line = stdin.next_line().await?.unwrap_or_default();
    let line = line.trim();
    Ok((!line.is_empty()).then(|| line.to_string()))
}
