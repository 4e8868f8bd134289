//! # logfix CLI
//!
//! The `logfix` binary analyzes deployment logs and returns one ranked
//! remediation, learning from user feedback over time.
//!
//! ## Usage
//!
//! ```bash
//! logfix --config ./config/logfix.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `logfix init` | Create the SQLite schema and seed the built-in patterns |
//! | `logfix analyze` | Analyze a log from `--file` or stdin, print one solution as JSON |
//! | `logfix feedback <target> <rating>` | Rate a served solution |
//! | `logfix patterns` | List stored patterns |
//! | `logfix stats` | Learning statistics |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database and seed patterns
//! logfix init
//!
//! # Analyze a Docker log
//! docker compose up 2>&1 | logfix analyze --source docker
//!
//! # Show the full match breakdown
//! logfix analyze --file build.log --explain
//!
//! # Rate the solution that was served
//! logfix feedback 3fa1c2... positive
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use logfix::{analyze, config, feedback_cmd, library, migrate, patterns, runtime, stats};

/// logfix: pattern-matching remediation engine for deployment logs.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/logfix.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "logfix",
    about = "logfix: match deployment logs to known fixes and learn from feedback",
    version,
    long_about = "logfix scores a log excerpt against a library of known failure patterns \
    using keyword overlap, embedding similarity and each pattern's feedback-learned success \
    rate. It returns exactly one solution, synthesizing one with a language model or a \
    generic template when no pattern is confident enough."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/logfix.toml")]
    config: PathBuf,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and seed the built-in patterns.
    ///
    /// Idempotent: seeded patterns are keyed by content hash, so running
    /// it again inserts nothing.
    Init,

    /// Analyze a log excerpt and print one solution as JSON.
    Analyze {
        /// Where the log came from: docker, kubernetes, ci, yaml,
        /// application. Anything else is treated as unknown.
        #[arg(long, default_value = "unknown")]
        source: String,

        /// Read the log from this file instead of stdin.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Print the match breakdown and any degradations with the solution.
        #[arg(long)]
        explain: bool,
    },

    /// Rate a served solution.
    ///
    /// Never fails on invalid input: bad feedback is logged and dropped.
    Feedback {
        /// Pattern id, or `candidate:<signature>` for a model-synthesized
        /// solution.
        target: String,

        /// positive | neutral | negative, excellent | good | fair | poor,
        /// yes | no, or an accuracy in [0, 1].
        rating: String,

        /// Free-text comment attached to the event.
        #[arg(long)]
        comment: Option<String>,
    },

    /// List stored patterns.
    Patterns {
        /// Only show this category (docker, kubernetes, database, network, other).
        #[arg(long)]
        category: Option<String>,
    },

    /// Show learning statistics.
    Stats,
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            let rt = runtime::open(&cfg).await?;
            let report = library::seed(
                rt.engine.store().as_ref(),
                rt.engine.embedder().as_ref(),
                cfg.store.pattern_prior,
            )
            .await;
            rt.close().await;
            let report = report?;
            println!(
                "Database initialized successfully ({} patterns seeded, {} already present).",
                report.inserted, report.existing
            );
        }
        Commands::Analyze {
            source,
            file,
            explain,
        } => {
            analyze::run_analyze(&cfg, &source, file.as_deref(), explain).await?;
        }
        Commands::Feedback {
            target,
            rating,
            comment,
        } => {
            feedback_cmd::run_feedback(&cfg, &target, &rating, comment).await?;
        }
        Commands::Patterns { category } => {
            patterns::run_patterns(&cfg, category.as_deref()).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
