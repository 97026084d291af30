//! # kbsync CLI
//!
//! The `kbsync` binary initializes the database, registers configured
//! sources, runs synchronizations and inspects their results.
//!
//! ## Usage
//!
//! ```bash
//! kbsync --config ./config/kbsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbsync init` | Create the database, run migrations, register sources |
//! | `kbsync sources` | List configured sources and their health |
//! | `kbsync sync <project>` | Synchronize every enabled source of a project |
//! | `kbsync runs <project>` | Recent runs of a project |
//! | `kbsync run <id>` | One run with its per-file audit rows |
//! | `kbsync get <id>` | A document with its fragments |
//! | `kbsync completions <shell>` | Shell completion script |

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use kbsync::config;
use kbsync::db;
use kbsync::get;
use kbsync::ingest::{self, SyncOptions};
use kbsync::migrate;
use kbsync::progress::ProgressMode;
use kbsync::sources;
use kbsync::sqlite_store::SqliteStore;
use kbsync::stats;

/// kbsync: incremental knowledge-base synchronization from directory trees.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kbsync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kbsync",
    about = "Incrementally synchronize per-project knowledge bases from directory trees",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kbsync.toml")]
    config: PathBuf,

    /// Log run and source activity to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and register configured sources.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// List configured sources and whether their roots exist.
    Sources,

    /// Synchronize every enabled source of a project.
    Sync {
        /// Project name as configured under `[projects.<name>]`.
        project: String,

        /// Classify and count without writing files, documents or audit rows.
        #[arg(long)]
        dry_run: bool,

        /// Hash every file under hash-confirming modes, even if size and
        /// mtime are unchanged.
        #[arg(long)]
        force_rehash: bool,

        /// Ingest at most this many files; the rest are deferred.
        #[arg(long)]
        max_files: Option<usize>,

        /// Print the run result as JSON.
        #[arg(long)]
        json: bool,

        /// Progress on stderr: `off`, `human`, or `json`. Defaults to
        /// `human` when stderr is a terminal.
        #[arg(long)]
        progress: Option<ProgressMode>,
    },

    /// Show recent runs of a project.
    Runs {
        project: String,

        #[arg(long, default_value_t = 10)]
        limit: i64,

        #[arg(long)]
        json: bool,
    },

    /// Show one run with its audit rows.
    Run {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Retrieve a document and its fragments by id.
    Get {
        id: String,

        #[arg(long)]
        json: bool,
    },

    /// Print a shell completion script.
    Completions { shell: clap_complete::Shell },
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let default = if verbose { "kbsync=info" } else { "kbsync=warn" };
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default))?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    // Commands that don't require config
    if let Commands::Completions { shell } = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "kbsync", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool.clone());
            let registered = sources::register_config(&store, &cfg).await;
            pool.close().await;
            let registered = registered?;
            println!("Database initialized successfully.");
            println!("  projects registered: {}", registered.len());
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Sync {
            project,
            dry_run,
            force_rehash,
            max_files,
            json,
            progress,
        } => {
            let opts = SyncOptions {
                dry_run,
                force_rehash,
                max_files,
            };
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_sync(&cfg, &project, &opts, mode, json).await?;
        }
        Commands::Runs {
            project,
            limit,
            json,
        } => {
            stats::run_runs(&cfg, &project, limit, json).await?;
        }
        Commands::Run { id, json } => {
            stats::run_show(&cfg, &id, json).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, &id, json).await?;
        }
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
