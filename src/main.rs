//! # Parley CLI
//!
//! The `parley` binary is the terminal interface for Parley. It provides
//! commands for database initialization, content and catalog indexing,
//! turn-resolution inspection, and interactive chat sessions.
//!
//! ## Usage
//!
//! ```bash
//! parley --config ./config/parley.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `parley init` | Create the SQLite database and run schema migrations |
//! | `parley sync` | Index content roots and the command catalog (incremental) |
//! | `parley commands` | List the registered command catalog |
//! | `parley resolve "<text>"` | Show how one turn would resolve, without chatting |
//! | `parley chat` | Start an interactive chat session |
//! | `parley sessions` | List recorded sessions |
//! | `parley replay <id>` | Print a session's turn log |

use std::io::{BufRead, Write as _};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::oneshot::error::TryRecvError;

use parley::catalog::CommandCatalog;
use parley::chat::{ChatOrchestrator, CompletionClient, TurnOutcome};
use parley::config::{self, Config};
use parley::db;
use parley::embedder::HttpEmbedder;
use parley::error::ResolveError;
use parley::index::IndexClient;
use parley::indexer::{reset_index, Indexer};
use parley::migrate;
use parley::models::{Resolution, Role, SyncSummary};
use parley::resolver::Resolver;
use parley::session::SessionStore;

/// Parley — a local-first conversational AI client with retrieval-augmented
/// chat and semantic command resolution.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/parley.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "parley",
    about = "Parley — retrieval-augmented local chat with semantic commands",
    version,
    long_about = "Parley maintains multi-turn chat sessions against a local completion \
    service, augments prompts with context retrieved from indexed local files, and \
    resolves user turns into semantic command invocations when they match the command \
    catalog."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/parley.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. Running
    /// it multiple times is safe.
    Init,

    /// Index content roots and the command catalog.
    ///
    /// Incremental by default: unchanged chunks are hash-gated and issue
    /// zero embedding calls. Sources that disappeared are removed from
    /// the index.
    Sync {
        /// Discard the whole index (vectors, hashes, collections) and
        /// re-embed everything from scratch. Required after switching
        /// embedding models.
        #[arg(long)]
        full: bool,
    },

    /// List the registered command catalog.
    Commands,

    /// Resolve one turn and print the outcome without chatting.
    ///
    /// Useful for tuning thresholds: shows whether the text resolves to
    /// a command invocation or a context bundle, with scores.
    Resolve {
        /// The turn text to resolve.
        text: String,
    },

    /// Start an interactive chat session.
    ///
    /// Reads turns from stdin. Input starting with `/` is explicit
    /// command intent; anything else is matched semantically against the
    /// catalog first and treated as conversation otherwise. EOF (Ctrl-D)
    /// ends the session; the turn log survives for `parley replay`.
    Chat {
        /// Resume an existing session instead of starting a new one.
        #[arg(long)]
        session: Option<String>,
    },

    /// List recorded sessions, newest first.
    Sessions,

    /// Print a session's turn log.
    Replay {
        /// Session id (see `parley sessions`).
        session_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Sync { full } => {
            run_sync(&cfg, full).await?;
        }
        Commands::Commands => {
            list_commands(&cfg);
        }
        Commands::Resolve { text } => {
            run_resolve(&cfg, &text).await?;
        }
        Commands::Chat { session } => {
            run_chat(&cfg, session).await?;
        }
        Commands::Sessions => {
            let pool = db::connect(&cfg.db.path).await?;
            let store = SessionStore::new(pool.clone());
            for info in store.list().await? {
                let date = chrono::DateTime::from_timestamp(info.last_active, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("{}  {:>4} turns  last active {}", info.session_id, info.turn_count, date);
            }
            pool.close().await;
        }
        Commands::Replay { session_id } => {
            run_replay(&cfg, &session_id).await?;
        }
    }

    Ok(())
}

async fn run_sync(cfg: &Config, full: bool) -> Result<()> {
    let pool = db::connect(&cfg.db.path).await?;
    migrate::run_migrations(&pool).await?;

    if full {
        reset_index(&pool).await?;
        println!("sync --full: cleared existing index");
    }

    let embedder = HttpEmbedder::new(&cfg.embedding)?;
    let index = IndexClient::new(pool.clone());
    let indexer = Indexer::new(&pool, &index, &embedder, cfg);

    if cfg.content.roots.is_empty() {
        println!("sync content: no roots configured, skipping");
    } else {
        let summary = indexer.sync_content().await?;
        print_summary("content", &summary);
    }

    let catalog = CommandCatalog::new(cfg.commands.clone());
    let summary = indexer.sync_commands(&catalog).await?;
    print_summary("commands", &summary);

    println!("ok");
    pool.close().await;
    Ok(())
}

fn print_summary(what: &str, summary: &SyncSummary) {
    println!("sync {}", what);
    println!("  added: {}", summary.added);
    println!("  updated: {}", summary.updated);
    println!("  removed: {}", summary.removed);
    println!("  skipped: {}", summary.skipped);
}

fn list_commands(cfg: &Config) {
    let catalog = CommandCatalog::new(cfg.commands.clone());
    println!("{:<14} {:<18} DESCRIPTION", "NAME", "HANDLER");
    for cmd in &cfg.commands {
        println!("{:<14} {:<18} {}", cmd.name, cmd.handler_ref, cmd.description);
    }
    println!("catalog hash: {}", catalog.hash());
}

async fn run_resolve(cfg: &Config, text: &str) -> Result<()> {
    let pool = db::connect(&cfg.db.path).await?;
    let embedder = HttpEmbedder::new(&cfg.embedding)?;
    let index = IndexClient::new(pool.clone());
    let resolver = Resolver::new(&embedder, &index, &cfg.resolver);

    match resolver.resolve(text).await? {
        Resolution::Command { name, raw_args } => {
            println!("command: {}", name);
            println!("args: {}", if raw_args.is_empty() { "(none)" } else { raw_args.as_str() });
        }
        Resolution::Context { items, budget_used } => {
            println!("context bundle: {} items, {} chars of budget", items.len(), budget_used);
            for (i, item) in items.iter().enumerate() {
                let excerpt: String = item.text.chars().take(80).collect();
                println!("{}. [{:.3}] {}", i + 1, item.score, item.source_ref);
                println!("   excerpt: \"{}\"", excerpt.replace('\n', " "));
            }
        }
    }

    pool.close().await;
    Ok(())
}

async fn run_chat(cfg: &Config, session: Option<String>) -> Result<()> {
    let pool = db::connect(&cfg.db.path).await?;
    migrate::run_migrations(&pool).await?;

    let embedder = HttpEmbedder::new(&cfg.embedding)?;
    let index = IndexClient::new(pool.clone());
    let store = SessionStore::new(pool.clone());
    let completion = CompletionClient::new(&cfg.chat)?;
    let catalog = CommandCatalog::new(cfg.commands.clone());
    let resolver = Resolver::new(&embedder, &index, &cfg.resolver);
    let orchestrator = ChatOrchestrator::new(&resolver, &store, &completion, &catalog);

    // Re-embed the catalog if it drifted since the last run.
    let indexer = Indexer::new(&pool, &index, &embedder, cfg);
    indexer.sync_commands(&catalog).await?;

    let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    orchestrator.ensure_session(&session_id, &cfg.chat.system_prompt).await?;

    // Content freshness is best-effort: sync in the background and report
    // when it lands, without blocking the first turn.
    let mut sync_rx = if cfg.chat.sync_on_start && !cfg.content.roots.is_empty() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let pool2 = pool.clone();
        let cfg2 = cfg.clone();
        tokio::spawn(async move {
            let result = background_sync(&pool2, &cfg2).await;
            let _ = tx.send(result);
        });
        Some(rx)
    } else {
        None
    };

    println!("session {}", session_id);
    println!("Type your message; /command for explicit commands; Ctrl-D to exit.");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        if let Some(mut rx) = sync_rx.take() {
            match rx.try_recv() {
                Ok(Ok(summary)) => eprintln!(
                    "// index sync complete: {} added, {} updated, {} removed",
                    summary.added, summary.updated, summary.removed
                ),
                Ok(Err(e)) => eprintln!("// index sync failed: {}", e),
                Err(TryRecvError::Empty) => sync_rx = Some(rx),
                Err(TryRecvError::Closed) => {}
            }
        }

        match orchestrator.run_turn(&session_id, &line).await {
            Ok(TurnOutcome::Reply(text)) => println!("{}", text),
            Ok(TurnOutcome::Command { name, raw_args }) => {
                match orchestrator.dispatch(&session_id, &line, &name, &raw_args).await {
                    Ok(Some(reply)) => println!("{}", reply),
                    Ok(None) => println!("// {} done", name),
                    Err(e) => eprintln!("// command error: {}", e),
                }
            }
            Err(e) => {
                if matches!(e.downcast_ref::<ResolveError>(), Some(ResolveError::EmptyInput)) {
                    continue;
                }
                // The turn failed; the session itself carries on.
                eprintln!("error: {}", e);
            }
        }
    }

    pool.close().await;
    Ok(())
}

async fn background_sync(pool: &sqlx::SqlitePool, cfg: &Config) -> Result<SyncSummary> {
    let embedder = HttpEmbedder::new(&cfg.embedding)?;
    let index = IndexClient::new(pool.clone());
    let indexer = Indexer::new(pool, &index, &embedder, cfg);
    indexer.sync_content().await
}

async fn run_replay(cfg: &Config, session_id: &str) -> Result<()> {
    let pool = db::connect(&cfg.db.path).await?;
    let store = SessionStore::new(pool.clone());
    let turns = store.load(session_id).await?;

    if turns.is_empty() {
        println!("No turns recorded for session {}", session_id);
        pool.close().await;
        return Ok(());
    }

    for turn in &turns {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        let annotation = match &turn.resolution {
            Some(Resolution::Command { name, .. }) => format!("  (command: {})", name),
            Some(Resolution::Context { items, .. }) if !items.is_empty() => {
                format!("  (context: {} items)", items.len())
            }
            _ => String::new(),
        };
        println!("[{}]{}", role, annotation);
        println!("{}", turn.text);
        println!();
    }

    pool.close().await;
    Ok(())
}
