use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use sentinel::config::Config;
use sentinel::db::Database;
use sentinel::enforce::DryRunPlatform;
use sentinel::events::{Event, MessageEvent};
use sentinel::output::terminal;
use sentinel::{Engine, EngineSettings};

/// Sentinel: multi-tenant chat moderation.
///
/// Scans messages for policy violations, rate-limits spam floods, and
/// stops privileged accounts that start mass-deleting or mass-banning.
#[derive(Parser)]
#[command(name = "sentinel", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Inspect or change a tenant's policy
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },

    /// Manage a tenant's exempt users
    Exempt {
        #[command(subcommand)]
        action: ExemptAction,
    },

    /// Manage a tenant's blocked words and patterns
    Blocklist {
        #[command(subcommand)]
        action: BlocklistAction,
    },

    /// Run the content scanner on a single message without enforcing
    Scan {
        tenant: String,
        /// Message text to check
        text: String,
        /// Actor id to attribute the message to
        #[arg(long, default_value = "cli")]
        actor: String,
    },

    /// Replay a JSONL file of events through the engine with a dry-run platform
    Replay {
        /// Path to a file with one event per line
        path: String,
    },

    /// Show system status (tenants, recent enforcements)
    Status,
}

#[derive(Subcommand)]
enum PolicyAction {
    /// Print the full policy
    Show { tenant: String },
    /// Print one setting by dot path (e.g. antiSpam.maxMessages)
    Get { tenant: String, path: String },
    /// Change one setting by dot path. The value is parsed as JSON, falling
    /// back to a plain string.
    Set {
        tenant: String,
        path: String,
        value: String,
    },
    /// Discard the stored policy and start again from defaults
    Reset {
        tenant: String,
        /// Display name to record for the tenant
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum ExemptAction {
    Add { tenant: String, actor: String },
    Remove { tenant: String, actor: String },
    List { tenant: String },
    Clear { tenant: String },
}

#[derive(Subcommand)]
enum BlocklistAction {
    /// Add a word or `*` pattern
    Add { tenant: String, word: String },
    Remove { tenant: String, word: String },
    List { tenant: String },
}

/// One line of a replay file: an event plus an optional timestamp.
#[derive(Deserialize)]
struct ReplayLine {
    #[serde(default)]
    at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    event: Event,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sentinel=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Init => {
            info!("Initializing Sentinel database...");
            let db = open_database(&config)?;
            let table_count = db.table_count().await?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("\nSentinel is ready. Policies are created per tenant on first use.");
            println!("Try: sentinel policy show <tenant-id>");
        }

        Commands::Policy { action } => {
            let engine = build_engine(&config)?;
            let store = engine.policies();
            match action {
                PolicyAction::Show { tenant } => {
                    terminal::display_policy(&store.get(&tenant).await);
                }
                PolicyAction::Get { tenant, path } => match store.get_setting(&tenant, &path).await {
                    Some(value) => println!("{path} = {value}"),
                    None => println!("{} {path} is not a policy setting", "!".yellow()),
                },
                PolicyAction::Set {
                    tenant,
                    path,
                    value,
                } => {
                    let parsed = serde_json::from_str(&value)
                        .unwrap_or(serde_json::Value::String(value.clone()));
                    if store.set(&tenant, &path, parsed).await {
                        println!("{} {path} updated", "✓".green());
                    } else {
                        anyhow::bail!("Could not set {path} to {value} (unknown path or wrong type)");
                    }
                }
                PolicyAction::Reset { tenant, name } => {
                    store.delete(&tenant).await;
                    match name {
                        Some(name) => store.ensure(&tenant, &name).await,
                        None => store.get(&tenant).await,
                    };
                    println!("{} Policy for {tenant} reset to defaults", "✓".green());
                }
            }
        }

        Commands::Exempt { action } => {
            let engine = build_engine(&config)?;
            let store = engine.policies();
            match action {
                ExemptAction::Add { tenant, actor } => {
                    report_change(store.add_exemption(&tenant, &actor).await, "exempt", &actor)
                }
                ExemptAction::Remove { tenant, actor } => report_change(
                    store.remove_exemption(&tenant, &actor).await,
                    "no longer exempt",
                    &actor,
                ),
                ExemptAction::List { tenant } => {
                    let policy = store.get(&tenant).await;
                    if policy.exempt_users.is_empty() {
                        println!("No exempt users for {tenant}");
                    }
                    for actor in &policy.exempt_users {
                        println!("  {actor}");
                    }
                }
                ExemptAction::Clear { tenant } => {
                    store.clear_exemptions(&tenant).await;
                    println!("{} Exempt list cleared for {tenant}", "✓".green());
                }
            }
        }

        Commands::Blocklist { action } => {
            let engine = build_engine(&config)?;
            let store = engine.policies();
            match action {
                BlocklistAction::Add { tenant, word } => {
                    report_change(store.add_blocked_word(&tenant, &word).await, "blocked", &word)
                }
                BlocklistAction::Remove { tenant, word } => report_change(
                    store.remove_blocked_word(&tenant, &word).await,
                    "unblocked",
                    &word,
                ),
                BlocklistAction::List { tenant } => {
                    let words = store.blocked_words(&tenant).await;
                    if words.is_empty() {
                        println!("No blocked words for {tenant}");
                    }
                    for word in &words {
                        println!("  {word}");
                    }
                }
            }
        }

        Commands::Scan {
            tenant,
            text,
            actor,
        } => {
            let engine = build_engine(&config)?;
            let event = MessageEvent::new(&tenant, &actor, &text);
            let verdict = engine.scan_content(&event).await;
            terminal::display_verdict(&sentinel::output::truncate_chars(&text, 60), &verdict);
        }

        Commands::Replay { path } => {
            let engine = build_engine(&config)?;
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read replay file {path}"))?;

            let lines: Vec<(usize, &str)> = raw
                .lines()
                .enumerate()
                .filter(|(_, l)| !l.trim().is_empty())
                .collect();
            println!("Replaying {} events from {path}...\n", lines.len());

            // Ordered: window state depends on event order
            let outcomes: Vec<bool> = stream::iter(lines)
                .then(|(n, line)| {
                    let engine = &engine;
                    async move {
                        let parsed: ReplayLine = match serde_json::from_str(line) {
                            Ok(p) => p,
                            Err(e) => {
                                warn!(line = n + 1, error = %e, "Skipping unparseable event");
                                return false;
                            }
                        };
                        let at = parsed.at.unwrap_or_else(Utc::now);
                        let label = format!(
                            "#{} {}/{}",
                            n + 1,
                            parsed.event.tenant_id(),
                            parsed.event.actor_id()
                        );
                        match engine.handle(&parsed.event, at).await {
                            Ok(outcome) => {
                                terminal::display_outcome(&label, &outcome);
                                outcome.verdict.is_violation()
                            }
                            Err(e) => {
                                warn!(line = n + 1, error = %e, "Event rejected");
                                false
                            }
                        }
                    }
                })
                .collect()
                .await;

            let violations = outcomes.iter().filter(|v| **v).count();
            println!(
                "\n{} {} events, {} violations",
                "Replay complete:".bold(),
                outcomes.len(),
                violations
            );
        }

        Commands::Status => {
            // Don't create the file just to report that it's missing
            let db: Arc<dyn Database> = if std::path::Path::new(&config.db_path).exists() {
                open_existing_database(&config)?
            } else {
                Arc::new(sentinel::db::MemoryDatabase::new())
            };
            sentinel::status::show(&db, &config.db_path).await?;
        }
    }

    Ok(())
}

fn report_change(changed: bool, what: &str, subject: &str) {
    if changed {
        println!("{} {subject} {what}", "✓".green());
    } else {
        println!("{} nothing changed for {subject}", "-".dimmed());
    }
}

/// Build an engine over the configured database with a dry-run platform.
fn build_engine(config: &Config) -> Result<Engine> {
    let db = open_database(config)?;
    Ok(Engine::new(
        db,
        Arc::new(DryRunPlatform::new()),
        EngineSettings::from_config(config),
    ))
}

/// Open the configured database, creating and migrating it if needed.
#[cfg(feature = "sqlite")]
fn open_database(config: &Config) -> Result<Arc<dyn Database>> {
    let conn = sentinel::db::initialize(&config.db_path)?;
    Ok(Arc::new(sentinel::db::SqliteDatabase::new(conn)))
}

#[cfg(not(feature = "sqlite"))]
fn open_database(_config: &Config) -> Result<Arc<dyn Database>> {
    warn!("Built without the 'sqlite' feature; policies will not persist");
    Ok(Arc::new(sentinel::db::MemoryDatabase::new()))
}

/// Open a database that must already exist.
#[cfg(feature = "sqlite")]
fn open_existing_database(config: &Config) -> Result<Arc<dyn Database>> {
    let conn = sentinel::db::open(&config.db_path)?;
    Ok(Arc::new(sentinel::db::SqliteDatabase::new(conn)))
}

#[cfg(not(feature = "sqlite"))]
fn open_existing_database(config: &Config) -> Result<Arc<dyn Database>> {
    open_database(config)
}
