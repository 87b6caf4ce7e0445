//! # Personal CRM CLI (`crm`)
//!
//! The `crm` binary initializes the database, starts the HTTP server, and
//! runs the board and graph operations from a terminal.
//!
//! ## Usage
//!
//! ```bash
//! crm --config ./config/crm.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crm init` | Create the SQLite database, schema, and default statuses |
//! | `crm serve` | Start the HTTP API |
//! | `crm move <contact> <status> <position>` | Move a contact on the board |
//! | `crm clusters` | Recompute graph clusters |
//! | `crm statuses` | List board columns with contact counts |

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use personal_crm::config::{self, Config};
use personal_crm::sqlite_store::SqliteStore;
use personal_crm::{db, migrate, server, statuses};
use personal_crm::{move_contact, recompute, MoveRequest};

/// Personal CRM: contacts on a Kanban board and in an association graph.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/crm.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "crm", about = "Personal CRM backend", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/crm.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all tables, and seeds the
    /// default statuses on first run. Safe to run repeatedly.
    Init,

    /// Start the HTTP server.
    Serve,

    /// Move a contact to a status column at a 0-based position.
    ///
    /// Positions past the end of the column place the contact last.
    Move {
        contact_id: String,
        status_id: String,
        #[arg(allow_negative_numbers = true)]
        position: i64,
    },

    /// Recompute cluster labels from the association graph.
    Clusters,

    /// List statuses in board order with their contact counts.
    Statuses {
        /// Include statuses marked inactive.
        #[arg(long)]
        all: bool,
    },
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Move {
            contact_id,
            status_id,
            position,
        } => {
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool.clone());
            let request = MoveRequest {
                contact_id,
                status_id,
                position,
            };
            let outcome = move_contact(&store, &request)
                .await
                .context("Move failed")?;
            println!(
                "Moved {} to {} at position {}",
                outcome.id, outcome.status_id, outcome.sort_order_in_status
            );
            pool.close().await;
        }
        Commands::Clusters => {
            let pool = db::connect(&cfg).await?;
            let store = SqliteStore::new(pool.clone());
            let summary = recompute(&store).await.context("Cluster recompute failed")?;
            println!(
                "Found {} clusters across {} contacts ({})",
                summary.clusters_found, summary.contacts_updated, summary.algorithm
            );
            pool.close().await;
        }
        Commands::Statuses { all } => {
            let pool = db::connect(&cfg).await?;
            let columns = statuses::list_statuses(&pool, all)
                .await
                .context("Failed to list statuses")?;
            if columns.is_empty() {
                println!("No statuses.");
            }
            for status in &columns {
                let flag = if status.is_active { "" } else { " (inactive)" };
                println!(
                    "{:>3}  {:<20} {:>5} contacts  {}{}",
                    status.sort_order, status.name, status.contact_count, status.id, flag
                );
            }
            pool.close().await;
        }
    }

    Ok(())
}
