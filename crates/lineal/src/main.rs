//! # Lineal CLI (`lineal`)
//!
//! The `lineal` binary fetches lineage trees from the configured document
//! store and can serve the same engine over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! lineal --config ./config/lineal.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lineal fetch <seeds>...` | Fetch a lineage tree around seed nodes |
//! | `lineal schemas` | List configured lineage schemas |
//! | `lineal serve` | Start the JSON tree API server |
//!
//! ## Examples
//!
//! ```bash
//! # Ancestors and descendants of one process, summary view
//! lineal fetch 5f3a… --schema endpoint --start 2024-01-01 --end 2024-02-01
//!
//! # Descendants only, as JSON
//! lineal fetch n1 --schema winlog --start 2024-01-01 --end 2024-02-01 \
//!     --ancestor-depth 0 --json
//!
//! # Serve the tree API
//! lineal serve --config ./config/lineal.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lineal::{config, fetch_cmd, schemas, server};

/// Lineal — lineage tree reconstruction over event stores.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lineal.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lineal",
    about = "Lineal — lineage tree reconstruction over event stores",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lineal.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Fetch a lineage tree around one or more seed nodes.
    ///
    /// Expands ancestors and descendants up to the configured depth and
    /// size limits and prints the assembled tree. Ctrl-C cancels between
    /// expansion levels and prints whatever was collected.
    Fetch {
        /// Seed node identifiers.
        #[arg(required = true)]
        seeds: Vec<String>,

        /// Named schema from the config's `[schemas.<name>]` table.
        #[arg(long)]
        schema: String,

        /// Window start (RFC 3339, or YYYY-MM-DD meaning midnight UTC).
        #[arg(long)]
        start: String,

        /// Window end, exclusive (RFC 3339 or YYYY-MM-DD).
        #[arg(long)]
        end: String,

        /// Index pattern(s) to query; defaults to `fetch.index_patterns`.
        #[arg(long = "index")]
        index_patterns: Vec<String>,

        /// Ancestor hops to traverse (0 disables the direction).
        #[arg(long)]
        ancestor_depth: Option<usize>,

        /// Maximum ancestors to return.
        #[arg(long)]
        ancestor_limit: Option<usize>,

        /// Descendant hops to traverse (0 disables the direction).
        #[arg(long)]
        descendant_depth: Option<usize>,

        /// Maximum descendants to return.
        #[arg(long)]
        descendant_limit: Option<usize>,

        /// Print the tree as pretty JSON instead of the summary view.
        #[arg(long)]
        json: bool,
    },

    /// List configured lineage schemas.
    Schemas,

    /// Start the JSON tree API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves
    /// `POST /tree` and `GET /health`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Fetch {
            seeds,
            schema,
            start,
            end,
            index_patterns,
            ancestor_depth,
            ancestor_limit,
            descendant_depth,
            descendant_limit,
            json,
        } => {
            fetch_cmd::run_fetch(
                &cfg,
                fetch_cmd::FetchParams {
                    seeds,
                    schema_name: schema,
                    start,
                    end,
                    index_patterns,
                    ancestor_depth,
                    ancestor_limit,
                    descendant_depth,
                    descendant_limit,
                    json,
                },
            )
            .await?;
        }
        Commands::Schemas => {
            schemas::run_schemas(&cfg)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
