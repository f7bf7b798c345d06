//! # Research Desk CLI (`desk`)
//!
//! The `desk` binary drives both sides of Research Desk from the terminal:
//! uploading files into the catalog and browsing the library.
//!
//! ## Usage
//!
//! ```bash
//! desk --config ./config/desk.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `desk init` | Create the SQLite catalog database |
//! | `desk upload <paths>` | Validate and ingest files or directories |
//! | `desk library` | Search, filter, sort and page the catalog |
//! | `desk remove <id>` | Delete one record from the catalog |
//! | `desk reset` | Clear the catalog |
//! | `desk serve` | Start the HTTP JSON server |
//!
//! ## Examples
//!
//! ```bash
//! # Upload two papers with a shared title and tags
//! desk upload a.pdf b.pdf --title "Reading group" --tags "ml, week 3"
//!
//! # Page 2 of PDFs, newest first
//! desk library --type .pdf --page 2
//!
//! # Follow the catalog while an upload runs in another terminal
//! desk library --watch
//! ```

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use research_desk::config::{self, Config};
use research_desk::library::{self, FileTypeFilter, LibraryQuery, SortKey};
use research_desk::notify::NotifyMode;
use research_desk::{ingest, migrate, server};

/// Research Desk: document ingestion and a synchronized research library.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/desk.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "desk",
    about = "Research Desk: document ingestion and a synchronized research library",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/desk.toml`. Built-in defaults are used when the
    /// file does not exist.
    #[arg(long, global = true, default_value = "./config/desk.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the catalog database.
    ///
    /// Creates the SQLite file and its key-value table. Idempotent.
    Init,

    /// Validate files and ingest the accepted ones.
    ///
    /// Directories are expanded recursively. Each accepted file becomes a
    /// catalog record that is driven to `completed` before the command exits.
    Upload {
        /// Files or directories to upload.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Title applied to every file in this batch.
        #[arg(long)]
        title: Option<String>,

        /// Comma-separated tags applied to every file in this batch.
        #[arg(long)]
        tags: Option<String>,

        /// Toast output: `human`, `json`, or `off`.
        ///
        /// Defaults to `human` when stderr is a terminal, otherwise `off`.
        #[arg(long, value_parser = parse_notify_mode)]
        notify: Option<NotifyMode>,
    },

    /// Browse the library.
    Library {
        /// Case-insensitive text matched against name, title and tags.
        #[arg(long, default_value = "")]
        search: String,

        /// File type filter, e.g. `.pdf`. Defaults to all types.
        #[arg(long = "type", default_value = "")]
        file_type: String,

        /// Sort order: `date` (newest first) or `name`.
        #[arg(long, default_value = "date")]
        sort: SortKey,

        /// 1-based page number.
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Keep polling and re-render whenever the catalog changes.
        #[arg(long)]
        watch: bool,
    },

    /// Remove a document from the catalog by id.
    Remove {
        /// Record id.
        id: String,
    },

    /// Delete every record from the catalog.
    Reset,

    /// Start the HTTP JSON server on `[server].bind`.
    Serve,
}

fn parse_notify_mode(s: &str) -> Result<NotifyMode, String> {
    NotifyMode::parse(s).ok_or_else(|| format!("invalid notify mode '{}': use human, json or off", s))
}

fn load(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Catalog initialized successfully.");
        }
        Commands::Upload {
            paths,
            title,
            tags,
            notify,
        } => {
            let mode = notify.unwrap_or_else(NotifyMode::default_for_tty);
            ingest::run_upload(&cfg, &paths, title, tags, mode).await?;
        }
        Commands::Library {
            search,
            file_type,
            sort,
            page,
            watch,
        } => {
            let query = LibraryQuery {
                search,
                file_type: FileTypeFilter::parse(&file_type),
                sort,
                page,
            };
            library::run_library(&cfg, &query, watch).await?;
        }
        Commands::Remove { id } => {
            library::run_remove(&cfg, &id).await?;
        }
        Commands::Reset => {
            library::run_reset(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
