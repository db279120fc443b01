//! # Clearview CLI (`clearview`)
//!
//! The `clearview` binary runs the HTTP service and offers one-shot access
//! to the report and narration flows.
//!
//! ## Usage
//!
//! ```bash
//! clearview --config ./config/clearview.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `clearview init` | Create the SQLite database and run schema migrations |
//! | `clearview serve` | Start the HTTP server |
//! | `clearview report <input>` | Analyze a URL, file, or text and write the PDF report |
//! | `clearview report <input> --narrate` | Report and MP3 together, from one extraction |
//! | `clearview narrate <input>` | Narrate a URL, file, or text to MP3 |
//! | `clearview get <report\|audio> <id>` | Write a stored record to disk |
//!
//! Secrets (`OPENAI_API_KEY`, `ELEVENLABS_API_KEY`) are read from the
//! environment, or from a `.env` file in the working directory.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clearview::config::{self, Config};
use clearview::models::ArtifactKind;
use clearview::{get, migrate, produce, server};

const DEFAULT_CONFIG: &str = "./config/clearview.toml";

/// Clearview: document risk analysis with PDF reports and narrated audio.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. When the default file is absent, built-in defaults are used.
#[derive(Parser)]
#[command(
    name = "clearview",
    about = "Clearview: summarize and assess documents, produce PDF reports and narrated audio",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the `records` table.
    /// Running it more than once is safe.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Analyze input and write the PDF report.
    Report {
        /// A URL, a path to a .pdf/.txt/.md file, or raw text.
        input: String,

        /// Output file. Defaults to a name derived from the title.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Also narrate the content; the MP3 is written next to the report.
        #[arg(long)]
        narrate: bool,

        /// Voice id for the primary speech provider (with `--narrate`).
        #[arg(long, requires = "narrate")]
        voice: Option<String>,
    },

    /// Narrate input to MP3.
    Narrate {
        /// A URL, a path to a .pdf/.txt/.md file, or raw text.
        input: String,

        /// Voice id for the primary speech provider.
        #[arg(long)]
        voice: Option<String>,

        /// Output file. Defaults to a name derived from the title.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Write a stored record to disk.
    Get {
        /// Record kind: `report` or `audio`.
        kind: ArtifactKind,

        /// Record id (UUID).
        id: String,

        /// Output file. Defaults to a name derived from the title.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG) {
        tracing::info!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::minimal());
    }
    config::load_config(path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cfg = load(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Report {
            input,
            out,
            narrate: true,
            voice,
        } => {
            produce::run_report_and_narrate(&cfg, &input, voice.as_deref(), out).await?;
        }
        Commands::Report { input, out, .. } => {
            produce::run_report(&cfg, &input, out).await?;
        }
        Commands::Narrate { input, voice, out } => {
            produce::run_narrate(&cfg, &input, voice.as_deref(), out).await?;
        }
        Commands::Get { kind, id, out } => {
            get::run_get(&cfg, kind, &id, out).await?;
        }
    }

    Ok(())
}
