//! # ragops CLI
//!
//! One binary for the API server, the frontend proxy and a few operator
//! commands that run the same pipelines locally.
//!
//! ## Usage
//!
//! ```bash
//! ragops --config ./config/ragops.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragops init` | Create the audit table, bucket and Chroma collection |
//! | `ragops serve api` | Start the HTTP API |
//! | `ragops serve proxy` | Start the frontend proxy |
//! | `ragops upload <path>` | Ingest a local file |
//! | `ragops ask "<query>"` | Answer a question and record it in the audit log |
//! | `ragops audit` | Show recent audit entries |
//!
//! A missing config file is not an error: built-in defaults apply, then
//! environment overrides (`MINIO_ENDPOINT`, `CHROMA_URL`, `OLLAMA_HOST`, ...).
//! Log verbosity follows `RUST_LOG` (default `ragops=info,tower_http=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragops::audit::SqliteAuditLog;
use ragops::{commands, config, proxy, server};

/// ragops: upload documents, ask questions, keep an audit trail.
#[derive(Parser)]
#[command(
    name = "ragops",
    about = "ragops: a minimal retrieval-augmented generation service",
    version,
    long_about = "ragops stores uploads in an S3-compatible object store, indexes them in Chroma, \
    answers questions with an Ollama model using the closest documents as context, and records \
    every answered question in a SQLite audit log."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragops.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare the audit database, the bucket and the vector collection.
    ///
    /// Idempotent. Also warns when Ollama cannot be reached.
    Init,

    /// Start a server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },

    /// Ingest a local file.
    ///
    /// The file name (without directories) becomes the object key and the
    /// `source` recorded in the index.
    Upload {
        /// File to upload.
        path: PathBuf,
    },

    /// Ask a question against the indexed documents.
    Ask {
        /// The question.
        query: String,

        /// Ollama model (defaults to `[generation].default_model`).
        #[arg(long)]
        model: Option<String>,
    },

    /// Show recent audit entries, newest first.
    Audit {
        /// Number of entries to show.
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// HTTP API on `[server].bind`.
    Api,

    /// Frontend proxy on `[proxy].bind`, forwarding to `[proxy].backend_url`.
    Proxy,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ragops=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            commands::run_init(&cfg).await?;
        }
        Commands::Serve { service } => match service {
            ServeService::Api => server::run_server(&cfg).await?,
            ServeService::Proxy => proxy::run_proxy(&cfg).await?,
        },
        Commands::Upload { path } => {
            let service = server::build_services(&cfg).await?;
            commands::run_upload(&service, &path).await?;
        }
        Commands::Ask { query, model } => {
            let service = server::build_services(&cfg).await?;
            commands::run_ask(&service, &query, model.as_deref()).await?;
        }
        Commands::Audit { limit } => {
            let audit = SqliteAuditLog::open(&cfg.db).await?;
            commands::run_audit(&audit, limit).await?;
        }
    }

    Ok(())
}
