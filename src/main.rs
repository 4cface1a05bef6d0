//! # CodeContext CLI (`codectx`)
//!
//! The `codectx` binary drives the indexing service. It can initialize
//! the database, ingest a local checkout directly, run semantic searches
//! against an indexed project, and start the HTTP API used by the web UI.
//!
//! ## Usage
//!
//! ```bash
//! codectx --config ./config/codectx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `codectx init` | Create the SQLite database and run schema migrations |
//! | `codectx ingest <path>` | Index a local repository checkout |
//! | `codectx search <project> "<query>"` | Semantic search over a project |
//! | `codectx serve` | Start the HTTP API server |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use code_context::config;
use code_context::context::AppContext;
use code_context::ingest;
use code_context::migrate;
use code_context::retrieval::Retriever;
use code_context::server;

/// CodeContext — self-hosted code intelligence over your repositories.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/codectx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "codectx",
    about = "CodeContext — index repositories, ask questions, generate edits",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/codectx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Index a local repository checkout.
    ///
    /// Registers the directory as a project and runs the full ingestion
    /// pipeline in the foreground: discover files, chunk, embed, store.
    Ingest {
        /// Path to the repository root.
        path: PathBuf,

        /// Project name. Defaults to the directory name.
        #[arg(long)]
        name: Option<String>,
    },

    /// Semantic search over an indexed project.
    Search {
        /// Project id (see the API or the ingest output).
        project_id: i64,

        /// The search query.
        query: String,

        /// Maximum number of results to return.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Start the HTTP API server.
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
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest { path, name } => {
            migrate::run_migrations(&cfg).await?;
            let ctx = AppContext::init(cfg).await?;

            let repo_path = std::fs::canonicalize(&path)?;
            let name = name.unwrap_or_else(|| {
                repo_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "project".to_string())
            });

            let project_id = ingest::create_project(
                &ctx.pool,
                &name,
                "local",
                None,
                &repo_path.to_string_lossy(),
            )
            .await?;

            ingest::process_project(ctx.clone(), project_id, repo_path).await;

            let (status, total_files, total_chunks) =
                sqlx::query_as::<_, (String, i64, i64)>(
                    "SELECT status, total_files, total_chunks FROM projects WHERE id = ?",
                )
                .bind(project_id)
                .fetch_one(&ctx.pool)
                .await?;

            println!("project {project_id} ({name})");
            println!("  status: {status}");
            println!("  files indexed: {total_files}");
            println!("  chunks indexed: {total_chunks}");
            if status != "ready" {
                anyhow::bail!("ingestion failed — see logs above");
            }
        }
        Commands::Search {
            project_id,
            query,
            top_k,
        } => {
            let ctx = AppContext::init(cfg).await?;
            let retriever = Retriever::new(
                ctx.embedder.clone(),
                ctx.vectors.clone(),
                ctx.config.retrieval.top_k,
            );

            let chunks = retriever.retrieve(project_id, &query, top_k).await?;
            if chunks.is_empty() {
                println!("No results.");
                return Ok(());
            }

            for (i, chunk) in chunks.iter().enumerate() {
                let mut location = chunk.file_path.clone();
                if let Some(start) = chunk.start_line {
                    let end = chunk.end_line.unwrap_or(start);
                    location.push_str(&format!(":{start}-{end}"));
                }
                println!(
                    "{}. [{:.3}] {} — {} ({})",
                    i + 1,
                    1.0 - chunk.distance,
                    location,
                    chunk.symbol,
                    chunk.language
                );
                for line in chunk.code.lines().take(3) {
                    println!("    {line}");
                }
                println!();
            }
        }
        Commands::Serve => {
            migrate::run_migrations(&cfg).await?;
            let ctx = AppContext::init(cfg).await?;
            server::run_server(ctx).await?;
        }
    }

    Ok(())
}
