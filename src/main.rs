//! # Campaign RAG CLI (`crag`)
//!
//! The `crag` binary loads a campaign graph, builds the vector artifacts,
//! answers questions, and serves the chat endpoint.
//!
//! ## Usage
//!
//! ```bash
//! crag --config ./config/crag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crag init` | Create the SQLite graph database and schema |
//! | `crag import <manifest>` | Upsert keywords, resources and talents from a manifest |
//! | `crag index build --manifest <file>` | Embed the manifest and write the vector artifacts |
//! | `crag keywords` | List the keyword hierarchy |
//! | `crag scope <keyword>` | Show descendants and resource hop counts for a keyword |
//! | `crag ask "<question>"` | Answer one question |
//! | `crag serve` | Start the HTTP chat server |
//!
//! ## Examples
//!
//! ```bash
//! crag init
//! crag import demos/campaign.json --propagate-from kw_lv --types shopping
//! crag index build --manifest demos/campaign.json
//! crag ask "what bags are in the louis vuitton campaign?" --types shopping
//! crag serve
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use campaign_rag::chat::{self, QueryInput};
use campaign_rag::{config, db, embedding, index, manifest, migrate, server};

/// Campaign RAG — keyword-scoped retrieval-augmented answers over a
/// campaign graph.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/crag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "crag",
    about = "Campaign RAG — keyword-scoped retrieval-augmented chat over a campaign graph",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/crag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the graph database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Import a campaign manifest (JSON) into the graph database.
    Import {
        /// Path to the manifest file.
        manifest: PathBuf,

        /// Delete all existing keywords, resources and talents first.
        #[arg(long)]
        wipe: bool,

        /// Root keyword ids whose subtree tags are propagated downward
        /// (comma-separated).
        #[arg(long, value_delimiter = ',')]
        propagate_from: Vec<String>,

        /// Resource types to propagate (comma-separated).
        #[arg(long, value_delimiter = ',', default_value = "shopping")]
        types: Vec<String>,
    },

    /// Manage the vector artifacts.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// List all keywords.
    Keywords,

    /// Show the scope of a keyword: descendants and resource hop counts.
    Scope {
        /// Keyword id or exact name.
        keyword: String,

        /// Traversal depth (defaults to `[retrieval].max_depth`).
        #[arg(long)]
        max_depth: Option<u32>,
    },

    /// Answer a question.
    Ask {
        /// The question.
        question: String,

        /// Keyword names allowed to answer (`all` by default).
        #[arg(long, value_delimiter = ',')]
        enabled: Vec<String>,

        /// Keyword names that force a refusal.
        #[arg(long, value_delimiter = ',')]
        disabled: Vec<String>,

        /// Resource types allowed into the answer (`all` by default).
        #[arg(long = "types", value_delimiter = ',')]
        resource_types: Vec<String>,

        /// Number of context resources.
        #[arg(long)]
        top_k: Option<usize>,

        /// Resolve to this keyword id directly.
        #[arg(long)]
        keyword_id: Option<String>,

        /// Resolve to this keyword name before matching the question.
        #[arg(long)]
        keyword_name: Option<String>,

        /// Print `{ answer, sources }` as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP chat server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum IndexAction {
    /// Embed a manifest per `[index].scope` and write the artifacts to `[index].dir`.
    Build {
        /// Path to the manifest file.
        #[arg(long)]
        manifest: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.graph.path.display());
        }
        Commands::Import {
            manifest: path,
            wipe,
            propagate_from,
            types,
        } => {
            let data = manifest::load_manifest(&path)?;
            let pool = db::connect(&cfg).await?;
            migrate::apply_schema(&pool).await?;
            if wipe {
                manifest::wipe(&pool).await?;
            }
            let stats =
                manifest::import_manifest(&pool, &data, &cfg.retrieval.default_type).await?;
            println!(
                "Imported {} keywords ({} placeholders), {} resources, {} talents, {} tags",
                stats.keywords, stats.placeholders, stats.resources, stats.talents, stats.tags
            );
            if !propagate_from.is_empty() {
                let added = manifest::propagate(&pool, &propagate_from, &types).await?;
                println!("Propagated {} tags", added);
            }
            pool.close().await;
        }
        Commands::Index {
            action: IndexAction::Build { manifest: path },
        } => {
            let embedder = embedding::create_embedder(&cfg.embedding)?;
            let summary = index::build_index(&cfg, &path, embedder.as_ref()).await?;
            println!(
                "Indexed {} rows ({} dims, model {}) into {}",
                summary.rows,
                summary.dims,
                summary.model,
                cfg.index.dir.display()
            );
        }
        Commands::Keywords => {
            chat::run_keywords(&cfg).await?;
        }
        Commands::Scope { keyword, max_depth } => {
            chat::run_scope(&cfg, &keyword, max_depth).await?;
        }
        Commands::Ask {
            question,
            enabled,
            disabled,
            resource_types,
            top_k,
            keyword_id,
            keyword_name,
            json,
        } => {
            let input = QueryInput {
                message: question,
                top_k,
                enabled,
                disabled,
                resource_types,
                keyword_id,
                keyword_name,
            };
            chat::run_ask(&cfg, input, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
