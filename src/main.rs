//! # rag-index CLI (`ragx`)
//!
//! Builds and queries the document index from the command line.
//!
//! ## Usage
//!
//! ```bash
//! ragx --config ./config/ragx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragx refresh` | Scan the corpus, embed changed files, persist the index |
//! | `ragx search "<query>"` | Top-k chunks from the persisted index |
//! | `ragx reset` | Delete the index artifact and ledger |
//! | `ragx stats` | Summarize what is indexed |
//!
//! Results go to stdout; logs and progress go to stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use rag_index::config::{self, Config};
use rag_index::embedding::create_provider;
use rag_index::progress::ProgressMode;
use rag_index::{logging, stats, Indexer};

/// rag-index CLI — incremental document indexing and similarity retrieval.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/ragx.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "ragx",
    about = "rag-index — incremental document indexing and similarity retrieval",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the index up to date with a document directory.
    ///
    /// Unchanged corpora load the persisted index without embedding
    /// anything. Otherwise changed files are re-embedded and the index is
    /// rebuilt, saved, and the ledger committed.
    Refresh {
        /// Directory to scan. Defaults to `[corpus] root`.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Progress on stderr: auto (human if TTY), off, human, json.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Search the persisted index.
    Search {
        /// Natural-language query.
        query: String,

        /// Number of chunks to return. Defaults to `[retrieval] top_k`.
        #[arg(short, long)]
        k: Option<usize>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete the index artifact and ledger. Safe to run repeatedly.
    Reset,

    /// Show what the store contains.
    Stats {
        /// Print stats as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn build_indexer(cfg: &Config) -> anyhow::Result<Indexer> {
    let provider = create_provider(&cfg.embedding)?;
    Ok(Indexer::new(cfg.clone(), provider)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init(&cfg.logging);

    match cli.command {
        Commands::Refresh { dir, progress } => {
            let mode = ProgressMode::parse(&progress)?;
            let dir = dir.unwrap_or_else(|| cfg.corpus.root.clone());
            let indexer = build_indexer(&cfg)?.with_progress(mode.reporter());
            let report = indexer.refresh_report(&dir).await?;

            println!("refresh {}", dir.display());
            println!(
                "  files: {} ({} added, {} modified, {} removed, {} unchanged)",
                report.files, report.added, report.modified, report.removed, report.unchanged
            );
            println!("  chunks: {}", report.chunks);
            if report.rebuilt {
                println!("  embedded: {}", report.embedded);
                println!("  reused: {}", report.reused);
                println!("  rebuilt: yes");
            } else {
                println!("  rebuilt: no (loaded persisted index)");
            }
            println!("ok");
        }
        Commands::Search { query, k, json } => {
            let indexer = build_indexer(&cfg)?;
            indexer.warm_start().await?;
            let k = k.unwrap_or(cfg.retrieval.top_k);
            let hits = indexer.search(&query, k).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&hits)?);
                return Ok(());
            }
            if hits.is_empty() {
                println!("No results.");
                return Ok(());
            }
            for (i, hit) in hits.iter().enumerate() {
                match hit.page {
                    Some(page) => println!(
                        "{}. [{:.2}] {} (page {}, chunk {})",
                        i + 1,
                        hit.score,
                        hit.source,
                        page,
                        hit.seq
                    ),
                    None => println!(
                        "{}. [{:.2}] {} (chunk {})",
                        i + 1,
                        hit.score,
                        hit.source,
                        hit.seq
                    ),
                }
                println!("    excerpt: \"{}\"", excerpt(&hit.text, 240));
                println!();
            }
        }
        Commands::Reset => {
            // Reset must work even when the provider cannot be constructed.
            let indexer = Indexer::new(cfg.clone(), Arc::new(rag_index::embedding::DisabledProvider))?;
            indexer.reset().await?;
            println!("Index reset.");
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
    }

    Ok(())
}

/// First `max` chars of `text` on one line.
fn excerpt(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}…", cut.trim_end())
}
