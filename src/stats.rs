//! Store statistics and health overview.
//!
//! Summarizes what is persisted: the index artifact (model, dimension,
//! chunking, chunk counts per source) and the ledger, and flags where the two
//! disagree. The artifact is saved before the ledger is committed, so a crash
//! in between leaves the artifact ahead of the ledger: sources it holds for
//! content the ledger has not recorded yet. Sources the ledger tracks but the
//! artifact lacks mean the artifact is missing or unusable. The next refresh
//! repairs both. Used by `ragx stats`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::IndexError;
use crate::ledger::HashLedger;
use crate::vector_index::{ArtifactInfo, VectorIndex};

#[derive(Debug, Serialize)]
pub struct StoreStats {
    /// `None` when no usable artifact exists.
    pub artifact: Option<ArtifactInfo>,
    pub ledger_files: usize,
    /// Ledger sources with no chunks in the artifact.
    pub unindexed: Vec<String>,
    /// Artifact sources whose file digest the ledger does not record.
    pub uncommitted: Vec<String>,
}

pub async fn collect_stats(config: &Config) -> Result<StoreStats> {
    let artifact = match VectorIndex::inspect(&config.store.index_path()).await {
        Ok(info) => Some(info),
        Err(IndexError::IndexNotFound { .. }) => None,
        Err(e) => return Err(e.into()),
    };
    let ledger = HashLedger::load(&config.store.ledger_path()).await?;

    let empty = BTreeMap::new();
    let by_source = artifact.as_ref().map(|a| &a.by_source).unwrap_or(&empty);
    let unindexed = ledger
        .entries()
        .keys()
        .filter(|source| !by_source.contains_key(*source))
        .cloned()
        .collect();
    let uncommitted = artifact
        .as_ref()
        .map(|a| {
            a.digests
                .iter()
                .filter(|(source, digest)| ledger.get(source) != Some(digest.as_str()))
                .map(|(source, _)| source.clone())
                .collect()
        })
        .unwrap_or_default();

    Ok(StoreStats {
        artifact,
        ledger_files: ledger.len(),
        unindexed,
        uncommitted,
    })
}

/// Run the stats command: inspect the store and print a summary.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let stats = collect_stats(config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("ragx — Index Stats");
    println!("==================");
    println!();
    println!("  Store:       {}", config.store.dir.display());

    let Some(info) = &stats.artifact else {
        println!("  Index:       none (run `ragx refresh`)");
        println!("  Ledger:      {} files", stats.ledger_files);
        println!();
        return Ok(());
    };

    println!("  Size:        {}", format_bytes(info.bytes));
    println!("  Model:       {} ({} dims)", info.meta.model, info.meta.dims);
    println!(
        "  Chunking:    {} chars, {} overlap",
        info.meta.chunking.chunk_size, info.meta.chunking.chunk_overlap
    );
    println!("  Built:       {}", format_relative(info.meta.built_at));
    println!();
    println!("  Sources:     {}", info.by_source.len());
    println!("  Chunks:      {}", info.chunks);
    println!("  Ledger:      {} files", stats.ledger_files);

    if !info.by_source.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<48} {:>8}", "SOURCE", "CHUNKS");
        println!("  {}", "-".repeat(58));
        for (source, n) in &info.by_source {
            println!("  {:<48} {:>8}", source, n);
        }
    }

    if !stats.unindexed.is_empty() {
        println!();
        println!("  In ledger but not indexed (next refresh reprocesses them):");
        for source in &stats.unindexed {
            println!("    {}", source);
        }
    }

    if !stats.uncommitted.is_empty() {
        println!();
        println!("  Indexed but not in ledger (next refresh re-embeds them):");
        for source in &stats.uncommitted {
            println!("    {}", source);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// "3 hours ago" for recent times, otherwise `YYYY-MM-DD HH:MM`.
fn format_relative(at: DateTime<Utc>) -> String {
    let delta = (Utc::now() - at).num_seconds();

    if delta < 0 {
        at.format("%Y-%m-%d %H:%M").to_string()
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        at.format("%Y-%m-%d %H:%M").to_string()
    }
}
