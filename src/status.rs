//! Index status overview.
//!
//! Compares the current corpus fingerprint with the saved index state and
//! checks the collection in the store, without changing anything. Used by
//! `docqa status` to tell whether the next run will reuse or rebuild.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::{Config, IndexConfig};
use crate::fingerprint;
use crate::loader;
use crate::models::{CorpusFingerprint, IndexState};
use crate::sqlite_store::SqliteStore;
use crate::state;
use crate::sync::{compare_saved_state, interpret_probe, StaleReason};
use docqa_core::store::VectorStore;

/// Expected outcome of the next synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Fresh,
    Stale(StaleReason),
    NoDocuments,
}

/// Run the status command: inspect and print a summary.
pub async fn run_status(config: &Config) -> Result<()> {
    let files = if config.documents.dir.is_dir() {
        loader::discover(&config.documents)?
    } else {
        Vec::new()
    };
    let fingerprint = fingerprint::fingerprint_files(&files);
    let saved = state::read_state(&config.index.state_file, &config.index.collection);

    let store = SqliteStore::new(&config.store.url)?;
    let probe = match store.ping().await {
        Ok(()) => store.probe(&config.index.collection).await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    let records = match &probe {
        Ok(true) => store.count(&config.index.collection).await.ok(),
        _ => None,
    };
    store.close().await;

    println!("docqa Index Status");
    println!("=================");
    println!();
    println!("  Documents:   {}", config.documents.dir.display());
    println!("  Eligible:    {}", files.len());
    if !files.is_empty() {
        println!("  Files:       {}", loader::file_names(&files));
    }
    if !fingerprint.skipped.is_empty() {
        println!("  Unreadable:  {}", fingerprint.skipped.join(", "));
    }
    println!("  Digest:      {}", fingerprint.digest);
    println!();
    println!("  State file:  {}", config.index.state_file.display());
    match &saved {
        Some(s) => {
            println!("  Saved:       {}", s.digest);
            println!(
                "  Built:       {} ({} documents, {} chunks)",
                s.built_at.map_or_else(|| "unknown".to_string(), format_built_at),
                s.document_count,
                s.chunk_count
            );
        }
        None => println!("  Saved:       none"),
    }
    println!();
    println!("  Store:       {}", config.store.url);
    println!("  Collection:  {}", config.index.collection);
    match &probe {
        Ok(true) => println!("  Records:     {}", records.unwrap_or(0)),
        Ok(false) => println!("  Records:     0 (missing or empty)"),
        Err(e) => println!("  Records:     unknown (store unreachable: {})", e),
    }
    println!();

    let next = verdict(
        files.len(),
        &fingerprint,
        saved.as_ref(),
        &config.index,
        probe.clone(),
    );
    match next {
        Verdict::Fresh => println!("  Next run:    reuse existing index"),
        Verdict::Stale(reason) => println!("  Next run:    rebuild ({})", reason),
        Verdict::NoDocuments => println!("  Next run:    fail (no eligible documents)"),
    }
    println!();

    Ok(())
}

/// Predict what the synchronizer will do, using the same checks as
/// [`IndexSynchronizer::check_freshness`](crate::sync::IndexSynchronizer::check_freshness).
pub fn verdict(
    file_count: usize,
    fingerprint: &CorpusFingerprint,
    saved: Option<&IndexState>,
    index: &IndexConfig,
    probe: Result<bool, String>,
) -> Verdict {
    if file_count == 0 {
        return Verdict::NoDocuments;
    }
    match compare_saved_state(saved, fingerprint, index).and_then(|()| interpret_probe(probe)) {
        Ok(()) => Verdict::Fresh,
        Err(reason) => Verdict::Stale(reason),
    }
}

fn format_built_at(ts: DateTime<Utc>) -> String {
    let delta = Utc::now().signed_duration_since(ts).num_seconds();

    if delta < 0 {
        return ts.format("%Y-%m-%d %H:%M").to_string();
    }

    if delta < 60 {
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
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}
