//! Document discovery and loading.
//!
//! Lists the eligible files in the top level of the documents directory
//! (file names matching `documents.include_globs`, by default `*.txt` and
//! `*.md`) and reads them into [`Document`]s. Discovery order is sorted by
//! file name so every consumer sees the same sequence regardless of how the
//! filesystem enumerates entries.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::DocumentsConfig;
use crate::models::Document;

/// Characters of each document shown in the load log.
const PREVIEW_CHARS: usize = 100;

/// An eligible file in the documents directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFile {
    /// File name, the sort key.
    pub name: String,
    pub path: PathBuf,
}

/// List eligible files, sorted by name. Subdirectories are not descended.
///
/// # Errors
///
/// If the directory does not exist, cannot be listed, or a glob is invalid.
pub fn discover(config: &DocumentsConfig) -> Result<Vec<DocumentFile>> {
    let root = &config.dir;
    if !root.is_dir() {
        bail!("Documents directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut files = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !include_set.is_match(&name) {
            debug!(file = %name, "skipping ineligible file");
            continue;
        }
        files.push(DocumentFile {
            name,
            path: entry.into_path(),
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Read each file as UTF-8 text. Unreadable files are logged and skipped.
pub fn load_documents(files: &[DocumentFile]) -> Vec<Document> {
    let mut docs = Vec::with_capacity(files.len());

    for (i, file) in files.iter().enumerate() {
        match std::fs::read_to_string(&file.path) {
            Ok(text) => {
                info!(
                    n = i + 1,
                    source = %file.path.display(),
                    preview = %preview(&text),
                    "loaded document"
                );
                docs.push(Document::new(file.path.display().to_string(), text));
            }
            Err(e) => {
                warn!(
                    source = %file.path.display(),
                    error = %e,
                    "could not load document, skipping"
                );
            }
        }
    }

    docs
}

fn preview(text: &str) -> String {
    text.chars()
        .take(PREVIEW_CHARS)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Display helper for listing discovered files.
pub fn file_names(files: &[DocumentFile]) -> String {
    files
        .iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
