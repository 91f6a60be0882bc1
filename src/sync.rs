//! Index synchronization.
//!
//! Decides once per run whether the persisted collection still matches the
//! documents on disk, and rebuilds it only when it does not.
//!
//! ```text
//!   documents? ──no──▶ NoDocuments (fail)
//!      │
//!      ▼
//!   WaitingForStore ──retries exhausted──▶ fail
//!      │
//!      ▼
//!   CheckingFreshness ──state + probe + digest all agree──▶ ReuseExisting
//!      │
//!      ▼ (anything else, or the probe errors)
//!   Rebuild: load → chunk → embed → delete old → write → save state
//!      │
//!      └──any step fails──▶ RebuildFailed
//! ```
//!
//! The side file is written last, so a crash mid-rebuild never leaves it
//! vouching for a partial collection. The whole check-then-rebuild section
//! runs under [`RebuildLock`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chunk::{ChunkingError, RecursiveSplitter};
use crate::config::{Config, IndexConfig, UnreadableFilePolicy};
use crate::embedding::create_embedder;
use crate::fingerprint;
use crate::loader::{self, DocumentFile};
use crate::models::{Chunk, CorpusFingerprint, IndexState};
use crate::search::Retriever;
use crate::sqlite_store::SqliteStore;
use crate::state::{self, RebuildLock};
use docqa_core::embedding::Embedder;
use docqa_core::store::VectorStore;

/// Synchronizer states, logged as they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    NoDocuments,
    WaitingForStore,
    CheckingFreshness,
    ReuseExisting,
    Rebuild,
    RebuildFailed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoDocuments => "no_documents",
            Self::WaitingForStore => "waiting_for_store",
            Self::CheckingFreshness => "checking_freshness",
            Self::ReuseExisting => "reuse_existing",
            Self::Rebuild => "rebuild",
            Self::RebuildFailed => "rebuild_failed",
        };
        f.write_str(name)
    }
}

/// Failures that leave no usable index.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("vector store unreachable after {attempts} attempts: {last_error}")]
    StoreUnavailable { attempts: u32, last_error: String },

    #[error("documents directory does not exist: {}", .0.display())]
    MissingDocumentsDir(PathBuf),

    #[error("no eligible documents found in {}", .0.display())]
    NoDocuments(PathBuf),

    #[error("none of the eligible documents could be read as UTF-8 text: {0}")]
    NoReadableDocuments(String),

    #[error("chunking produced no chunks")]
    NoChunks,

    #[error("index rebuild failed: {0}")]
    RebuildFailed(String),

    #[error("could not take rebuild lock: {0}")]
    Lock(String),
}

impl SyncError {
    /// Terminal state the machine halted in.
    pub fn state(&self) -> SyncState {
        match self {
            Self::MissingDocumentsDir(_)
            | Self::NoDocuments(_)
            | Self::NoReadableDocuments(_) => SyncState::NoDocuments,
            Self::StoreUnavailable { .. } => SyncState::WaitingForStore,
            Self::NoChunks | Self::RebuildFailed(_) | Self::Lock(_) => SyncState::RebuildFailed,
        }
    }
}

/// Which terminal success path was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Reused,
    Rebuilt,
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub action: SyncAction,
    /// State that now describes the collection.
    pub state: IndexState,
    pub fingerprint: CorpusFingerprint,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Skip the freshness check and rebuild unconditionally.
    pub force: bool,
}

/// Why a freshness check did not allow reuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    Forced,
    NoState,
    DigestChanged,
    CollectionChanged,
    UnreadableFiles(Vec<String>),
    EmptyCollection,
    ProbeFailed(String),
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forced => write!(f, "rebuild forced"),
            Self::NoState => write!(f, "no saved index state"),
            Self::DigestChanged => write!(f, "documents changed"),
            Self::CollectionChanged => write!(f, "collection name changed"),
            Self::UnreadableFiles(files) => {
                write!(f, "unreadable files: {}", files.join(", "))
            }
            Self::EmptyCollection => write!(f, "collection missing or empty"),
            Self::ProbeFailed(e) => write!(f, "collection probe failed: {}", e),
        }
    }
}

/// Block until `store` answers a ping, trying at most `attempts` times.
///
/// Returns the number of attempts used.
pub async fn wait_for_store<S: VectorStore + ?Sized>(
    store: &S,
    attempts: u32,
    interval: Duration,
) -> Result<u32, SyncError> {
    let attempts = attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match store.ping().await {
            Ok(()) => {
                debug!(attempt, "vector store ready");
                return Ok(attempt);
            }
            Err(e) => {
                last_error = e.to_string();
                info!(attempt, attempts, error = %e, "waiting for vector store");
                if attempt < attempts {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    Err(SyncError::StoreUnavailable {
        attempts,
        last_error,
    })
}

/// The freshness checks that need no store: the saved state must vouch for
/// this digest and collection, and skipped files must be acceptable under
/// `index.on_unreadable_file`.
pub fn compare_saved_state(
    saved: Option<&IndexState>,
    fingerprint: &CorpusFingerprint,
    index: &IndexConfig,
) -> Result<(), StaleReason> {
    let saved = saved.ok_or(StaleReason::NoState)?;
    if saved.collection != index.collection {
        return Err(StaleReason::CollectionChanged);
    }
    if !saved.matches(&fingerprint.digest, &index.collection) {
        return Err(StaleReason::DigestChanged);
    }
    if !fingerprint.is_complete() && index.on_unreadable_file == UnreadableFilePolicy::Rebuild {
        return Err(StaleReason::UnreadableFiles(fingerprint.skipped.clone()));
    }
    Ok(())
}

/// Map a collection probe to the last freshness condition.
pub fn interpret_probe(probe: Result<bool, String>) -> Result<(), StaleReason> {
    match probe {
        Ok(true) => Ok(()),
        Ok(false) => Err(StaleReason::EmptyCollection),
        Err(e) => Err(StaleReason::ProbeFailed(e)),
    }
}

/// Keeps one collection in step with the documents directory.
pub struct IndexSynchronizer<'a, S: ?Sized, E: ?Sized> {
    config: &'a Config,
    store: &'a S,
    embedder: &'a E,
}

impl<'a, S, E> IndexSynchronizer<'a, S, E>
where
    S: VectorStore + ?Sized,
    E: Embedder + ?Sized,
{
    pub fn new(config: &'a Config, store: &'a S, embedder: &'a E) -> Self {
        Self {
            config,
            store,
            embedder,
        }
    }

    /// Run the state machine to a terminal state.
    pub async fn sync(&self, options: SyncOptions) -> Result<SyncOutcome, SyncError> {
        let result = self.run(options).await;
        if let Err(e) = &result {
            warn!(state = %e.state(), error = %e, "index synchronization failed");
        }
        result
    }

    async fn run(&self, options: SyncOptions) -> Result<SyncOutcome, SyncError> {
        let files = self.eligible_files()?;

        enter(SyncState::WaitingForStore);
        wait_for_store(
            self.store,
            self.config.store.connect_retries,
            self.config.store.retry_interval(),
        )
        .await?;

        let _lock = RebuildLock::acquire(&self.config.index.state_file)
            .await
            .map_err(|e| SyncError::Lock(format!("{:#}", e)))?;

        enter(SyncState::CheckingFreshness);
        let fingerprint = fingerprint::fingerprint_files(&files);
        info!(
            digest = %fingerprint.digest,
            files = fingerprint.files_hashed,
            skipped = fingerprint.skipped.len(),
            "computed corpus fingerprint"
        );

        match self.check_freshness(&fingerprint, options).await {
            Ok(state) => {
                enter(SyncState::ReuseExisting);
                info!(collection = %state.collection, "using existing vector index");
                Ok(SyncOutcome {
                    action: SyncAction::Reused,
                    state,
                    fingerprint,
                })
            }
            Err(reason) => {
                enter(SyncState::Rebuild);
                info!(reason = %reason, "rebuilding vector index");
                let state = self.rebuild(&files, &fingerprint).await?;
                Ok(SyncOutcome {
                    action: SyncAction::Rebuilt,
                    state,
                    fingerprint,
                })
            }
        }
    }

    fn eligible_files(&self) -> Result<Vec<DocumentFile>, SyncError> {
        let dir = &self.config.documents.dir;
        if !dir.is_dir() {
            enter(SyncState::NoDocuments);
            return Err(SyncError::MissingDocumentsDir(dir.clone()));
        }
        let files = loader::discover(&self.config.documents)
            .map_err(|e| SyncError::RebuildFailed(format!("listing documents: {:#}", e)))?;
        if files.is_empty() {
            enter(SyncState::NoDocuments);
            return Err(SyncError::NoDocuments(dir.clone()));
        }
        debug!(files = %loader::file_names(&files), "eligible documents");
        Ok(files)
    }

    /// The saved state when the collection can be reused, otherwise why not.
    pub async fn check_freshness(
        &self,
        fingerprint: &CorpusFingerprint,
        options: SyncOptions,
    ) -> Result<IndexState, StaleReason> {
        if options.force {
            return Err(StaleReason::Forced);
        }

        let index = &self.config.index;
        let saved = state::read_state(&index.state_file, &index.collection);
        compare_saved_state(saved.as_ref(), fingerprint, index)?;
        let probe = self
            .store
            .probe(&index.collection)
            .await
            .map_err(|e| e.to_string());
        interpret_probe(probe)?;
        saved.ok_or(StaleReason::NoState)
    }

    async fn rebuild(
        &self,
        files: &[DocumentFile],
        fingerprint: &CorpusFingerprint,
    ) -> Result<IndexState, SyncError> {
        let collection = &self.config.index.collection;

        let docs = loader::load_documents(files);
        info!(count = docs.len(), "loaded documents");
        if docs.is_empty() {
            enter(SyncState::NoDocuments);
            return Err(SyncError::NoReadableDocuments(loader::file_names(files)));
        }

        let splitter = RecursiveSplitter::new(
            self.config.chunking.chunk_size,
            self.config.chunking.chunk_overlap,
        )
        .map_err(|e| SyncError::RebuildFailed(e.to_string()))?;

        let chunks = splitter.split_documents(&docs).map_err(|e| match e {
            ChunkingError::NoDocuments => {
                enter(SyncState::NoDocuments);
                SyncError::NoDocuments(self.config.documents.dir.clone())
            }
            ChunkingError::NoChunks => SyncError::NoChunks,
        })?;
        info!(count = chunks.len(), "split documents into chunks");

        let vectors = self.embed_chunks(&chunks).await?;

        // Usually the collection is simply absent. A failed delete of a
        // collection that still holds records would mix old and new chunks.
        if let Err(e) = self.store.delete_collection(collection).await {
            if matches!(self.store.probe(collection).await, Ok(true)) {
                return Err(failed(format!("replacing collection: {:#}", e)));
            }
            debug!(collection = %collection, error = %e, "no previous collection removed");
        }

        self.store
            .write_all(collection, &chunks, &vectors)
            .await
            .map_err(|e| failed(format!("writing collection: {:#}", e)))?;

        let state = IndexState {
            digest: fingerprint.digest.clone(),
            collection: collection.clone(),
            document_count: docs.len(),
            chunk_count: chunks.len(),
            built_at: Some(Utc::now()),
        };
        state::write_state(&self.config.index.state_file, &state)
            .map_err(|e| failed(format!("saving index state: {:#}", e)))?;

        info!(
            collection = %collection,
            documents = state.document_count,
            chunks = state.chunk_count,
            "vector index rebuilt"
        );
        Ok(state)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, SyncError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let batch_size = self.config.embedding.batch_size.max(1);
        let total_batches = texts.len().div_ceil(batch_size);
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(batch_size).enumerate() {
            debug!(batch = i + 1, of = total_batches, size = batch.len(), "embedding batch");
            let embedded = self
                .embedder
                .embed(batch)
                .await
                .map_err(|e| failed(format!("embedding chunks: {:#}", e)))?;
            if embedded.len() != batch.len() {
                return Err(failed(format!(
                    "embedder returned {} vectors for {} chunks",
                    embedded.len(),
                    batch.len()
                )));
            }
            vectors.extend(embedded);
        }

        Ok(vectors)
    }
}

/// A synchronized index ready for queries.
pub struct OpenIndex {
    pub retriever: Retriever<Arc<SqliteStore>, Box<dyn Embedder>>,
    pub outcome: SyncOutcome,
}

/// Build the configured store and embedder, synchronize, and hand back a
/// retriever over the result.
pub async fn open_index(config: &Config, options: SyncOptions) -> anyhow::Result<OpenIndex> {
    let store = Arc::new(SqliteStore::new(&config.store.url)?);
    let embedder = create_embedder(&config.embedding)?;

    let outcome = IndexSynchronizer::new(config, &*store, &*embedder)
        .sync(options)
        .await?;

    Ok(OpenIndex {
        retriever: Retriever::new(store, embedder, config.index.collection.clone()),
        outcome,
    })
}

/// `docqa sync`: bring the index up to date and report what happened.
pub async fn run_sync(config: &Config, force: bool) -> anyhow::Result<()> {
    let index = open_index(config, SyncOptions { force }).await?;
    let outcome = &index.outcome;

    match outcome.action {
        SyncAction::Reused => println!("Index is up to date; reusing existing collection."),
        SyncAction::Rebuilt => println!(
            "Index rebuilt: {} documents, {} chunks.",
            outcome.state.document_count, outcome.state.chunk_count
        ),
    }
    println!("  Collection: {}", outcome.state.collection);
    println!("  Digest:     {}", outcome.fingerprint.digest);
    if !outcome.fingerprint.skipped.is_empty() {
        println!("  Skipped:    {}", outcome.fingerprint.skipped.join(", "));
    }
    index.retriever.store().close().await;
    Ok(())
}

fn enter(state: SyncState) {
    info!(state = %state, "index sync");
}

fn failed(reason: String) -> SyncError {
    enter(SyncState::RebuildFailed);
    SyncError::RebuildFailed(reason)
}
