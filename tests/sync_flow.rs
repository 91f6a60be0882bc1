//! End-to-end synchronizer behaviour against the in-memory and SQLite stores.

use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use docqa::config::{Config, UnreadableFilePolicy};
use docqa::models::IndexState;
use docqa::search::{answer_question, Retriever};
use docqa::sqlite_store::SqliteStore;
use docqa::state;
use docqa::sync::{IndexSynchronizer, SyncAction, SyncError, SyncOptions};
use docqa_core::embedding::Embedder;
use docqa_core::prompt::InstructionTemplate;
use docqa_core::store::memory::InMemoryStore;
use docqa_core::store::VectorStore;

const DIMS: usize = 32;

/// Hashes lowercase words into a fixed number of buckets. Counts calls so
/// tests can tell whether a rebuild embedded anything.
#[derive(Default)]
struct BagOfWords {
    calls: AtomicUsize,
}

impl BagOfWords {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut h = DefaultHasher::new();
            word.to_lowercase().hash(&mut h);
            v[(h.finish() % DIMS as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

fn config_in(root: &Path) -> Config {
    let mut config = Config::default();
    config.documents.dir = root.join("documents");
    config.documents.manifest = root.join("context.md");
    config.index.state_file = root.join("data").join("document_hash.txt");
    config.store.url = format!(
        "sqlite:{}",
        root.join("data").join("vectordb.sqlite").display()
    );
    config.store.connect_retries = 3;
    config.store.retry_interval_ms = 0;
    config
}

fn write_docs(config: &Config, docs: &[(&str, &str)]) {
    fs::create_dir_all(&config.documents.dir).unwrap();
    for (name, body) in docs {
        fs::write(config.documents.dir.join(name), body).unwrap();
    }
}

const BILLING: &str = "Refunds are issued within five business days.\n\n\
Invoices are emailed on the first day of every month.";
const SHIPPING: &str = "Orders ship from the central warehouse.\n\n\
Express delivery arrives the next morning.";

#[tokio::test]
async fn test_unchanged_corpus_rebuilds_once() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    write_docs(&config, &[("billing.md", BILLING), ("shipping.txt", SHIPPING)]);

    let store = InMemoryStore::new();
    let embedder = BagOfWords::default();
    let sync = IndexSynchronizer::new(&config, &store, &embedder);

    let first = sync.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(first.action, SyncAction::Rebuilt);
    assert_eq!(first.state.document_count, 2);
    assert!(first.state.chunk_count >= 2);
    let embeds_after_first = embedder.calls();
    assert!(embeds_after_first > 0);

    let second = sync.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(second.action, SyncAction::Reused);
    assert_eq!(second.state.digest, first.state.digest);
    assert_eq!(store.write_count(), 1);
    assert_eq!(embedder.calls(), embeds_after_first);

    let saved = state::read_state(&config.index.state_file, &config.index.collection).unwrap();
    assert_eq!(saved.digest, first.fingerprint.digest);
}

#[tokio::test]
async fn test_changed_content_triggers_rebuild() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    write_docs(&config, &[("billing.md", BILLING)]);

    let store = InMemoryStore::new();
    let embedder = BagOfWords::default();
    let sync = IndexSynchronizer::new(&config, &store, &embedder);
    let first = sync.sync(SyncOptions::default()).await.unwrap();

    write_docs(&config, &[("billing.md", "Refunds are issued within ten business days.")]);
    let second = sync.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(second.action, SyncAction::Rebuilt);
    assert_ne!(second.state.digest, first.state.digest);
    assert_eq!(store.len(&config.index.collection), second.state.chunk_count);

    // Adding an eligible file also counts as a change; ineligible ones do not.
    write_docs(&config, &[("notes.pdf", "binary")]);
    let third = sync.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(third.action, SyncAction::Reused);
    write_docs(&config, &[("shipping.txt", SHIPPING)]);
    let fourth = sync.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(fourth.action, SyncAction::Rebuilt);
}

#[tokio::test]
async fn test_empty_collection_forces_rebuild() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    write_docs(&config, &[("billing.md", BILLING)]);

    let store = InMemoryStore::new();
    let embedder = BagOfWords::default();
    let sync = IndexSynchronizer::new(&config, &store, &embedder);
    sync.sync(SyncOptions::default()).await.unwrap();

    // State still claims freshness but the collection is gone.
    store.delete_collection(&config.index.collection).await.unwrap();
    let outcome = sync.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(outcome.action, SyncAction::Rebuilt);
    assert!(!store.is_empty(&config.index.collection));
}

#[tokio::test]
async fn test_state_for_other_collection_is_not_trusted() {
    let tmp = TempDir::new().unwrap();
    let mut config = config_in(tmp.path());
    write_docs(&config, &[("billing.md", BILLING)]);

    let store = InMemoryStore::new();
    let embedder = BagOfWords::default();
    IndexSynchronizer::new(&config, &store, &embedder)
        .sync(SyncOptions::default())
        .await
        .unwrap();

    config.index.collection = "renamed".to_string();
    let outcome = IndexSynchronizer::new(&config, &store, &embedder)
        .sync(SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.action, SyncAction::Rebuilt);
    assert_eq!(outcome.state.collection, "renamed");
}

#[tokio::test]
async fn test_corrupt_state_file_means_rebuild() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    write_docs(&config, &[("billing.md", BILLING)]);

    let store = InMemoryStore::new();
    let embedder = BagOfWords::default();
    let sync = IndexSynchronizer::new(&config, &store, &embedder);
    sync.sync(SyncOptions::default()).await.unwrap();

    fs::write(&config.index.state_file, "{ truncated").unwrap();
    let outcome = sync.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(outcome.action, SyncAction::Rebuilt);
    // The rebuild rewrote a valid state file.
    assert!(state::read_state(&config.index.state_file, &config.index.collection).is_some());
}

#[tokio::test]
async fn test_legacy_plain_digest_matching_current_content_is_reused() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    write_docs(&config, &[("billing.md", BILLING)]);

    let store = InMemoryStore::new();
    let embedder = BagOfWords::default();
    let sync = IndexSynchronizer::new(&config, &store, &embedder);
    let first = sync.sync(SyncOptions::default()).await.unwrap();

    fs::write(&config.index.state_file, format!("{}\n", first.state.digest)).unwrap();
    let outcome = sync.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(outcome.action, SyncAction::Reused);
}

#[tokio::test]
async fn test_unreachable_store_fails_after_bounded_retries() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    write_docs(&config, &[("billing.md", BILLING)]);

    let store = InMemoryStore::new();
    store.set_available(false);
    let embedder = BagOfWords::default();
    let err = IndexSynchronizer::new(&config, &store, &embedder)
        .sync(SyncOptions::default())
        .await
        .unwrap_err();

    match err {
        SyncError::StoreUnavailable { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.ping_count(), 3);
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_empty_documents_dir_reports_no_documents() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    write_docs(&config, &[("readme.pdf", "not eligible")]);

    let store = InMemoryStore::new();
    let embedder = BagOfWords::default();
    let err = IndexSynchronizer::new(&config, &store, &embedder)
        .sync(SyncOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NoDocuments(_)));
    assert_eq!(store.write_count(), 0);
}

#[tokio::test]
async fn test_whitespace_only_documents_report_no_chunks() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    write_docs(&config, &[("blank.md", "   \n\n  ")]);

    let store = InMemoryStore::new();
    let embedder = BagOfWords::default();
    let err = IndexSynchronizer::new(&config, &store, &embedder)
        .sync(SyncOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NoChunks));
    assert!(!config.index.state_file.exists());
}

#[tokio::test]
async fn test_non_utf8_file_follows_unreadable_policy() {
    let tmp = TempDir::new().unwrap();
    let mut config = config_in(tmp.path());
    write_docs(&config, &[("billing.md", BILLING)]);
    fs::write(config.documents.dir.join("legacy.txt"), [b'c', b'a', b'f', 0xe9]).unwrap();

    let store = InMemoryStore::new();
    let embedder = BagOfWords::default();
    let first = IndexSynchronizer::new(&config, &store, &embedder)
        .sync(SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(first.action, SyncAction::Rebuilt);
    assert_eq!(first.fingerprint.skipped, vec!["legacy.txt".to_string()]);
    assert_eq!(first.state.document_count, 1);

    let lenient = IndexSynchronizer::new(&config, &store, &embedder)
        .sync(SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(lenient.action, SyncAction::Reused);

    config.index.on_unreadable_file = UnreadableFilePolicy::Rebuild;
    let strict = IndexSynchronizer::new(&config, &store, &embedder)
        .sync(SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(strict.action, SyncAction::Rebuilt);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_file_policy() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new().unwrap();
    let mut config = config_in(tmp.path());
    write_docs(&config, &[("billing.md", BILLING), ("secret.md", "hidden")]);

    let store = InMemoryStore::new();
    let embedder = BagOfWords::default();
    IndexSynchronizer::new(&config, &store, &embedder)
        .sync(SyncOptions::default())
        .await
        .unwrap();

    let secret = config.documents.dir.join("secret.md");
    fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read(&secret).is_ok() {
        // Running as root; permissions are not enforced.
        return;
    }

    // Lenient default: the file silently drops out of the digest, which
    // now differs from the saved one, so this run rebuilds without it.
    let lenient = IndexSynchronizer::new(&config, &store, &embedder)
        .sync(SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(lenient.action, SyncAction::Rebuilt);
    assert_eq!(lenient.fingerprint.skipped, vec!["secret.md".to_string()]);
    let again = IndexSynchronizer::new(&config, &store, &embedder)
        .sync(SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(again.action, SyncAction::Reused);

    config.index.on_unreadable_file = UnreadableFilePolicy::Rebuild;
    let strict = IndexSynchronizer::new(&config, &store, &embedder)
        .sync(SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(strict.action, SyncAction::Rebuilt);

    fs::set_permissions(&secret, fs::Permissions::from_mode(0o644)).unwrap();
}

#[tokio::test]
async fn test_sqlite_end_to_end_and_retrieval() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    write_docs(&config, &[("billing.md", BILLING), ("shipping.txt", SHIPPING)]);

    let store = Arc::new(SqliteStore::new(&config.store.url).unwrap());
    let embedder = Arc::new(BagOfWords::default());

    let first = IndexSynchronizer::new(&config, &*store, &*embedder)
        .sync(SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(first.action, SyncAction::Rebuilt);
    assert_eq!(
        store.count(&config.index.collection).await.unwrap() as usize,
        first.state.chunk_count
    );
    store.close().await;

    // A fresh process sees the persisted collection and reuses it.
    let reopened = Arc::new(SqliteStore::new(&config.store.url).unwrap());
    let second = IndexSynchronizer::new(&config, &*reopened, &*embedder)
        .sync(SyncOptions::default())
        .await
        .unwrap();
    assert_eq!(second.action, SyncAction::Reused);

    let retriever = Retriever::new(
        reopened.clone(),
        embedder.clone(),
        config.index.collection.clone(),
    );
    let results = retriever.search("When are refunds issued?", 2).await.unwrap();
    assert!(!results.is_empty() && results.len() <= 2);
    assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert!(results[0].chunk.text.contains("Refunds"));
    assert!(results[0].chunk.source_id.ends_with("billing.md"));

    let outcome = answer_question(&retriever, None, "ctx", "When are refunds issued?", 3)
        .await
        .unwrap();
    assert_eq!(outcome.context.template, InstructionTemplate::DocumentationFound);
    assert!(outcome.answer.is_none());
}

#[tokio::test]
async fn test_sqlite_rebuild_replaces_previous_chunks() {
    let tmp = TempDir::new().unwrap();
    let config = config_in(tmp.path());
    write_docs(&config, &[("billing.md", "Refunds take five days.")]);

    let store = SqliteStore::new(&config.store.url).unwrap();
    let embedder = BagOfWords::default();
    let sync = IndexSynchronizer::new(&config, &store, &embedder);
    sync.sync(SyncOptions::default()).await.unwrap();

    write_docs(&config, &[("billing.md", "Refunds take ten days.")]);
    let changed = sync.sync(SyncOptions::default()).await.unwrap();
    assert_eq!(changed.action, SyncAction::Rebuilt);
    assert_eq!(
        store.count(&config.index.collection).await.unwrap() as usize,
        changed.state.chunk_count
    );

    let forced = sync.sync(SyncOptions { force: true }).await.unwrap();
    assert_eq!(forced.action, SyncAction::Rebuilt);
    assert_eq!(
        store.count(&config.index.collection).await.unwrap() as usize,
        forced.state.chunk_count
    );

    let results = store
        .query(&config.index.collection, &BagOfWords::vector("refunds"), 10)
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.chunk.text.contains("ten")));
    store.close().await;
}

#[tokio::test]
async fn test_retrieval_failure_yields_not_found_template() {
    let store = Arc::new(InMemoryStore::new());
    let retriever = Retriever::new(store.clone(), BagOfWords::default(), "document_search");
    store.set_available(false);

    let outcome = answer_question(&retriever, None, "ctx", "anything?", 3)
        .await
        .unwrap();
    assert!(outcome.results.is_empty());
    assert_eq!(outcome.context.template, InstructionTemplate::NoDocumentation);
}

#[test]
fn test_index_state_round_trips_through_side_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("state.json");
    let state = IndexState {
        digest: "abc".to_string(),
        collection: "document_search".to_string(),
        document_count: 3,
        chunk_count: 9,
        built_at: None,
    };
    state::write_state(&path, &state).unwrap();
    assert_eq!(state::read_state(&path, "document_search"), Some(state));
}
