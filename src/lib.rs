//! # docqa
//!
//! Local document question answering: keeps a vector index of a documents
//! directory in step with its content, retrieves the chunks closest to a
//! question, and optionally asks a language model to answer from them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────┐
//! │  documents/ │──▶│ Synchronizer │──▶│  SQLite  │
//! │  *.txt *.md │   │ hash → chunk │   │ vectors  │
//! └─────────────┘   │    → embed   │   └────┬─────┘
//!                   └──────────────┘        │
//!                                           ▼
//!        ┌────────┐   ┌──────────┐   ┌───────────┐
//!        │ Answer │◀──│  Prompt  │◀──│ Retriever │
//!        └────────┘   └──────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa init                         # create store and documents dir
//! docqa sync                         # build or reuse the index
//! docqa search "refund policy"       # nearest chunks
//! docqa ask "How do refunds work?" --generate
//! docqa chat                         # interactive loop
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types |
//! | [`loader`] | Document discovery and loading |
//! | [`fingerprint`] | Corpus digest |
//! | [`state`] | Index-state side file and rebuild lock |
//! | [`chunk`] | Recursive text chunking |
//! | [`embedding`] | Embedding providers |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`sync`] | Index synchronization |
//! | [`search`] | Retrieval and question answering |
//! | [`answer`] | Anthropic answer service |
//! | [`context`] | System context manifest |
//! | [`shell`] | Interactive loop |
//! | [`status`] | Index status report |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod fingerprint;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod search;
pub mod shell;
pub mod sqlite_store;
pub mod state;
pub mod status;
pub mod sync;
