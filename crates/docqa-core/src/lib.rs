//! # docqa core
//!
//! Pure logic shared by the `docqa` application: data models, the
//! recursive character chunker, the [`store::VectorStore`] capability
//! trait (with an in-memory implementation), the [`embedding::Embedder`]
//! trait, the [`search::Retriever`], prompt assembly and cost estimation.
//!
//! This crate contains no tokio, sqlx, filesystem or network code. The
//! application crate supplies concrete stores, embedders and the answer
//! service.

pub mod chunk;
pub mod embedding;
pub mod models;
pub mod pricing;
pub mod prompt;
pub mod search;
pub mod store;
