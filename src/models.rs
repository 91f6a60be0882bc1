//! Core data models used throughout docqa.
//!
//! Re-exported from `docqa-core` so application code can keep using
//! `crate::models::*` paths.

pub use docqa_core::models::*;
