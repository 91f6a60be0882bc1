//! Recursive text chunking.
//!
//! Re-exported from `docqa-core`; see [`docqa_core::chunk`].

pub use docqa_core::chunk::*;
