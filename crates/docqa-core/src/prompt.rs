//! Context assembly for the answer service.
//!
//! Combines the static system context, the retrieved chunks and the user's
//! question into one payload, followed by one of two instruction blocks
//! depending on whether anything was retrieved. Output is a pure function
//! of the inputs.
//!
//! Layout:
//!
//! ```text
//! <system context>
//!
//! ## Relevant Documentation Found:      (only when results exist)
//! --- Document Chunk (Distance: 0.123) ---
//! Source: documents/a.md
//! Content: ...
//!
//! ## User Question:
//! <question>
//!
//! ## Instructions:
//! <found / not-found instruction>
//! ```

use crate::models::SearchResult;

pub const FOUND_INSTRUCTIONS: &str = "Answer the user's question using the relevant \
documentation above, keeping in mind the system context. If the documentation doesn't \
contain enough information to fully answer the question, say so clearly.";

pub const NOT_FOUND_INSTRUCTIONS: &str = "No relevant documentation was found for this \
question. Please let the user know that you couldn't find specific information about \
their question in the knowledge base.";

/// Which instruction block was appended to the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionTemplate {
    DocumentationFound,
    NoDocumentation,
}

impl InstructionTemplate {
    pub fn for_results(results: &[SearchResult]) -> Self {
        if results.is_empty() {
            Self::NoDocumentation
        } else {
            Self::DocumentationFound
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Self::DocumentationFound => FOUND_INSTRUCTIONS,
            Self::NoDocumentation => NOT_FOUND_INSTRUCTIONS,
        }
    }
}

/// The composed payload plus the template that was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledContext {
    pub payload: String,
    pub template: InstructionTemplate,
}

/// Format one retrieved chunk as a documentation block.
pub fn format_chunk_block(result: &SearchResult) -> String {
    format!(
        "--- Document Chunk (Distance: {:.3}) ---\nSource: {}\nContent: {}",
        result.distance, result.chunk.source_id, result.chunk.text
    )
}

/// Build the payload sent to the answer service.
///
/// Chunk blocks appear in the same order as `results`.
pub fn assemble(
    system_context: &str,
    question: &str,
    results: &[SearchResult],
) -> AssembledContext {
    let template = InstructionTemplate::for_results(results);
    let mut payload = String::new();

    payload.push_str(system_context.trim());
    payload.push_str("\n\n");

    if template == InstructionTemplate::DocumentationFound {
        let blocks: Vec<String> = results.iter().map(format_chunk_block).collect();
        payload.push_str("## Relevant Documentation Found:\n");
        payload.push_str(&blocks.join("\n\n"));
        payload.push_str("\n\n");
    }

    payload.push_str("## User Question:\n");
    payload.push_str(question);
    payload.push_str("\n\n## Instructions:\n");
    payload.push_str(template.text());
    payload.push('\n');

    AssembledContext { payload, template }
}
