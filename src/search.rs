//! Question answering over the synchronized index.
//!
//! One question flows through retrieve → assemble → (optionally) generate.
//! Retrieval failures have already been turned into an empty result list
//! by the [`Retriever`]; generation failures are kept alongside the
//! results so both can be shown.

use anyhow::Result;
use tracing::warn;

use crate::answer::{Answer, AnswerError, AnswerService};
use crate::config::Config;
use crate::context::load_system_context;
use crate::models::SearchResult;
use crate::sync::{self, SyncOptions};
use docqa_core::embedding::Embedder;
use docqa_core::prompt::{assemble, AssembledContext};
use docqa_core::store::VectorStore;

pub use docqa_core::search::{Retriever, DEFAULT_K};

const RULE: usize = 60;

/// Everything produced for one question.
#[derive(Debug)]
pub struct QueryOutcome {
    pub question: String,
    pub results: Vec<SearchResult>,
    pub context: AssembledContext,
    /// `None` when generation was not requested.
    pub answer: Option<Result<Answer, AnswerError>>,
}

impl QueryOutcome {
    pub fn generation_requested(&self) -> bool {
        self.answer.is_some()
    }
}

/// Retrieve, assemble and, when `answerer` is given, generate.
///
/// # Errors
///
/// Only for an invalid `k`.
pub async fn answer_question<S, E>(
    retriever: &Retriever<S, E>,
    answerer: Option<&dyn AnswerService>,
    system_context: &str,
    question: &str,
    k: usize,
) -> Result<QueryOutcome>
where
    S: VectorStore,
    E: Embedder,
{
    let results = retriever.search(question, k).await?;
    let context = assemble(system_context, question, &results);

    let answer = match answerer {
        Some(service) => {
            let generated = service.generate(&context.payload).await;
            if let Err(e) = &generated {
                warn!(error = %e, "answer generation failed");
            }
            Some(generated)
        }
        None => None,
    };

    Ok(QueryOutcome {
        question: question.to_string(),
        results,
        context,
        answer,
    })
}

/// Numbered result blocks, or a notice when there are none.
pub fn render_results(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "No relevant documents found in vector database.\n".to_string();
    }

    let mut out = String::new();
    for (i, result) in results.iter().enumerate() {
        out.push_str(&format!("\nRESULT {}:\n", i + 1));
        out.push_str(&format!(
            "Distance Score: {:.3} (lower = more similar)\n",
            result.distance
        ));
        out.push_str(&format!("Content: {}\n", result.chunk.text));
        out.push_str(&format!("Source: {}\n", result.chunk.source_id));
        out.push_str(&"-".repeat(40));
        out.push('\n');
    }
    out
}

/// Full display for one question: answer first, then results, then the
/// raw payload and usage when generation was requested.
pub fn render_outcome(outcome: &QueryOutcome) -> String {
    let rule = "=".repeat(RULE);
    let thin = "-".repeat(RULE);
    let mut out = format!("\n{}\nQUESTION: {}\n{}\n", rule, outcome.question, rule);

    match &outcome.answer {
        Some(Ok(answer)) => {
            out.push_str(&format!("\n--- ANSWER ---\n{}\n{}\n", answer.text, thin));
        }
        Some(Err(e)) => {
            out.push_str(&format!("\nError: {}\n{}\n", e, thin));
        }
        None => {}
    }

    if !outcome.results.is_empty() {
        out.push_str("\n--- VECTOR SEARCH RESULTS ---\n");
    }
    out.push_str(&render_results(&outcome.results));

    if outcome.generation_requested() {
        out.push_str("\n--- RAW CONTEXT SENT TO MODEL ---\n");
        out.push_str("(For debugging - this was sent to the API)\n");
        out.push_str(&format!("{}\n{}\n{}\n", thin, outcome.context.payload, thin));
    }

    if let Some(Ok(answer)) = &outcome.answer {
        out.push('\n');
        out.push_str(&answer.usage_report());
    }

    out
}

/// `docqa search`: print the closest chunks for `query`.
pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let index = sync::open_index(config, SyncOptions::default()).await?;
    let k = k.unwrap_or(config.retrieval.default_k);

    println!("Searching for '{}'...", query);
    let results = index.retriever.search(query, k).await?;
    print!("{}", render_results(&results));
    Ok(())
}

/// `docqa ask`: answer one question, optionally with generation.
pub async fn run_ask(
    config: &Config,
    question: &str,
    k: Option<usize>,
    generate: bool,
) -> Result<()> {
    let index = sync::open_index(config, SyncOptions::default()).await?;
    let system_context =
        load_system_context(&config.documents.manifest, &config.documents.fallback_context);
    let answerer = if generate {
        Some(crate::answer::AnthropicClient::from_config(&config.answer)?)
    } else {
        None
    };

    let outcome = answer_question(
        &index.retriever,
        answerer.as_ref().map(|a| a as &dyn AnswerService),
        &system_context,
        question,
        k.unwrap_or(config.retrieval.default_k),
    )
    .await?;

    print!("{}", render_outcome(&outcome));
    Ok(())
}
