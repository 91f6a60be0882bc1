//! Interactive question loop (`docqa chat`).
//!
//! Prompts for a question, a result count and whether to generate an
//! answer, then prints the outcome. Nothing a single question does can end
//! the loop; only an exit keyword or end of input does.

use anyhow::Result;
use std::io::{BufRead, Write};
use tracing::info;

use crate::answer::{AnswerService, AnthropicClient};
use crate::config::Config;
use crate::context::load_system_context;
use crate::search::{answer_question, render_outcome, Retriever};
use crate::sync::{self, SyncAction, SyncOptions};
use docqa_core::embedding::Embedder;
use docqa_core::store::VectorStore;

const EXIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

/// Help printed when the index cannot be prepared.
pub const SETUP_HELP: &str = "\
Setup help:
1. Make sure the vector store is reachable (store.url / DATABASE_URL)
2. Check that documents are in the configured documents directory
3. Verify the embedding provider settings";

/// One parsed round of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompted {
    Question {
        question: String,
        k: usize,
        generate: bool,
    },
    Quit,
}

/// Everything a chat session needs per question.
pub struct Session<S, E> {
    pub retriever: Retriever<S, E>,
    pub answerer: Box<dyn AnswerService>,
    pub system_context: String,
    pub default_k: usize,
}

fn is_exit_word(s: &str) -> bool {
    let lower = s.to_lowercase();
    EXIT_WORDS.contains(&lower.as_str())
}

/// Print `prompt` and read one trimmed line; `None` at end of input.
fn ask<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    prompt: &str,
) -> std::io::Result<Option<String>> {
    write!(out, "{}", prompt)?;
    out.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Read a question, a positive result count and the generation flag.
///
/// Empty questions and invalid counts are re-prompted in place.
pub fn prompt_query<R: BufRead, W: Write>(
    input: &mut R,
    out: &mut W,
    default_k: usize,
) -> std::io::Result<Prompted> {
    let question = loop {
        writeln!(out, "\n{}", "=".repeat(60))?;
        match ask(input, out, "Enter your question about the documents: ")? {
            None => return Ok(Prompted::Quit),
            Some(q) if q.is_empty() => writeln!(out, "Please enter a question.")?,
            Some(q) if is_exit_word(&q) => return Ok(Prompted::Quit),
            Some(q) => break q,
        }
    };

    let k_prompt = format!("How many similar results do you want? (default={}): ", default_k);
    let k = loop {
        let raw = match ask(input, out, &k_prompt)? {
            None => return Ok(Prompted::Quit),
            Some(raw) => raw,
        };
        if raw.is_empty() {
            break default_k;
        }
        match raw.parse::<i64>() {
            Ok(n) if n > 0 => break n as usize,
            Ok(_) => writeln!(out, "Please enter a positive number.")?,
            Err(_) => writeln!(out, "Please enter a valid number.")?,
        }
    };

    let generate = match ask(input, out, "Generate an answer? (y/N): ")? {
        None => return Ok(Prompted::Quit),
        Some(flag) => matches!(flag.to_lowercase().as_str(), "y" | "yes"),
    };

    Ok(Prompted::Question {
        question,
        k,
        generate,
    })
}

/// Run the question loop until an exit keyword or end of input.
pub async fn chat_loop<S, E, R, W>(
    session: &Session<S, E>,
    mut input: R,
    mut out: W,
) -> Result<()>
where
    S: VectorStore,
    E: Embedder,
    R: BufRead,
    W: Write,
{
    loop {
        let prompted = prompt_query(&mut input, &mut out, session.default_k)?;
        let (question, k, generate) = match prompted {
            Prompted::Quit => {
                writeln!(out, "Goodbye!")?;
                return Ok(());
            }
            Prompted::Question {
                question,
                k,
                generate,
            } => (question, k, generate),
        };

        writeln!(out, "\nSearching for '{}'...", question)?;
        let answerer = if generate {
            Some(session.answerer.as_ref())
        } else {
            None
        };

        let outcome = answer_question(
            &session.retriever,
            answerer,
            &session.system_context,
            &question,
            k,
        )
        .await;
        match outcome {
            Ok(outcome) => write!(out, "{}", render_outcome(&outcome))?,
            Err(e) => {
                writeln!(out, "Error: {}", e)?;
                writeln!(out, "Please try again.")?;
            }
        }
    }
}

/// `docqa chat`: synchronize the index, then run the loop on stdin/stdout.
pub async fn run_chat(config: &Config) -> Result<()> {
    println!("Document Search System");
    println!("{}", "=".repeat(60));

    let index = sync::open_index(config, SyncOptions::default()).await?;

    println!("System ready!");
    if index.outcome.action == SyncAction::Reused {
        println!("Using existing vector index; it rebuilds only when documents change.");
    }
    println!(
        "Add documents to {} and restart to update.",
        config.documents.dir.display()
    );
    println!("Type 'quit', 'exit' or 'q' to stop.");

    let answerer = AnthropicClient::from_config(&config.answer)?;
    if answerer.has_credential() {
        info!(model = answerer.model(), "answer service configured");
    } else {
        println!(
            "Note: {} is not set; generated answers will report an error.",
            config.answer.api_key_env
        );
    }

    let session = Session {
        retriever: index.retriever,
        answerer: Box::new(answerer),
        system_context: load_system_context(
            &config.documents.manifest,
            &config.documents.fallback_context,
        ),
        default_k: config.retrieval.default_k,
    };

    let stdin = std::io::stdin();
    chat_loop(&session, stdin.lock(), std::io::stdout()).await
}
