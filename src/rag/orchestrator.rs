//! RAG orchestrator: retrieval, prompt building and generation merged into
//! one event stream.
//!
//! A chat stream is always `context`, then zero or more `token`s, then one
//! terminal `done` or `error`. A retrieval failure skips straight to the
//! terminal `error`.

use crate::llm::backend::{Fragment, GenerationBackend};
use crate::llm::client::GenerationParams;
use crate::protocol::StreamEvent;
use crate::rag::retrieval::RetrievalService;
use async_stream::stream;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

const PREAMBLE: &str = "You are a helpful assistant. Answer the question using the reference \
material below. If the material does not contain the answer, say so and answer from your own \
knowledge.";

/// Separator placed between retrieved chunks in the context block.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RagState {
    Idle,
    Retrieving,
    Prompting,
    Generating,
    Done,
    Error,
}

fn transition(from: RagState, to: RagState) -> RagState {
    debug!(?from, ?to, "RAG state transition");
    to
}

/// Build the augmented prompt for `query` over `context`.
pub fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "{}\n\nReference material:\n{}\n\nQuestion: {}",
        PREAMBLE, context, query
    )
}

pub struct RagOrchestrator {
    retrieval: Arc<RetrievalService>,
    backend: Arc<GenerationBackend>,
}

impl RagOrchestrator {
    pub fn new(retrieval: Arc<RetrievalService>, backend: Arc<GenerationBackend>) -> Self {
        Self { retrieval, backend }
    }

    /// Answer `query` using the `k` best matching chunks as context.
    pub fn chat(
        &self,
        query: String,
        k: usize,
        params: GenerationParams,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let retrieval = Arc::clone(&self.retrieval);
        let backend = Arc::clone(&self.backend);

        stream! {
            let mut state = RagState::Idle;

            state = transition(state, RagState::Retrieving);
            let texts = match retrieval.similarity_search(&query, k).await {
                Ok(texts) => texts,
                Err(e) => {
                    warn!(error = %e, "Retrieval failed");
                    transition(state, RagState::Error);
                    yield StreamEvent::Error(e.to_string());
                    return;
                }
            };
            debug!(retrieved = texts.len(), k, "Retrieved context");

            state = transition(state, RagState::Prompting);
            let context = texts.join(CONTEXT_SEPARATOR);
            let prompt = build_prompt(&context, &query);

            let mut fragments = backend.generate_stream(prompt, "user".to_string(), params);
            state = transition(state, RagState::Generating);
            yield StreamEvent::Context(context);

            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Fragment::Token(token) => yield StreamEvent::Token(token),
                    Fragment::Error(message) => {
                        transition(state, RagState::Error);
                        yield StreamEvent::Error(message);
                        return;
                    }
                }
            }

            transition(state, RagState::Done);
            yield StreamEvent::Done;
        }
    }

    /// Plain chat with no retrieval: tokens then a terminal event.
    pub fn casual(
        &self,
        content: String,
        role: String,
        params: Option<GenerationParams>,
    ) -> impl Stream<Item = StreamEvent> + Send + 'static {
        let params = params.unwrap_or(*self.backend.default_params());
        let mut fragments = self.backend.generate_stream(content, role, params);

        stream! {
            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Fragment::Token(token) => yield StreamEvent::Token(token),
                    Fragment::Error(message) => {
                        yield StreamEvent::Error(message);
                        return;
                    }
                }
            }
            yield StreamEvent::Done;
        }
    }
}
