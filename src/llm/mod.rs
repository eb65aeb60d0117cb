//! LLM Provider Clients and Generation Backend
//!
//! Providers sit behind the [`LLMClient`] trait and are chosen once from
//! configuration through the closed [`Provider`] enum. The
//! [`GenerationBackend`] wraps a client and exposes both complete and
//! streaming generation, the latter as a bounded channel of [`Fragment`]s.
//!
//! # Supported Providers
//!
//! - `ollama` - Local Ollama server (Cargo feature, enabled by default)
//! - `openai` - OpenAI and compatible chat completions endpoints (Cargo feature,
//!   enabled by default)
//!
//! # Example
//!
//! ```ignore
//! use tianqi::llm::{GenerationBackend, GenerationParams, Provider};
//!
//! let provider = Provider::Ollama {
//!     base_url: "http://localhost:11434".to_string(),
//!     model: "llama3.2".to_string(),
//! };
//! let client = provider.create_client("You are a helpful assistant").await?;
//! let backend = GenerationBackend::new(client.into(), GenerationParams::default(), 64);
//!
//! let mut fragments = backend.generate_stream(prompt, "user".into(), GenerationParams::default());
//! while let Some(fragment) = fragments.next().await { /* ... */ }
//! ```

/// Bounded producer/consumer wrapper around a client's token stream.
pub mod backend;
/// Core LLM client trait and provider selection.
pub mod client;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(feature = "openai")]
pub mod openai;

/// System message sent ahead of every request unless configured otherwise.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant";

pub use backend::{Fragment, GenerationBackend, TokenStream};
pub use client::{GenerationParams, LLMClient, Provider};
