//! Generation backend: turns an [`LLMClient`] into a bounded fragment channel.
//!
//! Each streaming call spawns a producer task that pumps the model's stream
//! into a `tokio::sync::mpsc` channel. The consumer side is a [`TokenStream`].
//! Dropping it closes the channel, and the producer stops on its next send or
//! as soon as it notices the closed receiver, dropping the model request.

use crate::llm::client::{GenerationParams, LLMClient};
use crate::types::Result;
use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One item of a generated reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Token(String),
    /// Terminal failure. Nothing follows it.
    Error(String),
}

/// Consumer end of a streaming generation.
pub struct TokenStream {
    receiver: mpsc::Receiver<Fragment>,
}

impl TokenStream {
    pub fn new(receiver: mpsc::Receiver<Fragment>) -> Self {
        Self { receiver }
    }
}

impl Stream for TokenStream {
    type Item = Fragment;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

pub struct GenerationBackend {
    client: Arc<dyn LLMClient>,
    params: GenerationParams,
    capacity: usize,
}

impl GenerationBackend {
    pub fn new(client: Arc<dyn LLMClient>, params: GenerationParams, capacity: usize) -> Self {
        Self {
            client,
            params,
            capacity: capacity.max(1),
        }
    }

    /// Sampling parameters used when the caller does not supply its own.
    pub fn default_params(&self) -> &GenerationParams {
        &self.params
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    pub async fn generate(
        &self,
        prompt: &str,
        role: &str,
        params: &GenerationParams,
    ) -> Result<String> {
        self.client.generate(prompt, role, params).await
    }

    /// Start generating in the background and return the fragment stream.
    ///
    /// The stream is finite. Failures arrive as a single [`Fragment::Error`].
    pub fn generate_stream(
        &self,
        prompt: String,
        role: String,
        params: GenerationParams,
    ) -> TokenStream {
        let (tx, rx) = mpsc::channel(self.capacity);
        let client = Arc::clone(&self.client);

        tokio::spawn(async move {
            let opened = tokio::select! {
                _ = tx.closed() => {
                    debug!("Consumer dropped before generation started");
                    return;
                }
                opened = client.stream(&prompt, &role, &params) => opened,
            };

            let mut fragments = match opened {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(error = %e, "Generation failed to start");
                    let _ = tx.send(Fragment::Error(e.to_string())).await;
                    return;
                }
            };

            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        debug!("Consumer dropped, stopping generation");
                        break;
                    }
                    next = fragments.next() => next,
                };

                match next {
                    Some(Ok(token)) => {
                        if tx.send(Fragment::Token(token)).await.is_err() {
                            debug!("Consumer dropped, stopping generation");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Generation stream failed");
                        let _ = tx.send(Fragment::Error(e.to_string())).await;
                        break;
                    }
                    None => break,
                }
            }
        });

        TokenStream::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AppError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Emits `parts`, optionally followed by an error, counting pulled items.
    struct ScriptedClient {
        parts: Vec<&'static str>,
        fail_after: bool,
        pulled: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LLMClient for ScriptedClient {
        async fn generate(&self, _: &str, _: &str, _: &GenerationParams) -> Result<String> {
            Ok(self.parts.concat())
        }

        async fn stream(
            &self,
            _: &str,
            _: &str,
            _: &GenerationParams,
        ) -> Result<Box<dyn Stream<Item = Result<String>> + Send + Unpin>> {
            let mut items: Vec<Result<String>> =
                self.parts.iter().map(|p| Ok(p.to_string())).collect();
            if self.fail_after {
                items.push(Err(AppError::Backend("connection reset".to_string())));
            }
            let pulled = Arc::clone(&self.pulled);
            Ok(Box::new(futures::stream::iter(items).inspect(move |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            })))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    fn backend(
        parts: Vec<&'static str>,
        fail_after: bool,
        capacity: usize,
    ) -> (GenerationBackend, Arc<AtomicUsize>) {
        let pulled = Arc::new(AtomicUsize::new(0));
        let client = ScriptedClient {
            parts,
            fail_after,
            pulled: Arc::clone(&pulled),
        };
        (
            GenerationBackend::new(Arc::new(client), GenerationParams::default(), capacity),
            pulled,
        )
    }

    #[tokio::test]
    async fn test_fragments_in_order() {
        let (backend, _) = backend(vec!["Hel", "lo", "!"], false, 4);
        let fragments: Vec<Fragment> = backend
            .generate_stream("p".into(), "user".into(), GenerationParams::default())
            .collect()
            .await;

        assert_eq!(
            fragments,
            vec![
                Fragment::Token("Hel".into()),
                Fragment::Token("lo".into()),
                Fragment::Token("!".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_error_is_single_terminal_fragment() {
        let (backend, _) = backend(vec!["partial"], true, 4);
        let fragments: Vec<Fragment> = backend
            .generate_stream("p".into(), "user".into(), GenerationParams::default())
            .collect()
            .await;

        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0], Fragment::Token("partial".into()));
        assert!(matches!(&fragments[1], Fragment::Error(msg) if msg.contains("connection reset")));
    }

    #[tokio::test]
    async fn test_dropping_consumer_stops_producer() {
        let parts: Vec<&'static str> = vec!["x"; 1000];
        let (backend, pulled) = backend(parts, false, 1);

        let mut stream =
            backend.generate_stream("p".into(), "user".into(), GenerationParams::default());
        assert_eq!(stream.next().await, Some(Fragment::Token("x".into())));
        drop(stream);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pulled.load(Ordering::SeqCst) < 10);
    }

    #[tokio::test]
    async fn test_generate_complete() {
        let (backend, _) = backend(vec!["a", "b"], false, 4);
        let reply = backend
            .generate("p", "user", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(reply, "ab");
        assert_eq!(backend.model_name(), "scripted");
    }
}
