//! HTTP client for a tianqi server.
//!
//! Chat calls return an [`EventReceiver`]: a worker task owns the HTTP
//! response, decodes it line by line and forwards events over a bounded
//! channel. Dropping the receiver stops the worker and closes the connection.
//! Failures never escape as `Err`; they arrive as one error event.

use super::codec::LineDecoder;
use super::StreamEvent;
use crate::rag::chunker::TextChunker;
use crate::rag::ingest::{prepare_folder, PreparedChunks};
use crate::types::{
    AddTextsRequest, AppError, CasualChatRequest, ChangeEmbeddingModelRequest,
    DeleteByIndexRequest, HealthResponse, RagChatRequest, Result, SearchRequest, StatusResponse,
    UpdateTextRequest,
};
use crate::utils::toml_config::ClientConfig;
use async_stream::stream;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tianqi_vector::SearchHit;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const EVENT_BUFFER: usize = 64;

/// Decode a chat response body into events.
///
/// A non-success status or transport failure yields exactly one error event.
/// The stream always ends with a terminal event.
pub fn decode_response(response: reqwest::Response) -> impl Stream<Item = StreamEvent> + Send {
    stream! {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = server_error_message(status, &body);
            warn!(%status, "Chat request rejected");
            yield StreamEvent::Error(AppError::Protocol(message).to_string());
            return;
        }

        let mut decoder = LineDecoder::new();
        let mut bytes = response.bytes_stream();

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for event in decoder.feed(&chunk) {
                        yield event;
                    }
                    if decoder.is_finished() {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Chat stream interrupted");
                    yield StreamEvent::Error(
                        AppError::Protocol(format!("transport error: {}", e)).to_string(),
                    );
                    return;
                }
            }
        }

        for event in decoder.finish() {
            yield event;
        }
    }
}

fn server_error_message(status: reqwest::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    if detail.is_empty() {
        format!("server returned {}", status)
    } else {
        format!("server returned {}: {}", status, detail)
    }
}

/// Consumer side of a chat stream driven by a background worker.
pub struct EventReceiver {
    receiver: mpsc::Receiver<StreamEvent>,
}

impl EventReceiver {
    /// Next event, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.receiver.recv().await
    }
}

impl Stream for EventReceiver {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Client for the `/rag/*`, `/casual/*` and `/health` routes.
#[derive(Clone)]
pub struct RagClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl RagClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Stream a retrieval-augmented answer.
    pub fn chat(&self, query: impl Into<String>, k: Option<usize>) -> EventReceiver {
        let body = RagChatRequest {
            query: query.into(),
            k,
        };
        self.spawn_stream("/rag/chat", body)
    }

    /// Stream a plain chat reply with no retrieval.
    pub fn casual_chat(
        &self,
        content: impl Into<String>,
        role: impl Into<String>,
    ) -> EventReceiver {
        let body = CasualChatRequest {
            content: content.into(),
            role: role.into(),
        };
        self.spawn_stream("/casual/chat", body)
    }

    fn spawn_stream<B: Serialize>(&self, path: &str, body: B) -> EventReceiver {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let request = self.http.post(self.url(path)).json(&body);
        let path = path.to_string();

        tokio::spawn(async move {
            let response = tokio::select! {
                _ = tx.closed() => return,
                sent = request.send() => sent,
            };

            let response = match response {
                Ok(response) => response,
                Err(e) => {
                    warn!(path = %path, error = %e, "Chat request failed");
                    let message = AppError::Protocol(format!("transport error: {}", e));
                    let _ = tx.send(StreamEvent::Error(message.to_string())).await;
                    return;
                }
            };

            let events = decode_response(response);
            futures::pin_mut!(events);
            while let Some(event) = events.next().await {
                if tx.send(event).await.is_err() {
                    debug!(path = %path, "Chat consumer dropped");
                    return;
                }
            }
        });

        EventReceiver { receiver: rx }
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.url(path))
            .timeout(self.request_timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Protocol(format!("transport error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Protocol(server_error_message(status, &body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Protocol(format!("invalid response body: {}", e)))
    }

    /// Scored matches for `query`, best first, without generating an answer.
    pub async fn search(
        &self,
        query: impl Into<String>,
        k: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        let body = SearchRequest {
            query: query.into(),
            k,
        };
        self.post("/rag/search", &body).await
    }

    pub async fn add_texts(&self, texts: Vec<String>) -> Result<StatusResponse> {
        self.post("/rag/add_texts", &AddTextsRequest { texts }).await
    }

    pub async fn delete_by_index(&self, index: u64) -> Result<StatusResponse> {
        self.post("/rag/delete_by_index", &DeleteByIndexRequest { index })
            .await
    }

    pub async fn delete_all(&self) -> Result<StatusResponse> {
        self.post("/rag/delete_all", &serde_json::json!({})).await
    }

    pub async fn change_embedding_model(
        &self,
        new_model_name: impl Into<String>,
    ) -> Result<StatusResponse> {
        let body = ChangeEmbeddingModelRequest {
            new_model_name: new_model_name.into(),
        };
        self.post("/rag/change_embedding_model", &body).await
    }

    pub async fn update_text(
        &self,
        index: u64,
        new_text: impl Into<String>,
    ) -> Result<StatusResponse> {
        let body = UpdateTextRequest {
            index,
            new_text: new_text.into(),
        };
        self.post("/rag/update_text", &body).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self
            .http
            .get(self.url("/health"))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| AppError::Protocol(format!("transport error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Protocol(server_error_message(status, &body)));
        }
        response
            .json()
            .await
            .map_err(|e| AppError::Protocol(format!("invalid response body: {}", e)))
    }

    /// Load, chunk and upload every supported document under `folder`.
    ///
    /// Nothing is sent when the folder yields no chunks.
    pub async fn upload_folder(
        &self,
        folder: impl Into<PathBuf>,
        chunker: TextChunker,
    ) -> Result<PreparedChunks> {
        let prepared = prepare_folder(folder.into(), chunker).await?;
        if prepared.chunks.is_empty() {
            info!("No chunks to upload");
            return Ok(prepared);
        }

        self.add_texts(prepared.chunks.clone()).await?;
        info!(chunks = prepared.chunks.len(), "Uploaded folder");
        Ok(prepared)
    }
}
