use crate::llm::client::{normalize_role, GenerationParams, LLMClient};
use crate::types::{AppError, Result};
use async_stream::stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use ollama_rs::{
    generation::chat::{request::ChatMessageRequest, ChatMessage},
    models::ModelOptions,
    Ollama,
};

/// Split `http://host:port` into the `(scheme://host, port)` pair ollama-rs wants.
pub fn split_base_url(base_url: &str) -> (String, u16) {
    let (scheme, rest) = match base_url.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", base_url),
    };
    let rest = rest.trim_end_matches('/');

    match rest.rsplit_once(':') {
        Some((host, port)) => (
            format!("{}://{}", scheme, host),
            port.parse().unwrap_or(11434),
        ),
        None => (format!("{}://{}", scheme, rest), 11434),
    }
}

/// Ollama client for a base URL.
pub fn connect(base_url: &str) -> Ollama {
    let (host, port) = split_base_url(base_url);
    Ollama::builder().host(host.as_str()).port(port).build()
}

pub struct OllamaClient {
    client: Ollama,
    model: String,
    system_prompt: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: String) -> Self {
        Self {
            client: connect(base_url),
            model,
            system_prompt: super::DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    fn request(&self, prompt: &str, role: &str, params: &GenerationParams) -> ChatMessageRequest {
        let message = match normalize_role(role) {
            "system" => ChatMessage::system(prompt.to_string()),
            "assistant" => ChatMessage::assistant(prompt.to_string()),
            _ => ChatMessage::user(prompt.to_string()),
        };
        let messages = vec![ChatMessage::system(self.system_prompt.clone()), message];

        let options = ModelOptions::default()
            .temperature(params.temperature)
            .top_k(params.top_k)
            .top_p(params.top_p)
            .num_predict(params.max_tokens as i32);

        ChatMessageRequest::new(self.model.clone(), messages).options(options)
    }
}

#[async_trait]
impl LLMClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        role: &str,
        params: &GenerationParams,
    ) -> Result<String> {
        let response = self
            .client
            .send_chat_messages(self.request(prompt, role, params))
            .await
            .map_err(|e| AppError::Backend(format!("Ollama error: {}", e)))?;

        Ok(response.message.content)
    }

    async fn stream(
        &self,
        prompt: &str,
        role: &str,
        params: &GenerationParams,
    ) -> Result<Box<dyn Stream<Item = Result<String>> + Send + Unpin>> {
        let mut stream_response = self
            .client
            .send_chat_messages_stream(self.request(prompt, role, params))
            .await
            .map_err(|e| AppError::Backend(format!("Ollama stream error: {}", e)))?;

        let output_stream = stream! {
            while let Some(chunk_result) = stream_response.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        let content = chunk.message.content;
                        if !content.is_empty() {
                            yield Ok(content);
                        }
                    }
                    Err(_) => {
                        yield Err(AppError::Backend("Ollama stream chunk error".to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::new(Box::pin(output_stream)))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
