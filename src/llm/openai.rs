use crate::llm::client::{normalize_role, GenerationParams, LLMClient};
use crate::types::{AppError, Result};
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};

/// Client for OpenAI and any endpoint speaking its chat completions API.
pub struct OpenAIClient {
    client: Client<OpenAIConfig>,
    model: String,
    system_prompt: String,
}

impl OpenAIClient {
    pub fn new(api_key: String, api_base: String, model: String) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base.trim_end_matches('/'));

        Self {
            client: Client::with_config(config),
            model,
            system_prompt: super::DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    fn message(&self, prompt: &str, role: &str) -> Result<ChatCompletionRequestMessage> {
        Ok(match normalize_role(role) {
            "system" => ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessage::from(prompt.to_string()),
            ),
            "assistant" => ChatCompletionRequestMessage::Assistant(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(prompt.to_string())
                    .build()
                    .map_err(|e| AppError::Backend(format!("Failed to build request: {}", e)))?,
            ),
            _ => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage::from(
                prompt.to_string(),
            )),
        })
    }

    // top_k is not part of the chat completions API
    #[allow(deprecated)]
    fn request(
        &self,
        prompt: &str,
        role: &str,
        params: &GenerationParams,
    ) -> Result<CreateChatCompletionRequest> {
        CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage::from(
                    self.system_prompt.clone(),
                )),
                self.message(prompt, role)?,
            ])
            .temperature(params.temperature)
            .top_p(params.top_p)
            .max_tokens(params.max_tokens)
            .build()
            .map_err(|e| AppError::Backend(format!("Failed to build request: {}", e)))
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn generate(
        &self,
        prompt: &str,
        role: &str,
        params: &GenerationParams,
    ) -> Result<String> {
        let request = self.request(prompt, role, params)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AppError::Backend(format!("OpenAI API error: {}", e)))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| AppError::Backend("No content in OpenAI response".to_string()))
    }

    async fn stream(
        &self,
        prompt: &str,
        role: &str,
        params: &GenerationParams,
    ) -> Result<Box<dyn Stream<Item = Result<String>> + Send + Unpin>> {
        let request = self.request(prompt, role, params)?;

        let mut stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(|e| AppError::Backend(format!("OpenAI API error: {}", e)))?;

        let output_stream = async_stream::stream! {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(response) => {
                        for choice in response.choices {
                            match choice.delta.content {
                                Some(content) if !content.is_empty() => yield Ok(content),
                                _ => {}
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(AppError::Backend(format!("OpenAI stream error: {}", e)));
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chunk(content: &str) -> String {
        let chunk = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "created": 1,
            "model": "gpt-test",
            "choices": [{ "index": 0, "delta": { "content": content }, "finish_reason": null }],
        });
        format!("data: {}\n\n", chunk)
    }

    #[tokio::test]
    async fn test_stream_collects_deltas() {
        let server = MockServer::start().await;
        let body = format!("{}{}{}data: [DONE]\n\n", chunk("Hel"), chunk(""), chunk("lo"));
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = OpenAIClient::new("sk-test".into(), server.uri(), "gpt-test".into());
        let stream = client
            .stream("hi", "user", &GenerationParams::default())
            .await
            .unwrap();
        let parts: Vec<String> = stream.map(|r| r.unwrap()).collect().await;

        assert_eq!(parts, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_generate_sends_sampling_params() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "gpt-test",
                "max_tokens": 7,
                "top_p": 0.5,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "chatcmpl-2",
                "object": "chat.completion",
                "created": 1,
                "model": "gpt-test",
                "choices": [{
                    "index": 0,
                    "message": { "role": "assistant", "content": "Short." },
                    "finish_reason": "stop",
                }],
            })))
            .mount(&server)
            .await;

        let client = OpenAIClient::new("sk-test".into(), server.uri(), "gpt-test".into())
            .with_system_prompt("be brief");
        let params = GenerationParams {
            temperature: 0.2,
            top_k: 10,
            top_p: 0.5,
            max_tokens: 7,
        };

        assert_eq!(client.generate("hi", "user", &params).await.unwrap(), "Short.");
    }

    #[tokio::test]
    async fn test_generate_reports_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {
                    "message": "Incorrect API key provided",
                    "type": "invalid_request_error",
                    "param": null,
                    "code": "invalid_api_key",
                }
            })))
            .mount(&server)
            .await;

        let client = OpenAIClient::new("nope".into(), server.uri(), "gpt-test".into());
        let err = client
            .generate("hi", "user", &GenerationParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Backend(msg) if msg.contains("Incorrect API key")));
    }
}
