use std::sync::Arc;

use async_trait::async_trait;
use deskpilot_core::{AiRequest, AiResponse, Error, PreferenceStore, Result, Usage};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

use crate::client::{read_json, send_checked, CHAT_TIMEOUT};
use crate::decode::{SseDecoder, SseFlavor};
use crate::stream::DeltaStream;
use crate::AiProvider;

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct OpenAIProvider {
    client: Client,
    prefs: Arc<dyn PreferenceStore>,
    api_base: String,
    models: Vec<String>,
}

impl OpenAIProvider {
    pub fn new(client: Client, prefs: Arc<dyn PreferenceStore>, api_base: Option<&str>) -> Self {
        Self {
            client,
            prefs,
            api_base: api_base
                .unwrap_or(OPENAI_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            models: ["gpt-4o", "gpt-4o-mini", "o1", "o3-mini"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }

    fn api_key(&self) -> Result<String> {
        self.prefs
            .api_key("openai")
            .ok_or_else(|| Error::Config("OpenAI API key not configured (set apiKey.openai)".to_string()))
    }

    fn build_body(request: &AiRequest, stream: bool) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        messages.extend(
            request
                .messages
                .iter()
                .map(|m| json!({ "role": m.role.as_str(), "content": m.content })),
        );

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_completion_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        if let Some(t) = request.temperature {
            body["temperature"] = json!(t);
        }
        if stream {
            body["stream"] = Value::Bool(true);
        }
        body
    }

    fn post(&self, api_key: &str, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(api_key)
            .json(body)
    }
}

#[async_trait]
impl AiProvider for OpenAIProvider {
    fn id(&self) -> &str {
        "openai"
    }

    fn name(&self) -> &str {
        "OpenAI"
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    async fn chat(&self, request: &AiRequest) -> Result<AiResponse> {
        let api_key = self.api_key()?;
        let body = Self::build_body(request, false);
        info!(model = %request.model, messages = request.messages.len(), "Calling OpenAI API");

        let response = send_checked(self.post(&api_key, &body).timeout(CHAT_TIMEOUT), &request.cancel).await?;
        let data = read_json(response, &request.cancel).await?;
        let content = data
            .pointer("/choices/0/message/content")
            .ok_or_else(|| Error::Protocol("OpenAI response has no choices".to_string()))?
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(AiResponse {
            content,
            model: data
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(&request.model)
                .to_string(),
            usage: Usage {
                input_tokens: data.pointer("/usage/prompt_tokens").and_then(Value::as_u64).unwrap_or(0),
                output_tokens: data.pointer("/usage/completion_tokens").and_then(Value::as_u64).unwrap_or(0),
            },
        })
    }

    async fn stream(&self, request: AiRequest) -> Result<DeltaStream> {
        let api_key = self.api_key()?;
        let body = Self::build_body(&request, true);
        info!(model = %request.model, "Streaming from OpenAI API");

        let response = send_checked(self.post(&api_key, &body), &request.cancel).await?;
        Ok(DeltaStream::spawn(
            response.bytes_stream(),
            SseDecoder::new(SseFlavor::OpenAi),
            request.cancel.child_token(),
        ))
    }
}
