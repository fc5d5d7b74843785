use std::sync::Arc;

use async_trait::async_trait;
use deskpilot_core::{AiRequest, AiResponse, PreferenceStore, Result, Usage};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

use crate::client::{read_json, send_checked, CHAT_TIMEOUT};
use crate::decode::NdjsonDecoder;
use crate::stream::DeltaStream;
use crate::AiProvider;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Local Ollama server. The base URL is the `ollamaUrl` preference, read on
/// every call.
pub struct OllamaProvider {
    client: Client,
    prefs: Arc<dyn PreferenceStore>,
    models: Vec<String>,
}

impl OllamaProvider {
    pub fn new(client: Client, prefs: Arc<dyn PreferenceStore>) -> Self {
        Self {
            client,
            prefs,
            models: ["llama3.2", "mistral", "codellama", "deepseek-r1"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }

    fn base_url(&self) -> String {
        self.prefs
            .get_str("ollamaUrl")
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
            .trim_end_matches('/')
            .to_string()
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

        let mut options = serde_json::Map::new();
        if let Some(t) = request.temperature {
            options.insert("temperature".into(), json!(t));
        }
        if let Some(n) = request.max_tokens {
            options.insert("num_predict".into(), json!(n));
        }

        json!({
            "model": request.model,
            "messages": messages,
            "stream": stream,
            "options": options,
        })
    }
}

#[async_trait]
impl AiProvider for OllamaProvider {
    fn id(&self) -> &str {
        "ollama"
    }

    fn name(&self) -> &str {
        "Ollama (Local)"
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    async fn chat(&self, request: &AiRequest) -> Result<AiResponse> {
        let url = format!("{}/api/chat", self.base_url());
        info!(url = %url, model = %request.model, "Calling Ollama");

        let body = Self::build_body(request, false);
        let builder = self.client.post(&url).json(&body).timeout(CHAT_TIMEOUT);
        let response = send_checked(builder, &request.cancel).await?;
        let data = read_json(response, &request.cancel).await?;

        Ok(AiResponse {
            content: data
                .pointer("/message/content")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            model: data
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(&request.model)
                .to_string(),
            usage: Usage {
                input_tokens: data.get("prompt_eval_count").and_then(Value::as_u64).unwrap_or(0),
                output_tokens: data.get("eval_count").and_then(Value::as_u64).unwrap_or(0),
            },
        })
    }

    async fn stream(&self, request: AiRequest) -> Result<DeltaStream> {
        let url = format!("{}/api/chat", self.base_url());
        info!(url = %url, model = %request.model, "Streaming from Ollama");

        let body = Self::build_body(&request, true);
        let response = send_checked(self.client.post(&url).json(&body), &request.cancel).await?;
        Ok(DeltaStream::spawn(
            response.bytes_stream(),
            NdjsonDecoder::new(),
            request.cancel.child_token(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamEnd;
    use deskpilot_core::{AiMessage, Error, MemoryPreferences};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base: &str) -> OllamaProvider {
        let prefs = MemoryPreferences::new();
        prefs.set("ollamaUrl", json!(base)).unwrap();
        OllamaProvider::new(Client::new(), Arc::new(prefs))
    }

    #[test]
    fn test_default_base_url() {
        let p = OllamaProvider::new(Client::new(), Arc::new(MemoryPreferences::new()));
        assert_eq!(p.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_options_mapping() {
        let req = AiRequest::new("llama3.2", vec![AiMessage::user("hi")])
            .with_temperature(0.5)
            .with_max_tokens(64);
        let body = OllamaProvider::build_body(&req, true);
        assert_eq!(body["options"], json!({"temperature": 0.5, "num_predict": 64}));
        assert_eq!(body["stream"], true);
    }

    #[tokio::test]
    async fn test_stream_ndjson() {
        let server = MockServer::start().await;
        let ndjson = concat!(
            "{\"model\":\"llama3.2\",\"message\":{\"role\":\"assistant\",\"content\":\"Hello\"},\"done\":false}\n",
            "{\"model\":\"llama3.2\",\"message\":{\"role\":\"assistant\",\"content\":\", world\"},\"done\":false}\n",
            "{\"model\":\"llama3.2\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"eval_count\":2}\n",
        );
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "llama3.2", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(ndjson, "application/x-ndjson"))
            .mount(&server)
            .await;

        let req = AiRequest::new("llama3.2", vec![AiMessage::user("hi")]);
        let (text, end) = provider(&server.uri()).stream(req).await.unwrap().collect_text().await;
        assert_eq!(text, "Hello, world");
        assert_eq!(end, StreamEnd::Completed);
    }

    #[tokio::test]
    async fn test_chat_counts_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "mistral",
                "message": {"role": "assistant", "content": "Bonjour"},
                "prompt_eval_count": 4,
                "eval_count": 2
            })))
            .mount(&server)
            .await;

        let req = AiRequest::new("mistral", vec![AiMessage::user("hi")]);
        let resp = provider(&server.uri()).chat(&req).await.unwrap();
        assert_eq!(resp.content, "Bonjour");
        assert_eq!(resp.usage, Usage { input_tokens: 4, output_tokens: 2 });
    }

    #[tokio::test]
    async fn test_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model 'x' not found"))
            .mount(&server)
            .await;

        let req = AiRequest::new("llama3.2", vec![AiMessage::user("hi")]);
        let err = provider(&server.uri()).stream(req).await.unwrap_err();
        assert!(matches!(err, Error::HttpStatus { status: 404, ref body } if body.contains("not found")));
    }
}
