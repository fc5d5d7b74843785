use std::sync::Arc;

use async_trait::async_trait;
use deskpilot_core::{AiMessage, AiRequest, AiResponse, Error, PreferenceStore, Result, Role, Usage};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::client::{read_json, send_checked, CHAT_TIMEOUT};
use crate::decode::{SseDecoder, SseFlavor};
use crate::stream::DeltaStream;
use crate::AiProvider;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    client: Client,
    prefs: Arc<dyn PreferenceStore>,
    api_base: String,
    models: Vec<String>,
}

impl AnthropicProvider {
    pub fn new(client: Client, prefs: Arc<dyn PreferenceStore>, api_base: Option<&str>) -> Self {
        Self {
            client,
            prefs,
            api_base: api_base
                .unwrap_or(ANTHROPIC_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            models: vec![
                "claude-opus-4-6".to_string(),
                "claude-sonnet-4-5-20250929".to_string(),
                "claude-haiku-4-5-20251001".to_string(),
            ],
        }
    }

    fn api_key(&self) -> Result<String> {
        self.prefs.api_key("anthropic").ok_or_else(|| {
            Error::Config("Anthropic API key not configured (set apiKey.anthropic)".to_string())
        })
    }

    /// System text goes top-level. Request `system` comes first, then any
    /// system-role messages in order.
    fn convert_messages(request: &AiRequest) -> (Option<String>, Vec<Value>) {
        let mut system: Vec<&str> = request.system.iter().map(String::as_str).collect();
        let mut turns: Vec<(Role, String)> = Vec::new();

        for AiMessage { role, content } in &request.messages {
            match role {
                Role::System => system.push(content),
                role => match turns.last_mut() {
                    // The API wants strictly alternating roles.
                    Some((last, text)) if last == role => {
                        text.push_str("\n\n");
                        text.push_str(content);
                    }
                    _ => turns.push((*role, content.clone())),
                },
            }
        }

        let system = system
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        let messages = turns
            .into_iter()
            .map(|(role, content)| json!({ "role": role.as_str(), "content": content }))
            .collect();
        ((!system.is_empty()).then_some(system), messages)
    }

    fn build_body(request: &AiRequest, stream: bool) -> Value {
        let (system, messages) = Self::convert_messages(request);
        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
        });
        if let Some(system) = system {
            body["system"] = Value::String(system);
        }
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
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
    }

    fn parse_response(data: &Value, requested: &str) -> Result<AiResponse> {
        let blocks = data
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Protocol("Anthropic response has no content".to_string()))?;
        let content = blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("");
        Ok(AiResponse {
            content,
            model: data
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(requested)
                .to_string(),
            usage: Usage {
                input_tokens: data.pointer("/usage/input_tokens").and_then(Value::as_u64).unwrap_or(0),
                output_tokens: data.pointer("/usage/output_tokens").and_then(Value::as_u64).unwrap_or(0),
            },
        })
    }
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn id(&self) -> &str {
        "claude"
    }

    fn name(&self) -> &str {
        "Anthropic Claude"
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    async fn chat(&self, request: &AiRequest) -> Result<AiResponse> {
        let api_key = self.api_key()?;
        let body = Self::build_body(request, false);
        info!(model = %request.model, messages = request.messages.len(), "Calling Anthropic API");

        let response = send_checked(self.post(&api_key, &body).timeout(CHAT_TIMEOUT), &request.cancel).await?;
        let data = read_json(response, &request.cancel).await?;
        let parsed = Self::parse_response(&data, &request.model)?;
        debug!(
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "Anthropic response parsed"
        );
        Ok(parsed)
    }

    async fn stream(&self, request: AiRequest) -> Result<DeltaStream> {
        let api_key = self.api_key()?;
        let body = Self::build_body(&request, true);
        info!(model = %request.model, "Streaming from Anthropic API");

        let response = send_checked(self.post(&api_key, &body), &request.cancel).await?;
        Ok(DeltaStream::spawn(
            response.bytes_stream(),
            SseDecoder::new(SseFlavor::Anthropic),
            request.cancel.child_token(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamEnd;
    use deskpilot_core::MemoryPreferences;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base: &str, key: Option<&str>) -> AnthropicProvider {
        let prefs = MemoryPreferences::new();
        if let Some(key) = key {
            prefs.set_api_key("anthropic", key).unwrap();
        }
        AnthropicProvider::new(Client::new(), Arc::new(prefs), Some(base))
    }

    fn request() -> AiRequest {
        AiRequest::new("claude-sonnet-4-5-20250929", vec![AiMessage::user("Hi")]).with_system("Be brief")
    }

    #[test]
    fn test_convert_messages_folds_system_and_merges_roles() {
        let req = AiRequest::new(
            "m",
            vec![
                AiMessage::system("extra rules"),
                AiMessage::user("a"),
                AiMessage::user("b"),
                AiMessage::assistant("c"),
            ],
        )
        .with_system("base");
        let (system, messages) = AnthropicProvider::convert_messages(&req);
        assert_eq!(system.as_deref(), Some("base\n\nextra rules"));
        assert_eq!(
            messages,
            vec![
                json!({"role": "user", "content": "a\n\nb"}),
                json!({"role": "assistant", "content": "c"}),
            ]
        );
    }

    #[test]
    fn test_body_defaults_max_tokens() {
        let body = AnthropicProvider::build_body(&request(), true);
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["system"], "Be brief");
        assert_eq!(body["stream"], true);
        assert!(body.get("temperature").is_none());
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let server = MockServer::start().await;
        let err = provider(&server.uri(), None).chat(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_chat_sends_headers_and_parses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(json!({"system": "Be brief", "max_tokens": 4096})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "model": "claude-sonnet-4-5-20250929",
                "content": [{"type": "text", "text": "Hello"}],
                "usage": {"input_tokens": 12, "output_tokens": 3}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resp = provider(&server.uri(), Some("sk-test")).chat(&request()).await.unwrap();
        assert_eq!(resp.content, "Hello");
        assert_eq!(resp.usage, Usage { input_tokens: 12, output_tokens: 3 });
    }

    #[tokio::test]
    async fn test_error_status_truncates_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("x".repeat(800)))
            .mount(&server)
            .await;

        let err = provider(&server.uri(), Some("bad")).chat(&request()).await.unwrap_err();
        match err {
            Error::HttpStatus { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body.len(), 500);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_stream_yields_text_deltas() {
        let server = MockServer::start().await;
        let sse = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let stream = provider(&server.uri(), Some("sk-test")).stream(request()).await.unwrap();
        let (text, end) = stream.collect_text().await;
        assert_eq!(text, "Hello");
        assert_eq!(end, StreamEnd::Completed);
    }
}
