use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use deskpilot_core::config::ModelDefaults;
use deskpilot_core::{AiRequest, AiResponse, Error, MemoryPreferences, Result, Usage};
use deskpilot_providers::{AiProvider, AiProviderRegistry, DeltaStream};

use crate::Completer;

/// Echoes the last message back and records every request.
pub struct EchoProvider {
    models: Vec<String>,
    pub requests: Mutex<Vec<AiRequest>>,
    fail: bool,
}

impl EchoProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            models: vec![ModelDefaults::default().default_model],
            requests: Mutex::new(Vec::new()),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            models: vec![ModelDefaults::default().default_model],
            requests: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn last(&self) -> AiRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl AiProvider for EchoProvider {
    fn id(&self) -> &str {
        "echo"
    }

    fn name(&self) -> &str {
        "Echo"
    }

    fn models(&self) -> &[String] {
        &self.models
    }

    async fn chat(&self, request: &AiRequest) -> Result<AiResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(Error::HttpStatus { status: 503, body: "overloaded".into() });
        }
        let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
        Ok(AiResponse {
            content: format!("echo: {}", last),
            model: request.model.clone(),
            usage: Usage::default(),
        })
    }

    async fn stream(&self, _request: AiRequest) -> Result<DeltaStream> {
        Err(Error::Other("not streaming".into()))
    }
}

pub fn completer(provider: Arc<EchoProvider>) -> Completer {
    let registry = AiProviderRegistry::new();
    registry.register(provider);
    Completer::new(
        Arc::new(registry),
        Arc::new(MemoryPreferences::new()),
        ModelDefaults::default(),
    )
}
