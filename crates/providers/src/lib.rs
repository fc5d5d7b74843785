pub mod anthropic;
pub mod client;
pub mod decode;
pub mod factory;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod stream;

use async_trait::async_trait;
use deskpilot_core::{AiRequest, AiResponse, Result};

/// One LLM backend. `stream` yields text fragments in arrival order.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn models(&self) -> &[String];

    fn supports(&self, model: &str) -> bool {
        self.models().iter().any(|m| m == model)
    }

    async fn chat(&self, request: &AiRequest) -> Result<AiResponse>;

    async fn stream(&self, request: AiRequest) -> Result<DeltaStream>;
}

pub use anthropic::AnthropicProvider;
pub use factory::create_registry;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
pub use registry::AiProviderRegistry;
pub use stream::{DeltaStream, StreamEnd};
