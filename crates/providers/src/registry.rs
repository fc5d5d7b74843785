use std::sync::{Arc, RwLock};

use deskpilot_core::{AiRequest, AiResponse, Error, Result};
use serde::Serialize;
use tracing::debug;

use crate::stream::DeltaStream;
use crate::AiProvider;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelEntry {
    pub provider: String,
    pub model: String,
}

/// Backends in registration order. When two backends list the same model,
/// the one registered first serves it.
#[derive(Default)]
pub struct AiProviderRegistry {
    providers: RwLock<Vec<Arc<dyn AiProvider>>>,
}

impl AiProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a backend with the same id in place.
    pub fn register(&self, provider: Arc<dyn AiProvider>) {
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        match providers.iter_mut().find(|p| p.id() == provider.id()) {
            Some(existing) => *existing = provider,
            None => providers.push(provider),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn AiProvider>> {
        self.snapshot().into_iter().find(|p| p.id() == id)
    }

    pub fn all(&self) -> Vec<Arc<dyn AiProvider>> {
        self.snapshot()
    }

    pub fn all_models(&self) -> Vec<ModelEntry> {
        self.snapshot()
            .iter()
            .flat_map(|p| {
                p.models().iter().map(|m| ModelEntry {
                    provider: p.id().to_string(),
                    model: m.clone(),
                })
            })
            .collect()
    }

    pub fn find_provider(&self, model: &str) -> Option<Arc<dyn AiProvider>> {
        self.snapshot().into_iter().find(|p| p.supports(model))
    }

    fn resolve(&self, model: &str) -> Result<Arc<dyn AiProvider>> {
        let provider = self
            .find_provider(model)
            .ok_or_else(|| Error::Routing(format!("No provider for model: {}", model)))?;
        debug!(model = %model, provider = %provider.id(), "Resolved model");
        Ok(provider)
    }

    pub async fn chat(&self, request: &AiRequest) -> Result<AiResponse> {
        self.resolve(&request.model)?.chat(request).await
    }

    pub async fn stream(&self, request: AiRequest) -> Result<DeltaStream> {
        self.resolve(&request.model)?.stream(request).await
    }

    fn snapshot(&self) -> Vec<Arc<dyn AiProvider>> {
        self.providers.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use deskpilot_core::{AiMessage, Usage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fake {
        id: &'static str,
        models: Vec<String>,
        calls: AtomicUsize,
    }

    impl Fake {
        fn new(id: &'static str, models: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                id,
                models: models.iter().map(|m| m.to_string()).collect(),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AiProvider for Fake {
        fn id(&self) -> &str {
            self.id
        }

        fn name(&self) -> &str {
            self.id
        }

        fn models(&self) -> &[String] {
            &self.models
        }

        async fn chat(&self, request: &AiRequest) -> Result<AiResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AiResponse {
                content: format!("{} answered", self.id),
                model: request.model.clone(),
                usage: Usage::default(),
            })
        }

        async fn stream(&self, _request: AiRequest) -> Result<DeltaStream> {
            Err(Error::Other("not streaming".into()))
        }
    }

    #[tokio::test]
    async fn test_first_registered_wins_on_overlap() {
        let registry = AiProviderRegistry::new();
        let a = Fake::new("a", &["shared", "only-a"]);
        let b = Fake::new("b", &["shared", "only-b"]);
        registry.register(a.clone());
        registry.register(b.clone());

        assert_eq!(registry.find_provider("shared").unwrap().id(), "a");
        assert_eq!(registry.find_provider("only-b").unwrap().id(), "b");

        let resp = registry
            .chat(&AiRequest::new("shared", vec![AiMessage::user("x")]))
            .await
            .unwrap();
        assert_eq!(resp.content, "a answered");
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_model_is_routing_error() {
        let registry = AiProviderRegistry::new();
        let a = Fake::new("a", &["m"]);
        registry.register(a.clone());

        let err = registry
            .chat(&AiRequest::new("nope", vec![AiMessage::user("x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Routing(_)));
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);

        let err = registry
            .stream(AiRequest::new("nope", vec![]))
            .await
            .unwrap_err();
        assert!(err.is_pre_flight());
    }

    #[test]
    fn test_all_models_in_order() {
        let registry = AiProviderRegistry::new();
        registry.register(Fake::new("a", &["m1", "m2"]));
        registry.register(Fake::new("b", &["m3"]));
        registry.register(Fake::new("a", &["m9"]));

        let models: Vec<(String, String)> = registry
            .all_models()
            .into_iter()
            .map(|e| (e.provider, e.model))
            .collect();
        assert_eq!(
            models,
            vec![
                ("a".to_string(), "m9".to_string()),
                ("b".to_string(), "m3".to_string()),
            ]
        );
        assert!(registry.get("b").is_some());
        assert_eq!(registry.all().len(), 2);
    }
}
