pub mod ask;
pub mod config_cmd;
pub mod models;
pub mod modules;
pub mod route;
pub mod status;
pub mod stream;
pub mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use deskpilot_agent::AssistantRuntime;
use deskpilot_core::{Config, ConversationStore, Paths, PreferenceStore};
use deskpilot_modules::{default_modules, Completer};
use deskpilot_providers::create_registry;
use deskpilot_storage::{JsonPreferences, JsonlConversationStore};

pub fn paths(home: Option<PathBuf>) -> Paths {
    home.map(Paths::with_base).unwrap_or_default()
}

/// Everything a command needs, wired once per invocation.
pub struct App {
    pub prefs: Arc<JsonPreferences>,
    pub conversations: Arc<JsonlConversationStore>,
    pub completer: Completer,
    pub runtime: AssistantRuntime,
}

impl App {
    pub fn bootstrap(paths: &Paths) -> anyhow::Result<Self> {
        let config = Config::load_or_default(paths)?;
        let prefs = Arc::new(JsonPreferences::open(paths.preferences_file()));
        let prefs_dyn: Arc<dyn PreferenceStore> = prefs.clone();

        let providers = Arc::new(create_registry(&config, prefs_dyn.clone()));
        let conversations = Arc::new(JsonlConversationStore::open(paths.clone())?);
        let completer = Completer::new(providers.clone(), prefs_dyn, config.models.clone());

        let runtime = AssistantRuntime::new(config, providers, None);
        let store: Arc<dyn ConversationStore> = conversations.clone();
        for module in default_modules(completer.clone(), store) {
            runtime.register_module(module);
        }

        Ok(Self {
            prefs,
            conversations,
            completer,
            runtime,
        })
    }

    /// Bootstraps and runs module init plus the context engine.
    pub async fn start(paths: &Paths) -> anyhow::Result<Self> {
        let app = Self::bootstrap(paths)?;
        let report = app.runtime.start().await;
        for (id, err) in &report.failures {
            eprintln!("warning: module {} failed to start: {}", id, err);
        }
        Ok(app)
    }

    pub async fn shutdown(self) {
        self.runtime.shutdown().await;
    }
}

pub fn check(enabled: bool) -> &'static str {
    if enabled {
        "✓"
    } else {
        "✗"
    }
}
