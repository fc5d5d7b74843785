use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use deskpilot_core::config::ContextConfig;
use deskpilot_core::{
    CapabilityModule, Clipboard, ContextLayer, ContextSignal, ContextSnapshot, ConversationMessage,
    Result,
};
use futures::future::BoxFuture;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::registry::ModuleRegistry;

pub const SIGNAL_EVENT: &str = "context:signal";
const SOURCE: &str = "context-engine";

type FetchFn = Arc<dyn Fn() -> BoxFuture<'static, Result<serde_json::Value>> + Send + Sync>;

/// One source of a keyed signal, optionally re-fetched on an interval.
#[derive(Clone)]
pub struct SignalProvider {
    pub layer: ContextLayer,
    pub key: String,
    pub source: String,
    pub interval: Option<Duration>,
    fetch: FetchFn,
}

impl SignalProvider {
    pub fn new<F, Fut>(layer: ContextLayer, key: impl Into<String>, source: impl Into<String>, fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        Self {
            layer,
            key: key.into(),
            source: source.into(),
            interval: None,
            fetch: Arc::new(move || Box::pin(fetch())),
        }
    }

    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    async fn fetch_signal(&self) -> Result<ContextSignal> {
        let value = (self.fetch)().await?;
        Ok(ContextSignal::new(self.layer, self.key.clone(), value, self.source.clone()))
    }
}

struct Shared {
    signals: Mutex<HashMap<String, ContextSignal>>,
    bus: EventBus,
}

impl Shared {
    fn store(&self, signal: ContextSignal) {
        let event = serde_json::to_value(&signal).unwrap_or_default();
        self.signals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(signal.key.clone(), signal);
        self.bus.send(SIGNAL_EVENT, SOURCE, event);
    }

    /// Drops the write if the run it belongs to has been stopped. The check
    /// and the insert happen under the same lock `stop` takes to cancel.
    fn store_if_live(&self, signal: ContextSignal, token: &CancellationToken) -> bool {
        let event = serde_json::to_value(&signal).unwrap_or_default();
        {
            let mut signals = self.signals.lock().unwrap_or_else(|e| e.into_inner());
            if token.is_cancelled() {
                return false;
            }
            signals.insert(signal.key.clone(), signal);
        }
        self.bus.send(SIGNAL_EVENT, SOURCE, event);
        true
    }
}

struct Session {
    recent: VecDeque<ConversationMessage>,
    active_module: Option<String>,
}

struct Run {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Aggregates environment signals and produces snapshots for module handlers.
pub struct ContextEngine {
    shared: Arc<Shared>,
    registry: Arc<ModuleRegistry>,
    clipboard: Option<Arc<dyn Clipboard>>,
    settings: ContextConfig,
    providers: Mutex<Vec<SignalProvider>>,
    session: Mutex<Session>,
    run: Mutex<Option<Run>>,
}

impl ContextEngine {
    pub fn new(registry: Arc<ModuleRegistry>, bus: EventBus, settings: ContextConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                signals: Mutex::new(HashMap::new()),
                bus,
            }),
            registry,
            clipboard: None,
            settings,
            providers: Mutex::new(Vec::new()),
            session: Mutex::new(Session {
                recent: VecDeque::new(),
                active_module: None,
            }),
            run: Mutex::new(None),
        }
    }

    pub fn with_clipboard(mut self, clipboard: Arc<dyn Clipboard>) -> Self {
        self.clipboard = Some(clipboard);
        self
    }

    pub fn register_provider(&self, provider: SignalProvider) {
        lock(&self.providers).push(provider);
    }

    fn builtin_providers(&self) -> Vec<SignalProvider> {
        let mut providers = vec![SignalProvider::new(
            ContextLayer::Immediate,
            "time",
            "system",
            || async { Ok(json!(Utc::now().to_rfc3339())) },
        )
        .every(Duration::from_millis(self.settings.clock_interval_ms.max(1)))];

        if let Some(clipboard) = &self.clipboard {
            let clipboard = clipboard.clone();
            providers.push(
                SignalProvider::new(ContextLayer::Immediate, "clipboard", "system", move || {
                    let clipboard = clipboard.clone();
                    async move { Ok(clipboard.read_text().await?.map(serde_json::Value::String).unwrap_or_default()) }
                })
                .every(Duration::from_millis(self.settings.clipboard_interval_ms.max(1))),
            );
        }
        providers
    }

    /// Starting an engine that is already running does nothing.
    pub async fn start(&self) {
        let token = {
            let mut run = lock(&self.run);
            if run.is_some() {
                warn!("Context engine already running");
                return;
            }
            let token = CancellationToken::new();
            *run = Some(Run {
                token: token.clone(),
                tasks: Vec::new(),
            });
            token
        };

        let mut providers = self.builtin_providers();
        providers.extend(lock(&self.providers).iter().cloned());

        for module in self.registry.enabled() {
            if !module.capabilities().context_signals {
                continue;
            }
            match module.context_signals().await {
                Ok(signals) => {
                    for signal in signals {
                        self.shared.store_if_live(signal, &token);
                    }
                }
                Err(e) => warn!(module = %module.id(), error = %e, "Context signals failed"),
            }
        }

        for provider in providers {
            match provider.fetch_signal().await {
                Ok(signal) => {
                    self.shared.store_if_live(signal, &token);
                }
                Err(e) => warn!(key = %provider.key, error = %e, "Signal fetch failed"),
            }

            let Some(period) = provider.interval else {
                continue;
            };
            let handle = spawn_poller(provider, period, self.shared.clone(), token.clone());

            let mut run = lock(&self.run);
            match run.as_mut() {
                Some(run) if !token.is_cancelled() => run.tasks.push(handle),
                _ => handle.abort(),
            }
        }
        info!(timers = self.active_timers(), "Context engine started");
    }

    /// Cancels every poller. In-flight fetches resolving afterwards are discarded.
    pub fn stop(&self) {
        let Some(run) = lock(&self.run).take() else {
            return;
        };
        {
            let _signals = self.shared.signals.lock().unwrap_or_else(|e| e.into_inner());
            run.token.cancel();
        }
        for task in &run.tasks {
            task.abort();
        }
        debug!(tasks = run.tasks.len(), "Context engine stopped");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.run).is_some()
    }

    pub fn active_timers(&self) -> usize {
        lock(&self.run)
            .as_ref()
            .map(|run| run.tasks.iter().filter(|t| !t.is_finished()).count())
            .unwrap_or(0)
    }

    pub fn set_signal(&self, signal: ContextSignal) {
        self.shared.store(signal);
    }

    pub fn get_signal(&self, key: &str) -> Option<serde_json::Value> {
        self.shared
            .signals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .map(|s| s.value.clone())
    }

    pub fn clear_signals(&self) {
        self.shared
            .signals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Keeps the newest `recentMessageLimit` entries.
    pub fn set_recent_messages(&self, messages: Vec<ConversationMessage>) {
        let limit = self.settings.recent_message_limit;
        let skip = messages.len().saturating_sub(limit);
        lock(&self.session).recent = messages.into_iter().skip(skip).collect();
    }

    pub fn push_message(&self, message: ConversationMessage) {
        let limit = self.settings.recent_message_limit;
        let mut session = lock(&self.session);
        session.recent.push_back(message);
        while session.recent.len() > limit {
            session.recent.pop_front();
        }
    }

    pub fn set_active_module(&self, module_id: Option<String>) {
        lock(&self.session).active_module = module_id;
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        let (signals, clipboard) = {
            let signals = self.shared.signals.lock().unwrap_or_else(|e| e.into_inner());
            let clipboard = signals
                .get("clipboard")
                .and_then(|s| s.value.as_str())
                .map(str::to_string);
            let flat: BTreeMap<String, serde_json::Value> = signals
                .iter()
                .map(|(k, s)| (k.clone(), s.value.clone()))
                .collect();
            (flat, clipboard)
        };
        let session = lock(&self.session);
        ContextSnapshot {
            time: Utc::now(),
            clipboard,
            signals,
            recent_messages: session.recent.iter().cloned().collect(),
            active_module: session.active_module.clone(),
        }
    }
}

impl Drop for ContextEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_poller(
    provider: SignalProvider,
    period: Duration,
    shared: Arc<Shared>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let fetched = tokio::select! {
                _ = token.cancelled() => break,
                fetched = provider.fetch_signal() => fetched,
            };
            match fetched {
                Ok(signal) => {
                    if !shared.store_if_live(signal, &token) {
                        break;
                    }
                }
                Err(e) => debug!(key = %provider.key, error = %e, "Signal fetch failed"),
            }
        }
    })
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
