pub mod bus;
pub mod context;
pub mod intent;
pub mod registry;
pub mod runtime;

#[cfg(test)]
pub(crate) mod test_support;

pub use bus::{EventBus, Subscription};
pub use context::{ContextEngine, SignalProvider};
pub use intent::{score_modules, IntentRouter};
pub use registry::{LifecycleReport, ModuleRef, ModuleRegistry};
pub use runtime::AssistantRuntime;
