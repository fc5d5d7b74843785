pub mod capability;
pub mod config;
pub mod error;
pub mod paths;
pub mod services;
pub mod types;

pub use capability::{CapabilityModule, ModuleCapabilities};
pub use config::Config;
pub use error::{Error, Result};
pub use paths::Paths;
pub use services::{
    Clipboard, ConversationStore, MemoryPreferences, PreferenceStore, VectorHit, VectorSearch,
};
pub use types::*;
