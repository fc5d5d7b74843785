pub mod conversations;
pub mod preferences;
pub mod vector;

pub use conversations::JsonlConversationStore;
pub use preferences::JsonPreferences;
pub use vector::TermVectorStore;
