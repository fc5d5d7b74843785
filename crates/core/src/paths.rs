use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".deskpilot"))
            .unwrap_or_else(|| PathBuf::from(".deskpilot"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn preferences_file(&self) -> PathBuf {
        self.base.join("preferences.json")
    }

    pub fn conversations_dir(&self) -> PathBuf {
        self.base.join("conversations")
    }

    pub fn conversation_file(&self, conversation_id: &str) -> PathBuf {
        let safe_id = conversation_id.replace([':', '/', '\\'], "_");
        self.conversations_dir().join(format!("{}.jsonl", safe_id))
    }

    pub fn vectors_file(&self) -> PathBuf {
        self.base.join("vectors.json")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_file_is_sanitized() {
        let paths = Paths::with_base(PathBuf::from("/tmp/dp"));
        assert_eq!(
            paths.conversation_file("a/b:c"),
            PathBuf::from("/tmp/dp/conversations/a_b_c.jsonl")
        );
    }
}
