use deskpilot_core::{Config, Paths, PreferenceStore};
use deskpilot_storage::JsonPreferences;
use serde_json::Value;

const KNOWN_BACKENDS: &[&str] = &["anthropic", "openai"];

/// Keeps the first and last four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Show the effective configuration and stored preferences.
pub async fn show(paths: &Paths) -> anyhow::Result<()> {
    let config = Config::load_or_default(paths)?;
    println!("Config: {}", paths.config_file().display());
    println!("{}", serde_json::to_string_pretty(&config)?);

    let prefs = JsonPreferences::open(paths.preferences_file());
    let masked: serde_json::Map<String, Value> = prefs
        .all()
        .into_iter()
        .map(|(key, value)| match (&value, key.starts_with("apiKey.")) {
            (Value::String(s), true) => (key, Value::String(mask_secret(s))),
            _ => (key, value),
        })
        .collect();
    println!();
    println!("Preferences: {}", prefs.path().display());
    println!("{}", serde_json::to_string_pretty(&masked)?);
    Ok(())
}

pub async fn set_key(paths: &Paths, backend: &str, key: &str) -> anyhow::Result<()> {
    if !KNOWN_BACKENDS.contains(&backend) {
        anyhow::bail!("unknown backend '{}' (expected one of: {})", backend, KNOWN_BACKENDS.join(", "));
    }
    if key.trim().is_empty() {
        anyhow::bail!("API key must not be empty");
    }
    let prefs = JsonPreferences::open(paths.preferences_file());
    prefs.set_api_key(backend, key.trim())?;
    println!("✓ Stored apiKey.{} ({})", backend, mask_secret(key.trim()));
    Ok(())
}
