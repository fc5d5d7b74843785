use deskpilot_core::{ConversationStore, Paths, PreferenceStore};

use super::{check, App};

pub async fn run(paths: &Paths) -> anyhow::Result<()> {
    let config_path = paths.config_file();
    println!("deskpilot status");
    println!("================");
    println!();
    println!(
        "Config:        {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "(defaults)" }
    );
    println!("Preferences:   {}", paths.preferences_file().display());

    let app = App::bootstrap(paths)?;
    println!("Default model: {}", app.completer.model());
    println!("Theme:         {}", app.prefs.theme());
    println!();

    println!("Backends:");
    for provider in app.runtime.providers().all() {
        let status = match provider.id() {
            "claude" => key_status(app.prefs.api_key("anthropic").is_some()),
            "openai" => key_status(app.prefs.api_key("openai").is_some()),
            _ => "local".to_string(),
        };
        println!("  {:<8} {:<3} models  {}", provider.id(), provider.models().len(), status);
    }
    println!();

    let registry = app.runtime.registry();
    println!("Modules:");
    for module in registry.all() {
        println!("  {} {}", check(registry.is_enabled(module.id())), module.id());
    }

    let conversations = app.conversations.all().await?;
    println!();
    println!("Conversations: {}", conversations.len());
    Ok(())
}

fn key_status(configured: bool) -> String {
    if configured {
        "✓ key configured".to_string()
    } else {
        "✗ no key".to_string()
    }
}
