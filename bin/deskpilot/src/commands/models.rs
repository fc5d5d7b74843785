use deskpilot_core::{Paths, PreferenceStore};

use super::App;

pub async fn run(paths: &Paths) -> anyhow::Result<()> {
    let app = App::bootstrap(paths)?;
    let default_model = app.completer.model();

    for provider in app.runtime.providers().all() {
        println!("{} ({})", provider.name(), provider.id());
        for model in provider.models() {
            let marker = if *model == default_model { "*" } else { " " };
            println!("  {} {}", marker, model);
        }
    }
    if app.prefs.get_str("defaultModel").is_none() {
        println!();
        println!("* default model (set the defaultModel preference to change)");
    }
    Ok(())
}
