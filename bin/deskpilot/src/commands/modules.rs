use deskpilot_core::Paths;

use super::{check, App};

pub async fn run(paths: &Paths) -> anyhow::Result<()> {
    let app = App::bootstrap(paths)?;
    let registry = app.runtime.registry();

    println!("Modules ({})", registry.len());
    for module in registry.all() {
        let caps = module.capabilities();
        let mut flags = Vec::new();
        if caps.tools {
            flags.push("tools");
        }
        if caps.context_signals {
            flags.push("signals");
        }
        if caps.quick_actions {
            flags.push("actions");
        }
        println!(
            "  {} {:<8} v{:<6} {}",
            check(registry.is_enabled(module.id())),
            module.id(),
            module.version(),
            module.description()
        );
        println!("      triggers: {}", module.triggers().join(", "));
        if !flags.is_empty() {
            println!("      provides: {}", flags.join(", "));
        }
    }
    Ok(())
}
