use deskpilot_core::{Paths, ToolResult};

use super::App;

pub async fn list(paths: &Paths) -> anyhow::Result<()> {
    let app = App::bootstrap(paths)?;
    let registry = app.runtime.registry();

    let tools = registry.all_tools();
    println!("Tools ({})", tools.len());
    for tool in tools {
        println!("  {:<22} {}", tool.name, tool.description);
    }

    let actions = registry.all_quick_actions();
    println!();
    println!("Quick actions ({})", actions.len());
    for action in actions {
        println!(
            "  {:<22} {} [{}]",
            action.id,
            action.description.as_deref().unwrap_or(&action.label),
            action.module_id
        );
    }
    Ok(())
}

pub async fn run(paths: &Paths, name: &str, params: &str) -> anyhow::Result<()> {
    let args: serde_json::Value =
        serde_json::from_str(params).map_err(|e| anyhow::anyhow!("invalid JSON params: {}", e))?;
    let app = App::start(paths).await?;
    let result = app.runtime.registry().execute_tool(name, args).await;
    app.shutdown().await;
    print_result(result?)
}

pub async fn action(paths: &Paths, id: &str) -> anyhow::Result<()> {
    let app = App::start(paths).await?;
    let result = app.runtime.registry().run_quick_action(id).await;
    app.shutdown().await;
    print_result(result?)
}

fn print_result(result: ToolResult) -> anyhow::Result<()> {
    if !result.success {
        anyhow::bail!(result.error.unwrap_or_else(|| "tool failed".to_string()));
    }
    match result.data {
        Some(serde_json::Value::String(text)) => println!("{}", text),
        Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
        None => println!("ok"),
    }
    Ok(())
}
