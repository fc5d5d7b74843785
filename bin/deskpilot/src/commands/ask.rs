use deskpilot_core::{ConversationMessage, ConversationStore, Paths, Role};

use super::App;

pub async fn run(paths: &Paths, message: &str, assisted: bool, save: bool) -> anyhow::Result<()> {
    let app = App::start(paths).await?;
    let (intent, result) = app.runtime.handle_message(message, assisted).await;
    tracing::debug!(primary = %intent.primary(), confidence = intent.confidence(), "Handled");

    if !result.success {
        let error = result.error.unwrap_or_else(|| "unknown error".to_string());
        app.shutdown().await;
        anyhow::bail!("[{}] {}", intent.primary(), error);
    }

    let reply = result.message.unwrap_or_default();
    println!("{}", reply);

    if save {
        let conv = app.conversations.create(None).await?;
        app.conversations
            .add_message(&conv.id, ConversationMessage::new(Role::User, message).with_module(intent.primary()))
            .await?;
        app.conversations
            .add_message(&conv.id, ConversationMessage::new(Role::Assistant, reply).with_module(intent.primary()))
            .await?;
        eprintln!("saved as conversation {}", conv.id);
    }

    app.shutdown().await;
    Ok(())
}
