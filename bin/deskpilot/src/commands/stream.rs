use std::io::Write;

use deskpilot_core::{AiMessage, Paths};
use deskpilot_providers::StreamEnd;
use futures::StreamExt;

use super::App;

const SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Be concise and direct.";

pub async fn run(paths: &Paths, message: &str, model: Option<String>) -> anyhow::Result<()> {
    let app = App::bootstrap(paths)?;
    let mut request = app.completer.request(SYSTEM_PROMPT, vec![AiMessage::user(message)]);
    if let Some(model) = model {
        request.model = model;
    }
    let cancel = request.cancel.clone();

    let mut stream = app.runtime.providers().stream(request).await?;
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            delta = stream.next() => match delta {
                Some(text) => {
                    write!(stdout, "{}", text)?;
                    stdout.flush()?;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
            }
        }
    }
    writeln!(stdout)?;

    match stream.outcome() {
        Some(StreamEnd::Failed(reason)) => anyhow::bail!("stream failed after {} deltas: {}", stream.yielded(), reason),
        Some(StreamEnd::Cancelled) => eprintln!("(cancelled)"),
        _ => {}
    }
    Ok(())
}
