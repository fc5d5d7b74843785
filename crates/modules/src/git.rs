use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use deskpilot_core::{Error, Result};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::safe_truncate;

const GIT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_OUTPUT_CHARS: usize = 10_000;

#[derive(Debug, Clone)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `git <args>` in `dir` without a shell.
pub async fn run_git(dir: &Path, args: &[&str]) -> Result<GitOutput> {
    debug!(dir = %dir.display(), args = ?args, "Running git");
    let mut cmd = Command::new("git");
    cmd.args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match timeout(GIT_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) => Ok(GitOutput {
            success: output.status.success(),
            stdout: clip(String::from_utf8_lossy(&output.stdout).into_owned()),
            stderr: clip(String::from_utf8_lossy(&output.stderr).into_owned()),
        }),
        Ok(Err(e)) => Err(Error::Module(format!("Failed to run git: {}", e))),
        Err(_) => Err(Error::Module(format!(
            "git timed out after {} seconds",
            GIT_TIMEOUT.as_secs()
        ))),
    }
}

fn clip(s: String) -> String {
    if s.len() > MAX_OUTPUT_CHARS {
        format!("{}\n... (output truncated)", safe_truncate(&s, MAX_OUTPUT_CHARS))
    } else {
        s
    }
}
