//! Best-effort detection of the project a code session is working in.

use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use crate::git::run_git;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
}

pub async fn detect_project(path: &Path) -> ProjectInfo {
    let mut info = ProjectInfo {
        path: path.display().to_string(),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        kind: "unknown".to_string(),
        framework: None,
        git_branch: None,
    };

    if let Ok(raw) = tokio::fs::read_to_string(path.join("package.json")).await {
        info.kind = "node".to_string();
        if let Ok(pkg) = serde_json::from_str::<Value>(&raw) {
            if let Some(name) = pkg.get("name").and_then(Value::as_str) {
                info.name = name.to_string();
            }
            info.framework = node_framework(&pkg).map(str::to_string);
        }
    } else if let Ok(raw) = tokio::fs::read_to_string(path.join("Cargo.toml")).await {
        info.kind = "rust".to_string();
        if let Some(name) = cargo_package_name(&raw) {
            info.name = name;
        }
    } else if path.join("go.mod").exists() {
        info.kind = "go".to_string();
    } else if path.join("pyproject.toml").exists() || path.join("requirements.txt").exists() {
        info.kind = "python".to_string();
    }

    if let Ok(out) = run_git(path, &["branch", "--show-current"]).await {
        let branch = out.stdout.trim();
        if out.success && !branch.is_empty() {
            info.git_branch = Some(branch.to_string());
        }
    }
    info
}

fn node_framework(pkg: &Value) -> Option<&'static str> {
    let deps = pkg.get("dependencies")?;
    [("next", "Next.js"), ("react", "React"), ("vue", "Vue"), ("svelte", "Svelte")]
        .into_iter()
        .find(|(dep, _)| deps.get(dep).is_some())
        .map(|(_, framework)| framework)
}

/// `name` from the `[package]` table, read line by line.
fn cargo_package_name(manifest: &str) -> Option<String> {
    let mut in_package = false;
    for line in manifest.lines().map(str::trim) {
        if line.starts_with('[') {
            in_package = line == "[package]";
            continue;
        }
        if !in_package {
            continue;
        }
        if let Some(rest) = line.strip_prefix("name") {
            let value = rest.trim_start().strip_prefix('=')?.trim();
            return Some(value.trim_matches('"').to_string());
        }
    }
    None
}
