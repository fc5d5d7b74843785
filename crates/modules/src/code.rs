use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use deskpilot_core::{
    AiMessage, CapabilityModule, ContextLayer, ContextSignal, ContextSnapshot, Intent, ModuleCapabilities,
    ModuleConfig, ModuleResult, QuickAction, Result, ToolDefinition, ToolResult, UiHint,
};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::git::run_git;
use crate::llm::Completer;
use crate::project::{detect_project, ProjectInfo};
use crate::{require_str, str_arg, strings};

pub const PROJECT_SIGNAL: &str = "code.project";

const SYSTEM_PROMPT: &str =
    "You are an expert software engineer. Give precise, working answers and show code in fenced blocks.";

pub struct CodeModule {
    completer: Completer,
    triggers: Vec<String>,
    project: Mutex<Option<ProjectInfo>>,
}

impl CodeModule {
    pub fn new(completer: Completer) -> Self {
        Self {
            completer,
            triggers: strings(&[
                "code", "function", "bug", "debug", "git", "commit", "review", "refactor", "test", "programming",
            ]),
            project: Mutex::new(None),
        }
    }

    pub fn project(&self) -> Option<ProjectInfo> {
        self.project.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Explicit `path` argument, else the detected project, else the working directory.
    fn resolve_dir(&self, args: &Value) -> PathBuf {
        str_arg(args, "path")
            .map(PathBuf::from)
            .or_else(|| self.project().map(|p| PathBuf::from(p.path)))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    async fn detect(&self, dir: PathBuf) -> ProjectInfo {
        let info = detect_project(&dir).await;
        info!(path = %info.path, kind = %info.kind, "Project detected");
        *self.project.lock().unwrap_or_else(|e| e.into_inner()) = Some(info.clone());
        info
    }

    async fn git(&self, args: &Value, git_args: &[&str]) -> Result<ToolResult> {
        let out = run_git(&self.resolve_dir(args), git_args).await?;
        Ok(if out.success {
            ToolResult::ok(json!(out.stdout))
        } else {
            ToolResult::err(out.stderr.trim().to_string())
        })
    }

    async fn suggest_commit(&self, args: &Value) -> Result<ToolResult> {
        let dir = self.resolve_dir(args);
        let mut out = run_git(&dir, &["diff", "--cached"]).await?;
        if out.success && out.stdout.trim().is_empty() {
            out = run_git(&dir, &["diff"]).await?;
        }
        if !out.success {
            return Ok(ToolResult::err(out.stderr.trim().to_string()));
        }
        if out.stdout.trim().is_empty() {
            return Ok(ToolResult::err("No changes to describe"));
        }
        let prompt = format!(
            "Write a concise commit message for this diff. Use an imperative summary line under 72 characters, \
             then a blank line and a short body if needed.\n\n{}",
            out.stdout
        );
        Ok(self.completer.tool_reply(SYSTEM_PROMPT, prompt).await)
    }

    fn prompt_for(name: &str, args: &Value) -> std::result::Result<String, ToolResult> {
        Ok(match name {
            "code.generate" => {
                let description = require_str(args, "description")?;
                match str_arg(args, "language") {
                    Some(lang) => format!("Write {} code for the following:\n\n{}", lang, description),
                    None => format!("Write code for the following:\n\n{}", description),
                }
            }
            "code.review" => format!(
                "Review this code. List bugs, risky patterns and readability issues, most severe first:\n\n{}",
                require_str(args, "code")?
            ),
            "code.explain" => format!("Explain what this code does:\n\n{}", require_str(args, "code")?),
            other => return Err(ToolResult::err(format!("Unknown tool: {}", other))),
        })
    }
}

fn path_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "path": { "type": "string" } }
    })
}

fn code_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "code": { "type": "string" } },
        "required": ["code"]
    })
}

#[async_trait]
impl CapabilityModule for CodeModule {
    fn id(&self) -> &str {
        "code"
    }

    fn name(&self) -> &str {
        "Code"
    }

    fn description(&self) -> &str {
        "Code generation, review, debugging, and git integration"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn triggers(&self) -> &[String] {
        &self.triggers
    }

    /// Detects the project at the `projectPath` setting, or the working directory.
    async fn init(&self, config: &ModuleConfig) -> Result<()> {
        let dir = match config.setting_str("projectPath") {
            Some(p) => PathBuf::from(p),
            None => std::env::current_dir()?,
        };
        self.detect(dir).await;
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        *self.project.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }

    fn can_handle(&self, intent: &Intent) -> bool {
        let raw = intent.raw().to_lowercase();
        self.triggers.iter().any(|t| raw.contains(t.as_str()))
    }

    async fn handle(&self, intent: &Intent, context: &ContextSnapshot) -> Result<ModuleResult> {
        let mut system = SYSTEM_PROMPT.to_string();
        if let Some(project) = context.signals.get(PROJECT_SIGNAL) {
            system.push_str(&format!("\n\nCurrent project: {}", project));
        }
        let request = self.completer.request(&system, vec![AiMessage::user(intent.raw())]);
        match self.completer.complete(&request).await {
            Ok(response) => Ok(ModuleResult::success(response.content).with_ui(UiHint::Markdown)),
            Err(e) => Ok(ModuleResult::failure(e.to_string())),
        }
    }

    fn capabilities(&self) -> ModuleCapabilities {
        ModuleCapabilities::none()
            .with_tools()
            .with_context_signals()
            .with_quick_actions()
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::new(
                "code.generate",
                "Generate code from a description",
                json!({
                    "type": "object",
                    "properties": {
                        "description": { "type": "string" },
                        "language": { "type": "string" }
                    },
                    "required": ["description"]
                }),
            ),
            ToolDefinition::new("code.review", "Review code for issues", code_schema()),
            ToolDefinition::new("code.explain", "Explain code or project structure", code_schema()),
            ToolDefinition::new("code.git_status", "Get git status of the current project", path_schema()),
            ToolDefinition::new("code.git_diff", "Get current git changes", path_schema()),
            ToolDefinition::new(
                "code.suggest_commit",
                "Generate a commit message from the current diff",
                path_schema(),
            ),
            ToolDefinition::new("code.detect_project", "Detect project type and git branch", path_schema()),
        ]
    }

    async fn execute_tool(&self, name: &str, args: Value) -> Result<ToolResult> {
        debug!(tool = %name, "Code tool");
        match name {
            "code.git_status" => self.git(&args, &["status", "--porcelain"]).await,
            "code.git_diff" => self.git(&args, &["diff"]).await,
            "code.suggest_commit" => self.suggest_commit(&args).await,
            "code.detect_project" => {
                let info = self.detect(self.resolve_dir(&args)).await;
                Ok(ToolResult::ok(serde_json::to_value(info)?))
            }
            _ => match Self::prompt_for(name, &args) {
                Ok(prompt) => Ok(self.completer.tool_reply(SYSTEM_PROMPT, prompt).await),
                Err(failed) => Ok(failed),
            },
        }
    }

    async fn context_signals(&self) -> Result<Vec<ContextSignal>> {
        let Some(project) = self.project() else {
            return Ok(Vec::new());
        };
        Ok(vec![ContextSignal::new(
            ContextLayer::Session,
            PROJECT_SIGNAL,
            serde_json::to_value(project)?,
            self.id(),
        )])
    }

    fn quick_actions(&self) -> Vec<QuickAction> {
        vec![QuickAction {
            id: "code.git_status".to_string(),
            label: "Git Status".to_string(),
            icon: Some("git-branch".to_string()),
            description: Some("Show git status".to_string()),
            module_id: self.id().to_string(),
        }]
    }
}
