//! Deploy aggregate models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall status of a deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStatus {
    Started,
    Running,
    Success,
    Failed,
}

impl DeployStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployStatus::Success | DeployStatus::Failed)
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeployStatus::Started => "started",
            DeployStatus::Running => "running",
            DeployStatus::Success => "success",
            DeployStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Status of a single build command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Running,
    Success,
    /// The command ran and exited non-zero
    Failed,
    /// The command could not be run to completion (timeout, spawn failure)
    Error,
}

impl CommandStatus {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            CommandStatus::Success | CommandStatus::Failed | CommandStatus::Error
        )
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Running => "running",
            CommandStatus::Success => "success",
            CommandStatus::Failed => "failed",
            CommandStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One deployment attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deploy {
    pub id: Uuid,
    pub repo_url: String,
    pub branch: String,

    /// Build output directory, relative to the repository root
    pub build_output_path: String,

    /// IIS site name, with the application path appended when present
    pub target_name: String,

    pub user_id: String,
    pub status: DeployStatus,
    pub message: Option<String>,

    /// Platform tag (e.g. "iis")
    pub platform: String,
    pub created_at: DateTime<Utc>,
}

/// One build/setup step of a deploy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployCommand {
    pub id: Uuid,
    pub deploy_id: Uuid,
    pub text: String,

    /// 1-based position inside the terminal group
    pub order: u32,
    pub terminal_id: String,
    pub status: CommandStatus,
    pub message: Option<String>,
    pub executed_at: Option<DateTime<Utc>>,

    /// Overrides the executor's default command timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl DeployCommand {
    pub fn pending(deploy_id: Uuid, build: &BuildCommand) -> Self {
        Self {
            id: Uuid::new_v4(),
            deploy_id,
            text: build.text.clone(),
            order: build.order,
            terminal_id: build.terminal_id.clone(),
            status: CommandStatus::Pending,
            message: None,
            executed_at: None,
            timeout_secs: build.timeout_secs,
        }
    }
}

/// Immutable record of a deploy-level status transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub deploy_id: Uuid,
    pub status: DeployStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(deploy_id: Uuid, status: DeployStatus, message: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            deploy_id,
            status,
            message,
            created_at: Utc::now(),
        }
    }
}

/// A deploy with its commands and history, as read back from a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploySnapshot {
    pub deploy: Deploy,
    pub commands: Vec<DeployCommand>,
    pub history: Vec<HistoryEntry>,
}

impl DeploySnapshot {
    pub fn latest_history(&self) -> Option<&HistoryEntry> {
        self.history.last()
    }

    /// Sort commands by terminal group, then by order
    pub fn sort_commands(&mut self) {
        self.commands
            .sort_by(|a, b| a.terminal_id.cmp(&b.terminal_id).then(a.order.cmp(&b.order)));
    }
}

// ================================ REQUEST / RESULT ================================ //

/// A build command as submitted in a deploy request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildCommand {
    pub text: String,
    pub order: u32,

    #[serde(default = "default_terminal_id")]
    pub terminal_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_terminal_id() -> String {
    "1".to_string()
}

/// Deploy request consumed by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub repo_url: String,
    pub branch: String,

    #[serde(default)]
    pub build_commands: Vec<BuildCommand>,

    #[serde(default)]
    pub build_output_rel_path: String,

    pub iis_site_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
}

impl DeployRequest {
    /// Site name with the application path appended, e.g. `shop/api`
    pub fn target_name(&self) -> String {
        match self
            .application_path
            .as_deref()
            .map(|p| p.trim_matches(|c| c == '/' || c == '\\'))
        {
            Some(app) if !app.is_empty() => format!("{}/{}", self.iis_site_name, app),
            _ => self.iis_site_name.clone(),
        }
    }
}

/// Per-command summary in a deploy result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSummary {
    pub order: u32,
    pub terminal_id: String,
    pub status: CommandStatus,
    pub message: Option<String>,
}

impl From<&DeployCommand> for CommandSummary {
    fn from(command: &DeployCommand) -> Self {
        Self {
            order: command.order,
            terminal_id: command.terminal_id.clone(),
            status: command.status,
            message: command.message.clone(),
        }
    }
}

/// How the working tree was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceAction {
    /// Existing tree fast-forwarded with checkout + pull
    Updated,
    Cloned,
}

/// Which credentials the successful clone used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStrategy {
    /// No clone was needed
    None,
    /// Ambient credentials (credential manager, SSH agent)
    System,
    /// Stored username and token embedded in the URL
    Explicit,
}

/// Result of source acquisition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOutcome {
    pub action: SourceAction,
    pub strategy: CredentialStrategy,
    pub working_dir: String,
}

/// Result returned to the caller of a deploy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutcome {
    pub success: bool,
    pub message: String,
    pub deploy_id: Uuid,
    pub final_status: DeployStatus,
    pub commands: Vec<CommandSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceOutcome>,
}
