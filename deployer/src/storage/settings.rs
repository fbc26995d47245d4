//! Settings file management

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};

use crate::deploy::executor::{ExecutorOptions, GroupScheduling};
use crate::deploy::orchestrator::OrchestratorOptions;
use crate::errors::DeployError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Deployer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    /// Base directory for working trees, deploy records and logs
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// Platform tag stored on every deploy
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Local HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// Git client configuration
    #[serde(default)]
    pub git: GitSettings,

    /// Build terminal configuration
    #[serde(default)]
    pub shell: ShellSettings,

    /// Deploy pipeline configuration
    #[serde(default)]
    pub deploy: DeploySettings,

    /// Deploy record backend
    #[serde(default)]
    pub store: StoreKind,

    /// How IIS sites are looked up
    #[serde(default)]
    pub site_resolver: SiteResolverKind,

    /// Known sites, used by the static resolver
    #[serde(default)]
    pub sites: HashMap<String, SiteSettings>,
}

fn default_storage_dir() -> PathBuf {
    #[cfg(windows)]
    let dir = PathBuf::from(r"C:\ProgramData\iis-deployer");

    #[cfg(not(windows))]
    let dir = PathBuf::from("/var/lib/iis-deployer");

    dir
}

fn default_platform() -> String {
    "iis".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            storage_dir: default_storage_dir(),
            platform: default_platform(),
            server: ServerSettings::default(),
            git: GitSettings::default(),
            shell: ShellSettings::default(),
            deploy: DeploySettings::default(),
            store: StoreKind::default(),
            site_resolver: SiteResolverKind::default(),
            sites: HashMap::new(),
        }
    }
}

impl Settings {
    /// Read settings from `file`; a missing file yields the defaults
    pub async fn load(file: &File) -> Result<Self, DeployError> {
        if !file.exists().await {
            return Ok(Self::default());
        }

        file.read_json().await.map_err(|e| {
            DeployError::ConfigError(format!("invalid settings file {}: {}", file.path().display(), e))
        })
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            platform: self.platform.clone(),
            delete_settle: Duration::from_millis(self.deploy.delete_settle_ms),
        }
    }

    /// Executor options derived from the shell and deploy sections
    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            command_timeout: Duration::from_secs(self.shell.command_timeout_secs),
            poll_interval: Duration::from_millis(self.shell.poll_interval_ms),
            exit_grace: Duration::from_secs(self.shell.exit_grace_secs),
            output_settle: Duration::from_millis(self.shell.output_settle_ms),
            extra_paths: self.shell.extra_paths.clone(),
            scheduling: self.deploy.group_scheduling,
        }
    }
}

/// Local HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8085
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Git client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSettings {
    /// Git executable
    #[serde(default = "default_git_program")]
    pub program: String,

    /// Upper bound for a single git invocation
    #[serde(default = "default_git_timeout")]
    pub timeout_secs: u64,

    /// Username for the explicit-credential clone fallback
    #[serde(default)]
    pub username: Option<String>,

    /// Access token for the explicit-credential clone fallback
    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret")]
    pub token: Option<Arc<SecretString>>,
}

fn default_git_program() -> String {
    "git".to_string()
}

fn default_git_timeout() -> u64 {
    300
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<Arc<SecretString>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .filter(|s| !s.is_empty())
        .map(|s| Arc::new(SecretString::from(s))))
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            program: default_git_program(),
            timeout_secs: default_git_timeout(),
            username: None,
            token: None,
        }
    }
}

/// Build terminal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellSettings {
    /// Default ceiling for one command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Sentinel file polling interval
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Time the shell gets to exit after stdin is closed
    #[serde(default = "default_exit_grace")]
    pub exit_grace_secs: u64,

    /// Time given to output readers after a command completes
    #[serde(default = "default_output_settle")]
    pub output_settle_ms: u64,

    /// Toolchain directories appended to PATH in every terminal
    #[serde(default = "default_extra_paths")]
    pub extra_paths: Vec<String>,
}

fn default_command_timeout() -> u64 {
    60
}

fn default_poll_interval() -> u64 {
    250
}

fn default_exit_grace() -> u64 {
    5
}

fn default_output_settle() -> u64 {
    100
}

fn default_extra_paths() -> Vec<String> {
    #[cfg(windows)]
    let paths = vec![
        r"C:\Program Files\nodejs".to_string(),
        r"C:\Program Files (x86)\nodejs".to_string(),
    ];

    #[cfg(not(windows))]
    let paths = vec!["/usr/local/bin".to_string()];

    paths
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            poll_interval_ms: default_poll_interval(),
            exit_grace_secs: default_exit_grace(),
            output_settle_ms: default_output_settle(),
            extra_paths: default_extra_paths(),
        }
    }
}

/// Deploy pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySettings {
    /// Whether terminal groups run one after another or side by side
    #[serde(default)]
    pub group_scheduling: GroupScheduling,

    /// Pause between deleting and recreating the target directory
    #[serde(default = "default_delete_settle")]
    pub delete_settle_ms: u64,
}

fn default_delete_settle() -> u64 {
    500
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            group_scheduling: GroupScheduling::default(),
            delete_settle_ms: default_delete_settle(),
        }
    }
}

/// Deploy record backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    #[default]
    Json,
}

/// IIS site lookup strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteResolverKind {
    #[default]
    Static,
    Powershell,
}

/// A statically configured IIS site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteSettings {
    pub physical_path: PathBuf,

    /// Nested applications keyed by path, e.g. `"/api"`
    #[serde(default)]
    pub applications: HashMap<String, PathBuf>,
}
