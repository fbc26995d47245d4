//! Build command execution across terminal groups

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::deploy::shell::{Invocation, ShellKind};
use crate::deploy::terminal::{SessionTiming, TerminalSession};
use crate::errors::DeployError;
use crate::models::deploy::{CommandStatus, DeployCommand};
use crate::store::DeployStore;

/// How terminal groups are scheduled relative to each other
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupScheduling {
    /// One group after another, in terminal id order
    #[default]
    Sequential,
    /// All groups at once, each in its own shell
    Concurrent,
}

/// Executor tuning
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Ceiling for a command without its own timeout
    pub command_timeout: Duration,
    pub poll_interval: Duration,

    /// How long a shell may take to exit once its stdin is closed
    pub exit_grace: Duration,
    pub output_settle: Duration,

    /// Directories appended to PATH in every session
    pub extra_paths: Vec<String>,
    pub scheduling: GroupScheduling,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(250),
            exit_grace: Duration::from_secs(5),
            output_settle: Duration::from_millis(100),
            extra_paths: Vec::new(),
            scheduling: GroupScheduling::Sequential,
        }
    }
}

impl ExecutorOptions {
    fn timing(&self) -> SessionTiming {
        SessionTiming {
            poll_interval: self.poll_interval,
            output_settle: self.output_settle,
        }
    }
}

/// Runs a deploy's commands, persisting each status change as it happens
pub struct CommandExecutor {
    store: Arc<dyn DeployStore>,
    shell: ShellKind,
    options: ExecutorOptions,
}

impl CommandExecutor {
    pub fn new(store: Arc<dyn DeployStore>, options: ExecutorOptions) -> Self {
        Self::with_shell(store, ShellKind::native(), options)
    }

    pub fn with_shell(store: Arc<dyn DeployStore>, shell: ShellKind, options: ExecutorOptions) -> Self {
        Self {
            store,
            shell,
            options,
        }
    }

    /// Execute every command; `Ok(false)` when any command did not succeed
    ///
    /// A failure stops the rest of its own group only. Errors are returned for
    /// store faults, never for command failures.
    pub async fn execute_all(
        &self,
        commands: Vec<DeployCommand>,
        work_dir: &Path,
    ) -> Result<bool, DeployError> {
        let groups = group_commands(commands);
        if groups.is_empty() {
            info!("No build commands to run");
            return Ok(true);
        }

        info!(
            "Running {} terminal group(s) ({:?})",
            groups.len(),
            self.options.scheduling
        );

        let results = match self.options.scheduling {
            GroupScheduling::Sequential => {
                let mut results = Vec::with_capacity(groups.len());
                for (terminal_id, commands) in groups {
                    results.push(self.run_group(&terminal_id, commands, work_dir).await);
                }
                results
            }
            GroupScheduling::Concurrent => {
                join_all(
                    groups
                        .iter()
                        .map(|(terminal_id, commands)| {
                            self.run_group(terminal_id, commands.clone(), work_dir)
                        }),
                )
                .await
            }
        };

        let mut all_ok = true;
        for result in results {
            all_ok &= result?;
        }
        Ok(all_ok)
    }

    async fn run_group(
        &self,
        terminal_id: &str,
        mut commands: Vec<DeployCommand>,
        work_dir: &Path,
    ) -> Result<bool, DeployError> {
        let session = TerminalSession::spawn(
            terminal_id,
            self.shell,
            work_dir,
            &self.options.extra_paths,
            self.options.timing(),
        )
        .await;

        let mut session = match session {
            Ok(session) => session,
            Err(e) => {
                error!("Terminal {} could not start: {}", terminal_id, e);
                if let Some(first) = commands.first_mut() {
                    first.status = CommandStatus::Error;
                    first.message = Some(e.to_string());
                    first.executed_at = Some(Utc::now());
                    self.store.update_command(first).await?;
                }
                return Ok(false);
            }
        };

        let result = self.run_in_session(&mut session, &mut commands).await;
        session.close(self.options.exit_grace).await;
        result
    }

    async fn run_in_session(
        &self,
        session: &mut TerminalSession,
        commands: &mut [DeployCommand],
    ) -> Result<bool, DeployError> {
        for command in commands.iter_mut() {
            command.status = CommandStatus::Running;
            command.executed_at = Some(Utc::now());
            self.store.update_command(command).await?;

            let line = Invocation::classify(&command.text).render(self.shell);
            let timeout = command
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(self.options.command_timeout);

            info!(
                "Terminal {} [{}]: {}",
                session.terminal_id(),
                command.order,
                command.text
            );
            let run = session.run(&line, timeout).await;

            command.status = run.status();
            command.message = Some(run.message());
            self.store.update_command(command).await?;

            if command.status != CommandStatus::Success {
                warn!(
                    "Terminal {} stopped at command {}: {}",
                    session.terminal_id(),
                    command.order,
                    run.message()
                );
                return Ok(false);
            }
        }

        Ok(true)
    }
}

/// Group commands by terminal id, each group sorted by order
fn group_commands(commands: Vec<DeployCommand>) -> BTreeMap<String, Vec<DeployCommand>> {
    let mut groups: BTreeMap<String, Vec<DeployCommand>> = BTreeMap::new();
    for command in commands {
        groups.entry(command.terminal_id.clone()).or_default().push(command);
    }
    for group in groups.values_mut() {
        group.sort_by_key(|c| c.order);
    }
    groups
}
