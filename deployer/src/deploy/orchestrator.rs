//! Deploy orchestration
//!
//! Sequence per deploy: resolve target, acquire source, persist pending
//! commands, run them, place artifacts, finalize. Every status change is its
//! own small store write so a deploy can be observed while it runs.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::deploy::artifacts::{deploy_artifacts, normalize_rel_path};
use crate::deploy::executor::CommandExecutor;
use crate::deploy::fsm::{DeployEvent, DeployFsm};
use crate::deploy::git::SourceAcquirer;
use crate::deploy::site::{application_segments, resolve_target, SiteResolver};
use crate::errors::DeployError;
use crate::models::deploy::{
    CommandStatus, CommandSummary, Deploy, DeployCommand, DeployOutcome, DeployRequest,
    DeployStatus, HistoryEntry, SourceOutcome,
};
use crate::storage::layout::StorageLayout;
use crate::store::DeployStore;

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Platform tag recorded on every deploy
    pub platform: String,
    pub delete_settle: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            platform: "iis".to_string(),
            delete_settle: Duration::from_millis(500),
        }
    }
}

/// How the pipeline ended when nothing errored
enum PipelineEnd {
    Completed(String),
    CommandsFailed(String),
}

/// Owns the deploy-level state machine and persists each transition
struct DeployTracker {
    deploy_id: Uuid,
    fsm: DeployFsm,
    store: Arc<dyn DeployStore>,
}

impl DeployTracker {
    fn new(deploy_id: Uuid, store: Arc<dyn DeployStore>) -> Self {
        Self {
            deploy_id,
            fsm: DeployFsm::new(),
            store,
        }
    }

    /// The in-memory state only advances once the history write succeeded
    async fn apply(&mut self, event: DeployEvent) -> Result<DeployStatus, DeployError> {
        let mut next = self.fsm.clone();
        let status = next.process(event).map_err(DeployError::Internal)?;

        let entry = HistoryEntry::new(self.deploy_id, status, next.message().map(String::from));
        self.store.append_history(&entry).await?;

        self.fsm = next;
        Ok(status)
    }
}

pub struct Orchestrator {
    store: Arc<dyn DeployStore>,
    sources: SourceAcquirer,
    sites: Arc<dyn SiteResolver>,
    executor: CommandExecutor,
    layout: StorageLayout,
    options: OrchestratorOptions,
    repo_locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn DeployStore>,
        sources: SourceAcquirer,
        sites: Arc<dyn SiteResolver>,
        executor: CommandExecutor,
        layout: StorageLayout,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            store,
            sources,
            sites,
            executor,
            layout,
            options,
            repo_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn DeployStore> {
        &self.store
    }

    /// Run one deploy to completion
    ///
    /// Tool failures, timeouts and missing resources end the deploy as
    /// `Failed` and come back as an unsuccessful outcome. Any other error is
    /// recorded on the deploy and then returned.
    pub async fn deploy(
        &self,
        request: DeployRequest,
        user_id: &str,
    ) -> Result<DeployOutcome, DeployError> {
        validate(&request)?;

        let work_dir = self.layout.repo_dir(&request.repo_url).path().to_path_buf();
        let lock = self.repo_lock(&work_dir);
        let _guard = lock.lock().await;

        let deploy = Deploy {
            id: Uuid::new_v4(),
            repo_url: request.repo_url.clone(),
            branch: request.branch.clone(),
            build_output_path: request.build_output_rel_path.clone(),
            target_name: request.target_name(),
            user_id: user_id.to_string(),
            status: DeployStatus::Started,
            message: Some("deploy started".to_string()),
            platform: self.options.platform.clone(),
            created_at: Utc::now(),
        };
        let started = HistoryEntry::new(deploy.id, DeployStatus::Started, deploy.message.clone());
        self.store.create_deploy(&deploy, &started).await?;

        info!(
            "Deploy {} started: {} ({}) -> {} by {}",
            deploy.id, deploy.repo_url, deploy.branch, deploy.target_name, user_id
        );

        let mut tracker = DeployTracker::new(deploy.id, self.store.clone());
        let mut source = None;
        let result = self
            .run_pipeline(&request, deploy.id, &work_dir, &mut tracker, &mut source)
            .await;

        let event = match result {
            Ok(PipelineEnd::Completed(message)) => DeployEvent::Succeed(message),
            Ok(PipelineEnd::CommandsFailed(message)) => DeployEvent::Fail(message),
            Err(e) if e.is_expected() => DeployEvent::Fail(e.to_string()),
            Err(e) => {
                error!("Deploy {} aborted: {}", deploy.id, e);
                if let Err(record_err) = tracker.apply(DeployEvent::Fail(e.to_string())).await {
                    error!("Failed to record failure of deploy {}: {}", deploy.id, record_err);
                }
                return Err(e);
            }
        };

        if let DeployEvent::Fail(message) = &event {
            warn!("Deploy {} failed: {}", deploy.id, message);
        }
        let final_status = tracker.apply(event).await?;

        if final_status == DeployStatus::Success {
            info!("Deploy {} succeeded", deploy.id);
        }

        self.outcome(&tracker, final_status, source).await
    }

    async fn run_pipeline(
        &self,
        request: &DeployRequest,
        deploy_id: Uuid,
        work_dir: &Path,
        tracker: &mut DeployTracker,
        source: &mut Option<SourceOutcome>,
    ) -> Result<PipelineEnd, DeployError> {
        let target = resolve_target(self.sites.as_ref(), request).await?;
        info!("Deploy {} target: {}", deploy_id, target.display());

        *source = Some(
            self.sources
                .acquire(&request.repo_url, &request.branch, work_dir)
                .await?,
        );

        let commands: Vec<DeployCommand> = request
            .build_commands
            .iter()
            .map(|build| DeployCommand::pending(deploy_id, build))
            .collect();
        self.store.insert_commands(&commands).await?;

        tracker
            .apply(DeployEvent::BeginCommands(format!(
                "running {} build command(s)",
                commands.len()
            )))
            .await?;

        if !self.executor.execute_all(commands, work_dir).await? {
            return Ok(PipelineEnd::CommandsFailed(
                self.first_failure(deploy_id).await?,
            ));
        }

        let report = deploy_artifacts(
            work_dir,
            &request.build_output_rel_path,
            &target,
            self.options.delete_settle,
        )
        .await?;

        Ok(PipelineEnd::Completed(format!(
            "deployed {} file(s) to {}",
            report.files_copied,
            report.target.display()
        )))
    }

    /// Describe the first command that did not succeed
    async fn first_failure(&self, deploy_id: Uuid) -> Result<String, DeployError> {
        let snapshot = self
            .store
            .get_deploy(deploy_id)
            .await?
            .ok_or_else(|| DeployError::NotFound(format!("deploy {}", deploy_id)))?;

        let failed = snapshot
            .commands
            .iter()
            .find(|c| matches!(c.status, CommandStatus::Failed | CommandStatus::Error));

        Ok(match failed {
            Some(command) => format!(
                "command {} in terminal {} ({}) {}: {}",
                command.order,
                command.terminal_id,
                command.text,
                command.status,
                command.message.as_deref().unwrap_or_default()
            ),
            None => "build commands did not complete".to_string(),
        })
    }

    async fn outcome(
        &self,
        tracker: &DeployTracker,
        final_status: DeployStatus,
        source: Option<SourceOutcome>,
    ) -> Result<DeployOutcome, DeployError> {
        let commands = self
            .store
            .get_deploy(tracker.deploy_id)
            .await?
            .map(|snapshot| snapshot.commands.iter().map(CommandSummary::from).collect())
            .unwrap_or_default();

        Ok(DeployOutcome {
            success: final_status == DeployStatus::Success,
            message: tracker.fsm.message().unwrap_or_default().to_string(),
            deploy_id: tracker.deploy_id,
            final_status,
            commands,
            source,
        })
    }

    fn repo_lock(&self, work_dir: &Path) -> Arc<AsyncMutex<()>> {
        let mut locks = self.repo_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(work_dir.to_path_buf()).or_default().clone()
    }
}

/// Reject malformed requests before any record is written
pub fn validate(request: &DeployRequest) -> Result<(), DeployError> {
    let invalid = |msg: &str| Err(DeployError::ValidationError(msg.to_string()));

    if request.repo_url.trim().is_empty() {
        return invalid("repoUrl is required");
    }
    if request.branch.trim().is_empty() {
        return invalid("branch is required");
    }

    let has_target = request
        .target_path
        .as_deref()
        .is_some_and(|p| !p.trim().is_empty());
    if !has_target && request.iis_site_name.trim().is_empty() {
        return invalid("iisSiteName is required unless targetPath is given");
    }

    let mut seen = HashSet::new();
    for command in &request.build_commands {
        if command.text.trim().is_empty() {
            return invalid("build command text must not be empty");
        }
        if command.order < 1 {
            return invalid("build command order starts at 1");
        }
        if command.terminal_id.trim().is_empty() {
            return invalid("build command terminalId must not be empty");
        }
        if !seen.insert((command.terminal_id.as_str(), command.order)) {
            return Err(DeployError::ValidationError(format!(
                "duplicate order {} in terminal {}",
                command.order, command.terminal_id
            )));
        }
    }

    normalize_rel_path(&request.build_output_rel_path)?;
    if let Some(app_path) = request.application_path.as_deref() {
        application_segments(app_path)?;
    }
    Ok(())
}
