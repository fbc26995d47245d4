//! Persistence of deploys, their commands, and status history

pub mod json;
pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::DeployError;
use crate::models::deploy::{Deploy, DeployCommand, DeploySnapshot, HistoryEntry};

pub use json::JsonFileStore;
pub use memory::MemoryStore;

/// Durable record of deploy progress
///
/// Every write is visible to readers as soon as the call returns, so a
/// deploy that is still running can be inspected mid-flight.
#[async_trait]
pub trait DeployStore: Send + Sync {
    /// Record a new deploy together with its first history entry
    async fn create_deploy(&self, deploy: &Deploy, entry: &HistoryEntry) -> Result<(), DeployError>;

    /// Append a status transition and mirror it onto the deploy row
    async fn append_history(&self, entry: &HistoryEntry) -> Result<(), DeployError>;

    async fn insert_commands(&self, commands: &[DeployCommand]) -> Result<(), DeployError>;

    /// Replace a stored command (matched by id) with `command`
    async fn update_command(&self, command: &DeployCommand) -> Result<(), DeployError>;

    async fn get_deploy(&self, id: Uuid) -> Result<Option<DeploySnapshot>, DeployError>;

    /// All deploys, newest first
    async fn list_deploys(&self) -> Result<Vec<Deploy>, DeployError>;
}

// Mutations shared by both stores; they operate on one snapshot in place.

fn apply_history(snapshot: &mut DeploySnapshot, entry: &HistoryEntry) {
    snapshot.deploy.status = entry.status;
    snapshot.deploy.message = entry.message.clone();
    snapshot.history.push(entry.clone());
}

fn apply_command(snapshot: &mut DeploySnapshot, command: &DeployCommand) -> Result<(), DeployError> {
    let slot = snapshot
        .commands
        .iter_mut()
        .find(|c| c.id == command.id)
        .ok_or_else(|| DeployError::StoreError(format!("unknown command {}", command.id)))?;
    *slot = command.clone();
    Ok(())
}

fn unknown_deploy(id: Uuid) -> DeployError {
    DeployError::StoreError(format!("unknown deploy {}", id))
}

fn sort_newest_first(deploys: &mut [Deploy]) {
    deploys.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
