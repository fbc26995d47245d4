//! In-process store

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use super::{apply_command, apply_history, sort_newest_first, unknown_deploy, DeployStore};
use crate::errors::DeployError;
use crate::models::deploy::{Deploy, DeployCommand, DeploySnapshot, HistoryEntry};

/// Keeps every deploy in memory; contents are lost on restart
#[derive(Default)]
pub struct MemoryStore {
    deploys: RwLock<HashMap<Uuid, DeploySnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_snapshot<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut DeploySnapshot) -> Result<T, DeployError>,
    ) -> Result<T, DeployError> {
        let mut deploys = self.deploys.write().unwrap_or_else(|e| e.into_inner());
        let snapshot = deploys.get_mut(&id).ok_or_else(|| unknown_deploy(id))?;
        f(snapshot)
    }
}

#[async_trait]
impl DeployStore for MemoryStore {
    async fn create_deploy(&self, deploy: &Deploy, entry: &HistoryEntry) -> Result<(), DeployError> {
        let mut deploys = self.deploys.write().unwrap_or_else(|e| e.into_inner());
        if deploys.contains_key(&deploy.id) {
            return Err(DeployError::StoreError(format!("deploy {} already exists", deploy.id)));
        }

        deploys.insert(
            deploy.id,
            DeploySnapshot {
                deploy: deploy.clone(),
                commands: Vec::new(),
                history: vec![entry.clone()],
            },
        );
        Ok(())
    }

    async fn append_history(&self, entry: &HistoryEntry) -> Result<(), DeployError> {
        self.with_snapshot(entry.deploy_id, |snapshot| {
            apply_history(snapshot, entry);
            Ok(())
        })
    }

    async fn insert_commands(&self, commands: &[DeployCommand]) -> Result<(), DeployError> {
        for command in commands {
            self.with_snapshot(command.deploy_id, |snapshot| {
                snapshot.commands.push(command.clone());
                Ok(())
            })?;
        }
        Ok(())
    }

    async fn update_command(&self, command: &DeployCommand) -> Result<(), DeployError> {
        self.with_snapshot(command.deploy_id, |snapshot| apply_command(snapshot, command))
    }

    async fn get_deploy(&self, id: Uuid) -> Result<Option<DeploySnapshot>, DeployError> {
        let deploys = self.deploys.read().unwrap_or_else(|e| e.into_inner());
        Ok(deploys.get(&id).cloned().map(|mut snapshot| {
            snapshot.sort_commands();
            snapshot
        }))
    }

    async fn list_deploys(&self) -> Result<Vec<Deploy>, DeployError> {
        let deploys = self.deploys.read().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<Deploy> = deploys.values().map(|s| s.deploy.clone()).collect();
        sort_newest_first(&mut list);
        Ok(list)
    }
}
