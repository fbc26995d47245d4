//! File-backed store: one JSON document per deploy

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use super::{apply_command, apply_history, sort_newest_first, unknown_deploy, DeployStore};
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::deploy::{Deploy, DeployCommand, DeploySnapshot, HistoryEntry};

/// Stores `<deploy id>.json` files under a directory
///
/// Writes are serialized through a single lock so a read-modify-write of one
/// document never interleaves with another.
pub struct JsonFileStore {
    dir: Dir,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(dir: Dir) -> Self {
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    fn document(&self, id: Uuid) -> File {
        self.dir.file(&format!("{}.json", id))
    }

    async fn load(&self, id: Uuid) -> Result<Option<DeploySnapshot>, DeployError> {
        let file = self.document(id);
        if !file.exists().await {
            return Ok(None);
        }
        Ok(Some(file.read_json().await?))
    }

    async fn modify(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut DeploySnapshot) -> Result<(), DeployError> + Send,
    ) -> Result<(), DeployError> {
        let _guard = self.write_lock.lock().await;

        let mut snapshot = self.load(id).await?.ok_or_else(|| unknown_deploy(id))?;
        f(&mut snapshot)?;
        self.document(id).write_json(&snapshot).await
    }
}

#[async_trait]
impl DeployStore for JsonFileStore {
    async fn create_deploy(&self, deploy: &Deploy, entry: &HistoryEntry) -> Result<(), DeployError> {
        let _guard = self.write_lock.lock().await;

        let file = self.document(deploy.id);
        if file.exists().await {
            return Err(DeployError::StoreError(format!("deploy {} already exists", deploy.id)));
        }

        let snapshot = DeploySnapshot {
            deploy: deploy.clone(),
            commands: Vec::new(),
            history: vec![entry.clone()],
        };
        file.write_json(&snapshot).await
    }

    async fn append_history(&self, entry: &HistoryEntry) -> Result<(), DeployError> {
        self.modify(entry.deploy_id, |snapshot| {
            apply_history(snapshot, entry);
            Ok(())
        })
        .await
    }

    async fn insert_commands(&self, commands: &[DeployCommand]) -> Result<(), DeployError> {
        let Some(first) = commands.first() else {
            return Ok(());
        };

        if commands.iter().any(|c| c.deploy_id != first.deploy_id) {
            return Err(DeployError::StoreError(
                "commands of one batch must share a deploy".into(),
            ));
        }

        self.modify(first.deploy_id, |snapshot| {
            snapshot.commands.extend_from_slice(commands);
            Ok(())
        })
        .await
    }

    async fn update_command(&self, command: &DeployCommand) -> Result<(), DeployError> {
        self.modify(command.deploy_id, |snapshot| apply_command(snapshot, command))
            .await
    }

    async fn get_deploy(&self, id: Uuid) -> Result<Option<DeploySnapshot>, DeployError> {
        Ok(self.load(id).await?.map(|mut snapshot| {
            snapshot.sort_commands();
            snapshot
        }))
    }

    async fn list_deploys(&self) -> Result<Vec<Deploy>, DeployError> {
        if !self.dir.exists().await {
            return Ok(Vec::new());
        }

        let mut deploys = Vec::new();
        for path in self.dir.list_files().await? {
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match File::new(&path).read_json::<DeploySnapshot>().await {
                Ok(snapshot) => deploys.push(snapshot.deploy),
                Err(e) => warn!("Skipping unreadable deploy record {}: {}", path.display(), e),
            }
        }

        sort_newest_first(&mut deploys);
        Ok(deploys)
    }
}
