//! Store tests shared by both backends

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use iis_deployer::models::deploy::{
    BuildCommand, CommandStatus, Deploy, DeployCommand, DeployStatus, HistoryEntry,
};
use iis_deployer::storage::layout::StorageLayout;
use iis_deployer::store::{DeployStore, JsonFileStore, MemoryStore};

fn new_deploy() -> Deploy {
    Deploy {
        id: Uuid::new_v4(),
        repo_url: "https://example.com/app.git".to_string(),
        branch: "main".to_string(),
        build_output_path: "dist".to_string(),
        target_name: "app".to_string(),
        user_id: "system".to_string(),
        status: DeployStatus::Started,
        message: Some("deploy started".to_string()),
        platform: "iis".to_string(),
        created_at: Utc::now(),
    }
}

fn commands(deploy_id: Uuid) -> Vec<DeployCommand> {
    [("2", 1, "dotnet publish"), ("1", 1, "npm ci"), ("1", 2, "npm run build")]
        .iter()
        .map(|(terminal, order, text)| {
            DeployCommand::pending(
                deploy_id,
                &BuildCommand {
                    text: text.to_string(),
                    order: *order,
                    terminal_id: terminal.to_string(),
                    timeout_secs: None,
                },
            )
        })
        .collect()
}

/// Walk a deploy through its full lifecycle against `store`
async fn exercise(store: Arc<dyn DeployStore>) {
    let deploy = new_deploy();
    store
        .create_deploy(
            &deploy,
            &HistoryEntry::new(deploy.id, DeployStatus::Started, deploy.message.clone()),
        )
        .await
        .unwrap();

    let mut rows = commands(deploy.id);
    store.insert_commands(&rows).await.unwrap();
    store
        .append_history(&HistoryEntry::new(deploy.id, DeployStatus::Running, None))
        .await
        .unwrap();

    for row in rows.iter_mut() {
        row.status = CommandStatus::Success;
        row.message = Some("executed successfully".to_string());
        row.executed_at = Some(Utc::now());
        store.update_command(row).await.unwrap();
    }
    store
        .append_history(&HistoryEntry::new(
            deploy.id,
            DeployStatus::Success,
            Some("deployed 4 file(s)".to_string()),
        ))
        .await
        .unwrap();

    let snapshot = store.get_deploy(deploy.id).await.unwrap().unwrap();
    assert_eq!(snapshot.commands.len(), 3);
    let order: Vec<_> = snapshot
        .commands
        .iter()
        .map(|c| (c.terminal_id.as_str(), c.order))
        .collect();
    assert_eq!(order, vec![("1", 1), ("1", 2), ("2", 1)]);
    assert!(snapshot.commands.iter().all(|c| c.status == CommandStatus::Success));

    assert_eq!(snapshot.history.len(), 3);
    assert_eq!(snapshot.deploy.status, DeployStatus::Success);
    assert_eq!(snapshot.deploy.message.as_deref(), Some("deployed 4 file(s)"));
    assert_eq!(snapshot.latest_history().unwrap().status, snapshot.deploy.status);
}

#[tokio::test]
async fn test_memory_store_lifecycle() {
    exercise(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_json_store_lifecycle() {
    let temp = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(temp.path());
    layout.setup().await.unwrap();

    exercise(Arc::new(JsonFileStore::new(layout.deploys_dir()))).await;

    let files = std::fs::read_dir(layout.deploys_dir().path()).unwrap().count();
    assert_eq!(files, 1);
}

#[test]
fn test_update_of_unknown_command_fails() {
    let store = MemoryStore::new();
    let deploy = new_deploy();

    tokio_test::block_on(async {
        store
            .create_deploy(&deploy, &HistoryEntry::new(deploy.id, DeployStatus::Started, None))
            .await
            .unwrap();

        let stray = commands(deploy.id).remove(0);
        assert!(store.update_command(&stray).await.is_err());
    });
}
