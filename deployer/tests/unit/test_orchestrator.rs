//! End-to-end deploy tests
//!
//! Build commands run in real POSIX shells, so these only run on unix.

#![cfg(unix)]

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use iis_deployer::errors::DeployError;
use iis_deployer::models::deploy::{
    CommandStatus, CredentialStrategy, Deploy, DeployCommand, DeploySnapshot, DeployStatus,
    HistoryEntry, SourceAction,
};
use iis_deployer::store::{DeployStore, MemoryStore};

use crate::support::{command, node_build, request, Harness};

#[tokio::test]
async fn test_node_app_deploys_to_site_root() {
    let harness = Harness::new();
    std::fs::create_dir_all(harness.site_dir()).unwrap();
    std::fs::write(harness.site_dir().join("stale.html"), "old release").unwrap();

    let outcome = harness
        .orchestrator
        .deploy(request(node_build()), "alice")
        .await
        .unwrap();

    assert!(outcome.success, "{}", outcome.message);
    assert_eq!(outcome.final_status, DeployStatus::Success);
    assert_eq!(harness.git.count("clone"), 1);

    let source = outcome.source.unwrap();
    assert_eq!(source.action, SourceAction::Cloned);
    assert_eq!(source.strategy, CredentialStrategy::System);

    // Build output replaced the previous release
    let site = harness.site_dir();
    assert_eq!(
        std::fs::read_to_string(site.join("index.html")).unwrap().trim(),
        "<html>app</html>"
    );
    assert!(site.join("assets/app.js").exists());
    assert!(!site.join("stale.html").exists());

    let snapshot = harness.store.get_deploy(outcome.deploy_id).await.unwrap().unwrap();
    assert_eq!(snapshot.deploy.user_id, "alice");
    assert_eq!(snapshot.deploy.status, DeployStatus::Success);
    assert_eq!(
        snapshot.commands.iter().map(|c| c.order).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert!(snapshot.commands.iter().all(|c| c.status == CommandStatus::Success));

    let statuses: Vec<_> = snapshot.history.iter().map(|h| h.status).collect();
    assert_eq!(
        statuses,
        vec![DeployStatus::Started, DeployStatus::Running, DeployStatus::Success]
    );
    assert_eq!(snapshot.latest_history().unwrap().status, snapshot.deploy.status);
}

#[tokio::test]
async fn test_redeploy_reuses_working_tree() {
    let harness = Harness::new();

    let first = harness
        .orchestrator
        .deploy(request(node_build()), "system")
        .await
        .unwrap();
    let second = harness
        .orchestrator
        .deploy(request(node_build()), "system")
        .await
        .unwrap();

    assert!(first.success && second.success);
    assert_eq!(harness.git.count("clone"), 1);
    assert_eq!(harness.git.count("checkout"), 1);
    assert_eq!(harness.git.count("pull"), 1);
    assert_eq!(second.source.unwrap().action, SourceAction::Updated);
    assert_eq!(harness.store.list_deploys().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_group_fails_deploy_but_other_group_completes() {
    let harness = Harness::new();
    std::fs::create_dir_all(harness.site_dir()).unwrap();
    std::fs::write(harness.site_dir().join("index.html"), "live").unwrap();

    let commands = vec![
        command("1", 1, "sh -c 'echo missing script: lint >&2; exit 1'"),
        command("1", 2, "sh build.sh"),
        command("2", 1, "touch api-built"),
        command("2", 2, "test -f api-built"),
    ];

    let outcome = harness
        .orchestrator
        .deploy(request(commands), "system")
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.final_status, DeployStatus::Failed);
    assert!(outcome.message.contains("missing script: lint"), "{}", outcome.message);

    let by_key = |terminal: &str, order: u32| {
        outcome
            .commands
            .iter()
            .find(|c| c.terminal_id == terminal && c.order == order)
            .map(|c| c.status)
            .unwrap()
    };
    assert_eq!(by_key("1", 1), CommandStatus::Failed);
    assert_eq!(by_key("1", 2), CommandStatus::Pending);
    assert_eq!(by_key("2", 1), CommandStatus::Success);
    assert_eq!(by_key("2", 2), CommandStatus::Success);

    // Artifacts are only placed after a clean build
    assert_eq!(
        std::fs::read_to_string(harness.site_dir().join("index.html")).unwrap(),
        "live"
    );
}

#[tokio::test]
async fn test_concurrent_groups_share_working_tree() {
    let harness = Harness::concurrent();
    // "api" is scheduled first and waits for "web" to start
    let mut wait_for_web = command("api", 1, "while [ ! -f web-started ]; do sleep 0.05; done");
    wait_for_web.timeout_secs = Some(5);
    let commands = vec![
        wait_for_web,
        command("api", 2, "touch api-out"),
        command("web", 1, "touch web-started"),
        command("web", 2, "sh build.sh"),
    ];

    let outcome = harness
        .orchestrator
        .deploy(request(commands), "system")
        .await
        .unwrap();

    assert!(outcome.success, "{}", outcome.message);
    assert!(outcome.commands.iter().all(|c| c.status == CommandStatus::Success));
    assert!(harness.site_dir().join("index.html").exists());
}

#[tokio::test]
async fn test_missing_site_fails_before_source() {
    let harness = Harness::new();
    let mut req = request(node_build());
    req.iis_site_name = "unknown".to_string();

    let outcome = harness.orchestrator.deploy(req, "system").await.unwrap();

    assert!(!outcome.success);
    assert!(outcome.message.contains("IIS site not found"));
    assert!(outcome.commands.is_empty());
    assert_eq!(harness.git.count("clone"), 0);

    let snapshot = harness.store.get_deploy(outcome.deploy_id).await.unwrap().unwrap();
    let statuses: Vec<_> = snapshot.history.iter().map(|h| h.status).collect();
    assert_eq!(statuses, vec![DeployStatus::Started, DeployStatus::Failed]);
}

#[tokio::test]
async fn test_missing_build_output_fails_deploy() {
    let harness = Harness::new();
    let mut req = request(node_build());
    req.build_output_rel_path = "build".to_string();

    let outcome = harness.orchestrator.deploy(req, "system").await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.final_status, DeployStatus::Failed);
    assert!(outcome.message.contains("build output not found"));
    assert!(outcome.commands.iter().all(|c| c.status == CommandStatus::Success));
}

#[tokio::test]
async fn test_invalid_request_creates_no_record() {
    let harness = Harness::new();
    let mut req = request(node_build());
    req.build_commands[1].order = 1;

    let err = harness.orchestrator.deploy(req, "system").await.unwrap_err();
    assert!(matches!(err, DeployError::ValidationError(_)));
    assert!(harness.store.list_deploys().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_application_path_outside_site_is_rejected() {
    let harness = Harness::new();
    let neighbour = harness.temp.path().join("sites").join("other");
    std::fs::create_dir_all(&neighbour).unwrap();
    std::fs::write(neighbour.join("index.html"), "other site").unwrap();

    let mut req = request(node_build());
    req.application_path = Some("../other".to_string());

    let err = harness.orchestrator.deploy(req, "system").await.unwrap_err();
    assert!(matches!(err, DeployError::ValidationError(_)));
    assert!(harness.store.list_deploys().await.unwrap().is_empty());
    assert_eq!(harness.git.count("clone"), 0);
    assert!(neighbour.join("index.html").exists());
}

#[tokio::test]
async fn test_same_repo_deploys_are_serialized() {
    let harness = Harness::new();

    let (a, b) = tokio::join!(
        harness.orchestrator.deploy(request(node_build()), "a"),
        harness.orchestrator.deploy(request(node_build()), "b"),
    );

    assert!(a.unwrap().success);
    assert!(b.unwrap().success);
    // The second deploy found the first one's tree instead of cloning again
    assert_eq!(harness.git.count("clone"), 1);
}

/// Store that refuses to persist commands
struct BrokenCommandStore {
    inner: MemoryStore,
}

#[async_trait]
impl DeployStore for BrokenCommandStore {
    async fn create_deploy(&self, deploy: &Deploy, entry: &HistoryEntry) -> Result<(), DeployError> {
        self.inner.create_deploy(deploy, entry).await
    }

    async fn append_history(&self, entry: &HistoryEntry) -> Result<(), DeployError> {
        self.inner.append_history(entry).await
    }

    async fn insert_commands(&self, _commands: &[DeployCommand]) -> Result<(), DeployError> {
        Err(DeployError::StoreError("disk full".to_string()))
    }

    async fn update_command(&self, command: &DeployCommand) -> Result<(), DeployError> {
        self.inner.update_command(command).await
    }

    async fn get_deploy(&self, id: Uuid) -> Result<Option<DeploySnapshot>, DeployError> {
        self.inner.get_deploy(id).await
    }

    async fn list_deploys(&self) -> Result<Vec<Deploy>, DeployError> {
        self.inner.list_deploys().await
    }
}

#[tokio::test]
async fn test_unexpected_error_is_recorded_then_returned() {
    let store = Arc::new(BrokenCommandStore {
        inner: MemoryStore::new(),
    });
    let harness = Harness::with_store(store.clone());

    let err = harness
        .orchestrator
        .deploy(request(node_build()), "system")
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::StoreError(_)));

    let deploys = store.list_deploys().await.unwrap();
    assert_eq!(deploys.len(), 1);
    assert_eq!(deploys[0].status, DeployStatus::Failed);
    assert_eq!(deploys[0].message.as_deref(), Some("Store error: disk full"));
}
