//! Shared fixtures: a git client that fabricates repositories and an
//! orchestrator wired to temporary directories

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use iis_deployer::deploy::executor::{CommandExecutor, ExecutorOptions, GroupScheduling};
use iis_deployer::deploy::git::{GitClient, SourceAcquirer};
use iis_deployer::deploy::orchestrator::{Orchestrator, OrchestratorOptions};
use iis_deployer::deploy::process::ToolOutput;
use iis_deployer::deploy::site::StaticSiteResolver;
use iis_deployer::errors::DeployError;
use iis_deployer::models::deploy::{BuildCommand, DeployRequest};
use iis_deployer::storage::layout::StorageLayout;
use iis_deployer::storage::settings::SiteSettings;
use iis_deployer::store::{DeployStore, MemoryStore};

pub const REPO_URL: &str = "https://example.com/app.git";

/// Script committed to the fake repository; stands in for `npm run build`
const BUILD_SCRIPT: &str = "mkdir -p dist/assets\n\
echo '<html>app</html>' > dist/index.html\n\
echo 'console.log(1)' > dist/assets/app.js\n";

/// Git client whose `clone` writes a small project instead of fetching one
#[derive(Default)]
pub struct FakeRepoGit {
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeRepoGit {
    pub fn count(&self, subcommand: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c[0] == subcommand)
            .count()
    }
}

#[async_trait]
impl GitClient for FakeRepoGit {
    async fn run(&self, args: &[&str], cwd: Option<&Path>) -> Result<ToolOutput, DeployError> {
        self.calls
            .lock()
            .unwrap()
            .push(args.iter().map(|a| a.to_string()).collect());

        if args[0] == "clone" {
            let dest = match args.last() {
                Some(&".") => cwd.unwrap().to_path_buf(),
                Some(path) => PathBuf::from(path),
                None => return Ok(ToolOutput::failed(129, "usage: git clone")),
            };
            std::fs::create_dir_all(dest.join(".git")).unwrap();
            std::fs::write(dest.join("package.json"), r#"{"name": "app"}"#).unwrap();
            std::fs::write(dest.join("build.sh"), BUILD_SCRIPT).unwrap();
        }

        Ok(ToolOutput::ok(""))
    }
}

pub struct Harness {
    pub temp: TempDir,
    pub git: Arc<FakeRepoGit>,
    pub store: Arc<dyn DeployStore>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn DeployStore>) -> Self {
        Self::build(store, GroupScheduling::Sequential)
    }

    pub fn concurrent() -> Self {
        Self::build(Arc::new(MemoryStore::new()), GroupScheduling::Concurrent)
    }

    fn build(store: Arc<dyn DeployStore>, scheduling: GroupScheduling) -> Self {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("sites")).unwrap();

        let mut sites = HashMap::new();
        sites.insert(
            "app".to_string(),
            SiteSettings {
                physical_path: temp.path().join("sites").join("app"),
                applications: HashMap::new(),
            },
        );

        let git = Arc::new(FakeRepoGit::default());
        let executor = CommandExecutor::new(
            store.clone(),
            ExecutorOptions {
                command_timeout: Duration::from_secs(10),
                poll_interval: Duration::from_millis(20),
                exit_grace: Duration::from_secs(2),
                output_settle: Duration::from_millis(20),
                extra_paths: Vec::new(),
                scheduling,
            },
        );

        let orchestrator = Orchestrator::new(
            store.clone(),
            SourceAcquirer::new(git.clone(), None),
            Arc::new(StaticSiteResolver::new(sites)),
            executor,
            StorageLayout::new(temp.path().join("storage")),
            OrchestratorOptions {
                platform: "iis".to_string(),
                delete_settle: Duration::from_millis(10),
            },
        );

        Self {
            temp,
            git,
            store,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn site_dir(&self) -> PathBuf {
        self.temp.path().join("sites").join("app")
    }
}

pub fn command(terminal_id: &str, order: u32, text: &str) -> BuildCommand {
    BuildCommand {
        text: text.to_string(),
        order,
        terminal_id: terminal_id.to_string(),
        timeout_secs: None,
    }
}

pub fn request(build_commands: Vec<BuildCommand>) -> DeployRequest {
    DeployRequest {
        repo_url: REPO_URL.to_string(),
        branch: "main".to_string(),
        build_commands,
        build_output_rel_path: "dist".to_string(),
        iis_site_name: "app".to_string(),
        application_path: None,
        target_path: None,
    }
}

/// The two-step build of a Node project, with POSIX stand-ins for npm
pub fn node_build() -> Vec<BuildCommand> {
    vec![
        command("1", 1, "test -f package.json"),
        command("1", 2, "sh build.sh"),
    ]
}
