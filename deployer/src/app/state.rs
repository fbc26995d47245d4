//! Application state management

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::deploy::executor::CommandExecutor;
use crate::deploy::git::{GitCredentials, SourceAcquirer, SystemGit};
use crate::deploy::orchestrator::Orchestrator;
use crate::deploy::site::{PowerShellSiteResolver, SiteResolver, StaticSiteResolver};
use crate::errors::DeployError;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{Settings, SiteResolverKind, StoreKind};
use crate::store::{DeployStore, JsonFileStore, MemoryStore};

const SITE_LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Main application state
pub struct AppState {
    pub layout: StorageLayout,
    pub store: Arc<dyn DeployStore>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Wire the store, git client, site resolver and orchestrator from settings
    pub async fn init(settings: &Settings) -> Result<Self, DeployError> {
        let layout = StorageLayout::new(&settings.storage_dir);
        layout.setup().await?;

        let store: Arc<dyn DeployStore> = match settings.store {
            StoreKind::Memory => Arc::new(MemoryStore::new()),
            StoreKind::Json => Arc::new(JsonFileStore::new(layout.deploys_dir())),
        };

        let credentials = GitCredentials::from_settings(&settings.git);
        if credentials.is_some() {
            info!("Stored git credentials available for clone fallback");
        }
        let sources = SourceAcquirer::new(
            Arc::new(SystemGit::from_settings(&settings.git)),
            credentials,
        );

        let sites: Arc<dyn SiteResolver> = match settings.site_resolver {
            SiteResolverKind::Static => Arc::new(StaticSiteResolver::new(settings.sites.clone())),
            SiteResolverKind::Powershell => Arc::new(PowerShellSiteResolver::new(SITE_LOOKUP_TIMEOUT)),
        };

        let executor = CommandExecutor::new(store.clone(), settings.executor_options());

        let orchestrator = Orchestrator::new(
            store.clone(),
            sources,
            sites,
            executor,
            layout.clone(),
            settings.orchestrator_options(),
        );

        info!(
            "Deployer state ready (store: {:?}, sites: {:?}, storage: {})",
            settings.store,
            settings.site_resolver,
            layout.base_dir.display()
        );

        Ok(Self {
            layout,
            store,
            orchestrator: Arc::new(orchestrator),
        })
    }
}
