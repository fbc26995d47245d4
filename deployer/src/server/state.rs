//! Server state

use std::sync::Arc;

use crate::deploy::orchestrator::Orchestrator;
use crate::store::DeployStore;

/// Server state shared across handlers
pub struct ServerState {
    pub orchestrator: Arc<Orchestrator>,
}

impl ServerState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn store(&self) -> &Arc<dyn DeployStore> {
        self.orchestrator.store()
    }
}
