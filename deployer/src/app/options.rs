//! Application configuration options

use std::time::Duration;

use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Parsed settings file
    pub settings: Settings,

    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,
}

impl AppOptions {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            lifecycle: LifecycleOptions::default(),
        }
    }
}

/// Lifecycle options for the deployer service
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    ///
    /// A deploy in flight when shutdown starts is given this long to finish.
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}
