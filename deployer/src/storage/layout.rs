//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::utils::short_hash;

/// Storage layout for the deployer
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Directory holding one working tree per repository
    pub fn repos_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("repos"))
    }

    /// Working tree for a repository, stable across deploys
    pub fn repo_dir(&self, repo_url: &str) -> Dir {
        let normalized = repo_url.trim().trim_end_matches('/').to_lowercase();
        self.repos_dir().subdir(&short_hash(normalized.as_bytes()))
    }

    /// Deploy records for the JSON store
    pub fn deploys_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("deploys"))
    }

    /// Default location of `settings.json`
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), DeployError> {
        self.repos_dir().create().await?;
        self.deploys_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}
