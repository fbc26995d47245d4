//! Placement of build output into the serving directory

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;

/// What an artifact deployment did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactReport {
    pub source: PathBuf,
    pub target: PathBuf,
    pub files_copied: u64,
}

/// Turn a build output path into a path relative to the repository root
///
/// Both separators are accepted. `""` and `"."` mean the repository root.
/// Absolute paths and parent components are rejected.
pub fn normalize_rel_path(rel: &str) -> Result<PathBuf, DeployError> {
    let unified = rel.trim().replace('\\', "/");
    if unified.starts_with('/') || has_drive_prefix(&unified) {
        return Err(DeployError::ValidationError(format!(
            "build output path must be relative: {}",
            rel
        )));
    }

    let mut normalized = PathBuf::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            _ => {
                return Err(DeployError::ValidationError(format!(
                    "build output path may not leave the repository: {}",
                    rel
                )))
            }
        }
    }

    Ok(normalized)
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Replace `target` with the contents of `source_dir/rel`
///
/// Not transactional: a failure mid-copy leaves the target partially filled.
pub async fn deploy_artifacts(
    source_dir: &Path,
    rel: &str,
    target: &Path,
    delete_settle: Duration,
) -> Result<ArtifactReport, DeployError> {
    let source = Dir::new(source_dir.join(normalize_rel_path(rel)?));
    if !source.exists().await {
        return Err(DeployError::ResourceMissing(format!(
            "build output not found: {}",
            source.path().display()
        )));
    }

    let parent_exists = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => Dir::new(parent).exists().await,
        _ => false,
    };
    if !parent_exists {
        return Err(DeployError::ResourceMissing(format!(
            "parent of target directory not found: {}",
            target.display()
        )));
    }

    let target_dir = Dir::new(target);
    if target_dir.exists().await {
        info!("Clearing existing target {}", target.display());
        target_dir.delete().await?;
        // Some filesystems release a deleted tree lazily
        tokio::time::sleep(delete_settle).await;
    }
    target_dir.create().await?;

    let files_copied = source.copy_into(target).await?;
    info!(
        "Copied {} file(s) from {} to {}",
        files_copied,
        source.path().display(),
        target.display()
    );

    Ok(ArtifactReport {
        source: source.path().to_path_buf(),
        target: target.to_path_buf(),
        files_copied,
    })
}
