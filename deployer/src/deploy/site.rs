//! IIS site lookup and deploy target resolution

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::deploy::process::run_tool;
use crate::errors::DeployError;
use crate::models::deploy::DeployRequest;
use crate::storage::settings::SiteSettings;

/// A site or nested application known to the web server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteInfo {
    pub name: String,
    pub physical_path: PathBuf,
}

/// Answers whether sites and applications exist, and where they live on disk
#[async_trait]
pub trait SiteResolver: Send + Sync {
    async fn site(&self, name: &str) -> Result<Option<SiteInfo>, DeployError>;

    /// Nested application `path` (e.g. `/api`) under site `site`
    async fn application(&self, site: &str, path: &str) -> Result<Option<SiteInfo>, DeployError>;
}

fn trim_app_path(path: &str) -> &str {
    path.trim_matches(|c| c == '/' || c == '\\')
}

// ================================ STATIC ================================ //

/// Resolver backed by the `sites` section of the settings file
#[derive(Debug, Default)]
pub struct StaticSiteResolver {
    sites: HashMap<String, SiteSettings>,
}

impl StaticSiteResolver {
    pub fn new(sites: HashMap<String, SiteSettings>) -> Self {
        Self { sites }
    }

    fn find(&self, name: &str) -> Option<(&String, &SiteSettings)> {
        self.sites.iter().find(|(key, _)| key.eq_ignore_ascii_case(name))
    }
}

#[async_trait]
impl SiteResolver for StaticSiteResolver {
    async fn site(&self, name: &str) -> Result<Option<SiteInfo>, DeployError> {
        Ok(self.find(name).map(|(key, site)| SiteInfo {
            name: key.clone(),
            physical_path: site.physical_path.clone(),
        }))
    }

    async fn application(&self, site: &str, path: &str) -> Result<Option<SiteInfo>, DeployError> {
        let Some((site_name, settings)) = self.find(site) else {
            return Ok(None);
        };

        let wanted = trim_app_path(path);
        Ok(settings
            .applications
            .iter()
            .find(|(key, _)| trim_app_path(key).eq_ignore_ascii_case(wanted))
            .map(|(key, physical_path)| SiteInfo {
                name: format!("{}/{}", site_name, trim_app_path(key)),
                physical_path: physical_path.clone(),
            }))
    }
}

// ================================ POWERSHELL ================================ //

/// Resolver that asks IIS through the WebAdministration module
pub struct PowerShellSiteResolver {
    program: String,
    timeout: Duration,
}

impl PowerShellSiteResolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "powershell.exe".to_string(),
            timeout,
        }
    }

    async fn query(&self, name: &str, script: String) -> Result<Option<SiteInfo>, DeployError> {
        let output = run_tool(
            &self.program,
            &["-NoProfile", "-NonInteractive", "-Command", script.as_str()],
            None,
            &[],
            self.timeout,
        )
        .await?;

        if !output.success() {
            return Err(DeployError::tool("powershell", output.failure_message()));
        }

        let path = output.stdout.trim();
        debug!("IIS lookup for {} returned {:?}", name, path);
        if path.is_empty() {
            return Ok(None);
        }

        Ok(Some(SiteInfo {
            name: name.to_string(),
            physical_path: PathBuf::from(path),
        }))
    }
}

/// Quote a value as a single-quoted PowerShell literal
fn ps_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn site_script(name: &str) -> String {
    format!(
        "Import-Module WebAdministration; \
         $s = Get-Website -Name {}; \
         if ($s) {{ [Environment]::ExpandEnvironmentVariables($s.PhysicalPath) }}",
        ps_literal(name)
    )
}

fn application_script(site: &str, path: &str) -> String {
    format!(
        "Import-Module WebAdministration; \
         $a = Get-WebApplication -Site {} -Name {}; \
         if ($a) {{ [Environment]::ExpandEnvironmentVariables($a.PhysicalPath) }}",
        ps_literal(site),
        ps_literal(trim_app_path(path))
    )
}

#[async_trait]
impl SiteResolver for PowerShellSiteResolver {
    async fn site(&self, name: &str) -> Result<Option<SiteInfo>, DeployError> {
        self.query(name, site_script(name)).await
    }

    async fn application(&self, site: &str, path: &str) -> Result<Option<SiteInfo>, DeployError> {
        let name = format!("{}/{}", site, trim_app_path(path));
        self.query(&name, application_script(site, path)).await
    }
}

// ================================ TARGET ================================ //

/// Compute the directory a deploy's build output is copied into
pub async fn resolve_target(
    resolver: &dyn SiteResolver,
    request: &DeployRequest,
) -> Result<PathBuf, DeployError> {
    if let Some(explicit) = request.target_path.as_deref().filter(|p| !p.trim().is_empty()) {
        info!("Using explicit target path {}", explicit);
        return Ok(PathBuf::from(explicit.trim()));
    }

    let site = resolver
        .site(&request.iis_site_name)
        .await?
        .ok_or_else(|| {
            DeployError::ResourceMissing(format!("IIS site not found: {}", request.iis_site_name))
        })?;

    let app_path = request
        .application_path
        .as_deref()
        .map(trim_app_path)
        .filter(|p| !p.is_empty());

    let Some(app_path) = app_path else {
        return Ok(site.physical_path);
    };
    let segments = application_segments(app_path)?;

    if let Some(app) = resolver.application(&site.name, app_path).await? {
        return Ok(app.physical_path);
    }

    Ok(segments
        .iter()
        .fold(site.physical_path, |path, segment| path.join(segment)))
}

/// Split an application path into plain segments
///
/// The fallback target is joined under the site root, so segments that
/// could climb out of it (`..`, drive prefixes) are rejected.
pub fn application_segments(app_path: &str) -> Result<Vec<&str>, DeployError> {
    let segments: Vec<&str> = app_path
        .split(|c| c == '/' || c == '\\')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    for segment in &segments {
        if *segment == ".." || segment.contains(':') {
            return Err(DeployError::ValidationError(format!(
                "applicationPath may not leave the site root: {}",
                app_path
            )));
        }
    }

    Ok(segments)
}
