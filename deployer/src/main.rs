//! IIS Deployer - Entry Point
//!
//! Pulls a repository, runs its build commands in persistent terminals and
//! copies the build output into an IIS site.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use anyhow::Context;
use iis_deployer::app::options::AppOptions;
use iis_deployer::app::run::{run, run_once};
use iis_deployer::filesys::file::File;
use iis_deployer::logs::{init_logging, LogOptions};
use iis_deployer::models::deploy::DeployRequest;
use iis_deployer::storage::layout::StorageLayout;
use iis_deployer::storage::settings::Settings;
use iis_deployer::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            cli_args.insert(key.trim_start_matches('-').to_string(), value.to_string());
        } else if arg.starts_with("--") {
            cli_args.insert(arg.trim_start_matches('-').to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return ExitCode::SUCCESS;
    }

    // Retrieve the settings file
    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(path),
        None => StorageLayout::new(Settings::default().storage_dir).settings_file(),
    };
    let settings = match Settings::load(&settings_file).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let layout = StorageLayout::new(&settings.storage_dir);
    let log_dir = match layout.logs_dir().create().await {
        Ok(()) => Some(layout.logs_dir().path().to_path_buf()),
        Err(e) => {
            eprintln!("Logging to stdout only, log directory unavailable: {}", e);
            None
        }
    };
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir,
        json_format: settings.log_json,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::new(settings);

    // Run a single deploy from a request file
    if let Some(path) = cli_args.get("request") {
        return match deploy_from_file(options, File::new(path)).await {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(e) => {
                error!("{:#}", e);
                ExitCode::FAILURE
            }
        };
    }

    info!("Running IIS deployer {} ({})", version.version, version.git_hash);
    match run(options, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to run the deployer: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the deploy described by `request_file`; `Ok(false)` when it failed
async fn deploy_from_file(options: AppOptions, request_file: File) -> anyhow::Result<bool> {
    let request = request_file
        .read_json::<DeployRequest>()
        .await
        .with_context(|| {
            format!("unable to read deploy request {}", request_file.path().display())
        })?;

    let outcome = run_once(options, request).await.context("deploy aborted")?;
    let json = serde_json::to_string_pretty(&outcome).context("unable to serialize deploy outcome")?;
    println!("{}", json);

    Ok(outcome.success)
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                _ => {
                    error!("Unable to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreadable_request_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("deploy.json");
        let options = AppOptions::new(Settings::default());

        let err = deploy_from_file(options, File::new(missing.clone())).await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.starts_with("unable to read deploy request"), "{}", message);
        assert!(message.contains("deploy.json"));
    }
}
