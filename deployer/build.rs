//! Embeds the commit hash and build time reported by `--version` and `/version`

use std::env;
use std::process::Command;

use chrono::Utc;

fn main() {
    // Release pipelines build from source archives without a .git directory
    let git_hash = env::var("GIT_HASH").ok().filter(|h| !h.is_empty()).unwrap_or_else(|| {
        Command::new("git")
            .args(["rev-parse", "--short", "HEAD"])
            .output()
            .ok()
            .filter(|output| output.status.success())
            .and_then(|output| String::from_utf8(output.stdout).ok())
            .map(|hash| hash.trim().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    });

    let build_time = Utc::now().to_rfc3339();

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=BUILD_TIME={}", build_time);
    println!("cargo:rerun-if-env-changed=GIT_HASH");
    println!("cargo:rerun-if-changed=../.git/HEAD");
}
