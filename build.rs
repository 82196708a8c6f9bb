// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    // Re-run build script if git HEAD changes
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=SCENEBRIDGE_VERSION");

    // Packagers may pin the version
    let version = std::env::var("SCENEBRIDGE_VERSION").unwrap_or_else(|_| version_string());

    println!("cargo::rustc-env=SCENEBRIDGE_VERSION={}", version);
}

/// Package version, suffixed with the short commit hash when built from git
fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match commit_hash() {
        Some(hash) => format!("{}-{}", version, hash),
        None => version.to_string(),
    }
}

fn commit_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
