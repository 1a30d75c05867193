//! Build script for cadence-ap
//!
//! Exposes build identification to the binary as compile-time env vars:
//! `CADENCE_GIT_HASH`, `CADENCE_BUILD_TIMESTAMP`, `CADENCE_BUILD_PROFILE`.

use std::process::Command;

fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let hash = String::from_utf8(output.stdout).ok()?;
    Some(hash.trim().to_string())
}

fn main() {
    let git_hash = git_short_hash().unwrap_or_else(|| "unknown".to_string());
    let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=CADENCE_GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=CADENCE_BUILD_TIMESTAMP={}", timestamp);
    println!("cargo:rustc-env=CADENCE_BUILD_PROFILE={}", profile);
}
