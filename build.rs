//! Stamps the `blens --version` string with build metadata.
//!
//! Exposes `BLENS_BUILD_TIMESTAMP` (UTC, RFC 3339 seconds) and
//! `BLENS_GIT_COMMIT` (short hash with a `-dirty` suffix for uncommitted
//! changes, or "unknown" outside a git checkout) to `env!`.

use std::process::Command;

fn main() {
    for watched in [".git/HEAD", ".git/index"] {
        println!("cargo:rerun-if-changed={watched}");
    }

    let built_at = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    println!("cargo:rustc-env=BLENS_BUILD_TIMESTAMP={built_at}");

    let commit = git(&["describe", "--always", "--dirty", "--abbrev=8"])
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=BLENS_GIT_COMMIT={commit}");
}

fn git(args: &[&str]) -> Option<String> {
    let out = Command::new("git").args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8(out.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
