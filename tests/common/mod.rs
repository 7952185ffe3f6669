//! Common test utilities for blens integration tests.
//!
//! Provides `TestEnv` for isolated test environments that neither read the
//! user's `~/.config/backlog-lens/config.kdl` nor pick up `AZURE_*` variables
//! from the developer's shell.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
pub use tempfile::TempDir;

/// Environment variables the CLI reads; cleared for every command.
const CLI_ENV_VARS: &[&str] = &[
    "AZURE_ORG",
    "AZURE_PROJECT",
    "AZURE_ITERATION_PATH",
    "AZURE_PAT",
    "AZURE_API_VERSION",
    "AZURE_DEVOPS_BASE_URL",
    "AZURE_DEVOPS_PROFILE_URL",
    "GEMINI_API_KEY",
    "MAX_ITEMS",
    "SPRINT_DAYS",
    "DAYS_PER_COMPLEXITY",
    "TEAM_LOAD_PERCENT",
    "LLM_COMMAND",
    "LLM_TIMEOUT_SECS",
    "BLENS_CONFIG",
    "BLENS_SNAPSHOT",
    "BLENS_PUBLIC_DIR",
    "BLENS_HOST",
    "BLENS_PORT",
    "BLENS_LOG",
];

/// A test environment with an isolated working and config directory.
///
/// - `work_dir`: the command's current directory (snapshot, `.env`, reports)
/// - `config_dir`: used as `BLENS_CONFIG_DIR`, so the default config file
///   lives at `<config_dir>/config.kdl`
pub struct TestEnv {
    pub work_dir: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    /// Create a new test environment with isolated directories.
    pub fn new() -> Self {
        Self {
            work_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    /// Get a Command for the blens binary with a clean environment.
    pub fn blens(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_blens"));
        cmd.current_dir(self.work_dir.path());
        cmd.env("BLENS_CONFIG_DIR", self.config_dir.path());
        for var in CLI_ENV_VARS {
            cmd.env_remove(var);
        }
        cmd
    }

    /// Get the path to the working directory.
    pub fn path(&self) -> &Path {
        self.work_dir.path()
    }

    /// Path of the snapshot a run writes by default.
    pub fn snapshot_path(&self) -> PathBuf {
        self.work_dir.path().join("res.json")
    }

    /// Write `content` as the default config file.
    pub fn write_config(&self, content: &str) -> PathBuf {
        let path = self.config_dir.path().join("config.kdl");
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Write a file relative to the working directory.
    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.work_dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// A minimal valid snapshot with two evaluated stories.
pub fn sample_snapshot() -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "org": "acme",
            "project": "Web",
            "sprint_path": "\\Web\\Iteration\\Sprint 4",
            "max_items": 7,
            "sprint_days": 10.0,
            "days_per_complexity_unit": 2.0,
            "load_percent": 0.0
        },
        "data": [
            {
                "id": 101,
                "title": "Login with SSO",
                "criteria_scores": {
                    "Independent": { "score": 4, "justification": "Standalone" },
                    "Small": { "score": 2, "justification": "Touches three services" }
                },
                "complexity": 3,
                "suggested_improvements": ["Split by identity provider"],
                "days": 6.21,
                "url": "https://dev.azure.com/acme/Web/_workitems/edit/101"
            },
            {
                "id": 102,
                "title": "Password reset email",
                "complexity": 1,
                "suggested_improvements": [],
                "days": 2.21
            }
        ]
    })
}
