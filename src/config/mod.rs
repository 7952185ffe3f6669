//! Configuration for Backlog Lens.
//!
//! Settings come from three layers (see [`resolver`]): CLI flags and their
//! environment variables, an optional `config.kdl` (see [`schema`]), and
//! built-in defaults. A run resolves them once into an immutable
//! [`RunConfig`] which is then passed by reference.

pub mod resolver;
pub mod schema;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};

pub use resolver::{
    ConfigOverrides, DEFAULT_DAYS_PER_COMPLEXITY, DEFAULT_HOST, DEFAULT_LOAD_PERCENT,
    DEFAULT_MAX_ITEMS, DEFAULT_PORT, DEFAULT_PUBLIC_DIR, DEFAULT_SPRINT_DAYS, Resolved,
    ResolvedSettings, ValueSource, resolve_settings,
};
pub use schema::{CONFIG_DIR_ENV, FileConfig, default_config_path};

use crate::Result;
use crate::evaluation::LlmCli;
use crate::models::SnapshotMetadata;
use crate::tracker::AzureDevOpsClient;
use crate::web::ServerConfig;

/// Load the config file and resolve it against `overrides`.
///
/// An explicit `config_path` must exist; the default location is optional.
pub fn load_settings(
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<ResolvedSettings> {
    let (path, required) = match config_path {
        Some(path) => (Some(path.to_path_buf()), true),
        None => (default_config_path(), false),
    };

    let file = match &path {
        Some(path) => FileConfig::load(path, required)?,
        None => FileConfig::new(),
    };
    resolve_settings(overrides, &file, path.as_deref())
}

/// Connection settings for Azure DevOps.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub org: String,
    pub project: String,
    pub pat: String,
    pub api_version: String,
    pub base_url: String,
    pub profile_base_url: String,
}

impl TrackerConfig {
    /// Build an API client from these settings.
    pub fn client(&self) -> AzureDevOpsClient {
        AzureDevOpsClient::new(&self.org, &self.project, &self.pat)
            .with_base_url(&self.base_url)
            .with_profile_base_url(&self.profile_base_url)
            .with_api_version(&self.api_version)
    }
}

/// Estimation tuning for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationConfig {
    pub max_items: usize,
    pub sprint_days: f64,
    pub days_per_complexity_unit: f64,
    pub load_percent: f64,
}

/// How to invoke the LLM command.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub command: String,
    pub args: Vec<String>,
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl LlmConfig {
    /// Build an evaluator from these settings.
    pub fn evaluator(&self, prompt_file: Option<PathBuf>) -> LlmCli {
        LlmCli::new(&self.command)
            .with_args(&self.args)
            .with_api_key(self.api_key.clone())
            .with_timeout(self.timeout)
            .with_prompt_file(prompt_file)
    }
}

/// Everything a full pipeline run needs, resolved once.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub tracker: TrackerConfig,
    pub iteration_path: String,
    pub estimation: EstimationConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
}

impl RunConfig {
    /// Build a run config, failing if a required value is missing.
    pub fn from_settings(settings: &ResolvedSettings) -> Result<Self> {
        let tracker = tracker_config(settings, "")?;
        Ok(Self {
            tracker: TrackerConfig {
                project: settings.require_project()?.to_string(),
                ..tracker
            },
            iteration_path: settings.require_iteration_path()?.to_string(),
            estimation: estimation_config(settings),
            llm: llm_config(settings),
            server: server_config(settings),
        })
    }

    /// Metadata recorded alongside this run's results.
    pub fn snapshot_metadata(&self, generated_at: DateTime<Utc>) -> SnapshotMetadata {
        SnapshotMetadata {
            org: self.tracker.org.clone(),
            project: self.tracker.project.clone(),
            sprint_path: self.iteration_path.clone(),
            max_items: self.estimation.max_items,
            sprint_days: self.estimation.sprint_days,
            days_per_complexity_unit: self.estimation.days_per_complexity_unit,
            load_percent: self.estimation.load_percent,
            generated_at: Some(generated_at),
        }
    }
}

/// Tracker settings; `project` may be empty for organization-level calls.
pub fn tracker_config(settings: &ResolvedSettings, project: &str) -> Result<TrackerConfig> {
    Ok(TrackerConfig {
        org: settings.require_org()?.to_string(),
        project: project.to_string(),
        pat: settings.require_pat()?.to_string(),
        api_version: settings.api_version.value.clone(),
        base_url: settings.base_url.value.clone(),
        profile_base_url: settings.profile_base_url.value.clone(),
    })
}

pub fn estimation_config(settings: &ResolvedSettings) -> EstimationConfig {
    EstimationConfig {
        max_items: settings.max_items.value,
        sprint_days: settings.sprint_days.value,
        days_per_complexity_unit: settings.days_per_complexity.value,
        load_percent: settings.load_percent.value,
    }
}

pub fn llm_config(settings: &ResolvedSettings) -> LlmConfig {
    LlmConfig {
        command: settings.llm_command.value.clone(),
        args: settings.llm_args.clone(),
        api_key: settings.api_key.as_ref().map(|r| r.value.clone()),
        timeout: settings
            .llm_timeout_secs
            .as_ref()
            .map(|r| Duration::from_secs(r.value)),
    }
}

pub fn server_config(settings: &ResolvedSettings) -> ServerConfig {
    ServerConfig {
        host: settings.host.value.clone(),
        port: settings.port.value,
        snapshot_path: settings.snapshot.value.clone(),
        public_dir: settings.public_dir.value.clone(),
    }
}
