//! Precedence resolution for run settings.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags, or the environment variables clap binds to them
//! 2. config.kdl (`~/.config/backlog-lens/config.kdl` or `--config`)
//! 3. Built-in defaults
//!
//! Secrets (`AZURE_PAT`, `GEMINI_API_KEY`) only come from level 1.

use std::path::{Path, PathBuf};

use super::schema::FileConfig;
use crate::evaluation::DEFAULT_LLM_COMMAND;
use crate::storage::DEFAULT_SNAPSHOT_FILE;
use crate::tracker::{DEFAULT_API_VERSION, DEFAULT_BASE_URL, DEFAULT_PROFILE_BASE_URL};
use crate::{Error, Result};

pub const DEFAULT_MAX_ITEMS: usize = 7;
pub const DEFAULT_SPRINT_DAYS: f64 = 10.0;
pub const DEFAULT_DAYS_PER_COMPLEXITY: f64 = 2.0;
pub const DEFAULT_LOAD_PERCENT: f64 = 0.0;
pub const DEFAULT_PUBLIC_DIR: &str = "public";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from a CLI flag or its environment variable
    CliFlag,
    /// Value from a config file
    File(PathBuf),
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::File(path) => write!(f, "file:{}", path.display()),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    /// The resolved value
    pub value: T,
    /// Where the value came from
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    /// Create a new resolved value.
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Values given on the command line (or through their env vars).
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub org: Option<String>,
    pub project: Option<String>,
    pub iteration_path: Option<String>,
    pub pat: Option<String>,
    pub api_key: Option<String>,
    pub max_items: Option<usize>,
    pub sprint_days: Option<f64>,
    pub days_per_complexity: Option<f64>,
    pub load_percent: Option<f64>,
    pub llm_command: Option<String>,
    pub llm_args: Vec<String>,
    pub llm_timeout_secs: Option<u64>,
    pub snapshot: Option<PathBuf>,
    pub public_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub api_version: Option<String>,
    pub base_url: Option<String>,
    pub profile_base_url: Option<String>,
}

/// Every setting after precedence resolution, with its source.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub org: Option<Resolved<String>>,
    pub project: Option<Resolved<String>>,
    pub iteration_path: Option<Resolved<String>>,
    pub pat: Option<Resolved<String>>,
    pub api_key: Option<Resolved<String>>,
    pub max_items: Resolved<usize>,
    pub sprint_days: Resolved<f64>,
    pub days_per_complexity: Resolved<f64>,
    pub load_percent: Resolved<f64>,
    pub llm_command: Resolved<String>,
    pub llm_args: Vec<String>,
    pub llm_timeout_secs: Option<Resolved<u64>>,
    pub snapshot: Resolved<PathBuf>,
    pub public_dir: Resolved<PathBuf>,
    pub host: Resolved<String>,
    pub port: Resolved<u16>,
    pub api_version: Resolved<String>,
    pub base_url: Resolved<String>,
    pub profile_base_url: Resolved<String>,
}

impl ResolvedSettings {
    /// The organization, or a config error naming how to set it.
    pub fn require_org(&self) -> Result<&str> {
        require(&self.org, "organization", "--org", "AZURE_ORG")
    }

    /// The project, or a config error naming how to set it.
    pub fn require_project(&self) -> Result<&str> {
        require(&self.project, "project", "--project", "AZURE_PROJECT")
    }

    /// The iteration path, or a config error naming how to set it.
    pub fn require_iteration_path(&self) -> Result<&str> {
        require(
            &self.iteration_path,
            "iteration path",
            "--iteration",
            "AZURE_ITERATION_PATH",
        )
    }

    /// The personal access token, or a config error naming how to set it.
    pub fn require_pat(&self) -> Result<&str> {
        require(&self.pat, "personal access token", "--pat", "AZURE_PAT")
    }

    /// Get the masked token for display purposes.
    pub fn masked_pat(&self) -> Option<String> {
        self.pat.as_ref().map(|r| mask_secret(&r.value))
    }

    /// Get the masked LLM API key for display purposes.
    pub fn masked_api_key(&self) -> Option<String> {
        self.api_key.as_ref().map(|r| mask_secret(&r.value))
    }
}

fn require<'a>(
    value: &'a Option<Resolved<String>>,
    what: &str,
    flag: &str,
    env: &str,
) -> Result<&'a str> {
    value
        .as_ref()
        .map(|r| r.value.as_str())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Config(format!("missing {}: set {} or {}", what, flag, env)))
}

/// Mask a secret for display.
///
/// Up to 8 characters nothing is shown, up to 12 only the first four, and
/// longer secrets keep their first and last four.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0..=8 => "****".to_string(),
        9..=12 => format!("{}...", chars[..4].iter().collect::<String>()),
        n => format!(
            "{}...{}",
            chars[..4].iter().collect::<String>(),
            chars[n - 4..].iter().collect::<String>()
        ),
    }
}

fn pick<T: Clone>(
    flag: &Option<T>,
    file: &Option<T>,
    file_source: &ValueSource,
) -> Option<Resolved<T>> {
    if let Some(value) = flag {
        Some(Resolved::new(value.clone(), ValueSource::CliFlag))
    } else {
        file.as_ref()
            .map(|value| Resolved::new(value.clone(), file_source.clone()))
    }
}

fn pick_or<T: Clone>(
    flag: &Option<T>,
    file: &Option<T>,
    file_source: &ValueSource,
    default: T,
) -> Resolved<T> {
    pick(flag, file, file_source).unwrap_or_else(|| Resolved::new(default, ValueSource::Default))
}

fn non_negative(name: &str, value: &Resolved<f64>) -> Result<()> {
    if value.value.is_finite() && value.value >= 0.0 {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} must be a non-negative number, got {} ({})",
            name, value.value, value.source
        )))
    }
}

/// Resolve settings from CLI overrides and a parsed config file.
///
/// `file_path` labels values taken from `file`.
pub fn resolve_settings(
    overrides: &ConfigOverrides,
    file: &FileConfig,
    file_path: Option<&Path>,
) -> Result<ResolvedSettings> {
    let from_file = ValueSource::File(file_path.map(Path::to_path_buf).unwrap_or_default());

    let settings = ResolvedSettings {
        org: pick(&overrides.org, &file.org, &from_file),
        project: pick(&overrides.project, &file.project, &from_file),
        iteration_path: pick(&overrides.iteration_path, &file.iteration_path, &from_file),
        pat: pick(&overrides.pat, &None, &from_file),
        api_key: pick(&overrides.api_key, &None, &from_file),
        max_items: pick_or(
            &overrides.max_items,
            &file.max_items,
            &from_file,
            DEFAULT_MAX_ITEMS,
        ),
        sprint_days: pick_or(
            &overrides.sprint_days,
            &file.sprint_days,
            &from_file,
            DEFAULT_SPRINT_DAYS,
        ),
        days_per_complexity: pick_or(
            &overrides.days_per_complexity,
            &file.days_per_complexity,
            &from_file,
            DEFAULT_DAYS_PER_COMPLEXITY,
        ),
        load_percent: pick_or(
            &overrides.load_percent,
            &file.load_percent,
            &from_file,
            DEFAULT_LOAD_PERCENT,
        ),
        llm_command: pick_or(
            &overrides.llm_command,
            &file.llm_command,
            &from_file,
            DEFAULT_LLM_COMMAND.to_string(),
        ),
        llm_args: overrides.llm_args.clone(),
        llm_timeout_secs: pick(&overrides.llm_timeout_secs, &file.llm_timeout_secs, &from_file),
        snapshot: pick_or(
            &overrides.snapshot,
            &file.snapshot,
            &from_file,
            PathBuf::from(DEFAULT_SNAPSHOT_FILE),
        ),
        public_dir: pick_or(
            &overrides.public_dir,
            &file.public_dir,
            &from_file,
            PathBuf::from(DEFAULT_PUBLIC_DIR),
        ),
        host: pick_or(&overrides.host, &file.host, &from_file, DEFAULT_HOST.to_string()),
        port: pick_or(&overrides.port, &file.port, &from_file, DEFAULT_PORT),
        api_version: pick_or(
            &overrides.api_version,
            &file.api_version,
            &from_file,
            DEFAULT_API_VERSION.to_string(),
        ),
        base_url: pick_or(&overrides.base_url, &None, &from_file, DEFAULT_BASE_URL.to_string()),
        profile_base_url: pick_or(
            &overrides.profile_base_url,
            &None,
            &from_file,
            DEFAULT_PROFILE_BASE_URL.to_string(),
        ),
    };

    if settings.max_items.value == 0 {
        return Err(Error::Config(format!(
            "max-items must be at least 1 ({})",
            settings.max_items.source
        )));
    }
    non_negative("sprint-days", &settings.sprint_days)?;
    non_negative("days-per-complexity", &settings.days_per_complexity)?;
    non_negative("load-percent", &settings.load_percent)?;

    Ok(settings)
}
