//! Command implementations for the Backlog Lens CLI.
//!
//! Each command returns a result type implementing [`Output`], so `main` can
//! print it as JSON (default) or human-readable text (`-H`).

use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::{self, ResolvedSettings, RunConfig};
use crate::evaluation::{EvaluationError, Evaluator, evaluate_or_empty, extract_records};
use crate::models::{EvaluationRecord, TeamCapacity, estimate_days};
use crate::progress::with_spinner;
use crate::tracker::{WorkItemSource, iteration_display_name};
use crate::{Error, Result, report, storage};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

// === run ===

/// Outcome of a full pipeline run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub snapshot: PathBuf,
    pub items: usize,
    pub records: usize,
    pub total_days: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<PathBuf>,
}

impl Output for RunSummary {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!(
            "Evaluated {} of {} stories, {} days estimated in total.\nSnapshot written to {}",
            self.records,
            self.items,
            self.total_days,
            self.snapshot.display()
        );
        if let Some(path) = &self.markdown {
            let _ = write!(out, "\nReport written to {}", path.display());
        }
        out
    }
}

/// Fetch, evaluate, estimate and persist one sprint.
///
/// Tracker errors abort the run. Evaluation failures are logged and leave no
/// records, which fails the run with [`Error::EmptyEvaluation`] before
/// anything is written.
pub fn run(
    config: &RunConfig,
    source: &dyn WorkItemSource,
    evaluator: &dyn Evaluator,
    markdown: Option<&Path>,
) -> Result<RunSummary> {
    let estimation = &config.estimation;

    tracing::info!(
        iteration = %config.iteration_path,
        max_items = estimation.max_items,
        "fetching work items"
    );
    let items = source.fetch_items(&config.iteration_path, estimation.max_items)?;
    if items.is_empty() {
        return Err(Error::NotFound(format!(
            "no {} found under iteration '{}'",
            crate::tracker::WORK_ITEM_TYPE,
            config.iteration_path
        )));
    }
    tracing::info!(count = items.len(), "fetched work items");

    let message = format!("Evaluating {} stories", items.len());
    let records = with_spinner(&message, || evaluate_or_empty(evaluator, &items));
    if records.is_empty() {
        return Err(Error::EmptyEvaluation);
    }

    let capacity = TeamCapacity::new(estimation.load_percent, items.len());
    let snapshot = report::aggregate(
        records,
        &items,
        &capacity,
        estimation.sprint_days,
        estimation.days_per_complexity_unit,
        config.snapshot_metadata(chrono::Utc::now()),
    );

    storage::write_snapshot(&config.server.snapshot_path, &snapshot)?;
    if let Some(path) = markdown {
        std::fs::write(path, report::render_markdown(&snapshot))?;
    }

    let total_days: f64 = snapshot.data.iter().filter_map(|r| r.days).sum();
    Ok(RunSummary {
        snapshot: config.server.snapshot_path.clone(),
        items: items.len(),
        records: snapshot.data.len(),
        total_days: (total_days * 100.0).round() / 100.0,
        markdown: markdown.map(Path::to_path_buf),
    })
}

// === estimate ===

#[derive(Debug, Serialize)]
pub struct EstimateResult {
    pub complexity: f64,
    pub story_count: i64,
    pub load_percent: f64,
    pub sprint_days: f64,
    pub days_per_complexity_unit: f64,
    pub days: f64,
}

impl Output for EstimateResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "{} days (complexity {}, {} stories, load {}%, sprint {} days, {} days per point)",
            self.days,
            self.complexity,
            self.story_count,
            self.load_percent,
            self.sprint_days,
            self.days_per_complexity_unit
        )
    }
}

/// Evaluate the estimation formula with the resolved settings.
///
/// `stories` defaults to the configured maximum item count.
pub fn estimate(
    settings: &ResolvedSettings,
    complexity: f64,
    stories: Option<i64>,
) -> EstimateResult {
    let estimation = config::estimation_config(settings);
    let capacity = TeamCapacity {
        load_percent: estimation.load_percent,
        story_count: stories
            .unwrap_or_else(|| i64::try_from(estimation.max_items).unwrap_or(i64::MAX)),
    };
    let days = estimate_days(
        complexity,
        &capacity,
        estimation.sprint_days,
        estimation.days_per_complexity_unit,
    );

    EstimateResult {
        complexity,
        story_count: capacity.story_count,
        load_percent: capacity.load_percent,
        sprint_days: estimation.sprint_days,
        days_per_complexity_unit: estimation.days_per_complexity_unit,
        days,
    }
}

// === extract ===

#[derive(Debug, Serialize)]
pub struct ExtractResult {
    pub count: usize,
    pub records: Vec<EvaluationRecord>,
}

impl Output for ExtractResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!("{} record(s)", self.count);
        for record in &self.records {
            let id = record.id.map(|id| id.to_string()).unwrap_or_else(|| "?".to_string());
            let complexity = record
                .complexity
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = write!(
                out,
                "\n  #{} {} (complexity {})",
                id,
                record.title.as_deref().unwrap_or("(untitled)"),
                complexity
            );
        }
        out
    }
}

/// Run the response extractor over raw LLM output.
pub fn extract(raw_text: &str) -> Result<ExtractResult> {
    let records = extract_records(raw_text).map_err(EvaluationError::from)?;
    Ok(ExtractResult {
        count: records.len(),
        records,
    })
}

// === report ===

#[derive(Debug, Serialize)]
pub struct ReportWritten {
    pub path: PathBuf,
    pub records: usize,
}

impl Output for ReportWritten {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Wrote report for {} stories to {}",
            self.records,
            self.path.display()
        )
    }
}

/// Render the snapshot at `snapshot_path` as Markdown.
pub fn report_markdown(snapshot_path: &Path) -> Result<String> {
    let snapshot = storage::read_snapshot(snapshot_path)?;
    Ok(report::render_markdown(&snapshot))
}

/// Render the snapshot and write the report to `output`.
pub fn write_report(snapshot_path: &Path, output: &Path) -> Result<ReportWritten> {
    let snapshot = storage::read_snapshot(snapshot_path)?;
    std::fs::write(output, report::render_markdown(&snapshot))?;
    Ok(ReportWritten {
        path: output.to_path_buf(),
        records: snapshot.data.len(),
    })
}

// === projects / iterations / orgs ===

#[derive(Debug, Serialize)]
pub struct NameList {
    pub count: usize,
    pub names: Vec<String>,
    /// Short names, for iteration paths
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_names: Option<Vec<String>>,
}

impl NameList {
    fn new(names: Vec<String>) -> Self {
        Self {
            count: names.len(),
            names,
            display_names: None,
        }
    }
}

impl Output for NameList {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.names.is_empty() {
            return "(none)".to_string();
        }
        match &self.display_names {
            Some(short) => self
                .names
                .iter()
                .zip(short)
                .map(|(path, name)| format!("{:<24} {}", name, path))
                .collect::<Vec<_>>()
                .join("\n"),
            None => self.names.join("\n"),
        }
    }
}

/// List projects in the configured organization.
pub fn projects(settings: &ResolvedSettings) -> Result<NameList> {
    let client = config::tracker_config(settings, "")?.client();
    Ok(NameList::new(client.list_projects()?))
}

/// List leaf iterations of the configured project, newest first.
pub fn iterations(settings: &ResolvedSettings) -> Result<NameList> {
    let project = settings.require_project()?;
    let client = config::tracker_config(settings, project)?.client();
    let paths = client.list_iterations(project)?;

    let mut list = NameList::new(paths);
    list.display_names = Some(list.names.iter().map(|p| iteration_display_name(p)).collect());
    Ok(list)
}

/// List organizations visible to the configured token.
pub fn orgs(settings: &ResolvedSettings) -> Result<NameList> {
    let pat = settings.require_pat()?;
    let client = crate::tracker::AzureDevOpsClient::new("", "", pat)
        .with_profile_base_url(&settings.profile_base_url.value);
    Ok(NameList::new(client.list_organizations()?))
}

// === config ===

#[derive(Debug, Serialize)]
pub struct SettingEntry {
    pub key: &'static str,
    pub value: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfigShow {
    pub settings: Vec<SettingEntry>,
}

impl Output for ConfigShow {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        self.settings
            .iter()
            .map(|entry| match (&entry.value, &entry.source) {
                (Some(value), Some(source)) => format!("{} = {} ({})", entry.key, value, source),
                _ => format!("{} = (unset)", entry.key),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn entry<T: ToString>(key: &'static str, value: Option<&config::Resolved<T>>) -> SettingEntry {
    SettingEntry {
        key,
        value: value.map(|r| r.value.to_string()),
        source: value.map(|r| r.source.to_string()),
    }
}

fn path_entry(key: &'static str, value: &config::Resolved<PathBuf>) -> SettingEntry {
    SettingEntry {
        key,
        value: Some(value.value.display().to_string()),
        source: Some(value.source.to_string()),
    }
}

/// Show every resolved setting with its source. Secrets are masked.
pub fn config_show(settings: &ResolvedSettings) -> ConfigShow {
    ConfigShow {
        settings: vec![
            entry("org", settings.org.as_ref()),
            entry("project", settings.project.as_ref()),
            entry("iteration-path", settings.iteration_path.as_ref()),
            SettingEntry {
                key: "pat",
                value: settings.masked_pat(),
                source: settings.pat.as_ref().map(|r| r.source.to_string()),
            },
            SettingEntry {
                key: "api-key",
                value: settings.masked_api_key(),
                source: settings.api_key.as_ref().map(|r| r.source.to_string()),
            },
            entry("max-items", Some(&settings.max_items)),
            entry("sprint-days", Some(&settings.sprint_days)),
            entry("days-per-complexity", Some(&settings.days_per_complexity)),
            entry("load-percent", Some(&settings.load_percent)),
            entry("llm-command", Some(&settings.llm_command)),
            entry("llm-timeout-secs", settings.llm_timeout_secs.as_ref()),
            path_entry("snapshot", &settings.snapshot),
            path_entry("public-dir", &settings.public_dir),
            entry("host", Some(&settings.host)),
            entry("port", Some(&settings.port)),
            entry("api-version", Some(&settings.api_version)),
        ],
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigPath {
    pub path: Option<PathBuf>,
    pub exists: bool,
}

impl Output for ConfigPath {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        match &self.path {
            Some(path) if self.exists => path.display().to_string(),
            Some(path) => format!("{} (not created)", path.display()),
            None => "No config directory on this platform".to_string(),
        }
    }
}

/// Locate the config file in effect.
pub fn config_path(explicit: Option<&Path>) -> ConfigPath {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(config::default_config_path);
    let exists = path.as_deref().is_some_and(Path::exists);
    ConfigPath { path, exists }
}
