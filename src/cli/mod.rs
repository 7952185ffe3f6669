//! CLI argument definitions for Backlog Lens.

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ConfigOverrides;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BLENS_GIT_COMMIT"),
    " ",
    env!("BLENS_BUILD_TIMESTAMP"),
    ")"
);

/// Backlog Lens - INVEST evaluation and effort estimation for sprint backlogs.
///
/// Start with `blens orgs`, `blens projects` and `blens iterations` to find
/// the sprint to evaluate, then `blens run`.
#[derive(Parser, Debug)]
#[command(name = "blens")]
#[command(author, version = VERSION, about = "Score sprint backlog items against INVEST with an LLM CLI and estimate effort", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Increase log verbosity (-v info, -vv debug). BLENS_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.config/backlog-lens/config.kdl
    #[arg(long, global = true, env = "BLENS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub settings: SettingsArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings shared by all commands. Each one can also come from config.kdl.
#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// Azure DevOps organization
    #[arg(long, global = true, env = "AZURE_ORG")]
    pub org: Option<String>,

    /// Azure DevOps project
    #[arg(long, global = true, env = "AZURE_PROJECT")]
    pub project: Option<String>,

    /// Iteration (sprint) path, e.g. "\Web\Iteration\Sprint 4" or "Web\Sprint 4"
    #[arg(long = "iteration", global = true, env = "AZURE_ITERATION_PATH")]
    pub iteration_path: Option<String>,

    /// Azure DevOps personal access token
    #[arg(long, global = true, env = "AZURE_PAT", hide_env_values = true)]
    pub pat: Option<String>,

    /// API key forwarded to the LLM command as GEMINI_API_KEY
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Maximum number of backlog items to evaluate
    #[arg(long, global = true, env = "MAX_ITEMS")]
    pub max_items: Option<usize>,

    /// Working days in a sprint
    #[arg(long, global = true, env = "SPRINT_DAYS")]
    pub sprint_days: Option<f64>,

    /// Days of work per complexity point
    #[arg(long, global = true, env = "DAYS_PER_COMPLEXITY")]
    pub days_per_complexity: Option<f64>,

    /// Team load in percent, added on top of the base effort
    #[arg(long, global = true, env = "TEAM_LOAD_PERCENT")]
    pub load_percent: Option<f64>,

    /// LLM command-line tool to invoke
    #[arg(long, global = true, env = "LLM_COMMAND")]
    pub llm_command: Option<String>,

    /// Extra argument passed to the LLM command before `-p` (repeatable)
    #[arg(long = "llm-arg", global = true, allow_hyphen_values = true)]
    pub llm_args: Vec<String>,

    /// Kill the LLM command after this many seconds
    #[arg(long, global = true, env = "LLM_TIMEOUT_SECS")]
    pub llm_timeout_secs: Option<u64>,

    /// Snapshot file written by `run` and served at /data
    #[arg(long, global = true, env = "BLENS_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,

    /// Directory of static dashboard assets
    #[arg(long, global = true, env = "BLENS_PUBLIC_DIR")]
    pub public_dir: Option<PathBuf>,

    /// Host address to bind the dashboard server to
    #[arg(long, global = true, env = "BLENS_HOST")]
    pub host: Option<String>,

    /// Port for the dashboard server
    #[arg(long, global = true, env = "BLENS_PORT")]
    pub port: Option<u16>,

    /// Azure DevOps REST api-version for work item queries
    #[arg(long, global = true, env = "AZURE_API_VERSION")]
    pub api_version: Option<String>,

    /// Azure DevOps API base URL
    #[arg(long, global = true, env = "AZURE_DEVOPS_BASE_URL", hide = true)]
    pub api_base_url: Option<String>,

    /// Azure DevOps profile API base URL
    #[arg(long, global = true, env = "AZURE_DEVOPS_PROFILE_URL", hide = true)]
    pub profile_base_url: Option<String>,
}

impl SettingsArgs {
    /// Convert parsed flags into resolver overrides.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            org: self.org.clone(),
            project: self.project.clone(),
            iteration_path: self.iteration_path.clone(),
            pat: self.pat.clone(),
            api_key: self.api_key.clone(),
            max_items: self.max_items,
            sprint_days: self.sprint_days,
            days_per_complexity: self.days_per_complexity,
            load_percent: self.load_percent,
            llm_command: self.llm_command.clone(),
            llm_args: self.llm_args.clone(),
            llm_timeout_secs: self.llm_timeout_secs,
            snapshot: self.snapshot.clone(),
            public_dir: self.public_dir.clone(),
            host: self.host.clone(),
            port: self.port,
            api_version: self.api_version.clone(),
            base_url: self.api_base_url.clone(),
            profile_base_url: self.profile_base_url.clone(),
        }
    }
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch, evaluate and estimate a sprint, then serve the dashboard
    ///
    /// Writes the snapshot file, optionally a Markdown report, and serves
    /// both the dashboard and /data until Enter or Ctrl+C.
    Run {
        /// Stop after writing the snapshot
        #[arg(long)]
        no_serve: bool,

        /// Save the prompt sent to the LLM command to this file
        #[arg(long, value_name = "PATH")]
        save_prompt: Option<PathBuf>,

        /// Also write a Markdown report to this file
        #[arg(long, value_name = "PATH")]
        markdown: Option<PathBuf>,
    },

    /// Serve the dashboard for an existing snapshot
    Serve,

    /// Render the snapshot as a Markdown report
    Report {
        /// Write the report here instead of printing it
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Compute the day estimate for a complexity score
    Estimate {
        /// Complexity score (1-5)
        #[arg(short, long)]
        complexity: f64,

        /// Number of stories sharing the sprint overhead (defaults to max items)
        #[arg(short, long)]
        stories: Option<i64>,
    },

    /// Extract evaluation records from LLM output
    Extract {
        /// File holding the raw output (reads stdin if omitted)
        file: Option<PathBuf>,
    },

    /// List projects in the organization
    Projects,

    /// List sprint iterations of the project, newest first
    Iterations,

    /// List organizations the token's owner belongs to
    Orgs,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show every resolved setting and where it came from
    Show,

    /// Print the config file location
    Path,
}
