//! Backlog Lens CLI - INVEST evaluation and effort estimation for sprint backlogs.

use backlog_lens::cli::{Cli, Commands, ConfigCommands};
use backlog_lens::commands::{self, Output};
use backlog_lens::config::{self, RunConfig};
use backlog_lens::web::{self, ServerConfig};
use clap::Parser;
use std::io::Read;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a tracing filter directive.
const LOG_ENV: &str = "BLENS_LOG";

fn main() {
    // A missing .env is fine; values may come from the real environment.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);
    match dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "failed to load .env"),
    }

    let human = cli.human_readable;
    if let Err(e) = run_command(cli) {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV)
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_command(cli: Cli) -> Result<(), backlog_lens::Error> {
    let human = cli.human_readable;
    let config_path = cli.config.as_deref();

    // `config path` must work even when the config file is broken.
    if let Commands::Config {
        command: ConfigCommands::Path,
    } = &cli.command
    {
        output(&commands::config_path(config_path), human);
        return Ok(());
    }

    let settings = config::load_settings(config_path, &cli.settings.overrides())?;

    match cli.command {
        Commands::Run {
            no_serve,
            save_prompt,
            markdown,
        } => {
            let config = RunConfig::from_settings(&settings)?;
            let source = config.tracker.client();
            let evaluator = config.llm.evaluator(save_prompt);

            let summary = commands::run(&config, &source, &evaluator, markdown.as_deref())?;
            output(&summary, human);

            if !no_serve {
                serve_dashboard(&config.server)?;
            }
        }
        Commands::Serve => {
            let server = config::server_config(&settings);
            if !server.snapshot_path.exists() {
                tracing::warn!(
                    path = %server.snapshot_path.display(),
                    "snapshot not found, /data will answer 404 until it exists"
                );
            }
            serve_dashboard(&server)?;
        }
        Commands::Report { output: path } => {
            let snapshot_path = &settings.snapshot.value;
            match path {
                Some(path) => output(&commands::write_report(snapshot_path, &path)?, human),
                None => print!("{}", commands::report_markdown(snapshot_path)?),
            }
        }
        Commands::Estimate {
            complexity,
            stories,
        } => output(&commands::estimate(&settings, complexity, stories), human),
        Commands::Extract { file } => {
            let raw = read_input(file.as_deref())?;
            output(&commands::extract(&raw)?, human);
        }
        Commands::Projects => output(&commands::projects(&settings)?, human),
        Commands::Iterations => output(&commands::iterations(&settings)?, human),
        Commands::Orgs => output(&commands::orgs(&settings)?, human),
        Commands::Config { command } => match command {
            ConfigCommands::Show => output(&commands::config_show(&settings), human),
            ConfigCommands::Path => output(&commands::config_path(config_path), human),
        },
    }

    Ok(())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

fn read_input(file: Option<&Path>) -> Result<String, backlog_lens::Error> {
    match file {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            Ok(raw)
        }
    }
}

/// Run the dashboard server until Enter or Ctrl+C.
fn serve_dashboard(server: &ServerConfig) -> Result<(), backlog_lens::Error> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(web::serve(server, web::shutdown_signal()))
}
