//! INVEST evaluation of work items by an external LLM command-line tool.
//!
//! All items of a run are sent in a single prompt; the tool's stdout is
//! handed to [`extract::extract_records`]. Failures are typed so the caller
//! can decide whether to abort or continue with nothing, see
//! [`evaluate_or_empty`].

pub mod extract;

use std::fmt::Write as _;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use wait_timeout::ChildExt;

use crate::models::{Criterion, EvaluationRecord, WorkItem};
pub use extract::{ExtractError, extract_records, locate_json_array};

/// Default LLM command.
pub const DEFAULT_LLM_COMMAND: &str = "gemini";

/// Environment variable the API key is forwarded to the tool under.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Errors that can occur while evaluating work items.
#[derive(Debug, Error)]
pub enum EvaluationError {
    /// The LLM executable is not on PATH
    #[error("LLM command '{0}' not found. Make sure it is installed and on your PATH")]
    ToolNotFound(String),

    /// The tool ran but exited unsuccessfully
    #[error("LLM command exited with {}: {stderr}", describe_status(.code))]
    ExternalTool {
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// The tool did not finish within the configured timeout
    #[error("LLM command timed out after {0:?}")]
    Timeout(Duration),

    /// The tool's output did not contain a usable JSON array
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Spawning or talking to the tool failed
    #[error("IO error running LLM command: {0}")]
    Io(#[from] io::Error),
}

fn describe_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// A backend that scores work items against the rubric.
pub trait Evaluator {
    /// Evaluate a batch of items.
    fn evaluate(&self, items: &[WorkItem]) -> Result<Vec<EvaluationRecord>, EvaluationError>;
}

/// Build the rubric prompt for a batch of items.
pub fn build_prompt(items: &[WorkItem]) -> String {
    let mut prompt = String::from(
        "You are an expert in user stories and Azure DevOps boards.\n\
         Your task is to evaluate the following user stories against the INVEST criteria.\n\n\
         For each story, provide:\n",
    );

    let names: Vec<&str> = Criterion::ALL.iter().map(|c| c.as_str()).collect();
    let _ = writeln!(
        prompt,
        "1. An assessment of each INVEST criterion ({}) with a score from 1 to 5 and a short justification.",
        names.join(", ")
    );
    prompt.push_str(
        "2. A complexity value (1 = very simple, 2.5 = normal, 5 = very complex).\n\
         3. A list of possible improvements or recommendations for the story.\n\n\
         Reply only with a JSON array of objects, one object per user story, each with this structure:\n",
    );

    prompt.push_str("{\n  \"id\": <story ID>,\n  \"title\": \"<story title>\",\n  \"criteria_scores\": {\n");
    for (index, criterion) in Criterion::ALL.iter().enumerate() {
        let separator = if index + 1 < Criterion::ALL.len() { "," } else { "" };
        let _ = writeln!(
            prompt,
            "    \"{}\": {{ \"score\": <score>, \"justification\": \"<justification>\" }}{}",
            criterion, separator
        );
    }
    prompt.push_str(
        "  },\n  \"complexity\": <complexity>,\n  \"suggested_improvements\": [\"<suggestion_1>\", \"<suggestion_2>\", \"...\"]\n}\n\n\
         Here are the stories to evaluate:\n",
    );

    for item in items {
        let _ = write!(
            prompt,
            "\n---\nStory ID: {}\nTitle: {}\nDescription: {}\nAcceptance Criteria: {}\n---\n",
            item.id, item.title, item.description, item.acceptance_criteria
        );
    }

    prompt
}

/// Evaluator that shells out to an LLM CLI such as `gemini`.
///
/// The tool is invoked as `<command> [args...] -p <prompt>` and must print
/// its answer to stdout.
#[derive(Debug, Clone)]
pub struct LlmCli {
    command: String,
    args: Vec<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
    prompt_file: Option<PathBuf>,
}

impl LlmCli {
    /// Create an evaluator for the given executable.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            api_key: None,
            timeout: None,
            prompt_file: None,
        }
    }

    /// Extra arguments placed before `-p <prompt>`.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Forward an API key to the tool's environment.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Kill the tool if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Save every prompt to this file before invoking the tool.
    pub fn with_prompt_file(mut self, path: Option<PathBuf>) -> Self {
        self.prompt_file = path;
        self
    }

    /// Run the tool with `prompt` and return its stdout.
    pub fn run(&self, prompt: &str) -> Result<String, EvaluationError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg("-p")
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(key) = &self.api_key {
            cmd.env(API_KEY_ENV, key);
        }

        tracing::debug!(command = %self.command, prompt_len = prompt.len(), "spawning LLM command");
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                EvaluationError::ToolNotFound(self.command.clone())
            } else {
                EvaluationError::Io(e)
            }
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Drain both pipes while waiting so a chatty tool cannot block on a full pipe.
        let (status, stdout, stderr) = std::thread::scope(|scope| {
            let out = scope.spawn(move || read_pipe(stdout));
            let err = scope.spawn(move || read_pipe(stderr));

            let status = self.wait(&mut child);

            let stdout = out.join().unwrap_or_default();
            let stderr = err.join().unwrap_or_default();
            (status, stdout, stderr)
        });

        let status = status?;
        if !status.success() {
            return Err(EvaluationError::ExternalTool {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        tracing::debug!(stdout_len = stdout.len(), "LLM command finished");
        Ok(stdout.trim().to_string())
    }

    fn wait(&self, child: &mut std::process::Child) -> Result<ExitStatus, EvaluationError> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?);
        };

        match child.wait_timeout(timeout)? {
            Some(status) => Ok(status),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(EvaluationError::Timeout(timeout))
            }
        }
    }
}

impl Evaluator for LlmCli {
    fn evaluate(&self, items: &[WorkItem]) -> Result<Vec<EvaluationRecord>, EvaluationError> {
        let prompt = build_prompt(items);

        if let Some(path) = &self.prompt_file {
            std::fs::write(path, &prompt)?;
            tracing::info!(path = %path.display(), "saved prompt");
        }

        let output = self.run(&prompt)?;
        Ok(extract_records(&output)?)
    }
}

fn read_pipe<R: Read>(pipe: Option<R>) -> String {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Evaluate `items`, logging any failure and returning no records instead.
pub fn evaluate_or_empty(evaluator: &dyn Evaluator, items: &[WorkItem]) -> Vec<EvaluationRecord> {
    match evaluator.evaluate(items) {
        Ok(records) => {
            tracing::info!(count = records.len(), "evaluation returned records");
            records
        }
        Err(EvaluationError::Extract(err @ ExtractError::Decode { .. })) => {
            tracing::error!("{}", err);
            if let Some(candidate) = err.candidate() {
                tracing::error!("Response received:\n{}", candidate);
            }
            Vec::new()
        }
        Err(err) => {
            tracing::error!("{}", err);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: u64, title: &str) -> WorkItem {
        WorkItem {
            id,
            title: title.to_string(),
            url: format!("https://dev.azure.com/acme/_workitems/edit/{}", id),
            description: format!("Description of {}", title),
            acceptance_criteria: format!("Criteria of {}", title),
        }
    }

    /// An `sh -c` evaluator; the script sees `-p` as `$1` and the prompt as `$2`.
    fn shell(script: &str) -> LlmCli {
        LlmCli::new("sh").with_args(["-c", script, "fake-llm"])
    }

    struct FailingEvaluator;

    impl Evaluator for FailingEvaluator {
        fn evaluate(&self, _: &[WorkItem]) -> Result<Vec<EvaluationRecord>, EvaluationError> {
            Err(EvaluationError::ToolNotFound("gemini".to_string()))
        }
    }

    #[test]
    fn test_prompt_lists_every_item() {
        let prompt = build_prompt(&[item(11, "Login"), item(12, "Logout")]);
        assert!(prompt.contains("Story ID: 11"));
        assert!(prompt.contains("Title: Logout"));
        assert!(prompt.contains("Description: Description of Login"));
        assert!(prompt.contains("Acceptance Criteria: Criteria of Logout"));
        assert_eq!(prompt.matches("\n---\nStory ID:").count(), 2);
    }

    #[test]
    fn test_prompt_names_all_criteria_and_fields() {
        let prompt = build_prompt(&[]);
        for criterion in Criterion::ALL {
            assert!(prompt.contains(&format!("\"{}\"", criterion)));
        }
        assert!(prompt.contains("\"criteria_scores\""));
        assert!(prompt.contains("\"complexity\""));
        assert!(prompt.contains("\"suggested_improvements\""));
    }

    #[test]
    fn test_missing_tool_is_tool_not_found() {
        let cli = LlmCli::new("blens-definitely-not-installed-llm");
        let err = cli.evaluate(&[item(1, "A")]).unwrap_err();
        assert!(matches!(err, EvaluationError::ToolNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_fenced_output_is_extracted() {
        let cli = shell(
            "printf 'Here you go:\\n```json\\n[{\"id\": 1, \"complexity\": 2}]\\n```\\n'",
        );
        let records = cli.evaluate(&[item(1, "A")]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].complexity, Some(2.0));
    }

    #[cfg(unix)]
    #[test]
    fn test_prompt_is_passed_after_p_flag() {
        let cli = shell("[ \"$1\" = \"-p\" ] && printf '%s' \"$2\"");
        let output = cli.run("hello prompt").unwrap();
        assert_eq!(output, "hello prompt");
    }

    #[cfg(unix)]
    #[test]
    fn test_api_key_forwarded() {
        let cli = shell("printf '%s' \"$GEMINI_API_KEY\"").with_api_key(Some("k-123".into()));
        assert_eq!(cli.run("x").unwrap(), "k-123");
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_external_tool_error() {
        let cli = shell("echo 'quota exceeded' >&2; exit 3");
        match cli.evaluate(&[item(1, "A")]).unwrap_err() {
            EvaluationError::ExternalTool { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "quota exceeded");
            }
            other => panic!("Expected ExternalTool, got: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_prose_only_output_is_parse_error() {
        let cli = shell("echo 'I cannot help with that.'");
        let err = cli.evaluate(&[item(1, "A")]).unwrap_err();
        assert!(matches!(err, EvaluationError::Extract(ExtractError::Parse)));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_tool() {
        let cli = shell("exec sleep 5").with_timeout(Some(Duration::from_millis(200)));
        let err = cli.run("x").unwrap_err();
        assert!(matches!(err, EvaluationError::Timeout(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_prompt_file_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        let cli = shell("echo '[{\"id\": 1}]'").with_prompt_file(Some(path.clone()));
        cli.evaluate(&[item(1, "Saved")]).unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("Title: Saved"));
    }

    #[test]
    fn test_evaluate_or_empty_swallows_errors() {
        let records = evaluate_or_empty(&FailingEvaluator, &[item(1, "A")]);
        assert!(records.is_empty());
    }

    #[test]
    fn test_external_tool_error_display() {
        let err = EvaluationError::ExternalTool {
            code: Some(2),
            stderr: "bad flag".to_string(),
        };
        assert_eq!(err.to_string(), "LLM command exited with status 2: bad flag");
    }
}
