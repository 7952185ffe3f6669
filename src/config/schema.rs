//! KDL schema for config.kdl.
//!
//! The file only carries non-secret defaults. The personal access token and
//! LLM API key are read from flags or the environment, never from here.
//!
//! # KDL Schema
//!
//! ```kdl
//! org "acme"
//! project "Web"
//! iteration-path "\\Web\\Iteration\\Sprint 4"
//! max-items 7
//! sprint-days 10
//! days-per-complexity 2
//! load-percent 0
//! llm-command "gemini"
//! llm-timeout-secs 600
//! snapshot "res.json"
//! public-dir "public"
//! host "127.0.0.1"
//! port 8000
//! api-version "7.0"
//! ```

use kdl::{KdlDocument, KdlValue};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Values read from config.kdl. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileConfig {
    pub org: Option<String>,
    pub project: Option<String>,
    pub iteration_path: Option<String>,
    pub max_items: Option<usize>,
    pub sprint_days: Option<f64>,
    pub days_per_complexity: Option<f64>,
    pub load_percent: Option<f64>,
    pub llm_command: Option<String>,
    pub llm_timeout_secs: Option<u64>,
    pub snapshot: Option<PathBuf>,
    pub public_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub api_version: Option<String>,
}

impl FileConfig {
    /// Create an empty config with no values set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config from a KDL document.
    ///
    /// Unknown nodes are ignored; values of the wrong type are errors.
    pub fn from_kdl(doc: &KdlDocument) -> Result<Self> {
        Ok(Self {
            org: string_value(doc, "org")?,
            project: string_value(doc, "project")?,
            iteration_path: string_value(doc, "iteration-path")?,
            max_items: integer_value(doc, "max-items")?,
            sprint_days: float_value(doc, "sprint-days")?,
            days_per_complexity: float_value(doc, "days-per-complexity")?,
            load_percent: float_value(doc, "load-percent")?,
            llm_command: string_value(doc, "llm-command")?,
            llm_timeout_secs: integer_value(doc, "llm-timeout-secs")?,
            snapshot: string_value(doc, "snapshot")?.map(PathBuf::from),
            public_dir: string_value(doc, "public-dir")?.map(PathBuf::from),
            host: string_value(doc, "host")?,
            port: integer_value(doc, "port")?,
            api_version: string_value(doc, "api-version")?,
        })
    }

    /// Parse config from KDL text.
    pub fn parse(text: &str) -> Result<Self> {
        let doc: KdlDocument = text
            .parse()
            .map_err(|e: kdl::KdlError| Error::Config(format!("invalid config.kdl: {}", e)))?;
        Self::from_kdl(&doc)
    }

    /// Load config from `path`.
    ///
    /// A missing file yields an empty config unless `required` is set.
    pub fn load(path: &Path, required: bool) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).map_err(|e| match e {
                Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
                other => other,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                tracing::debug!(path = %path.display(), "no config file");
                Ok(Self::new())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            ))),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Overrides the directory holding config.kdl.
pub const CONFIG_DIR_ENV: &str = "BLENS_CONFIG_DIR";

/// Default location of config.kdl.
///
/// `$BLENS_CONFIG_DIR/config.kdl` when set, else
/// `~/.config/backlog-lens/config.kdl`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join("config.kdl"));
    }
    dirs::config_dir().map(|dir| dir.join("backlog-lens").join("config.kdl"))
}

fn first_value<'a>(doc: &'a KdlDocument, name: &str) -> Option<&'a KdlValue> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .map(|entry| entry.value())
}

fn type_error(name: &str, expected: &str) -> Error {
    Error::Config(format!("{} must be {}", name, expected))
}

fn string_value(doc: &KdlDocument, name: &str) -> Result<Option<String>> {
    match first_value(doc, name) {
        None => Ok(None),
        Some(value) => value
            .as_string()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| type_error(name, "a string")),
    }
}

fn integer_value<T: TryFrom<i128>>(doc: &KdlDocument, name: &str) -> Result<Option<T>> {
    match first_value(doc, name) {
        None => Ok(None),
        Some(value) => value
            .as_integer()
            .and_then(|i| T::try_from(i).ok())
            .map(Some)
            .ok_or_else(|| type_error(name, "a non-negative integer in range")),
    }
}

fn float_value(doc: &KdlDocument, name: &str) -> Result<Option<f64>> {
    match first_value(doc, name) {
        None => Ok(None),
        Some(value) => value
            .as_float()
            .or_else(|| value.as_integer().map(|i| i as f64))
            .map(Some)
            .ok_or_else(|| type_error(name, "a number")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let config = FileConfig::parse(
            r#"
            org "acme"
            project "Web"
            iteration-path "Web\\Sprint 4"
            max-items 12
            sprint-days 9.5
            days-per-complexity 2
            load-percent 20
            llm-command "gemini"
            llm-timeout-secs 300
            snapshot "out/res.json"
            public-dir "static"
            host "0.0.0.0"
            port 9000
            api-version "7.1"
            "#,
        )
        .unwrap();

        assert_eq!(config.org.as_deref(), Some("acme"));
        assert_eq!(config.iteration_path.as_deref(), Some(r"Web\Sprint 4"));
        assert_eq!(config.max_items, Some(12));
        assert_eq!(config.sprint_days, Some(9.5));
        assert_eq!(config.days_per_complexity, Some(2.0));
        assert_eq!(config.load_percent, Some(20.0));
        assert_eq!(config.llm_timeout_secs, Some(300));
        assert_eq!(config.snapshot, Some(PathBuf::from("out/res.json")));
        assert_eq!(config.public_dir, Some(PathBuf::from("static")));
        assert_eq!(config.port, Some(9000));
        assert_eq!(config.api_version.as_deref(), Some("7.1"));
    }

    #[test]
    fn test_parse_empty_config() {
        assert_eq!(FileConfig::parse("").unwrap(), FileConfig::new());
    }

    #[test]
    fn test_unknown_nodes_ignored() {
        let config = FileConfig::parse("editor \"nvim\"\nport 8080").unwrap();
        assert_eq!(config.port, Some(8080));
    }

    #[test]
    fn test_wrong_type_is_error() {
        let err = FileConfig::parse("max-items \"lots\"").unwrap_err();
        assert!(err.to_string().contains("max-items"));
    }

    #[test]
    fn test_out_of_range_port_is_error() {
        assert!(FileConfig::parse("port 70000").is_err());
    }

    #[test]
    fn test_negative_integer_is_error() {
        assert!(FileConfig::parse("max-items -1").is_err());
    }

    #[test]
    fn test_invalid_kdl_is_error() {
        let err = FileConfig::parse("org \"unterminated").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_missing_optional_file() {
        let dir = TempDir::new().unwrap();
        let config = FileConfig::load(&dir.path().join("config.kdl"), false).unwrap();
        assert_eq!(config, FileConfig::new());
    }

    #[test]
    fn test_load_missing_required_file() {
        let dir = TempDir::new().unwrap();
        let err = FileConfig::load(&dir.path().join("config.kdl"), true).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.kdl");
        std::fs::write(&path, "sprint-days 15").unwrap();

        let config = FileConfig::load(&path, true).unwrap();
        assert_eq!(config.sprint_days, Some(15.0));
    }

    #[test]
    #[serial]
    fn test_default_config_path_honors_env_override() {
        let dir = TempDir::new().unwrap();
        // SAFETY: serialized with the other env-mutating tests
        unsafe { std::env::set_var(CONFIG_DIR_ENV, dir.path()) };
        let path = default_config_path();
        unsafe { std::env::remove_var(CONFIG_DIR_ENV) };

        assert_eq!(path, Some(dir.path().join("config.kdl")));
    }

    #[test]
    #[serial]
    fn test_default_config_path_under_backlog_lens() {
        unsafe { std::env::remove_var(CONFIG_DIR_ENV) };
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("backlog-lens/config.kdl"));
        }
    }
}
