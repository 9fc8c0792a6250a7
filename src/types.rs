//! Core data structures

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{BridgeError, Result};

fn default_concurrency() -> usize {
    8
}

fn default_start_timeout_ms() -> u64 {
    60_000
}

/// Launch and scheduling options for one server session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerOptions {
    /// Executable path (resolved via $PATH when bare)
    pub executable: String,
    /// Command line arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables for the server process
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory for the server process
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Maximum concurrent normal-class requests; deferred capacity is
    /// derived from this
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Startup handshake timeout in milliseconds
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,
}

impl ServerOptions {
    /// Create options for an executable with default scheduling settings
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            concurrency: default_concurrency(),
            start_timeout_ms: default_start_timeout_ms(),
        }
    }

    /// Load options from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        debug!("Loading server options from: {:?}", path);

        let content = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("Failed to read options file: {}", e)))?;

        Self::from_yaml_str(&content)
    }

    /// Load options from a YAML string
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let options: ServerOptions = serde_yaml::from_str(content)
            .map_err(|e| BridgeError::Config(format!("Failed to parse YAML: {}", e)))?;

        options.validate()?;
        Ok(options)
    }

    /// Validate option values
    pub fn validate(&self) -> Result<()> {
        if self.executable.is_empty() {
            return Err(BridgeError::Config("executable must not be empty".into()));
        }

        if self.concurrency == 0 {
            return Err(BridgeError::Config(
                "concurrency must be at least 1".into(),
            ));
        }

        if self.start_timeout_ms == 0 {
            return Err(BridgeError::Config(
                "start_timeout_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

/// Lifecycle state of a server session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never started
    NotStarted,
    /// Process launched, waiting for the readiness event
    Starting,
    /// Handshake complete, requests may be sent
    Ready,
    /// Shutdown initiated
    Stopping,
    /// Process gone; terminal until restarted
    Stopped,
}

/// A named event broadcast by the server
#[derive(Debug, Clone)]
pub struct ServerEvent {
    /// Event name as it appeared on the wire
    pub name: String,
    /// Event payload
    pub body: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let options = ServerOptions::new("omnisharp");
        assert_eq!(options.executable, "omnisharp");
        assert_eq!(options.concurrency, 8);
        assert_eq!(options.start_timeout_ms, 60_000);
        assert!(options.args.is_empty());
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_options_from_yaml() {
        let yaml = r#"
executable: /usr/local/bin/omnisharp
args: ["-s", "/work/App.sln"]
concurrency: 4
"#;
        let options = ServerOptions::from_yaml_str(yaml).unwrap();
        assert_eq!(options.executable, "/usr/local/bin/omnisharp");
        assert_eq!(options.args, vec!["-s", "/work/App.sln"]);
        assert_eq!(options.concurrency, 4);
        // unspecified fields fall back to defaults
        assert_eq!(options.start_timeout_ms, 60_000);
    }

    #[test]
    fn test_options_reject_empty_executable() {
        let result = ServerOptions::from_yaml_str("executable: \"\"");
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_options_reject_zero_concurrency() {
        let yaml = "executable: omnisharp\nconcurrency: 0\n";
        let result = ServerOptions::from_yaml_str(yaml);
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_options_reject_malformed_yaml() {
        let result = ServerOptions::from_yaml_str(": not yaml :");
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_options_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "executable: omnisharp").unwrap();
        writeln!(file, "start_timeout_ms: 5000").unwrap();

        let options = ServerOptions::from_yaml_file(file.path()).unwrap();
        assert_eq!(options.executable, "omnisharp");
        assert_eq!(options.start_timeout_ms, 5000);
    }

    #[test]
    fn test_options_missing_file() {
        let result = ServerOptions::from_yaml_file(Path::new("/nonexistent/options.yaml"));
        assert!(matches!(result, Err(BridgeError::Config(_))));
    }
}
