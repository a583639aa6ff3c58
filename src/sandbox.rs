mod invoker;
mod report;

// Re-export the invoker and the report interpreter
pub use invoker::Invoker;
pub use report::{ReportSummary, interpret_report};

use std::fmt;
use std::path::PathBuf;

use anyhow::{Result, bail};
use serde::Deserialize;

use crate::config::{DEFAULT_MEMORY_LIMIT_KB, DEFAULT_TIME_LIMIT_S};

/// Canonical classification of one sandboxed run
///
/// Verdicts describe completed or limit-violating runs; they are normal
/// return values, never errors. Infrastructure faults (unreadable report,
/// failed spawn) are reported as `Err` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The program finished within its limits
    Ok,
    /// Time Limit Exceeded
    TimeLimitExceeded,
    /// Restricted Function: the program attempted a forbidden operation
    RestrictedFunction,
    /// Internal Error reported by the sandbox about itself
    InternalError,
    /// Non-Zero Exit Code
    NonZeroExit,
    /// Terminated by the named signal, e.g. `SIGSEGV`
    Signal(String),
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Ok => write!(f, "OK"),
            Verdict::TimeLimitExceeded => write!(f, "TLE"),
            Verdict::RestrictedFunction => write!(f, "RF"),
            Verdict::InternalError => write!(f, "IE"),
            Verdict::NonZeroExit => write!(f, "NZEC"),
            Verdict::Signal(name) => write!(f, "{name}"),
        }
    }
}

/// One sandboxed execution to perform
///
/// When `interpreter_path` is set the program is run as a script under that
/// interpreter; otherwise it must be directly executable. Requests arrive
/// either constructed in code or deserialized from JSON, with omitted
/// optional fields falling back to their defaults.
#[derive(Deserialize, Debug, Clone)]
pub struct ExecutionRequest {
    /// Interpreter to run the program under; `None` means the program is directly executable
    #[serde(default)]
    pub interpreter_path: Option<PathBuf>,
    /// Program under test
    pub program_path: PathBuf,
    /// File supplying the program's standard input; `None` means empty input
    #[serde(default)]
    pub stdin_path: Option<PathBuf>,
    /// Arguments passed to the interpreter, before the program path
    #[serde(default)]
    pub interpreter_args: Vec<String>,
    /// Arguments passed to the program
    #[serde(default)]
    pub program_args: Vec<String>,
    /// Directory the program executes in; `None` inherits the invoker's
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Destination of the sandbox report; `None` lets the invoker allocate one
    #[serde(default)]
    pub report_path: Option<PathBuf>,
    /// Time limit in seconds, fractional values allowed
    #[serde(default = "default_time_limit")]
    pub time_limit_s: f64,
    /// Memory limit in KiB
    #[serde(default = "default_memory_limit")]
    pub memory_limit_kb: u32,
}

fn default_time_limit() -> f64 {
    DEFAULT_TIME_LIMIT_S
}

fn default_memory_limit() -> u32 {
    DEFAULT_MEMORY_LIMIT_KB
}

impl ExecutionRequest {
    /// Creates a request for a directly executable program with default limits
    pub fn new(program_path: impl Into<PathBuf>) -> Self {
        Self {
            interpreter_path: None,
            program_path: program_path.into(),
            stdin_path: None,
            interpreter_args: Vec::new(),
            program_args: Vec::new(),
            working_dir: None,
            report_path: None,
            time_limit_s: DEFAULT_TIME_LIMIT_S,
            memory_limit_kb: DEFAULT_MEMORY_LIMIT_KB,
        }
    }

    /// Rejects limits the sandbox cannot be instructed with
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.time_limit_s.is_finite() || self.time_limit_s <= 0.0 {
            bail!("Time limit must be positive, got {}", self.time_limit_s);
        }
        if self.memory_limit_kb == 0 {
            bail!("Memory limit must be positive");
        }
        Ok(())
    }
}

/// Result of one sandboxed execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Classification of the run
    pub verdict: Verdict,
    /// Captured standard output of the sandboxed program
    pub stdout: String,
    /// Captured standard error of the sandboxed program
    pub stderr: String,
    /// CPU time consumed, in seconds
    pub time_s: f64,
    /// Peak memory usage, in KiB
    pub memory_kb: u32,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_verdict_display_forms() {
        assert_eq!(Verdict::Ok.to_string(), "OK");
        assert_eq!(Verdict::TimeLimitExceeded.to_string(), "TLE");
        assert_eq!(Verdict::RestrictedFunction.to_string(), "RF");
        assert_eq!(Verdict::InternalError.to_string(), "IE");
        assert_eq!(Verdict::NonZeroExit.to_string(), "NZEC");
        assert_eq!(Verdict::Signal("SIGKILL".to_string()).to_string(), "SIGKILL");
    }

    #[test]
    fn test_request_deserialization_fills_defaults() {
        let request: ExecutionRequest =
            serde_json::from_str(r#"{ "program_path": "./main" }"#).unwrap();
        assert_eq!(request.program_path, PathBuf::from("./main"));
        assert_eq!(request.interpreter_path, None);
        assert_eq!(request.time_limit_s, 10.0);
        assert_eq!(request.memory_limit_kb, 80_000);
        assert!(request.program_args.is_empty());
    }

    #[test]
    fn test_request_validation() {
        let mut request = ExecutionRequest::new("./main");
        assert!(request.validate().is_ok());

        request.time_limit_s = 0.0;
        assert!(request.validate().is_err());

        request.time_limit_s = 1.5;
        request.memory_limit_kb = 0;
        assert!(request.validate().is_err());
    }
}
