use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Time limit applied when a request does not carry its own, in seconds
pub const DEFAULT_TIME_LIMIT_S: f64 = 10.0;
/// Memory limit applied when a request does not carry its own, in KiB
pub const DEFAULT_MEMORY_LIMIT_KB: u32 = 80_000;

// Fixed isolation identity, never derived from a request
const SANDBOX_GID: u32 = 10_000;
const SANDBOX_NPROC: u32 = 5;

/// Configuration of the external sandbox executable
///
/// Resolved once at startup and handed to the `Invoker` explicitly, so that
/// tests can point it at a fake sandbox binary.
#[derive(Deserialize, Debug, Clone)]
pub struct SandboxConfig {
    /// Path to the sandbox executable
    pub sandbox_path: PathBuf,
    /// Non-privileged group id the sandboxed program runs under
    #[serde(default = "default_gid")]
    pub gid: u32,
    /// Cap on the number of processes/threads the sandboxed program may create
    #[serde(default = "default_nproc")]
    pub nproc: u32,
}

fn default_gid() -> u32 {
    SANDBOX_GID
}

fn default_nproc() -> u32 {
    SANDBOX_NPROC
}

impl SandboxConfig {
    /// Creates a configuration with the fixed isolation defaults
    pub fn new(sandbox_path: impl Into<PathBuf>) -> Self {
        Self {
            sandbox_path: sandbox_path.into(),
            gid: SANDBOX_GID,
            nproc: SANDBOX_NPROC,
        }
    }

    /// Loads the configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open sandbox config {}", path.display()))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse sandbox config {}", path.display()))
    }
}
