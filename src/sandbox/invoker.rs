use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow};
use chrono::Local;

use crate::config::SandboxConfig;

use super::report::interpret_report;
use super::{ExecutionRequest, ExecutionResult};

// Cache directory permissions
const CACHE_DIR_PERMISSIONS: u32 = 0o700;
// File name of an invoker-allocated report
const REPORT_FILE_NAME: &str = "run.report";

/// Runs programs under the external sandbox executable
///
/// The invoker holds no mutable state, so independent instances or
/// concurrent `execute` calls run as independent child processes. Callers
/// sharing one explicit `report_path` across concurrent runs would race on
/// the report file; each run needs its own.
pub struct Invoker {
    /// Sandbox executable and fixed isolation identity
    config: SandboxConfig,
    /// Directory for invoker-allocated report files
    cache_dir: PathBuf,
}

impl Invoker {
    /// Creates an invoker around the given sandbox configuration
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let cache_dir = setup_cache_directory()?;

        log::info!(
            "Invoker initialized with sandbox {}",
            config.sandbox_path.display()
        );
        Ok(Self { config, cache_dir })
    }

    /// Executes one request in the sandbox and interprets its report
    ///
    /// Blocks until the child process exits and both output streams are
    /// fully drained. The report file is only read after that point, since
    /// the sandbox writes it as part of its own shutdown.
    ///
    /// Program outcomes (`TLE`, `NZEC`, signals, ...) come back as verdicts
    /// inside `Ok`. Errors are reserved for infrastructure faults: invalid
    /// limits, a sandbox that cannot be spawned, or a report that cannot be
    /// read or parsed.
    pub fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        request.validate()?;

        let report_path = match &request.report_path {
            Some(path) => absolutize(path)?,
            None => self.create_run_report_path()?,
        };

        let command = sandbox_command(&self.config, request, &report_path);
        log::debug!("Running sandbox command: {command:?}");

        let mut cmd = Command::new(&command[0]);
        cmd.args(&command[1..]);

        match &request.stdin_path {
            Some(path) => {
                let stdin_file = fs::File::open(path)
                    .with_context(|| format!("Failed to open stdin file {}", path.display()))?;
                cmd.stdin(Stdio::from(stdin_file));
            }
            None => {
                // The program must see immediate EOF, not the caller's terminal
                cmd.stdin(Stdio::null());
            }
        }

        if let Some(dir) = &request.working_dir {
            cmd.current_dir(dir);
        }

        // output() waits for exit and drains both streams completely
        let output = cmd.output().map_err(|e| {
            anyhow!(
                "Failed to spawn sandbox {}: {}",
                self.config.sandbox_path.display(),
                e
            )
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let report = fs::read_to_string(&report_path).map_err(|e| {
            log::error!("Failed to read sandbox report {}: {e}", report_path.display());
            anyhow!(
                "Failed to read sandbox report {}: {}",
                report_path.display(),
                e
            )
        })?;
        let lines: Vec<&str> = report.trim().split('\n').collect();

        let summary = interpret_report(&lines, request.time_limit_s)?;
        log::debug!(
            "Sandbox run finished: {} ({}s, {} KiB)",
            summary.verdict,
            summary.time_s,
            summary.memory_kb
        );

        Ok(ExecutionResult {
            verdict: summary.verdict,
            stdout,
            stderr,
            time_s: summary.time_s,
            memory_kb: summary.memory_kb,
        })
    }

    /// Allocates a report path in a timestamped run directory
    fn create_run_report_path(&self) -> Result<PathBuf> {
        let run_dir = self
            .cache_dir
            .join(Local::now().format("%y%m%d-%H-%M-%S%.6f").to_string());
        fs::create_dir_all(&run_dir)?;
        Ok(run_dir.join(REPORT_FILE_NAME))
    }
}

/// Sets up the cache directory holding invoker-allocated reports
fn setup_cache_directory() -> Result<PathBuf> {
    use directories::ProjectDirs;

    let proj_dirs =
        ProjectDirs::from("", "", "ojexec").ok_or_else(|| anyhow!("Unable to find user directory"))?;

    let cache_dir = proj_dirs.cache_dir().join("reports");
    fs::create_dir_all(&cache_dir)?;
    fs::set_permissions(
        &cache_dir,
        fs::Permissions::from_mode(CACHE_DIR_PERMISSIONS),
    )?;

    Ok(cache_dir)
}

/// Resolves the report destination before it is handed to the sandbox
///
/// The sandboxed process may run under a different working directory, so a
/// relative report path has to be pinned down first.
fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = std::env::current_dir().context("Failed to resolve current directory")?;
        Ok(cwd.join(path))
    }
}

/// Builds the command line of the program itself
///
/// Interpreter flags precede the program path, which precedes program
/// arguments; the order is part of the contract.
pub(crate) fn effective_command(request: &ExecutionRequest) -> Vec<String> {
    let program = request.program_path.to_string_lossy().into_owned();

    match &request.interpreter_path {
        Some(interpreter) => {
            let mut command = vec![interpreter.to_string_lossy().into_owned()];
            command.extend(request.interpreter_args.iter().cloned());
            command.push(program);
            command.extend(request.program_args.iter().cloned());
            command
        }
        None => {
            let mut command = vec![program];
            command.extend(request.program_args.iter().cloned());
            command
        }
    }
}

/// Wraps the effective command in the full sandbox invocation
///
/// The clock limit handed to the sandbox is the requested limit rounded up
/// to whole seconds; the fractional limit is enforced afterwards by the
/// report interpreter.
pub(crate) fn sandbox_command(
    config: &SandboxConfig,
    request: &ExecutionRequest,
    report_path: &Path,
) -> Vec<String> {
    let mut command = vec![
        config.sandbox_path.to_string_lossy().into_owned(),
        "--gid".to_string(),
        config.gid.to_string(),
        "--nproc".to_string(),
        config.nproc.to_string(),
        "--clock".to_string(),
        (request.time_limit_s.ceil() as u64).to_string(),
        "--mem".to_string(),
        request.memory_limit_kb.to_string(),
        "--report_file".to_string(),
        report_path.to_string_lossy().into_owned(),
        "--exec".to_string(),
    ];
    command.extend(effective_command(request));

    command
}
