//! Toolchain invoker for the build worker.
//!
//! Runs the external compiler for one cache miss:
//! - Materializes the source into a temporary input file
//! - Picks the simulate or firmware command shape from the output format
//! - Captures combined stdout/stderr for diagnostics
//! - Races process exit against cancellation, killing the process on cancel
//! - Publishes the output into the artifact cache on success
//!
//! The input file, the temporary output and the diagnostics buffer are all
//! scoped to a single call and removed on every exit path.

use std::ffi::OsString;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Instant;

use lane_protocol::{InvocationMode, JobOutcome, JobRequest};
use thiserror::Error;

use crate::cache::{ArtifactCache, CacheError};
use crate::cancel::CancelToken;
use crate::config::ToolchainConfig;

/// First line of every input file, so diagnostics count lines from the
/// user's source rather than from the injected preamble.
pub const LINE_DIRECTIVE: &[u8] = b"//line main.go:1:1\n";

/// Errors that prevent an invocation from producing a normal outcome.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("could not prepare build: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Publish(#[from] CacheError),
}

/// Compiles one job on a cache miss.
///
/// Implementations must return exactly one outcome and must not leave a
/// running process behind.
pub trait Toolchain: Send {
    fn compile(&self, job: &JobRequest, cancel: &CancelToken, cache: &dyn ArtifactCache)
        -> JobOutcome;
}

/// Invokes the external toolchain executable.
#[derive(Debug, Clone, Default)]
pub struct ToolchainInvoker {
    config: ToolchainConfig,
}

impl ToolchainInvoker {
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    /// Arguments for one invocation, after the configured program name.
    pub fn command_args(&self, job: &JobRequest, output: &Path, input: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.config.base_args.iter().map(OsString::from).collect();
        args.push("-o".into());
        args.push(output.into());

        match job.format.mode() {
            InvocationMode::Simulate => {
                args.push("-tags".into());
                args.push(job.target.build_tag().into());
                args.push("-no-debug".into());
            }
            InvocationMode::Firmware => {
                args.push("-target".into());
                args.push(job.target.as_str().into());
            }
        }

        args.push(input.into());
        args
    }

    fn run(
        &self,
        job: &JobRequest,
        cancel: &CancelToken,
        cache: &dyn ArtifactCache,
    ) -> Result<JobOutcome, InvokeError> {
        let key = job.key();
        let input = write_input(job)?;
        let output = TempOutput(cache.temp_output_path(&key));
        let mut log = tempfile::tempfile()?;

        let input_path = input.path();
        let work_dir = input_path.parent().unwrap_or_else(|| Path::new("."));

        let mut command = Command::new(&self.config.program);
        command
            .args(self.command_args(job, &output.0, input_path))
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log.try_clone()?));

        // The toolchain forks its own helpers; give it a process group so a
        // cancel reaches all of them.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        tracing::debug!(
            program = %self.config.program,
            board = %job.target,
            format = %job.format,
            digest = %job.digest,
            "starting toolchain"
        );
        let start = Instant::now();

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(program = %self.config.program, error = %e, "toolchain failed to start");
                return Ok(JobOutcome::failed(format!(
                    "failed to start {}: {}",
                    self.config.program, e
                )));
            }
        };
        let mut process = ProcessGuard::new(child);

        let status = match self.wait_or_cancel(&mut process, cancel)? {
            Some(status) => status,
            None => {
                tracing::info!(board = %job.target, digest = %job.digest, "toolchain run cancelled");
                return Ok(JobOutcome::aborted());
            }
        };

        let mut diagnostics = Vec::new();
        log.seek(SeekFrom::Start(0))?;
        log.read_to_end(&mut diagnostics)?;

        if !status.success() {
            tracing::debug!(
                board = %job.target,
                status = %status,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "toolchain reported errors"
            );
            if diagnostics.is_empty() {
                diagnostics = status.to_string().into_bytes();
            }
            return Ok(JobOutcome::Failed(strip_input_marker(diagnostics, input_path)));
        }

        let artifact = cache.publish(&key, &output.0)?;
        tracing::info!(
            artifact = %artifact.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "toolchain build finished"
        );
        Ok(JobOutcome::Built(artifact))
    }

    /// Wait for the process to exit, or kill it once `cancel` fires.
    ///
    /// Returns `None` if the process was cancelled.
    fn wait_or_cancel(
        &self,
        process: &mut ProcessGuard,
        cancel: &CancelToken,
    ) -> io::Result<Option<ExitStatus>> {
        loop {
            if cancel.is_cancelled() {
                self.terminate(process)?;
                return Ok(None);
            }
            if let Some(status) = process.child.try_wait()? {
                process.reaped = true;
                return Ok(Some(status));
            }
            thread::sleep(self.config.poll_interval);
        }
    }

    /// Terminate the toolchain's process group gracefully then forcefully.
    fn terminate(&self, process: &mut ProcessGuard) -> io::Result<()> {
        process.signal_group(GroupSignal::Terminate);

        let start = Instant::now();
        while start.elapsed() < self.config.termination_grace {
            if process.child.try_wait()?.is_some() {
                process.reaped = true;
                break;
            }
            thread::sleep(self.config.poll_interval);
        }

        // Helpers may outlive the group leader.
        process.signal_group(GroupSignal::Kill);
        if !process.reaped {
            process.child.wait()?;
            process.reaped = true;
        }
        Ok(())
    }
}

impl Toolchain for ToolchainInvoker {
    fn compile(
        &self,
        job: &JobRequest,
        cancel: &CancelToken,
        cache: &dyn ArtifactCache,
    ) -> JobOutcome {
        match self.run(job, cancel, cache) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(board = %job.target, digest = %job.digest, error = %e, "build failed unexpectedly");
                JobOutcome::failed(e.to_string())
            }
        }
    }
}

/// Write the line directive and the job's source into a fresh temp file.
fn write_input(job: &JobRequest) -> io::Result<tempfile::NamedTempFile> {
    let mut input = tempfile::Builder::new()
        .prefix(&format!("build-{}-", job.target))
        .suffix(".go")
        .tempfile()?;
    input.write_all(LINE_DIRECTIVE)?;
    input.write_all(&job.source)?;
    input.flush()?;
    Ok(input)
}

/// Drop the `# <input path>` header the toolchain prints before diagnostics,
/// so local temp paths don't leak to callers.
pub fn strip_input_marker(mut diagnostics: Vec<u8>, input: &Path) -> Vec<u8> {
    let marker = format!("# {}\n", input.display());
    if diagnostics.starts_with(marker.as_bytes()) {
        diagnostics.drain(..marker.len());
    }
    diagnostics
}

/// Temporary toolchain output, removed when dropped unless already moved.
struct TempOutput(PathBuf);

impl Drop for TempOutput {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

/// Owns a spawned toolchain process; kills its group and reaps it if still
/// running on drop.
struct ProcessGuard {
    child: Child,
    reaped: bool,
}

impl ProcessGuard {
    fn new(child: Child) -> Self {
        Self { child, reaped: false }
    }

    /// Signal every process in the child's group. Errors (e.g. the group is
    /// already gone) are ignored.
    #[cfg(unix)]
    fn signal_group(&mut self, which: GroupSignal) {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let signal = match which {
            GroupSignal::Terminate => Signal::SIGTERM,
            GroupSignal::Kill => Signal::SIGKILL,
        };
        let _ = killpg(Pid::from_raw(self.child.id() as i32), signal);
    }

    #[cfg(not(unix))]
    fn signal_group(&mut self, _which: GroupSignal) {
        if !self.reaped {
            let _ = self.child.kill();
        }
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        if !self.reaped {
            self.signal_group(GroupSignal::Kill);
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
