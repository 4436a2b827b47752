//! Running a [`Pipeline`] as a tree of forked processes.
//!
//! The shell forks once per pipeline. That child wires the stages left to
//! right: every stage but the last is forked off with its standard output
//! connected to a pipe, and the child then reads that pipe as its own standard
//! input before moving on. The last stage replaces the child's image, so the
//! process the shell waits for is the one running the final program.
//!
//! A non-final stage that also has an output redirection is run twice: once
//! writing to its file and once feeding the pipe.

use crate::command::{CommandDescriptor, ExitCode, OutputRedirect, Pipeline};
use nix::errno::Errno;
use nix::libc;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{ForkResult, Pid, dup2, execvp, fork, pipe};
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Exit status of a stage whose redirection could not be set up.
pub const REDIRECT_FAILURE: ExitCode = 1;
/// Exit status of a stage whose program could not be started.
pub const EXEC_FAILURE: ExitCode = 127;

/// Failures to create the processes of a pipeline.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("fork failed: {0}")]
    Fork(Errno),
    #[error("pipe failed: {0}")]
    Pipe(Errno),
    #[error("wait failed: {0}")]
    Wait(Errno),
    #[error("cannot redirect stdin to pipe: {0}")]
    Dup(Errno),
    #[error("argument contains a NUL byte: {0:?}")]
    InvalidArgument(String),
}

/// Failures to attach a stage's standard streams to files.
#[derive(Debug, Error)]
pub enum RedirectError {
    #[error("{}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("cannot redirect {stream}: {source}")]
    Dup { stream: &'static str, source: Errno },
}

/// What happened to a pipeline after it was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Foreground pipeline finished; `code` is the status of its last stage.
    Exited { pid: Pid, code: ExitCode },
    /// Background pipeline detached; the shell did not wait.
    Background(Pid),
}

impl Outcome {
    pub fn code(&self) -> Option<ExitCode> {
        match self {
            Outcome::Exited { code, .. } => Some(*code),
            Outcome::Background(_) => None,
        }
    }
}

/// A stage with its argv converted for `execvp` ahead of forking.
struct PreparedStage {
    argv: Vec<CString>,
    input: Option<PathBuf>,
    output: Option<OutputRedirect>,
}

impl PreparedStage {
    fn new(stage: &CommandDescriptor) -> Result<Self, SpawnError> {
        let argv = stage
            .argv
            .iter()
            .map(|arg| {
                CString::new(arg.as_str()).map_err(|_| SpawnError::InvalidArgument(arg.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if argv.is_empty() {
            return Err(SpawnError::InvalidArgument(String::new()));
        }
        Ok(Self {
            argv,
            input: stage.input.clone(),
            output: stage.output.clone(),
        })
    }

    fn program(&self) -> &CString {
        &self.argv[0]
    }
}

/// Start `pipeline`, waiting for it unless it is a background pipeline.
///
/// The process id of the forked pipeline leader is recorded on the last stage,
/// since that process ends up running the last program.
pub fn execute(pipeline: &mut Pipeline) -> Result<Outcome, SpawnError> {
    let stages = pipeline
        .stages
        .iter()
        .map(PreparedStage::new)
        .collect::<Result<Vec<_>, _>>()?;

    // Our own pending output must reach the terminal before the children's.
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();

    // SAFETY: the child only rewires descriptors, forks and execs; it never
    // returns into the caller.
    match unsafe { fork() }.map_err(SpawnError::Fork)? {
        ForkResult::Child => run_stages(&stages),
        ForkResult::Parent { child } => {
            if let Some(last) = pipeline.stages.last_mut() {
                last.pid = Some(child);
            }
            tracing::debug!(
                pid = child.as_raw(),
                stages = stages.len(),
                background = pipeline.background,
                "pipeline started"
            );
            if pipeline.background {
                return Ok(Outcome::Background(child));
            }
            let code = wait_for(child)?;
            tracing::debug!(pid = child.as_raw(), code, "pipeline finished");
            Ok(Outcome::Exited { pid: child, code })
        }
    }
}

/// Collect the background pipelines in `jobs` that have finished, without
/// blocking. Reaped pids are removed from `jobs`.
///
/// Only the listed pids are waited on, so foreground children owned by someone
/// else are never collected here.
pub fn reap_background(jobs: &mut Vec<Pid>) -> Vec<(Pid, ExitCode)> {
    let mut reaped = Vec::new();
    jobs.retain(|&pid| {
        match syscall(|| waitpid(pid, Some(WaitPidFlag::WNOHANG))) {
            Ok(WaitStatus::Exited(pid, code)) => reaped.push((pid, code)),
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                reaped.push((pid, terminated_by_signal(signal as i32)))
            }
            Ok(_) => return true,
            // Already collected elsewhere; nothing left to wait for.
            Err(Errno::ECHILD) => {}
            Err(e) => {
                tracing::warn!(pid = pid.as_raw(), "reaping background job failed: {}", e);
                return true;
            }
        }
        false
    });
    for (pid, code) in &reaped {
        tracing::debug!(pid = pid.as_raw(), code, "background pipeline finished");
    }
    reaped
}

fn wait_for(pid: Pid) -> Result<ExitCode, SpawnError> {
    loop {
        match syscall(|| waitpid(pid, None)).map_err(SpawnError::Wait)? {
            WaitStatus::Exited(_, code) => return Ok(code),
            WaitStatus::Signaled(_, signal, _) => return Ok(terminated_by_signal(signal as i32)),
            _ => continue,
        }
    }
}

fn terminated_by_signal(signal: i32) -> ExitCode {
    128 + signal
}

/// System call wrapper retrying on EINTR.
fn syscall<F, T>(f: F) -> Result<T, Errno>
where
    F: Fn() -> Result<T, Errno>,
{
    loop {
        match f() {
            Err(Errno::EINTR) => continue,
            result => return result,
        }
    }
}

/// Body of the pipeline leader process. Never returns.
fn run_stages(stages: &[PreparedStage]) -> ! {
    let Some((last, upstream)) = stages.split_last() else {
        exit_child(0)
    };
    for stage in upstream {
        let step = match stage.output {
            Some(ref output) => {
                redirect_to_sink(stage, output).and_then(|_| connect_via_pipe(stage))
            }
            None => connect_via_pipe(stage),
        };
        if let Err(e) = step {
            report(format_args!("{}", e));
            exit_child(1);
        }
    }
    exec_stage(last, last.output.as_ref())
}

/// Run `stage` in a side process whose output goes to `sink`.
fn redirect_to_sink(stage: &PreparedStage, sink: &OutputRedirect) -> Result<(), SpawnError> {
    // SAFETY: see `execute`.
    match unsafe { fork() }.map_err(SpawnError::Fork)? {
        ForkResult::Child => exec_stage(stage, Some(sink)),
        ForkResult::Parent { .. } => Ok(()),
    }
}

/// Run `stage` with its output feeding a new pipe, then read that pipe as our
/// own standard input.
fn connect_via_pipe(stage: &PreparedStage) -> Result<(), SpawnError> {
    let (read_end, write_end) = pipe().map_err(SpawnError::Pipe)?;
    // SAFETY: see `execute`.
    match unsafe { fork() }.map_err(SpawnError::Fork)? {
        ForkResult::Child => {
            if let Err(e) = dup2(write_end.as_raw_fd(), libc::STDOUT_FILENO) {
                report(format_args!("cannot redirect stdout: {}", e));
                exit_child(REDIRECT_FAILURE);
            }
            drop(read_end);
            drop(write_end);
            exec_stage(stage, None)
        }
        ForkResult::Parent { .. } => {
            dup2(read_end.as_raw_fd(), libc::STDIN_FILENO).map_err(SpawnError::Dup)?;
            drop(write_end);
            drop(read_end);
            Ok(())
        }
    }
}

/// Apply redirections and replace the current process image. Never returns.
fn exec_stage(stage: &PreparedStage, output: Option<&OutputRedirect>) -> ! {
    if let Err(e) = apply_redirects(stage.input.as_deref(), output) {
        report(format_args!("{}", e));
        exit_child(REDIRECT_FAILURE);
    }
    let errno = match execvp(stage.program(), &stage.argv) {
        Ok(never) => match never {},
        Err(errno) => errno,
    };
    report(format_args!(
        "{}: command failed: {}",
        stage.program().to_string_lossy(),
        errno.desc()
    ));
    exit_child(EXEC_FAILURE)
}

fn apply_redirects(
    input: Option<&Path>,
    output: Option<&OutputRedirect>,
) -> Result<(), RedirectError> {
    if let Some(path) = input {
        let file = File::open(path).map_err(|source| RedirectError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        replace_stream(&file, libc::STDIN_FILENO, "stdin")?;
    }
    if let Some(redirect) = output {
        let file = open_sink(redirect)?;
        replace_stream(&file, libc::STDOUT_FILENO, "stdout")?;
    }
    Ok(())
}

/// Open an output redirection target: create if missing, truncate or append.
pub(crate) fn open_sink(redirect: &OutputRedirect) -> Result<File, RedirectError> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .append(redirect.append)
        .truncate(!redirect.append)
        .mode(0o666)
        .open(&redirect.path)
        .map_err(|source| RedirectError::Open {
            path: redirect.path.clone(),
            source,
        })
}

fn replace_stream(file: &File, stream: RawFd, name: &'static str) -> Result<(), RedirectError> {
    dup2(file.as_raw_fd(), stream).map_err(|source| RedirectError::Dup {
        stream: name,
        source,
    })?;
    Ok(())
}

fn report(message: std::fmt::Arguments<'_>) {
    let _ = writeln!(io::stderr(), "twig: {}", message);
}

fn exit_child(code: ExitCode) -> ! {
    // SAFETY: `_exit` skips atexit handlers and stdio flushing, which belong to
    // the parent shell.
    unsafe { libc::_exit(code) }
}
