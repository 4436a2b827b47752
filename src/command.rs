use crate::env::Environment;
use crate::history::History;
use anyhow::Result;
use nix::unistd::Pid;
use std::io::Write;
use std::path::PathBuf;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// Where a stage's standard output goes instead of the terminal or pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRedirect {
    pub path: PathBuf,
    /// `>>` appends to an existing file, `>` truncates it.
    pub append: bool,
}

/// One pipeline stage: a program, its arguments and its redirections.
///
/// `argv` is never empty; the builder refuses to create a stage without a
/// program name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub argv: Vec<String>,
    pub input: Option<PathBuf>,
    pub output: Option<OutputRedirect>,
    /// Process running this stage, once spawned.
    pub pid: Option<Pid>,
}

impl CommandDescriptor {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            input: None,
            output: None,
            pid: None,
        }
    }

    /// Name of the program to run.
    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }
}

/// Ordered stages connected left to right by pipes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<CommandDescriptor>,
    /// Run without making the shell wait for completion (`&`).
    pub background: bool,
}

impl Pipeline {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// The single stage of a pipeline without pipes.
    pub fn single(&self) -> Option<&CommandDescriptor> {
        match self.stages.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

/// Object-safe trait for a command the shell runs in-process.
///
/// Implemented for every built-in via a blanket impl.
pub trait ExecutableCommand {
    /// Executes the command.
    fn execute(
        self: Box<Self>,
        stdout: &mut dyn Write,
        env: &mut Environment,
        history: &History,
    ) -> Result<ExitCode>;
}

/// Factory that tries to create a command from a name and its arguments.
///
/// Returns `None` when the factory doesn't recognize the `name`.
pub trait CommandFactory {
    /// Attempt to create a command instance for the provided name and arguments.
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>>;
}
