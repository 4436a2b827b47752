use crate::autocomplete::AutoComplete;
use crate::command::{CommandDescriptor, CommandFactory, ExitCode};
use crate::editor::LineEditor;
use crate::env::Environment;
use crate::executor::{self, Outcome};
use crate::history::History;
use crate::parser;
use crate::terminal::{self, RawMode};
use anyhow::{Context, Result};
use nix::unistd::Pid;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports the built-ins defined in this crate.
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// The shell: reads command lines, records them and runs them.
///
/// The interpreter owns the [`Environment`] and the [`History`]. Lines come
/// either from the interactive [`LineEditor`] ([`Interpreter::repl`]) or from a
/// script ([`Interpreter::run_batch`]); either way every line goes through
/// [`Interpreter::run_line`].
///
/// Example
/// ```no_run
/// use twig_shell::Interpreter;
/// let mut sh = Interpreter::default();
/// let code = sh.run_line("echo hello world");
/// assert_eq!(code, 0);
/// assert_eq!(sh.history().len(), 1);
/// ```
pub struct Interpreter {
    env: Environment,
    history: History,
    builtins: Vec<Box<dyn CommandFactory>>,
    autocomplete: AutoComplete,
    /// Background pipelines not yet reaped.
    jobs: Vec<Pid>,
}

impl Interpreter {
    /// Create a new interpreter with a custom set of built-in factories.
    pub fn new(builtins: Vec<Box<dyn CommandFactory>>) -> Self {
        Self {
            env: Environment::new(),
            history: History::new(),
            builtins,
            autocomplete: AutoComplete::default(),
            jobs: Vec::new(),
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// The auto-complete switch consulted by the line editor.
    pub fn autocomplete(&self) -> &AutoComplete {
        &self.autocomplete
    }

    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    pub fn prompt(&self) -> String {
        format!("twig:{} % ", self.env.current_dir.display())
    }

    /// Record `line` in the history and run it.
    ///
    /// Failures are reported on stderr and turned into a non-zero status; the
    /// line is recorded even when it cannot be parsed or run.
    pub fn run_line(&mut self, line: &str) -> ExitCode {
        self.run_line_with_output(line, &mut io::stdout())
    }

    fn run_line_with_output(&mut self, line: &str, stdout: &mut dyn Write) -> ExitCode {
        self.history.append(line);
        let code = match self.execute_line(line, stdout) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("twig: {:#}", e);
                1
            }
        };
        self.env.last_status = code;
        code
    }

    fn execute_line(&mut self, line: &str, stdout: &mut dyn Write) -> Result<ExitCode> {
        let mut pipeline = parser::build(line)?;

        if let Some(stage) = pipeline.single() {
            if let Some(code) = self.run_builtin(stage, stdout)? {
                return Ok(code);
            }
        }

        match executor::execute(&mut pipeline)? {
            Outcome::Exited { code, .. } => Ok(code),
            Outcome::Background(pid) => {
                tracing::info!(pid = pid.as_raw(), line, "running in background");
                self.jobs.push(pid);
                Ok(0)
            }
        }
    }

    /// Run `stage` in-process if it names a built-in. `None` if it does not.
    fn run_builtin(
        &mut self,
        stage: &CommandDescriptor,
        stdout: &mut dyn Write,
    ) -> Result<Option<ExitCode>> {
        let args: Vec<&str> = stage.args().iter().map(String::as_str).collect();
        let Some(cmd) = self
            .builtins
            .iter()
            .find_map(|factory| factory.try_create(stage.program(), &args))
        else {
            return Ok(None);
        };

        let mut file;
        let out: &mut dyn Write = match &stage.output {
            Some(redirect) => {
                file = executor::open_sink(redirect)?;
                &mut file
            }
            None => stdout,
        };

        let code = cmd.execute(out, &mut self.env, &self.history)?;
        out.flush()?;
        Ok(Some(code))
    }

    /// Interactive loop: edit lines on the terminal until `exit` or end of input.
    pub fn repl(&mut self) -> Result<()> {
        let mut editor = LineEditor::new(self.prompt(), self.autocomplete.clone());
        let mut keys = terminal::stdin_keys();

        while !self.env.should_exit {
            executor::reap_background(&mut self.jobs);
            editor.set_prompt(self.prompt());

            let line = {
                let _raw =
                    RawMode::enable(false).context("cannot switch terminal to raw mode")?;
                editor.read_line(&self.history, &mut keys, &mut io::stdout())?
            };

            match line {
                Some(line) => {
                    self.run_line(&line);
                }
                None => break,
            }
        }
        Ok(())
    }

    /// Run every line of `reader` as if it had been typed.
    ///
    /// Blank lines and lines starting with `#` are skipped and not recorded.
    pub fn run_batch(&mut self, reader: impl BufRead) -> Result<()> {
        for line in reader.lines() {
            let line = line.context("cannot read batch input")?;
            if is_comment_or_blank(&line) {
                continue;
            }
            self.run_line(&line);
            if self.env.should_exit {
                break;
            }
            executor::reap_background(&mut self.jobs);
        }
        Ok(())
    }

    /// Run a batch file, then report the executed commands.
    pub fn run_script(&mut self, path: &Path) -> Result<()> {
        let file = File::open(path)
            .with_context(|| format!("invalid batch file {}", path.display()))?;
        self.run_batch(BufReader::new(file))?;

        let mut stdout = io::stdout().lock();
        writeln!(stdout, "{} batch completed: ", path.display())?;
        write!(stdout, "{}", self.history)?;
        stdout.flush()?;
        Ok(())
    }
}

impl Default for Interpreter {
    /// Create an interpreter with the default built-ins: `cd`, `exit`, `history`.
    fn default() -> Self {
        use crate::builtin::*;
        Self::new(vec![
            Box::new(Factory::<Cd>::default()),
            Box::new(Factory::<Exit>::default()),
            Box::new(Factory::<ShowHistory>::default()),
        ])
    }
}

fn is_comment_or_blank(line: &str) -> bool {
    let line = line.trim_start();
    line.is_empty() || line.starts_with('#')
}
