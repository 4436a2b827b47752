use anyhow::Context;
use argh::FromArgs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use twig_shell::{Interpreter, logging, terminal};

#[derive(FromArgs)]
/// A small interactive shell with history and pipelines.
struct Args {
    #[argh(positional)]
    /// run the commands in this file instead of reading the terminal.
    script: Option<PathBuf>,

    #[argh(option)]
    /// write diagnostic logs to this file.
    log_file: Option<PathBuf>,

    #[argh(switch)]
    /// start with auto-complete armed. Ctrl-C toggles it at any time.
    autocomplete: bool,
}

fn run(args: Args) -> anyhow::Result<()> {
    if let Some(path) = &args.log_file {
        logging::init_global(path)?;
    }

    let mut shell = Interpreter::default();

    if let Some(script) = &args.script {
        return shell.run_script(script);
    }

    if !terminal::stdin_is_terminal() {
        return shell.run_batch(io::stdin().lock());
    }

    shell.autocomplete().set_armed(args.autocomplete);
    shell
        .autocomplete()
        .toggle_on_interrupt()
        .context("cannot install the interrupt handler")?;
    tracing::info!("interactive session started");
    shell.repl()
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("twig: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
