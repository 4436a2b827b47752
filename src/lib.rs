//! A small interactive Unix shell.
//!
//! This crate provides the pieces of `twig`: a raw-terminal line editor with
//! history scroll-back and first-character auto-complete, a tokenizer and
//! pipeline builder for lines such as `ls -l | grep foo > out &`, and an
//! executor that runs the pipeline with `fork`, `pipe`, `dup2` and `exec`.
//!
//! The main entry point is [`Interpreter`], which records every submitted line
//! in its history and runs it, either interactively ([`Interpreter::repl`]) or
//! from a script ([`Interpreter::run_script`]). The public modules expose the
//! building blocks, e.g. [`parser::build`] and [`executor::execute`], for
//! driving them separately.

pub mod autocomplete;
pub mod buffer;
mod builtin;
pub mod command;
pub mod editor;
pub mod env;
pub mod executor;
pub mod history;
mod interpreter;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod terminal;

/// Just a convenient re-export of the shell driver.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;
