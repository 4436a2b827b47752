use crate::command::{CommandDescriptor, OutputRedirect, Pipeline};
use crate::lexer::{self, Token};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while turning a command line into a [`Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A stage had no program name, e.g. `| wc`, `ls |` or `< in`.
    #[error("empty command")]
    EmptyCommand,
    /// A redirection operator was not followed by a file name.
    #[error("missing file name after `{0}`")]
    MissingRedirectTarget(Token),
    /// `&` appeared anywhere but at the very end of the line.
    #[error("`&` is only allowed at the end of a line")]
    MisplacedBackground,
    /// A token that cannot appear inside a single stage.
    #[error("unexpected `{0}`")]
    UnexpectedToken(Token),
}

struct StageBuilder<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> StageBuilder<'t> {
    fn from(tokens: &'t [Token]) -> Self {
        StageBuilder { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Parse a stage: word+ (redirect word)*
    fn build_stage(mut self) -> Result<CommandDescriptor, BuildError> {
        let mut argv = Vec::new();

        // Program and arguments run up to the first operator.
        while let Some(Token::Word(word)) = self.peek() {
            argv.push(word.clone());
            self.consume();
        }

        if argv.is_empty() {
            return match self.peek() {
                Some(Token::Background) => Err(BuildError::MisplacedBackground),
                _ => Err(BuildError::EmptyCommand),
            };
        }

        let mut stage = CommandDescriptor::new(argv);

        while let Some(token) = self.consume() {
            match token {
                Token::RedirectIn => {
                    stage.input = Some(self.parse_target(token)?);
                }
                Token::RedirectOut | Token::RedirectAppend => {
                    stage.output = Some(OutputRedirect {
                        path: self.parse_target(token)?,
                        append: *token == Token::RedirectAppend,
                    });
                }
                Token::Word(word) => {
                    // Words after a redirection are not part of argv.
                    tracing::warn!(word = word.as_str(), "ignoring word after redirection");
                }
                Token::Background => return Err(BuildError::MisplacedBackground),
                Token::Pipe => return Err(BuildError::UnexpectedToken(token.clone())),
            }
        }

        Ok(stage)
    }

    /// Parse the file name following a redirection operator.
    fn parse_target(&mut self, operator: &Token) -> Result<PathBuf, BuildError> {
        match self.consume() {
            Some(Token::Word(path)) => Ok(PathBuf::from(path)),
            _ => Err(BuildError::MissingRedirectTarget(operator.clone())),
        }
    }
}

/// Build one pipeline stage from the tokens between two pipes.
pub fn build_stage(tokens: &[Token]) -> Result<CommandDescriptor, BuildError> {
    StageBuilder::from(tokens).build_stage()
}

/// Split a finished command line into a [`Pipeline`].
///
/// A trailing `&` marks the pipeline as background and is not passed to any
/// program. Each `|` ends the current stage and starts the next one, so the
/// result always has one stage more than the line has pipes.
pub fn build(line: &str) -> Result<Pipeline, BuildError> {
    let mut tokens = lexer::split_into_tokens(line);

    let background = tokens.last() == Some(&Token::Background);
    if background {
        tokens.pop();
    }

    let stages = tokens
        .split(|token| *token == Token::Pipe)
        .map(build_stage)
        .collect::<Result<Vec<_>, _>>()?;

    tracing::debug!(stages = stages.len(), background, "pipeline built");
    Ok(Pipeline { stages, background })
}
