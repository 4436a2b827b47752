//! A module implementing lexical analysis (tokenization) of a finished command line.
//!
//! Words are separated by whitespace only; there is no quoting. Operator
//! tokens are recognized only when they stand alone, so `a>b` is a single word.

use std::fmt;

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A program name, argument or redirection target.
    Word(String),
    /// The pipe operator, `|`.
    Pipe,
    /// Input redirection symbol, `<`.
    RedirectIn,
    /// Output redirection symbol, `>`.
    RedirectOut,
    /// Appending output redirection symbol, `>>`.
    RedirectAppend,
    /// Background marker, `&`.
    Background,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Word(w) => f.write_str(w),
            Token::Pipe => f.write_str("|"),
            Token::RedirectIn => f.write_str("<"),
            Token::RedirectOut => f.write_str(">"),
            Token::RedirectAppend => f.write_str(">>"),
            Token::Background => f.write_str("&"),
        }
    }
}

/// Split a line into tokens at whitespace.
pub fn split_into_tokens(line: &str) -> Vec<Token> {
    line.split_whitespace()
        .map(|word| match word {
            "|" => Token::Pipe,
            "<" => Token::RedirectIn,
            ">" => Token::RedirectOut,
            ">>" => Token::RedirectAppend,
            "&" => Token::Background,
            w => Token::Word(w.to_string()),
        })
        .collect()
}
