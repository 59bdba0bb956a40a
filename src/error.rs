use std::fmt;
use thiserror::Error;

/// Everything that can go wrong while compiling or rendering a template.
///
/// Compile-time variants (`Lex`, `BlockMismatch`, `Syntax`) are always
/// raised by `compile`, never on first render.
#[derive(Debug, Error)]
pub enum Error {
    #[error("lex error at {line}:{column}: {message}")]
    Lex {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("block mismatch: {message}")]
    BlockMismatch { message: String },

    #[error("syntax error: {message}")]
    Syntax { message: String },

    #[error("helper `{name}` is not registered")]
    MissingHelper { name: String },

    #[error("partial `{name}` is not registered")]
    MissingPartial { name: String },

    #[error("helper `{name}` failed: {message}")]
    Helper { name: String, message: String },

    #[error("failed to read template: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to convert render data: {0}")]
    Data(#[from] serde_json::Error),

    #[error("failed to write output")]
    Write(#[from] fmt::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Error raised from inside a helper body.
    pub fn helper(name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Helper {
            name: name.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn lex(source: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = position(source, offset);
        Self::Lex {
            line,
            column,
            message: message.into(),
        }
    }

    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        Self::BlockMismatch {
            message: message.into(),
        }
    }

    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
        }
    }
}

/// 1-based line and column of a byte offset.
fn position(source: &str, offset: usize) -> (usize, usize) {
    let before = &source[..offset.min(source.len())];
    let line = before.matches('\n').count() + 1;
    let column = match before.rfind('\n') {
        Some(nl) => before[nl + 1..].chars().count() + 1,
        None => before.chars().count() + 1,
    };
    (line, column)
}
