use std::fmt;
use std::ops::Range;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("variable {name} is a {got}, expected a {expected}")]
    WrongVariableKind {
        name: String,
        expected: &'static str,
        got: &'static str,
    },
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("invalid number: '{0}'")]
    InvalidNumber(String),
    #[error("invalid expression: {0}")]
    InvalidExpression(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("crypto error: {0}")]
    Crypto(String),
    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Custom(String),
}

impl RuntimeError {
    pub fn custom(message: impl Into<String>) -> Self {
        RuntimeError::Custom(message.into())
    }
}

/// A runtime error enriched with the block that raised it.
#[derive(Debug)]
pub struct DiagnosticError {
    pub error: RuntimeError,
    /// Position of the failing block in its config.
    pub block_index: Option<usize>,
    pub label: Option<String>,
    /// Byte range of the failing block in its source, when it came from text.
    pub span: Option<Range<usize>>,
    pub source_id: usize,
}

impl DiagnosticError {
    pub fn at_block(error: RuntimeError, index: usize, label: &str, span: Range<usize>, source_id: usize) -> Self {
        DiagnosticError {
            error,
            block_index: Some(index),
            label: Some(label.to_string()),
            span: (!span.is_empty()).then_some(span),
            source_id,
        }
    }
}

impl From<RuntimeError> for DiagnosticError {
    fn from(error: RuntimeError) -> Self {
        DiagnosticError {
            error,
            block_index: None,
            label: None,
            span: None,
            source_id: 0,
        }
    }
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.block_index, &self.label) {
            (Some(index), Some(label)) => write!(f, "block {} ({}): {}", index, label, self.error),
            _ => self.error.fmt(f),
        }
    }
}

impl std::error::Error for DiagnosticError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
