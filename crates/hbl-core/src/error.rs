use crate::span::Span;
use miette::{Diagnostic, SourceSpan};
use std::result;
use thiserror::Error;

pub use eyre;

/// Malformed template text, carrying the offending source for rendering.
#[derive(Error, Debug, Diagnostic)]
#[error("Syntax error: {message}")]
#[diagnostic(code(hbl::syntax))]
pub struct SyntaxError {
    pub message: String,
    #[source_code]
    pub source_code: String,
    #[label("here")]
    pub at: SourceSpan,
    pub span: Span,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, source: &str, span: Span) -> Self {
        Self {
            message: message.into(),
            source_code: source.to_string(),
            at: span.into(),
            span,
        }
    }

    /// 1-based (line, column) of the error in the preprocessed text.
    pub fn line_col(&self) -> (usize, usize) {
        self.span.line_col(&self.source_code)
    }
}

#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("Unknown operation: {0}")]
    #[diagnostic(code(hbl::unknown_operation))]
    UnknownOperation(String),
    #[error("Template {0} not found")]
    #[diagnostic(code(hbl::template_not_found))]
    TemplateNotFound(String),
    #[error("Operation `{0}` has no synchronous evaluator")]
    #[diagnostic(
        code(hbl::async_operation),
        help("build the template with an async builder and await the result")
    )]
    AsyncOperation(String),
    #[error("Type error: {0}")]
    #[diagnostic(code(hbl::type_error))]
    Type(String),
    #[error("Generic error: {0}")]
    Generic(eyre::Error),
}

pub type Result<T> = result::Result<T, Error>;

impl Error {
    pub fn syntax(message: impl Into<String>, source: &str, span: Span) -> Self {
        Error::Syntax(SyntaxError::new(message, source, span))
    }

    pub fn is_template_not_found(&self) -> bool {
        matches!(self, Error::TemplateNotFound(_))
    }
}

// Convert from eyre::Report to our Error type
impl From<eyre::Report> for Error {
    fn from(err: eyre::Report) -> Self {
        Error::Generic(err)
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Generic(eyre::Report::msg(s))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Generic(e.into())
    }
}
