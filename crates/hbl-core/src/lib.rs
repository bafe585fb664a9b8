//! Core data model for the handlebars-logic template engine.
//!
//! Holds everything the execution engine consumes as plain data: the value
//! model, the template IR, errors, the whitespace preprocessor and the
//! reference parser that turns template text into IR.

#[macro_use]
pub mod macros;

pub mod collections;
pub mod config;
pub mod error;
pub mod ir;
pub mod parser;
pub mod preprocess;
pub mod span;
pub mod value;

// Re-export commonly used items for convenience
pub use tracing;

pub use ir::{Expr, OpCall, Path};
pub use parser::{parse, CompileOptions};
pub use preprocess::preprocess;
pub use value::Value;

// Alias for error types
pub type Error = crate::error::Error;
pub type Result<T> = crate::error::Result<T>;
