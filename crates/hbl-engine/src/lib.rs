//! Execution engine for handlebars-logic templates.
//!
//! Templates are parsed into [`hbl_core::Expr`] trees and then either walked
//! directly ([`Engine::interpreted`]) or compiled once into closures
//! ([`Engine::compile`]). Both strategies come in a synchronous and an
//! asynchronous flavour and render identical output.
//!
//! ```
//! use hbl_engine::{CompileOptions, Engine, Value};
//!
//! let engine = Engine::isolated();
//! let template = engine.compile("Hi {{name}}!", &CompileOptions::default())?;
//! let data = Value::from_json_str(r#"{"name": "Bob"}"#)?;
//! assert_eq!(template.render(&data)?, "Hi Bob!");
//! # Ok::<(), hbl_engine::Error>(())
//! ```

pub mod builtins;
pub mod compile;
pub mod engine;
pub mod interpret;
pub mod ops;
pub mod registry;
pub mod scope;

pub use engine::{AsyncTemplate, Engine, Template};
pub use hbl_core::error::{Error, Result};
pub use hbl_core::ir::{Arguments, Expr};
pub use hbl_core::parser::CompileOptions;
pub use hbl_core::value::Value;
pub use ops::{Method, Operation};
pub use registry::TemplateRegistry;
