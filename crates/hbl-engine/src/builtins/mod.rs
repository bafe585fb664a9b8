//! Operations every engine starts with.
//!
//! Control constructs (`if`, `each`, `with`, `partial`, ...) receive their
//! arguments unevaluated and implement [`crate::ops::Operation`] directly;
//! everything else is a [`crate::ops::Method`] over evaluated arguments.

mod arithmetic;
mod control;
mod data;
mod each;
mod partial;
mod position;
mod with;

use std::sync::Arc;

use hbl_core::bail;
use hbl_core::error::Result;
use hbl_core::ir::{Expr, SplitArgs};
use hbl_core::value::Value;

use crate::compile::Lazy;
use crate::engine::Engine;
use crate::scope::Scope;

pub use control::escape_html;

pub fn install(engine: &Engine) {
    control::install(engine);
    each::install(engine);
    with::install(engine);
    partial::install(engine);
    position::install(engine);
    data::install(engine);
    arithmetic::install(engine);
    hbl_core::trace!("installed built-in operations");
}

/// Positional parts of a block: `(selector, body, else)`.
pub(crate) fn block_parts<'a>(
    name: &str,
    split: &SplitArgs<'a>,
) -> Result<(&'a Expr, &'a Expr, Option<&'a Expr>)> {
    match split.positional.as_slice() {
        [selector, body] => Ok((*selector, *body, None)),
        [selector, body, otherwise] => Ok((*selector, *body, Some(*otherwise))),
        _ => bail!(
            "{{{{#{}}}}} takes one value and a body, got {} positional arguments",
            name,
            split.positional.len()
        ),
    }
}

pub(crate) fn param_names(split: &SplitArgs<'_>) -> Vec<Arc<str>> {
    split
        .block_params()
        .into_iter()
        .map(Arc::from)
        .collect()
}

/// The else branch, or the empty string when there is none.
pub(crate) fn otherwise<E: Lazy>(branch: Option<E>, scope: &Scope<'_>) -> Result<Value> {
    match branch {
        Some(branch) => branch.eval(scope),
        None => Ok(Value::from("")),
    }
}

pub(crate) async fn otherwise_async<E: Lazy>(branch: Option<E>, scope: &Scope<'_>) -> Result<Value> {
    match branch {
        Some(branch) => branch.eval_async(scope).await,
        None => Ok(Value::from("")),
    }
}
