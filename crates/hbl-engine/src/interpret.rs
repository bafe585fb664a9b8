//! Tree-walking evaluator, synchronous and asynchronous.

use futures_util::future::{ready, BoxFuture, FutureExt};
use hbl_core::error::Result;
use hbl_core::ir::{split_args, Arguments, Expr};
use hbl_core::value::Value;
use indexmap::IndexMap;

use crate::scope::Scope;

pub fn run(expr: &Expr, scope: &Scope<'_>) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Var(path) => Ok(path.resolve(scope.context)),
        Expr::Hash(_, inner) => run(inner, scope),
        Expr::Op(call) => scope
            .engine
            .operation(&call.name)?
            .interpret(&call.args, scope),
    }
}

/// Async twin of [`run`]. Whether a whole template needs awaiting is decided
/// once when it is built; here only calls of synchronous operations over
/// plain values are short-cut.
pub fn run_async<'a>(expr: &'a Expr, scope: &'a Scope<'a>) -> BoxFuture<'a, Result<Value>> {
    match expr {
        Expr::Op(call) => match scope.engine.operation(&call.name) {
            Ok(op) if op.is_sync() && call.args.iter().all(Expr::is_leaf) => {
                ready(op.interpret(&call.args, scope)).boxed()
            }
            Ok(op) => async move { op.interpret_async(&call.args, scope).await }.boxed(),
            Err(err) => ready(Err(err)).boxed(),
        },
        Expr::Hash(_, inner) => run_async(inner, scope),
        _ => ready(run(expr, scope)).boxed(),
    }
}

/// Evaluates arguments in source order, named ones included.
pub fn eval_arguments(args: &[Expr], scope: &Scope<'_>) -> Result<Arguments> {
    let mut evaluated = Arguments::default();
    for arg in args {
        match arg {
            Expr::Hash(name, inner) => {
                let value = run(inner, scope)?;
                evaluated.hash.insert(name.to_string(), value);
            }
            other => evaluated.positional.push(run(other, scope)?),
        }
    }
    Ok(evaluated)
}

pub async fn eval_arguments_async(args: &[Expr], scope: &Scope<'_>) -> Result<Arguments> {
    let mut evaluated = Arguments::default();
    for arg in args {
        match arg {
            Expr::Hash(name, inner) => {
                let value = run_async(inner, scope).await?;
                evaluated.hash.insert(name.to_string(), value);
            }
            other => evaluated.positional.push(run_async(other, scope).await?),
        }
    }
    Ok(evaluated)
}

/// Evaluates the named arguments (except `as`) into an object.
pub fn eval_hash(args: &[Expr], scope: &Scope<'_>) -> Result<Option<Value>> {
    let split = split_args(args);
    if !split.has_hash_values() {
        return Ok(None);
    }
    let mut object = IndexMap::new();
    for (name, arg) in split.hash_values() {
        object.insert(name.to_string(), run(arg, scope)?);
    }
    Ok(Some(Value::from(object)))
}

pub async fn eval_hash_async(args: &[Expr], scope: &Scope<'_>) -> Result<Option<Value>> {
    let split = split_args(args);
    if !split.has_hash_values() {
        return Ok(None);
    }
    let mut object = IndexMap::new();
    for (name, arg) in split.hash_values() {
        object.insert(name.to_string(), run_async(arg, scope).await?);
    }
    Ok(Some(Value::from(object)))
}
