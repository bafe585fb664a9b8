//! `{{#with value key=val as |name|}}`: runs its body against a new context.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use hbl_core::bail;
use hbl_core::error::Result;
use hbl_core::ir::{split_args, Expr, SplitArgs};
use hbl_core::value::Value;

use super::param_names;
use crate::compile::{async_fn, sync_fn, Body, BuildCtx, Fragment, Lazy, Shape};
use crate::engine::Engine;
use crate::interpret::{eval_hash, eval_hash_async};
use crate::ops::Operation;
use crate::scope::Scope;

pub(super) fn install(engine: &Engine) {
    engine.add_operation("with", With);
}

fn parts<'a>(split: &SplitArgs<'a>) -> Result<(Option<&'a Expr>, &'a Expr)> {
    match split.positional.as_slice() {
        [body] => Ok((None, *body)),
        [value, body] => Ok((Some(*value), *body)),
        _ => bail!("{{{{#with}}}} takes at most one value and a body"),
    }
}

/// The body's context, and whether it replaces the caller's context behind a
/// new frame. Positional keys win over named ones.
fn new_context(hash: Option<Value>, value: Option<Value>) -> (Value, bool) {
    match (hash, value) {
        (Some(hash), Some(Value::Object(fields))) => {
            let mut merged = hash.as_object().cloned().unwrap_or_default();
            merged.extend(fields.iter().map(|(key, value)| (key.clone(), value.clone())));
            (Value::from(merged), true)
        }
        (Some(hash), _) => (hash, true),
        (None, None) => (Value::empty_object(), true),
        (None, Some(value)) => (value, false),
    }
}

fn bindings(params: &[Arc<str>], context: &Value) -> Vec<(Arc<str>, Value)> {
    params
        .first()
        .map(|name| vec![(name.clone(), context.clone())])
        .unwrap_or_default()
}

/// Runs `body` against `context`. A frame is pushed when the context replaces
/// the caller's, or when a block parameter has to be bound.
fn enter(
    body: Body<'_>,
    context: &Value,
    replaces: bool,
    params: &[Arc<str>],
    scope: &Scope<'_>,
) -> Result<Value> {
    if replaces || !params.is_empty() {
        let frame = scope.push(bindings(params, context), None);
        body.eval(&scope.enter(context, &frame))
    } else {
        body.eval(&scope.rebase(context, None))
    }
}

async fn enter_async(
    body: Body<'_>,
    context: &Value,
    replaces: bool,
    params: &[Arc<str>],
    scope: &Scope<'_>,
) -> Result<Value> {
    if replaces || !params.is_empty() {
        let frame = scope.push(bindings(params, context), None);
        let inner = scope.enter(context, &frame);
        body.eval_async(&inner).await
    } else {
        let inner = scope.rebase(context, None);
        body.eval_async(&inner).await
    }
}

struct With;

impl Operation for With {
    fn interpret(&self, args: &[Expr], scope: &Scope<'_>) -> Result<Value> {
        let split = split_args(args);
        let (value, body) = parts(&split)?;
        let hash = eval_hash(args, scope)?;
        let value = value.map(|value| value.eval(scope)).transpose()?;
        let (context, replaces) = new_context(hash, value);
        enter(
            Body::Interpreted(body),
            &context,
            replaces,
            &param_names(&split),
            scope,
        )
    }

    fn interpret_async<'a>(
        &'a self,
        args: &'a [Expr],
        scope: &'a Scope<'a>,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            let split = split_args(args);
            let (value, body) = parts(&split)?;
            let hash = eval_hash_async(args, scope).await?;
            let value = match value {
                Some(value) => Some(value.eval_async(scope).await?),
                None => None,
            };
            let (context, replaces) = new_context(hash, value);
            let params = param_names(&split);
            enter_async(Body::Interpreted(body), &context, replaces, &params, scope).await
        }
        .boxed()
    }

    fn synthesize(&self, args: &[Expr], build: &BuildCtx<'_>) -> Result<Fragment> {
        let split = split_args(args);
        let (value, body) = parts(&split)?;
        let compiled = CompiledWith {
            hash: split
                .hash_values()
                .map(|(name, expr)| Ok((name.to_string(), build.synthesize(expr)?)))
                .collect::<Result<Vec<_>>>()?,
            value: value.map(|value| build.synthesize(value)).transpose()?,
            body: build.synthesize(body)?,
            params: param_names(&split),
        };
        Ok(compiled.into_fragment())
    }

    fn is_deterministic(&self, args: &[Expr], build: &BuildCtx<'_>) -> bool {
        let split = split_args(args);
        let Ok((value, body)) = parts(&split) else {
            return false;
        };
        split.hash_values().all(|(_, arg)| build.is_deterministic(arg))
            && value.map_or(true, |value| build.is_deterministic(value))
            && build.iterating().is_deterministic(body)
    }
}

struct CompiledWith {
    hash: Vec<(String, Fragment)>,
    value: Option<Fragment>,
    body: Fragment,
    params: Vec<Arc<str>>,
}

impl CompiledWith {
    fn run(&self, scope: &Scope<'_>) -> Result<Value> {
        let hash = if self.hash.is_empty() {
            None
        } else {
            let mut object = hbl_core::value::Object::with_capacity(self.hash.len());
            for (name, fragment) in &self.hash {
                object.insert(name.clone(), fragment.call(scope)?);
            }
            Some(Value::from(object))
        };
        let value = self.value.as_ref().map(|value| value.call(scope)).transpose()?;
        let (context, replaces) = new_context(hash, value);
        enter(
            Body::Compiled(&self.body),
            &context,
            replaces && self.body.touches_ancestors(),
            &self.params,
            scope,
        )
    }

    async fn run_async(&self, scope: &Scope<'_>) -> Result<Value> {
        let hash = if self.hash.is_empty() {
            None
        } else {
            let mut object = hbl_core::value::Object::with_capacity(self.hash.len());
            for (name, fragment) in &self.hash {
                object.insert(name.clone(), fragment.call_async(scope).await?);
            }
            Some(Value::from(object))
        };
        let value = match &self.value {
            Some(value) => Some(value.call_async(scope).await?),
            None => None,
        };
        let (context, replaces) = new_context(hash, value);
        enter_async(
            Body::Compiled(&self.body),
            &context,
            replaces && self.body.touches_ancestors(),
            &self.params,
            scope,
        )
        .await
    }

    fn into_fragment(self) -> Fragment {
        let fragments = self
            .hash
            .iter()
            .map(|(_, fragment)| fragment)
            .chain(self.value.as_ref())
            .chain([&self.body]);
        let shape = Shape::of(fragments.clone());
        let touches = fragments.into_iter().any(Fragment::touches_ancestors);
        let compiled = Arc::new(self);
        let sync = {
            let compiled = compiled.clone();
            sync_fn(move |scope| compiled.run(scope))
        };
        let asynchronous = async_fn(move |scope| {
            let compiled = compiled.clone();
            async move { compiled.run_async(scope).await }.boxed()
        });
        Fragment::compose(shape, touches, sync, asynchronous)
    }
}
