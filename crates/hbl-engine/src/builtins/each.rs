//! `each` and the implicit Mustache section `{{#name}}...{{/name}}`.
//!
//! Both share one loop driver over [`Body`], so the interpreted and compiled
//! strategies iterate identically. The interpreter pushes a frame for every
//! iteration; compiled loops skip the frame when the body never reads
//! ancestors and take unrolled branches for short sequences.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use hbl_core::config;
use hbl_core::error::Result;
use hbl_core::ir::{split_args, Expr};
use hbl_core::value::{Object, Value};

use super::{block_parts, otherwise, otherwise_async, param_names};
use crate::compile::{async_fn, sync_fn, Body, BuildCtx, Fragment, Lazy, Shape};
use crate::engine::Engine;
use crate::ops::Operation;
use crate::scope::{block_bindings, Position, Scope};

pub(super) fn install(engine: &Engine) {
    engine.add_operation("each", Each);
    engine.add_operation("section", Section);
}

/// The iterable view of a value. Strings iterate their characters; other
/// scalars iterate nothing.
enum Iterable<'v> {
    Sequence(&'v [Value]),
    Chars(Vec<Value>),
    Entries(&'v [(Value, Value)]),
    Keyed(&'v Object),
    Empty,
}

impl<'v> Iterable<'v> {
    fn of(value: &'v Value) -> Self {
        match value {
            Value::Array(items) => Iterable::Sequence(items),
            Value::String(text) => {
                Iterable::Chars(text.chars().map(|c| Value::from(c.to_string())).collect())
            }
            Value::Map(entries) => Iterable::Entries(entries),
            Value::Object(object) => Iterable::Keyed(object),
            _ => Iterable::Empty,
        }
    }

    fn count(&self) -> usize {
        match self {
            Iterable::Sequence(items) => items.len(),
            Iterable::Chars(chars) => chars.len(),
            Iterable::Entries(entries) => entries.len(),
            Iterable::Keyed(object) => object.len(),
            Iterable::Empty => 0,
        }
    }

    /// The `length` a frame exposes; keyed and character sources have none.
    fn length(&self) -> Option<usize> {
        match self {
            Iterable::Sequence(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Position and item at `ordinal`.
    fn entry(&self, ordinal: usize) -> (Position, &Value) {
        let length = self.length();
        let (index, item) = match self {
            Iterable::Sequence(items) => (Value::from(ordinal), &items[ordinal]),
            Iterable::Chars(chars) => (Value::from(ordinal), &chars[ordinal]),
            Iterable::Entries(entries) => {
                let (key, value) = &entries[ordinal];
                (key.clone(), value)
            }
            Iterable::Keyed(object) => match object.get_index(ordinal) {
                Some((key, value)) => (Value::from(key.as_str()), value),
                None => (Value::Null, &hbl_core::value::NULL),
            },
            Iterable::Empty => (Value::Null, &hbl_core::value::NULL),
        };
        (Position::new(index, length), item)
    }
}

/// Per-iteration state shared by the loop drivers.
#[derive(Clone, Copy)]
struct Loop<'b, 'p> {
    body: Body<'b>,
    params: &'p [Arc<str>],
    framed: bool,
}

impl Loop<'_, '_> {
    fn step(&self, scope: &Scope<'_>, item: &Value, position: Position) -> Result<Value> {
        if self.framed {
            let frame = scope.push(
                block_bindings(self.params, item, &position.index),
                Some(position),
            );
            self.body.eval(&scope.enter(item, &frame))
        } else {
            self.body.eval(&scope.rebase(item, Some(&position)))
        }
    }

    /// Renders every iteration, or `None` when there was nothing to iterate.
    fn run(&self, source: &Value, scope: &Scope<'_>) -> Result<Option<String>> {
        let items = Iterable::of(source);
        let count = items.count();
        if count == 0 {
            return Ok(None);
        }
        let mut out = String::new();
        for ordinal in 0..count {
            let (position, item) = items.entry(ordinal);
            self.step(scope, item, position)?.write_output(&mut out);
        }
        Ok(Some(out))
    }

    /// Iterations are awaited one after another, in order.
    async fn run_async(&self, source: &Value, scope: &Scope<'_>) -> Result<Option<String>> {
        let items = Iterable::of(source);
        let count = items.count();
        if count == 0 {
            return Ok(None);
        }
        let mut out = String::new();
        for ordinal in 0..count {
            let (position, item) = items.entry(ordinal);
            let value = if self.framed {
                let frame = scope.push(
                    block_bindings(self.params, item, &position.index),
                    Some(position),
                );
                let inner = scope.enter(item, &frame);
                self.body.eval_async(&inner).await?
            } else {
                let inner = scope.rebase(item, Some(&position));
                self.body.eval_async(&inner).await?
            };
            value.write_output(&mut out);
        }
        Ok(Some(out))
    }

    /// Short sequences without frames take a branch per length.
    fn run_unrolled(&self, source: &Value, scope: &Scope<'_>) -> Result<Option<String>> {
        let Value::Array(items) = source else {
            return self.run(source, scope);
        };
        let length = items.len();
        let at = |ordinal: usize, item: &Value| {
            let position = Position::new(Value::from(ordinal), Some(length));
            self.body.eval(&scope.rebase(item, Some(&position)))
        };
        match items.as_slice() {
            [] => Ok(None),
            [a] => Ok(Some(at(0, a)?.to_output())),
            [a, b] => Ok(Some(joined([at(0, a)?, at(1, b)?]))),
            [a, b, c] => Ok(Some(joined([at(0, a)?, at(1, b)?, at(2, c)?]))),
            [a, b, c, d] => Ok(Some(joined([at(0, a)?, at(1, b)?, at(2, c)?, at(3, d)?]))),
            _ => self.run(source, scope),
        }
    }
}

fn joined<const N: usize>(values: [Value; N]) -> String {
    let mut out = String::new();
    for value in &values {
        value.write_output(&mut out);
    }
    out
}

fn rendered(out: Option<String>) -> Option<Value> {
    out.map(Value::from)
}

struct Each;

impl Operation for Each {
    fn interpret(&self, args: &[Expr], scope: &Scope<'_>) -> Result<Value> {
        let split = split_args(args);
        let (selector, body, branch) = block_parts("each", &split)?;
        let params = param_names(&split);
        let source = selector.eval(scope)?;
        let looped = Loop {
            body: Body::Interpreted(body),
            params: &params,
            framed: true,
        };
        if source.truthy() {
            if let Some(value) = rendered(looped.run(&source, scope)?) {
                return Ok(value);
            }
        }
        otherwise(branch, scope)
    }

    fn interpret_async<'a>(
        &'a self,
        args: &'a [Expr],
        scope: &'a Scope<'a>,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            let split = split_args(args);
            let (selector, body, branch) = block_parts("each", &split)?;
            let params = param_names(&split);
            let source = selector.eval_async(scope).await?;
            let looped = Loop {
                body: Body::Interpreted(body),
                params: &params,
                framed: true,
            };
            if source.truthy() {
                if let Some(value) = rendered(looped.run_async(&source, scope).await?) {
                    return Ok(value);
                }
            }
            otherwise_async(branch, scope).await
        }
        .boxed()
    }

    fn synthesize(&self, args: &[Expr], build: &BuildCtx<'_>) -> Result<Fragment> {
        let split = split_args(args);
        let (selector, body, branch) = block_parts("each", &split)?;
        let compiled = CompiledLoop {
            selector: build.synthesize(selector)?,
            body: build.synthesize(body)?,
            branch: branch.map(|branch| build.synthesize(branch)).transpose()?,
            params: param_names(&split),
            whole_values: false,
        };
        Ok(compiled.into_fragment())
    }

    fn is_deterministic(&self, args: &[Expr], build: &BuildCtx<'_>) -> bool {
        loop_is_deterministic(args, build)
    }
}

/// A deterministic selector feeding a body that is deterministic once its
/// context is.
fn loop_is_deterministic(args: &[Expr], build: &BuildCtx<'_>) -> bool {
    let split = split_args(args);
    let Ok((selector, body, branch)) = block_parts("each", &split) else {
        return false;
    };
    build.is_deterministic(selector)
        && split.hash_values().all(|(_, arg)| build.is_deterministic(arg))
        && build.iterating().is_deterministic(body)
        && branch.map_or(true, |branch| build.is_deterministic(branch))
}

/// `{{#name}}body{{else}}...{{/name}}` where `name` is not an operation:
/// sequences iterate, `true` renders the body in place, any other truthy value
/// becomes the body's context.
struct Section;

impl Section {
    fn step(source: &Value, body: Body<'_>, scope: &Scope<'_>) -> Result<Value> {
        match source {
            Value::Bool(true) => body.eval(scope),
            _ => {
                let frame = scope.push(Vec::new(), None);
                body.eval(&scope.enter(source, &frame))
            }
        }
    }

    async fn step_async(source: &Value, body: Body<'_>, scope: &Scope<'_>) -> Result<Value> {
        match source {
            Value::Bool(true) => body.eval_async(scope).await,
            _ => {
                let frame = scope.push(Vec::new(), None);
                let inner = scope.enter(source, &frame);
                body.eval_async(&inner).await
            }
        }
    }
}

impl Operation for Section {
    fn interpret(&self, args: &[Expr], scope: &Scope<'_>) -> Result<Value> {
        let split = split_args(args);
        let (selector, body, branch) = block_parts("section", &split)?;
        let source = selector.eval(scope)?;
        if !source.truthy() {
            return otherwise(branch, scope);
        }
        if let Value::Array(_) = source {
            let looped = Loop {
                body: Body::Interpreted(body),
                params: &[],
                framed: true,
            };
            return match rendered(looped.run(&source, scope)?) {
                Some(value) => Ok(value),
                None => otherwise(branch, scope),
            };
        }
        Self::step(&source, Body::Interpreted(body), scope)
    }

    fn interpret_async<'a>(
        &'a self,
        args: &'a [Expr],
        scope: &'a Scope<'a>,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            let split = split_args(args);
            let (selector, body, branch) = block_parts("section", &split)?;
            let source = selector.eval_async(scope).await?;
            if !source.truthy() {
                return otherwise_async(branch, scope).await;
            }
            if let Value::Array(_) = source {
                let looped = Loop {
                    body: Body::Interpreted(body),
                    params: &[],
                    framed: true,
                };
                return match rendered(looped.run_async(&source, scope).await?) {
                    Some(value) => Ok(value),
                    None => otherwise_async(branch, scope).await,
                };
            }
            Self::step_async(&source, Body::Interpreted(body), scope).await
        }
        .boxed()
    }

    fn synthesize(&self, args: &[Expr], build: &BuildCtx<'_>) -> Result<Fragment> {
        let split = split_args(args);
        let (selector, body, branch) = block_parts("section", &split)?;
        let compiled = CompiledLoop {
            selector: build.synthesize(selector)?,
            body: build.synthesize(body)?,
            branch: branch.map(|branch| build.synthesize(branch)).transpose()?,
            params: Vec::new(),
            whole_values: true,
        };
        Ok(compiled.into_fragment())
    }

    fn is_deterministic(&self, args: &[Expr], build: &BuildCtx<'_>) -> bool {
        loop_is_deterministic(args, build)
    }
}

/// Compiled form shared by `each` and `section`.
struct CompiledLoop {
    selector: Fragment,
    body: Fragment,
    branch: Option<Fragment>,
    params: Vec<Arc<str>>,
    /// Non-sequence values render the body once instead of iterating.
    whole_values: bool,
}

impl CompiledLoop {
    fn looped(&self) -> Loop<'_, '_> {
        Loop {
            body: Body::Compiled(&self.body),
            params: &self.params,
            framed: self.body.touches_ancestors(),
        }
    }

    fn run(&self, scope: &Scope<'_>) -> Result<Value> {
        let source = self.selector.call(scope)?;
        if !source.truthy() {
            return otherwise(self.branch.as_ref(), scope);
        }
        if self.whole_values && !matches!(source, Value::Array(_)) {
            return Section::step(&source, Body::Compiled(&self.body), scope);
        }
        let looped = self.looped();
        let out = if looped.framed || !config::loop_unrolling() {
            looped.run(&source, scope)?
        } else {
            looped.run_unrolled(&source, scope)?
        };
        match rendered(out) {
            Some(value) => Ok(value),
            None => otherwise(self.branch.as_ref(), scope),
        }
    }

    async fn run_async(&self, scope: &Scope<'_>) -> Result<Value> {
        let source = self.selector.call_async(scope).await?;
        if !source.truthy() {
            return otherwise_async(self.branch.as_ref(), scope).await;
        }
        if self.whole_values && !matches!(source, Value::Array(_)) {
            return Section::step_async(&source, Body::Compiled(&self.body), scope).await;
        }
        match rendered(self.looped().run_async(&source, scope).await?) {
            Some(value) => Ok(value),
            None => otherwise_async(self.branch.as_ref(), scope).await,
        }
    }

    fn into_fragment(self) -> Fragment {
        let parts = [&self.selector, &self.body];
        let shape = Shape::of(parts.into_iter().chain(self.branch.as_ref()));
        let touches = self.selector.touches_ancestors()
            || self.body.touches_ancestors()
            || self.branch.as_ref().is_some_and(Fragment::touches_ancestors);
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
