//! `{{> name ctx key=val}}` and `{{#inline "name"}}...{{/inline}}`.
//!
//! Partials are looked up by name on every call, so re-registering a partial
//! is visible to templates built earlier, except where a call was found
//! deterministic and inlined as a constant at build time.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use hbl_core::bail;
use hbl_core::error::Result;
use hbl_core::ir::{split_args, Expr, SplitArgs};
use hbl_core::value::{Object, Value};

use crate::compile::{
    async_fn, is_sync_expr, sync_fn, BuildCtx, Fragment, Lazy, Shape,
};
use crate::engine::Engine;
use crate::ops::Operation;
use crate::registry::{TemplateBody, TemplateEntry};
use crate::scope::Scope;

pub(super) fn install(engine: &Engine) {
    engine.add_operation("partial", Partial);
    engine.add_operation("inline", Inline);
}

fn name_arg<'a>(op: &str, split: &SplitArgs<'a>) -> Result<&'a Expr> {
    match split.positional.first() {
        Some(name) => Ok(*name),
        None => bail!("{} needs a template name", op),
    }
}

/// Context a partial runs against: the `""` argument when given, otherwise
/// the named arguments as an object, otherwise the caller's context.
fn partial_context(mut named: Vec<(String, Value)>) -> Option<Value> {
    if named.is_empty() {
        return None;
    }
    if let Some(at) = named.iter().position(|(name, _)| name.is_empty()) {
        return Some(named.swap_remove(at).1);
    }
    Some(Value::from(named.into_iter().collect::<Object>()))
}

/// Runs `entry` against `context` behind a frame holding the caller.
fn call_entry(entry: &TemplateEntry, context: Option<&Value>, scope: &Scope<'_>) -> Result<Value> {
    let context = context.unwrap_or(scope.context);
    if entry.captures_scope {
        let frame = scope.push(Vec::new(), None);
        entry.body.call(&scope.enter(context, &frame))
    } else {
        entry.body.call(&scope.rebase(context, None))
    }
}

async fn call_entry_async(
    entry: &TemplateEntry,
    context: Option<&Value>,
    scope: &Scope<'_>,
) -> Result<Value> {
    let context = context.unwrap_or(scope.context);
    if entry.captures_scope {
        let frame = scope.push(Vec::new(), None);
        let inner = scope.enter(context, &frame);
        entry.body.call_async(&inner).await
    } else {
        let inner = scope.rebase(context, None);
        entry.body.call_async(&inner).await
    }
}

struct Partial;

impl Operation for Partial {
    fn interpret(&self, args: &[Expr], scope: &Scope<'_>) -> Result<Value> {
        let split = split_args(args);
        let name = name_arg("partial", &split)?.eval(scope)?.key_string();
        let entry = scope.engine.registry().lookup(&name)?;
        let mut named = Vec::new();
        for (key, arg) in split.hash_values() {
            named.push((key.to_string(), arg.eval(scope)?));
        }
        call_entry(&entry, partial_context(named).as_ref(), scope)
    }

    fn interpret_async<'a>(
        &'a self,
        args: &'a [Expr],
        scope: &'a Scope<'a>,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            let split = split_args(args);
            let name = name_arg("partial", &split)?
                .eval_async(scope)
                .await?
                .key_string();
            let entry = scope.engine.registry().lookup(&name)?;
            let mut named = Vec::new();
            for (key, arg) in split.hash_values() {
                named.push((key.to_string(), arg.eval_async(scope).await?));
            }
            call_entry_async(&entry, partial_context(named).as_ref(), scope).await
        }
        .boxed()
    }

    fn synthesize(&self, args: &[Expr], build: &BuildCtx<'_>) -> Result<Fragment> {
        let split = split_args(args);
        let compiled = CompiledPartial {
            name: build.synthesize(name_arg("partial", &split)?)?,
            named: split
                .hash_values()
                .map(|(key, arg)| Ok((key.to_string(), build.synthesize(arg)?)))
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(compiled.into_fragment())
    }

    fn is_deterministic(&self, args: &[Expr], build: &BuildCtx<'_>) -> bool {
        let split = split_args(args);
        let Some(Expr::Literal(name)) = split.positional.first().copied() else {
            return false;
        };
        let Some(entry) = build.engine.registry().get(&name.key_string()) else {
            return false;
        };
        if split.has_hash_values() {
            entry.is_deterministic && split.hash_values().all(|(_, arg)| build.is_deterministic(arg))
        } else {
            entry.is_inlinable
        }
    }

    fn is_sync(&self) -> bool {
        false
    }

    fn supports_sync(&self) -> bool {
        true
    }

    /// The called body may read the caller's frames.
    fn captures_scope(&self) -> bool {
        true
    }
}

struct CompiledPartial {
    name: Fragment,
    named: Vec<(String, Fragment)>,
}

impl CompiledPartial {
    fn run(&self, scope: &Scope<'_>) -> Result<Value> {
        let name = self.name.call(scope)?.key_string();
        let entry = scope.engine.registry().lookup(&name)?;
        let named = self
            .named
            .iter()
            .map(|(key, fragment)| Ok((key.clone(), fragment.call(scope)?)))
            .collect::<Result<Vec<_>>>()?;
        call_entry(&entry, partial_context(named).as_ref(), scope)
    }

    async fn run_async(&self, scope: &Scope<'_>) -> Result<Value> {
        let name = self.name.call_async(scope).await?.key_string();
        let entry = scope.engine.registry().lookup(&name)?;
        let mut named = Vec::with_capacity(self.named.len());
        for (key, fragment) in &self.named {
            named.push((key.clone(), fragment.call_async(scope).await?));
        }
        call_entry_async(&entry, partial_context(named).as_ref(), scope).await
    }

    /// The entry is only known at run time, so the synchronous path is kept
    /// next to the async one.
    fn into_fragment(self) -> Fragment {
        let parts = std::iter::once(&self.name).chain(self.named.iter().map(|(_, part)| part));
        let shape = Shape::of(parts).max(Shape::Dual);
        let compiled = Arc::new(self);
        let sync = {
            let compiled = compiled.clone();
            sync_fn(move |scope| compiled.run(scope))
        };
        let asynchronous = async_fn(move |scope| {
            let compiled = compiled.clone();
            async move { compiled.run_async(scope).await }.boxed()
        });
        Fragment::compose(shape, true, sync, asynchronous)
    }
}

/// Registers its body under a name the first time it runs and renders
/// nothing. Registration is global to the engine's registry.
struct Inline;

impl Inline {
    fn parts<'a>(split: &SplitArgs<'a>) -> Result<(&'a Expr, &'a Expr)> {
        match split.positional.as_slice() {
            [name, body] => Ok((*name, *body)),
            _ => bail!("{{{{#inline}}}} takes a name and a body"),
        }
    }

    fn register(engine: &Engine, name: &str, make: impl FnOnce() -> TemplateEntry) {
        let registry = engine.registry();
        if registry.contains(name) {
            return;
        }
        let entry = make();
        registry.insert_if_absent(name, move || entry);
    }
}

impl Operation for Inline {
    fn interpret(&self, args: &[Expr], scope: &Scope<'_>) -> Result<Value> {
        let split = split_args(args);
        let (name, body) = Self::parts(&split)?;
        let name = name.eval(scope)?.key_string();
        Self::register(scope.engine, &name, || {
            TemplateEntry::interpreted(name.clone(), body.clone(), scope.engine)
        });
        Ok(Value::from(""))
    }

    fn interpret_async<'a>(
        &'a self,
        args: &'a [Expr],
        scope: &'a Scope<'a>,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            let split = split_args(args);
            let (name, body) = Self::parts(&split)?;
            let name = name.eval_async(scope).await?.key_string();
            Self::register(scope.engine, &name, || {
                TemplateEntry::interpreted(name.clone(), body.clone(), scope.engine)
            });
            Ok(Value::from(""))
        }
        .boxed()
    }

    fn synthesize(&self, args: &[Expr], build: &BuildCtx<'_>) -> Result<Fragment> {
        let split = split_args(args);
        let (name, body) = Self::parts(&split)?;
        let name = build.synthesize(name)?;
        let content = InlineContent {
            body: build.synthesize(body)?,
            is_sync: is_sync_expr(build.engine, body),
            is_deterministic: build.iterating().is_deterministic(body),
            is_inlinable: BuildCtx::new(build.engine).is_deterministic(body),
        };
        let shape = name.shape();
        let touches = name.touches_ancestors();
        let content = Arc::new(content);
        let sync = {
            let name = name.clone();
            let content = content.clone();
            sync_fn(move |scope| {
                let name = name.call(scope)?.key_string();
                Self::register(scope.engine, &name, || content.entry(name.clone()));
                Ok(Value::from(""))
            })
        };
        let asynchronous = async_fn(move |scope| {
            let name = name.clone();
            let content = content.clone();
            async move {
                let name = name.call_async(scope).await?.key_string();
                Self::register(scope.engine, &name, || content.entry(name.clone()));
                Ok(Value::from(""))
            }
            .boxed()
        });
        Ok(Fragment::compose(shape, touches, sync, asynchronous))
    }
}

/// A compiled inline body with its analysis done once at build time.
struct InlineContent {
    body: Fragment,
    is_sync: bool,
    is_deterministic: bool,
    is_inlinable: bool,
}

impl InlineContent {
    fn entry(&self, name: String) -> TemplateEntry {
        TemplateEntry {
            name,
            body: TemplateBody::Compiled(self.body.clone()),
            is_sync: self.is_sync,
            is_deterministic: self.is_deterministic,
            is_inlinable: self.is_inlinable,
            captures_scope: self.body.touches_ancestors(),
        }
    }
}
