//! Named templates invocable through `{{> name}}`.
//!
//! The registry is shared mutable state: entries are overwritten on
//! re-registration and never evicted. Templates that need isolation from one
//! another use separate registries.

use std::sync::{Arc, OnceLock};

use futures_util::future::{ready, BoxFuture, FutureExt};
use hbl_core::collections::ConcurrentMap;
use hbl_core::error::{Error, Result};
use hbl_core::ir::Expr;
use hbl_core::value::Value;
use itertools::Itertools;

use crate::compile::{captures_scope_expr, is_sync_expr, Body, BuildCtx, Fragment};
use crate::engine::Engine;
use crate::interpret;
use crate::scope::Scope;

#[derive(Debug, Clone)]
pub enum TemplateBody {
    Compiled(Fragment),
    /// Walked on every call. Whether the walk ever suspends is decided once,
    /// when the body is built.
    Interpreted { ir: Arc<Expr>, is_sync: bool },
}

impl TemplateBody {
    pub fn interpreted(ir: Arc<Expr>, engine: &Engine) -> Self {
        let is_sync = is_sync_expr(engine, &ir);
        TemplateBody::Interpreted { ir, is_sync }
    }

    pub fn as_body(&self) -> Body<'_> {
        match self {
            TemplateBody::Compiled(fragment) => Body::Compiled(fragment),
            TemplateBody::Interpreted { ir, .. } => Body::Interpreted(ir),
        }
    }

    pub fn call(&self, scope: &Scope<'_>) -> Result<Value> {
        self.as_body().eval(scope)
    }

    pub fn call_async<'a>(&self, scope: &'a Scope<'a>) -> BoxFuture<'a, Result<Value>> {
        match self {
            TemplateBody::Compiled(fragment) => fragment.call_async(scope),
            TemplateBody::Interpreted { ir, is_sync: true } => ready(interpret::run(ir, scope)).boxed(),
            TemplateBody::Interpreted { ir, .. } => {
                let ir = ir.clone();
                async move { interpret::run_async(&ir, scope).await }.boxed()
            }
        }
    }
}

#[derive(Debug)]
pub struct TemplateEntry {
    pub name: String,
    pub body: TemplateBody,
    pub is_sync: bool,
    /// Output depends only on the context it is given.
    pub is_deterministic: bool,
    /// Output depends on nothing at all, so calls can be inlined as constants.
    pub is_inlinable: bool,
    /// The body reads frames above its context, so callers push one.
    pub captures_scope: bool,
}

impl TemplateEntry {
    pub fn new(name: impl Into<String>, body: TemplateBody, ir: &Expr, engine: &Engine) -> Self {
        let build = BuildCtx::new(engine);
        let (captures_scope, is_sync) = match &body {
            TemplateBody::Compiled(fragment) => {
                (fragment.touches_ancestors(), fragment.is_sync())
            }
            TemplateBody::Interpreted { is_sync, .. } => (captures_scope_expr(engine, ir), *is_sync),
        };
        Self {
            name: name.into(),
            body,
            is_sync,
            is_deterministic: build.iterating().is_deterministic(ir),
            is_inlinable: build.is_deterministic(ir),
            captures_scope,
        }
    }

    pub fn compiled(name: impl Into<String>, ir: &Expr, engine: &Engine) -> Result<Self> {
        let fragment = BuildCtx::new(engine).synthesize(ir)?;
        Ok(Self::new(name, TemplateBody::Compiled(fragment), ir, engine))
    }

    pub fn interpreted(name: impl Into<String>, ir: Expr, engine: &Engine) -> Self {
        let ir = Arc::new(ir);
        Self::new(name, TemplateBody::interpreted(ir.clone(), engine), &ir, engine)
    }
}

#[derive(Clone, Default)]
pub struct TemplateRegistry {
    entries: Arc<ConcurrentMap<String, Arc<TemplateEntry>>>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry shared by every [`Engine::new`].
    pub fn global() -> Self {
        static GLOBAL: OnceLock<TemplateRegistry> = OnceLock::new();
        GLOBAL.get_or_init(TemplateRegistry::new).clone()
    }

    pub fn insert(&self, entry: TemplateEntry) -> Option<Arc<TemplateEntry>> {
        tracing::debug!(
            "registering template {} (sync: {}, deterministic: {}, inlinable: {})",
            entry.name,
            entry.is_sync,
            entry.is_deterministic,
            entry.is_inlinable
        );
        self.entries.insert(entry.name.clone(), Arc::new(entry))
    }

    /// Registers only when `name` is vacant; the first registration wins.
    pub fn insert_if_absent(&self, name: &str, make: impl FnOnce() -> TemplateEntry) -> bool {
        let inserted = self
            .entries
            .insert_if_absent(name.to_string(), || Arc::new(make()));
        if inserted {
            tracing::debug!("registered inline template {}", name);
        }
        inserted
    }

    pub fn get(&self, name: &str) -> Option<Arc<TemplateEntry>> {
        self.entries.get_cloned(name)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<TemplateEntry>> {
        self.get(name)
            .ok_or_else(|| Error::TemplateNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<TemplateEntry>> {
        self.entries.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().into_iter().sorted().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
