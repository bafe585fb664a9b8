//! Closure compiler: turns IR into a tree of closures built once and invoked
//! many times without re-walking the IR.

use std::sync::Arc;

use futures_util::future::{ready, BoxFuture, FutureExt};
use hbl_core::config;
use hbl_core::error::{Error, Result};
use hbl_core::ir::{Arguments, Expr};
use hbl_core::value::Value;

use crate::engine::Engine;
use crate::interpret;
use crate::scope::Scope;

pub type SyncFn = Arc<dyn Fn(&Scope<'_>) -> Result<Value> + Send + Sync>;
pub type AsyncFn = Arc<dyn for<'a> Fn(&'a Scope<'a>) -> BoxFuture<'a, Result<Value>> + Send + Sync>;

pub fn sync_fn<F>(f: F) -> SyncFn
where
    F: Fn(&Scope<'_>) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn async_fn<F>(f: F) -> AsyncFn
where
    F: for<'a> Fn(&'a Scope<'a>) -> BoxFuture<'a, Result<Value>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// How a compiled fragment can be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Shape {
    /// Never suspends.
    Sync,
    /// Has a synchronous path that may fail at run time, and an async one.
    Dual,
    /// Must be awaited.
    Async,
}

impl Shape {
    pub fn of<'f>(fragments: impl IntoIterator<Item = &'f Fragment>) -> Shape {
        fragments
            .into_iter()
            .map(Fragment::shape)
            .max()
            .unwrap_or(Shape::Sync)
    }
}

#[derive(Clone)]
enum Eval {
    Const(Value),
    Sync(SyncFn),
    Dual(SyncFn, AsyncFn),
    Async(AsyncFn),
}

#[derive(Clone)]
pub struct Fragment {
    eval: Eval,
    touches_ancestors: bool,
    /// Operation that keeps an async fragment from running synchronously.
    async_op: Option<Arc<str>>,
}

impl std::fmt::Debug for Fragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("Fragment");
        match &self.eval {
            Eval::Const(value) => debug.field("const", value),
            _ => debug.field("shape", &self.shape()),
        };
        debug
            .field("touches_ancestors", &self.touches_ancestors)
            .finish()
    }
}

impl Fragment {
    pub fn constant(value: Value) -> Self {
        Self {
            eval: Eval::Const(value),
            touches_ancestors: false,
            async_op: None,
        }
    }

    pub fn sync(touches_ancestors: bool, f: SyncFn) -> Self {
        Self {
            eval: Eval::Sync(f),
            touches_ancestors,
            async_op: None,
        }
    }

    /// Picks the evaluator matching `shape`; the other one is dropped.
    pub fn compose(shape: Shape, touches_ancestors: bool, sync: SyncFn, asynchronous: AsyncFn) -> Self {
        let eval = match shape {
            Shape::Sync => Eval::Sync(sync),
            Shape::Dual => Eval::Dual(sync, asynchronous),
            Shape::Async => Eval::Async(asynchronous),
        };
        Self {
            eval,
            touches_ancestors,
            async_op: None,
        }
    }

    pub fn as_const(&self) -> Option<&Value> {
        match &self.eval {
            Eval::Const(value) => Some(value),
            _ => None,
        }
    }

    pub fn shape(&self) -> Shape {
        match self.eval {
            Eval::Const(_) | Eval::Sync(_) => Shape::Sync,
            Eval::Dual(..) => Shape::Dual,
            Eval::Async(_) => Shape::Async,
        }
    }

    pub fn is_sync(&self) -> bool {
        self.shape() == Shape::Sync
    }

    pub fn supports_sync(&self) -> bool {
        self.shape() != Shape::Async
    }

    pub fn touches_ancestors(&self) -> bool {
        self.touches_ancestors
    }

    pub fn async_op(&self) -> Option<&str> {
        self.async_op.as_deref()
    }

    fn blocked_on(mut self, name: &str) -> Self {
        self.async_op = Some(Arc::from(name));
        self
    }

    pub fn call(&self, scope: &Scope<'_>) -> Result<Value> {
        match &self.eval {
            Eval::Const(value) => Ok(value.clone()),
            Eval::Sync(f) | Eval::Dual(f, _) => f(scope),
            Eval::Async(_) => Err(Error::AsyncOperation(
                self.async_op().unwrap_or("template").to_string(),
            )),
        }
    }

    /// The returned future does not borrow the fragment.
    pub fn call_async<'a>(&self, scope: &'a Scope<'a>) -> BoxFuture<'a, Result<Value>> {
        match &self.eval {
            Eval::Const(value) => ready(Ok(value.clone())).boxed(),
            Eval::Sync(f) => ready(f(scope)).boxed(),
            Eval::Dual(_, f) | Eval::Async(f) => f(scope),
        }
    }
}

/// Build-time state handed to [`crate::ops::Operation::synthesize`] and
/// [`crate::ops::Operation::is_deterministic`].
#[derive(Clone, Copy)]
pub struct BuildCtx<'e> {
    pub engine: &'e Engine,
    /// The context of the expression being analysed is itself derived from
    /// build-time-known values (a loop body over a constant sequence).
    pub inside_iterator: bool,
}

impl<'e> BuildCtx<'e> {
    pub fn new(engine: &'e Engine) -> Self {
        Self {
            engine,
            inside_iterator: false,
        }
    }

    pub fn iterating(&self) -> Self {
        Self {
            engine: self.engine,
            inside_iterator: true,
        }
    }

    pub fn is_deterministic(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Literal(_) => true,
            Expr::Var(_) => self.inside_iterator,
            Expr::Hash(_, inner) => self.is_deterministic(inner),
            Expr::Op(call) => self
                .engine
                .operation(&call.name)
                .map(|op| op.is_deterministic(&call.args, self))
                .unwrap_or(false),
        }
    }

    pub fn synthesize(&self, expr: &Expr) -> Result<Fragment> {
        match expr {
            Expr::Literal(value) => Ok(Fragment::constant(value.clone())),
            Expr::Var(path) if path.is_this() => {
                Ok(Fragment::sync(false, sync_fn(|scope| Ok(scope.context.clone()))))
            }
            Expr::Var(path) => {
                let path = path.clone();
                Ok(Fragment::sync(
                    false,
                    sync_fn(move |scope| Ok(path.resolve(scope.context))),
                ))
            }
            Expr::Hash(_, inner) => self.synthesize(inner),
            Expr::Op(call) => {
                let op = self.engine.operation(&call.name)?;
                if let Some(value) = self.try_fold(expr) {
                    return Ok(Fragment::constant(value));
                }
                let fragment = op.synthesize(&call.args, self)?;
                if fragment.shape() != Shape::Async {
                    return Ok(fragment);
                }
                let name = first_async_op(self.engine, expr).unwrap_or_else(|| call.name.clone());
                Ok(fragment.blocked_on(&name))
            }
        }
    }

    pub fn synthesize_all<'x>(&self, exprs: impl IntoIterator<Item = &'x Expr>) -> Result<Vec<Fragment>> {
        exprs.into_iter().map(|expr| self.synthesize(expr)).collect()
    }

    /// Evaluates a deterministic sub-tree with a synchronous path once at
    /// build time.
    /// A sub-tree that fails here is left to fail at run time instead.
    fn try_fold(&self, expr: &Expr) -> Option<Value> {
        if !config::constant_folding() {
            return None;
        }
        let top = BuildCtx::new(self.engine);
        if !top.is_deterministic(expr) || first_async_op(self.engine, expr).is_some() {
            return None;
        }
        let null = Value::Null;
        match interpret::run(expr, &Scope::root(self.engine, &null)) {
            Ok(value) => {
                tracing::trace!("folded {} into a constant", expr);
                Some(value)
            }
            Err(err) => {
                tracing::debug!("not folding {}: {}", expr, err);
                None
            }
        }
    }
}

/// True when every operation in the tree exists and never suspends.
pub fn is_sync_expr(engine: &Engine, expr: &Expr) -> bool {
    first_op_where(engine, expr, |op| !op.is_sync()).is_none()
}

/// Name of the first operation in the tree with no synchronous evaluator.
pub fn first_async_op(engine: &Engine, expr: &Expr) -> Option<String> {
    first_op_where(engine, expr, |op| !op.supports_sync())
}

/// Name of the first operation in the tree the engine does not know.
pub fn first_unknown_op(engine: &Engine, expr: &Expr) -> Option<String> {
    first_op_where(engine, expr, |_| false)
}

/// True when some operation in the tree reads frames above its context.
/// Unknown operations count as reading them.
pub fn captures_scope_expr(engine: &Engine, expr: &Expr) -> bool {
    first_op_where(engine, expr, |op| op.captures_scope()).is_some()
}

fn first_op_where(
    engine: &Engine,
    expr: &Expr,
    pred: impl Fn(&dyn crate::ops::Operation) -> bool,
) -> Option<String> {
    let mut found = None;
    expr.walk_ops(&mut |call| {
        if found.is_some() {
            return;
        }
        match engine.operation(&call.name) {
            Ok(op) if !pred(op.as_ref()) => {}
            _ => found = Some(call.name.clone()),
        }
    });
    found
}

/// Compiled argument list of a method call, kept in source order.
pub struct CompiledArgs {
    args: Vec<(Option<String>, Fragment)>,
}

impl CompiledArgs {
    pub fn build(args: &[Expr], build: &BuildCtx<'_>) -> Result<Self> {
        let args = args
            .iter()
            .map(|arg| match arg {
                Expr::Hash(name, inner) => Ok((Some(name.clone()), build.synthesize(inner)?)),
                other => Ok((None, build.synthesize(other)?)),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { args })
    }

    fn fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.args.iter().map(|(_, fragment)| fragment)
    }

    pub fn shape(&self) -> Shape {
        Shape::of(self.fragments())
    }

    pub fn touches_ancestors(&self) -> bool {
        self.fragments().any(Fragment::touches_ancestors)
    }

    fn place(evaluated: &mut Arguments, name: &Option<String>, value: Value) {
        match name {
            Some(name) => {
                evaluated.hash.insert(name.clone(), value);
            }
            None => evaluated.positional.push(value),
        }
    }

    pub fn eval(&self, scope: &Scope<'_>) -> Result<Arguments> {
        let mut evaluated = Arguments::default();
        for (name, fragment) in &self.args {
            Self::place(&mut evaluated, name, fragment.call(scope)?);
        }
        Ok(evaluated)
    }

    pub async fn eval_async(&self, scope: &Scope<'_>) -> Result<Arguments> {
        let mut evaluated = Arguments::default();
        for (name, fragment) in &self.args {
            let value = fragment.call_async(scope).await?;
            Self::place(&mut evaluated, name, value);
        }
        Ok(evaluated)
    }
}

/// Anything a control operation evaluates on demand: an IR node walked by the
/// interpreter or a compiled fragment. Control drivers are written once over
/// this trait and used by both strategies.
pub trait Lazy: Sync {
    fn eval(&self, scope: &Scope<'_>) -> Result<Value>;

    fn eval_async<'s>(&'s self, scope: &'s Scope<'s>) -> BoxFuture<'s, Result<Value>>;
}

impl Lazy for Expr {
    fn eval(&self, scope: &Scope<'_>) -> Result<Value> {
        interpret::run(self, scope)
    }

    fn eval_async<'s>(&'s self, scope: &'s Scope<'s>) -> BoxFuture<'s, Result<Value>> {
        interpret::run_async(self, scope)
    }
}

impl Lazy for Fragment {
    fn eval(&self, scope: &Scope<'_>) -> Result<Value> {
        self.call(scope)
    }

    fn eval_async<'s>(&'s self, scope: &'s Scope<'s>) -> BoxFuture<'s, Result<Value>> {
        self.call_async(scope)
    }
}

impl<T: Lazy + ?Sized> Lazy for &T {
    fn eval(&self, scope: &Scope<'_>) -> Result<Value> {
        (**self).eval(scope)
    }

    fn eval_async<'s>(&'s self, scope: &'s Scope<'s>) -> BoxFuture<'s, Result<Value>> {
        (**self).eval_async(scope)
    }
}

/// Compiles `parts` into one fragment driven by `sync` and `asynchronous`.
/// The fragment's shape and ancestor use are those of its parts.
pub fn compose_parts<S, A>(parts: Vec<Fragment>, sync: S, asynchronous: A) -> Fragment
where
    S: Fn(&[Fragment], &Scope<'_>) -> Result<Value> + Send + Sync + 'static,
    A: for<'a> Fn(Arc<[Fragment]>, &'a Scope<'a>) -> BoxFuture<'a, Result<Value>>
        + Send
        + Sync
        + 'static,
{
    let shape = Shape::of(&parts);
    let touches = parts.iter().any(Fragment::touches_ancestors);
    let parts: Arc<[Fragment]> = parts.into();
    let sync = {
        let parts = parts.clone();
        sync_fn(move |scope| sync(&parts, scope))
    };
    let asynchronous = async_fn(move |scope| asynchronous(parts.clone(), scope));
    Fragment::compose(shape, touches, sync, asynchronous)
}

/// A block body evaluated either by walking its IR or through its compiled
/// fragment, so loop drivers are shared by both strategies.
#[derive(Clone, Copy)]
pub enum Body<'b> {
    Interpreted(&'b Expr),
    Compiled(&'b Fragment),
}

impl<'b> Body<'b> {
    pub fn eval(&self, scope: &Scope<'_>) -> Result<Value> {
        match self {
            Body::Interpreted(expr) => interpret::run(expr, scope),
            Body::Compiled(fragment) => fragment.call(scope),
        }
    }

    pub fn eval_async<'s>(&self, scope: &'s Scope<'s>) -> BoxFuture<'s, Result<Value>>
    where
        'b: 's,
    {
        match *self {
            Body::Interpreted(expr) => interpret::run_async(expr, scope),
            Body::Compiled(fragment) => fragment.call_async(scope),
        }
    }
}
