//! The operation contract every named helper implements, and [`Method`], the
//! adapter that turns a plain function over evaluated arguments into one.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use futures_util::future::{ready, BoxFuture, FutureExt};
use hbl_core::error::{Error, Result};
use hbl_core::ir::{Arguments, Expr};
use hbl_core::value::Value;

use crate::compile::{async_fn, sync_fn, BuildCtx, CompiledArgs, Fragment, Shape};
use crate::interpret;
use crate::scope::Scope;

/// A named operation. Arguments arrive unevaluated so control constructs can
/// decide what to evaluate and when.
pub trait Operation: Send + Sync {
    fn interpret(&self, args: &[Expr], scope: &Scope<'_>) -> Result<Value>;

    fn interpret_async<'a>(
        &'a self,
        args: &'a [Expr],
        scope: &'a Scope<'a>,
    ) -> BoxFuture<'a, Result<Value>> {
        ready(self.interpret(args, scope)).boxed()
    }

    fn synthesize(&self, args: &[Expr], build: &BuildCtx<'_>) -> Result<Fragment>;

    /// Whether the result depends only on build-time-known values.
    fn is_deterministic(&self, _args: &[Expr], _build: &BuildCtx<'_>) -> bool {
        false
    }

    /// Never suspends when its arguments do not.
    fn is_sync(&self) -> bool {
        true
    }

    /// Has a synchronous evaluator at all, possibly failing at run time.
    fn supports_sync(&self) -> bool {
        self.is_sync()
    }

    /// Reads frames above the current context.
    fn captures_scope(&self) -> bool {
        false
    }
}

pub type SyncMethodFn = dyn Fn(&Arguments) -> Result<Value> + Send + Sync;
pub type AsyncMethodFn = dyn Fn(Arguments) -> BoxFuture<'static, Result<Value>> + Send + Sync;

#[derive(Clone)]
pub enum MethodFn {
    Sync(Arc<SyncMethodFn>),
    Async(Arc<AsyncMethodFn>),
}

impl MethodFn {
    fn call<'a>(&self, args: Arguments) -> BoxFuture<'a, Result<Value>> {
        match self {
            MethodFn::Sync(f) => ready(f(&args)).boxed(),
            MethodFn::Async(f) => f(args),
        }
    }
}

/// A helper over evaluated arguments. Arguments are evaluated in source
/// order, named ones interleaved with positional ones.
#[derive(Clone)]
pub struct Method {
    pub name: String,
    pub func: MethodFn,
    pub deterministic: bool,
}

impl Debug for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("sync", &matches!(self.func, MethodFn::Sync(_)))
            .field("deterministic", &self.deterministic)
            .finish()
    }
}

impl Method {
    pub fn sync<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Arguments) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: MethodFn::Sync(Arc::new(f)),
            deterministic: false,
        }
    }

    pub fn asynchronous<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: MethodFn::Async(Arc::new(move |args| f(args).boxed())),
            deterministic: false,
        }
    }

    /// Marks the method as pure so calls with constant arguments are folded.
    pub fn deterministic(mut self) -> Self {
        self.deterministic = true;
        self
    }

    fn evaluate(&self, args: Arguments) -> Result<Value> {
        match &self.func {
            MethodFn::Sync(f) => f(&args),
            MethodFn::Async(_) => Err(Error::AsyncOperation(self.name.clone())),
        }
    }
}

impl Operation for Method {
    fn interpret(&self, args: &[Expr], scope: &Scope<'_>) -> Result<Value> {
        if let MethodFn::Async(_) = self.func {
            return Err(Error::AsyncOperation(self.name.clone()));
        }
        self.evaluate(interpret::eval_arguments(args, scope)?)
    }

    fn interpret_async<'a>(
        &'a self,
        args: &'a [Expr],
        scope: &'a Scope<'a>,
    ) -> BoxFuture<'a, Result<Value>> {
        async move {
            let evaluated = interpret::eval_arguments_async(args, scope).await?;
            self.func.call(evaluated).await
        }
        .boxed()
    }

    fn synthesize(&self, args: &[Expr], build: &BuildCtx<'_>) -> Result<Fragment> {
        let compiled = Arc::new(CompiledArgs::build(args, build)?);
        let touches = compiled.touches_ancestors();
        let shape = match self.func {
            MethodFn::Sync(_) => compiled.shape(),
            MethodFn::Async(_) => Shape::Async,
        };
        let sync = {
            let compiled = compiled.clone();
            let method = self.clone();
            sync_fn(move |scope| method.evaluate(compiled.eval(scope)?))
        };
        let func = self.func.clone();
        let asynchronous = async_fn(move |scope| {
            let compiled = compiled.clone();
            let func = func.clone();
            async move {
                let evaluated = compiled.eval_async(scope).await?;
                func.call(evaluated).await
            }
            .boxed()
        });
        Ok(Fragment::compose(shape, touches, sync, asynchronous))
    }

    fn is_deterministic(&self, args: &[Expr], build: &BuildCtx<'_>) -> bool {
        self.deterministic && args.iter().all(|arg| build.is_deterministic(arg))
    }

    fn is_sync(&self) -> bool {
        matches!(self.func, MethodFn::Sync(_))
    }
}
