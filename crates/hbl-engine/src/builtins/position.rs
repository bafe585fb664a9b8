//! Scope-chain reads: `rvar` and the `@` data variables.

use std::sync::Arc;

use hbl_core::error::Result;
use hbl_core::type_bail;
use hbl_core::ir::Expr;
use hbl_core::value::Value;

use crate::compile::{sync_fn, BuildCtx, Fragment};
use crate::engine::Engine;
use crate::ops::Operation;
use crate::scope::{Position, Scope};

pub(super) fn install(engine: &Engine) {
    engine.add_operation("rvar", ScopeLookup);
    engine.add_operation("@index", PositionRead(index));
    engine.add_operation("@key", PositionRead(index));
    engine.add_operation("@first", PositionRead(first));
    engine.add_operation("@last", PositionRead(last));
}

/// `rvar("../a.b")`: searches the context and then every frame outward.
struct ScopeLookup;

impl ScopeLookup {
    fn raw(args: &[Expr]) -> Result<Arc<str>> {
        match args.first().and_then(Expr::as_literal) {
            Some(Value::String(raw)) => Ok(raw.clone()),
            _ => type_bail!("rvar expects a literal path"),
        }
    }
}

impl Operation for ScopeLookup {
    fn interpret(&self, args: &[Expr], scope: &Scope<'_>) -> Result<Value> {
        Ok(scope.lookup(&Self::raw(args)?))
    }

    fn synthesize(&self, args: &[Expr], _build: &BuildCtx<'_>) -> Result<Fragment> {
        let raw = Self::raw(args)?;
        Ok(Fragment::sync(
            self.captures_scope(),
            sync_fn(move |scope| Ok(scope.lookup(&raw))),
        ))
    }

    fn captures_scope(&self) -> bool {
        true
    }
}

fn index(position: &Position) -> Value {
    position.index.clone()
}

fn first(position: &Position) -> Value {
    Value::from(position.is_first())
}

fn last(position: &Position) -> Value {
    Value::from(position.is_last())
}

/// Reads the current loop position, or `null` outside a loop.
struct PositionRead(fn(&Position) -> Value);

impl PositionRead {
    fn read(&self, scope: &Scope<'_>) -> Value {
        scope.position.map_or(Value::Null, self.0)
    }
}

impl Operation for PositionRead {
    fn interpret(&self, _args: &[Expr], scope: &Scope<'_>) -> Result<Value> {
        Ok(self.read(scope))
    }

    fn synthesize(&self, _args: &[Expr], _build: &BuildCtx<'_>) -> Result<Fragment> {
        let read = self.0;
        Ok(Fragment::sync(
            false,
            sync_fn(move |scope| Ok(PositionRead(read).read(scope))),
        ))
    }
}
