use std::borrow::Cow;

use futures_util::future::{BoxFuture, FutureExt};
use hbl_core::error::Result;
use hbl_core::ir::{split_args, Arguments, Expr};
use hbl_core::value::Value;

use crate::compile::{compose_parts, BuildCtx, Fragment, Lazy};
use crate::engine::Engine;
use crate::ops::{Method, Operation};
use crate::scope::Scope;

pub(super) fn install(engine: &Engine) {
    engine.add_operation("cat", Cat);
    engine.add_operation("if", If);
    engine.add_operation("unless", Unless);
    engine.add_operation("default", Coalesce);
    engine.add_operation("and", And);
    engine.add_operation("or", Or);
    engine.add_method(Method::sync("escape", escape).deterministic());
}

/// Implements [`Operation`] for a construct that evaluates its positional
/// arguments on demand through a pair of drivers generic over [`Lazy`].
macro_rules! lazy_operation {
    ($ty:ident, $drive:ident, $drive_async:ident) => {
        struct $ty;

        impl Operation for $ty {
            fn interpret(&self, args: &[Expr], scope: &Scope<'_>) -> Result<Value> {
                $drive(&split_args(args).positional, scope)
            }

            fn interpret_async<'a>(
                &'a self,
                args: &'a [Expr],
                scope: &'a Scope<'a>,
            ) -> BoxFuture<'a, Result<Value>> {
                async move {
                    let split = split_args(args);
                    $drive_async(&split.positional, scope).await
                }
                .boxed()
            }

            fn synthesize(&self, args: &[Expr], build: &BuildCtx<'_>) -> Result<Fragment> {
                let parts = build.synthesize_all(split_args(args).positional)?;
                Ok(compose_parts(
                    parts,
                    |parts, scope| $drive(parts, scope),
                    |parts, scope| async move { $drive_async(&parts[..], scope).await }.boxed(),
                ))
            }

            fn is_deterministic(&self, args: &[Expr], build: &BuildCtx<'_>) -> bool {
                args.iter().all(|arg| build.is_deterministic(arg))
            }
        }
    };
}

lazy_operation!(Cat, concat, concat_async);
lazy_operation!(If, choose, choose_async);
lazy_operation!(Unless, choose_unless, choose_unless_async);
lazy_operation!(Coalesce, coalesce, coalesce_async);
lazy_operation!(And, all, all_async);
lazy_operation!(Or, any, any_async);

fn concat<E: Lazy>(parts: &[E], scope: &Scope<'_>) -> Result<Value> {
    let mut out = String::new();
    for part in parts {
        part.eval(scope)?.write_output(&mut out);
    }
    Ok(Value::from(out))
}

async fn concat_async<E: Lazy>(parts: &[E], scope: &Scope<'_>) -> Result<Value> {
    let mut out = String::new();
    for part in parts {
        part.eval_async(scope).await?.write_output(&mut out);
    }
    Ok(Value::from(out))
}

/// `cond, then, cond, then, ..., else?`
fn choose<E: Lazy>(parts: &[E], scope: &Scope<'_>) -> Result<Value> {
    let mut pairs = parts.chunks_exact(2);
    for pair in &mut pairs {
        if pair[0].eval(scope)?.truthy() {
            return pair[1].eval(scope);
        }
    }
    match pairs.remainder() {
        [otherwise] => otherwise.eval(scope),
        _ => Ok(Value::Null),
    }
}

async fn choose_async<E: Lazy>(parts: &[E], scope: &Scope<'_>) -> Result<Value> {
    let mut pairs = parts.chunks_exact(2);
    for pair in &mut pairs {
        if pair[0].eval_async(scope).await?.truthy() {
            return pair[1].eval_async(scope).await;
        }
    }
    match pairs.remainder() {
        [otherwise] => otherwise.eval_async(scope).await,
        _ => Ok(Value::Null),
    }
}

fn choose_unless<E: Lazy>(parts: &[E], scope: &Scope<'_>) -> Result<Value> {
    match parts {
        [cond, body, rest @ ..] => {
            if !cond.eval(scope)?.truthy() {
                body.eval(scope)
            } else {
                rest.first().map_or(Ok(Value::Null), |otherwise| otherwise.eval(scope))
            }
        }
        _ => Ok(Value::Null),
    }
}

async fn choose_unless_async<E: Lazy>(parts: &[E], scope: &Scope<'_>) -> Result<Value> {
    match parts {
        [cond, body, rest @ ..] => {
            if !cond.eval_async(scope).await?.truthy() {
                body.eval_async(scope).await
            } else if let Some(otherwise) = rest.first() {
                otherwise.eval_async(scope).await
            } else {
                Ok(Value::Null)
            }
        }
        _ => Ok(Value::Null),
    }
}

/// First non-null operand; later operands are not evaluated.
fn coalesce<E: Lazy>(parts: &[E], scope: &Scope<'_>) -> Result<Value> {
    for part in parts {
        let value = part.eval(scope)?;
        if !value.is_null() {
            return Ok(value);
        }
    }
    Ok(Value::Null)
}

async fn coalesce_async<E: Lazy>(parts: &[E], scope: &Scope<'_>) -> Result<Value> {
    for part in parts {
        let value = part.eval_async(scope).await?;
        if !value.is_null() {
            return Ok(value);
        }
    }
    Ok(Value::Null)
}

/// First falsy operand, or the last one.
fn all<E: Lazy>(parts: &[E], scope: &Scope<'_>) -> Result<Value> {
    let mut last = Value::Null;
    for part in parts {
        last = part.eval(scope)?;
        if !last.truthy() {
            break;
        }
    }
    Ok(last)
}

async fn all_async<E: Lazy>(parts: &[E], scope: &Scope<'_>) -> Result<Value> {
    let mut last = Value::Null;
    for part in parts {
        last = part.eval_async(scope).await?;
        if !last.truthy() {
            break;
        }
    }
    Ok(last)
}

/// First truthy operand, or the last one.
fn any<E: Lazy>(parts: &[E], scope: &Scope<'_>) -> Result<Value> {
    let mut last = Value::Null;
    for part in parts {
        last = part.eval(scope)?;
        if last.truthy() {
            break;
        }
    }
    Ok(last)
}

async fn any_async<E: Lazy>(parts: &[E], scope: &Scope<'_>) -> Result<Value> {
    let mut last = Value::Null;
    for part in parts {
        last = part.eval_async(scope).await?;
        if last.truthy() {
            break;
        }
    }
    Ok(last)
}

fn escape(args: &Arguments) -> Result<Value> {
    Ok(match args.get(0) {
        Value::Null => Value::from(""),
        Value::String(text) => match escape_html(text) {
            Cow::Borrowed(_) => Value::String(text.clone()),
            Cow::Owned(escaped) => Value::from(escaped),
        },
        other => other.clone(),
    })
}

/// Replaces `" & ' < >` with their entities. Text without any of them is
/// returned as is.
pub fn escape_html(text: &str) -> Cow<'_, str> {
    let Some(first) = text.find(['"', '&', '\'', '<', '>']) else {
        return Cow::Borrowed(text);
    };
    let mut out = String::with_capacity(text.len() + 16);
    let mut last = 0;
    for (at, byte) in text.bytes().enumerate().skip(first) {
        let entity = match byte {
            b'"' => "&quot;",
            b'&' => "&amp;",
            b'\'' => "&#39;",
            b'<' => "&lt;",
            b'>' => "&gt;",
            _ => continue,
        };
        out.push_str(&text[last..at]);
        out.push_str(entity);
        last = at + 1;
    }
    out.push_str(&text[last..]);
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn escapes_only_when_needed() {
        assert!(matches!(escape_html("plain text"), Cow::Borrowed("plain text")));
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/a&gt;"
        );
        assert_eq!(escape_html("é<ü>"), "é&lt;ü&gt;");
    }

    #[test]
    fn escape_passes_non_strings_through() {
        let escaped = |value: Value| escape(&Arguments::new(vec![value]));
        assert_eq!(escaped(Value::Null).ok(), Some(Value::from("")));
        assert_eq!(escaped(Value::from(12)).ok(), Some(Value::from(12)));
        assert_eq!(escaped(Value::from("<")).ok(), Some(Value::from("&lt;")));
    }
}
