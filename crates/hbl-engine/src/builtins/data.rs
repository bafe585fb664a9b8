//! Value helpers over evaluated arguments.

use std::cmp::Ordering;

use hbl_core::error::Result;
use hbl_core::ir::Arguments;
use hbl_core::type_bail;
use hbl_core::value::{Object, Value};

use super::arithmetic::number;
use crate::engine::Engine;
use crate::ops::Method;

type Helper = fn(&Arguments) -> Result<Value>;

pub(super) fn install(engine: &Engine) {
    let helpers: [(&[&str], Helper); 14] = [
        (&["min"], |args| Ok(extreme(args, Ordering::Less))),
        (&["max"], |args| Ok(extreme(args, Ordering::Greater))),
        (&["lowercase"], |args| Ok(Value::from(text("lowercase", args)?.to_lowercase()))),
        (&["uppercase"], |args| Ok(Value::from(text("uppercase", args)?.to_uppercase()))),
        (&["json"], |args| Ok(Value::from(serde_json::to_string(args.get(0))?))),
        (&["truncate"], truncate),
        (&["arr", "array"], |args| Ok(Value::array(args.positional.iter().cloned()))),
        (&["obj", "object"], |args| Ok(object(args))),
        (&["merge"], |args| Ok(merge(args))),
        (&["get", "lookup"], |args| Ok(args.get(0).get_dotted(&args.get(1).key_string()))),
        (&["match"], |args| Ok(matched(args))),
        (&["not", "!"], |args| Ok(Value::from(!args.get(0).truthy()))),
        (&["isArray"], |args| Ok(Value::from(matches!(args.get(0), Value::Array(_))))),
        (&["type"], |args| Ok(Value::from(args.get(0).type_name()))),
    ];
    for (names, helper) in helpers {
        for name in names {
            engine.add_method(Method::sync(*name, helper).deterministic());
        }
    }
    engine.add_method(Method::sync("log", log));
}

fn text<'a>(helper: &str, args: &'a Arguments) -> Result<&'a str> {
    match args.get(0) {
        Value::String(text) => Ok(&**text),
        other => type_bail!("{} expects a string, got {}", helper, other.type_name()),
    }
}

/// Smallest or largest operand by numeric value; `null` without operands.
fn extreme(args: &Arguments, keep: Ordering) -> Value {
    let mut best: Option<f64> = None;
    for n in args.positional.iter().map(Value::to_number) {
        if n.is_nan() {
            return Value::Float(f64::NAN);
        }
        match best {
            Some(current) if n.partial_cmp(&current) != Some(keep) => {}
            _ => best = Some(n),
        }
    }
    best.map_or(Value::Null, number)
}

/// First `n` characters.
fn truncate(args: &Arguments) -> Result<Value> {
    let text = text("truncate", args)?;
    let limit = args.get(1).to_number();
    let limit = if limit.is_nan() { 0 } else { limit.max(0.0) as usize };
    Ok(Value::from(text.chars().take(limit).collect::<String>()))
}

/// Named arguments first, then positional `key value` pairs; later keys win.
fn object(args: &Arguments) -> Value {
    let mut object: Object = args.hash.clone();
    for pair in args.positional.chunks(2) {
        let value = pair.get(1).cloned().unwrap_or_default();
        object.insert(pair[0].key_string(), value);
    }
    Value::from(object)
}

fn merge(args: &Arguments) -> Value {
    let mut merged = Object::new();
    for fields in args.positional.iter().filter_map(Value::as_object) {
        merged.extend(fields.iter().map(|(key, value)| (key.clone(), value.clone())));
    }
    Value::from(merged)
}

/// `match value k1 v1 k2 v2 fallback`: a truthy named argument keyed by the
/// value's string form wins, then the first positional key strictly equal to the
/// value, then the last positional argument.
fn matched(args: &Arguments) -> Value {
    let value = args.get(0);
    if let Some(found) = args.hash.get(&value.key_string()).filter(|found| found.truthy()) {
        return found.clone();
    }
    let rest = args.positional.get(1..).unwrap_or_default();
    for pair in rest.chunks_exact(2) {
        if pair[0].strict_eq(value) {
            return pair[1].clone();
        }
    }
    rest.last().cloned().unwrap_or_default()
}

fn log(args: &Arguments) -> Result<Value> {
    let value = args.get(0);
    tracing::info!(target: "hbl::log", "{}", value.to_json());
    Ok(value.clone())
}
