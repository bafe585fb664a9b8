//! Comparison and arithmetic helpers. Operands are coerced to numbers the way
//! the value model's `to_number` does; strings compare lexicographically
//! against strings.

use std::cmp::Ordering;

use hbl_core::error::Result;
use hbl_core::ir::Arguments;
use hbl_core::value::Value;

use crate::engine::Engine;
use crate::ops::Method;

type Helper = fn(&Arguments) -> Result<Value>;

pub(super) fn install(engine: &Engine) {
    let helpers: [(&[&str], Helper); 11] = [
        (&["lt", "<"], |args| Ok(ordered(args, |ord| ord == Ordering::Less))),
        (&["lte", "<="], |args| Ok(ordered(args, |ord| ord != Ordering::Greater))),
        (&["gt", ">"], |args| Ok(ordered(args, |ord| ord == Ordering::Greater))),
        (&["gte", ">="], |args| Ok(ordered(args, |ord| ord != Ordering::Less))),
        (&["eq", "=="], |args| Ok(Value::from(args.get(0).loose_eq(args.get(1))))),
        (&["ne", "!="], |args| Ok(Value::from(!args.get(0).loose_eq(args.get(1))))),
        (&["add", "+"], |args| Ok(add(args))),
        (&["subtract", "-"], |args| Ok(subtract(args))),
        (&["multiply", "*"], |args| Ok(multiply(args))),
        (&["divide", "/"], |args| Ok(float_fold(args, |a, b| a / b))),
        (&["mod", "%"], |args| Ok(float_fold(args, |a, b| a % b))),
    ];
    for (names, helper) in helpers {
        for name in names {
            engine.add_method(Method::sync(*name, helper).deterministic());
        }
    }
}

/// Integral results become `Int`.
pub(super) fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Int(n as i64)
    } else {
        Value::Float(n)
    }
}

fn ordered(args: &Arguments, accept: fn(Ordering) -> bool) -> Value {
    Value::from(args.get(0).compare(args.get(1)).is_some_and(accept))
}

fn integers(args: &Arguments) -> Option<Vec<i64>> {
    args.positional.iter().map(Value::as_i64).collect()
}

fn numbers(args: &Arguments) -> impl Iterator<Item = f64> + '_ {
    args.positional.iter().map(Value::to_number)
}

fn add(args: &Arguments) -> Value {
    integers(args)
        .and_then(|ints| ints.into_iter().try_fold(0i64, i64::checked_add))
        .map(Value::Int)
        .unwrap_or_else(|| number(numbers(args).sum()))
}

fn multiply(args: &Arguments) -> Value {
    integers(args)
        .and_then(|ints| ints.into_iter().try_fold(1i64, i64::checked_mul))
        .map(Value::Int)
        .unwrap_or_else(|| number(numbers(args).product()))
}

/// `subtract a` negates; `subtract a b c` is `a - b - c`.
fn subtract(args: &Arguments) -> Value {
    if let Some(ints) = integers(args) {
        let result = match ints.as_slice() {
            [] => Some(0),
            [single] => single.checked_neg(),
            [first, rest @ ..] => rest.iter().try_fold(*first, |acc, n| acc.checked_sub(*n)),
        };
        if let Some(result) = result {
            return Value::Int(result);
        }
    }
    let mut operands = numbers(args);
    match (operands.next(), args.len()) {
        (None, _) => Value::Int(0),
        (Some(single), 1) => number(-single),
        (Some(first), _) => number(operands.fold(first, |acc, n| acc - n)),
    }
}

fn float_fold(args: &Arguments, op: fn(f64, f64) -> f64) -> Value {
    let mut operands = numbers(args);
    match operands.next() {
        Some(first) => number(operands.fold(first, op)),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(values: Vec<Value>) -> Arguments {
        Arguments::new(values)
    }

    #[test]
    fn integer_arithmetic_stays_integral() {
        assert_eq!(add(&args(vec![Value::from(1), Value::from(10)])), Value::Int(11));
        assert_eq!(
            add(&args(vec![Value::from(i64::MAX), Value::from(1)])),
            Value::Float(i64::MAX as f64 + 1.0)
        );
        assert_eq!(subtract(&args(vec![Value::from(5)])), Value::Int(-5));
        assert_eq!(multiply(&args(vec![Value::from(3), Value::from("4")])), Value::Int(12));
    }

    #[test]
    fn division_and_remainder_use_floats() {
        assert_eq!(float_fold(&args(vec![Value::from(1), Value::from(4)]), |a, b| a / b), Value::Float(0.25));
        assert_eq!(float_fold(&args(vec![Value::from(7), Value::from(4)]), |a, b| a % b), Value::Int(3));
    }

    #[test]
    fn comparisons_coerce_numbers() {
        let lt = |a: Value, b: Value| ordered(&args(vec![a, b]), |ord| ord == Ordering::Less);
        assert_eq!(lt(Value::from("2"), Value::from(10)), Value::from(true));
        assert_eq!(lt(Value::from("b"), Value::from("a")), Value::from(false));
        assert_eq!(lt(Value::from("x"), Value::from(1)), Value::from(false));
    }
}
