//! Intermediate representation produced by the parser and consumed by the
//! interpreter and the closure compiler.

use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::value::{Object, Value, NULL};

/// Dotted property path read from the current context. An empty path is the
/// context itself (`this` / `.`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Path {
    pub segments: Vec<String>,
}

impl Path {
    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    pub fn this() -> Self {
        Self::default()
    }

    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split(['.', '/'])
            .filter(|s| !s.is_empty() && *s != "this")
            .map(str::to_string)
            .collect();
        Self { segments }
    }

    pub fn is_this(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn resolve(&self, context: &Value) -> Value {
        context.get_path(&self.segments)
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.segments.is_empty() {
            f.write_str("this")
        } else {
            f.write_str(&self.segments.join("."))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpCall {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Value),
    Var(Path),
    /// Named (`key=value`) argument; only meaningful inside an argument list.
    Hash(String, Box<Expr>),
    Op(OpCall),
}

impl Expr {
    pub fn lit(value: impl Into<Value>) -> Expr {
        Expr::Literal(value.into())
    }

    pub fn var(raw: &str) -> Expr {
        Expr::Var(Path::parse(raw))
    }

    pub fn op(name: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Op(OpCall {
            name: name.into(),
            args,
        })
    }

    pub fn hash(name: impl Into<String>, value: Expr) -> Expr {
        Expr::Hash(name.into(), Box::new(value))
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Expr::Literal(value) => Some(value),
            _ => None,
        }
    }

    /// A value or path with no operation call anywhere below it.
    pub fn is_leaf(&self) -> bool {
        match self {
            Expr::Literal(_) | Expr::Var(_) => true,
            Expr::Hash(_, inner) => inner.is_leaf(),
            Expr::Op(_) => false,
        }
    }

    pub fn as_op(&self) -> Option<&OpCall> {
        match self {
            Expr::Op(call) => Some(call),
            _ => None,
        }
    }

    pub fn op_name(&self) -> Option<&str> {
        self.as_op().map(|call| call.name.as_str())
    }

    /// Visits every operation call in the tree, outermost first.
    pub fn walk_ops<'a>(&'a self, f: &mut impl FnMut(&'a OpCall)) {
        match self {
            Expr::Literal(_) | Expr::Var(_) => {}
            Expr::Hash(_, inner) => inner.walk_ops(f),
            Expr::Op(call) => {
                f(call);
                for arg in &call.args {
                    arg.walk_ops(f);
                }
            }
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(Value::String(s)) => write!(f, "{:?}", &**s),
            Expr::Literal(value) => match value {
                Value::Null => f.write_str("null"),
                other => write!(f, "{}", other),
            },
            Expr::Var(path) => write!(f, "{}", path),
            Expr::Hash(name, value) => write!(f, "{}={}", name, value),
            Expr::Op(call) if call.args.is_empty() => write!(f, "({})", call.name),
            Expr::Op(call) => write!(f, "({} {})", call.name, call.args.iter().join(" ")),
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal(value)
    }
}

/// Argument list of an operation split into positional and named parts.
#[derive(Debug, Clone, Default)]
pub struct SplitArgs<'a> {
    pub positional: Vec<&'a Expr>,
    pub hash: IndexMap<&'a str, &'a Expr>,
}

impl<'a> SplitArgs<'a> {
    /// Block parameter names declared with `as |a b|`.
    pub fn block_params(&self) -> Vec<String> {
        block_params(self.hash.get("as").copied())
    }

    /// Named arguments other than `as`.
    pub fn hash_values(&self) -> impl Iterator<Item = (&'a str, &'a Expr)> + '_ {
        self.hash
            .iter()
            .filter(|(name, _)| **name != "as")
            .map(|(name, expr)| (*name, *expr))
    }

    pub fn has_hash_values(&self) -> bool {
        self.hash.keys().any(|name| *name != "as")
    }
}

pub fn split_args(args: &[Expr]) -> SplitArgs<'_> {
    let mut split = SplitArgs::default();
    for arg in args {
        match arg {
            Expr::Hash(name, value) => {
                split.hash.insert(name.as_str(), value.as_ref());
            }
            other => split.positional.push(other),
        }
    }
    split
}

fn block_params(declared: Option<&Expr>) -> Vec<String> {
    match declared.and_then(Expr::as_literal) {
        Some(Value::Array(names)) => names.iter().map(Value::key_string).collect(),
        Some(Value::String(name)) => vec![name.to_string()],
        _ => Vec::new(),
    }
}

/// Evaluated arguments handed to plain methods.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    pub positional: Vec<Value>,
    pub hash: IndexMap<String, Value>,
}

impl Arguments {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            hash: IndexMap::new(),
        }
    }

    pub fn get(&self, index: usize) -> &Value {
        self.positional.get(index).unwrap_or(&NULL)
    }

    pub fn named(&self, name: &str) -> &Value {
        self.hash.get(name).unwrap_or(&NULL)
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    pub fn last(&self) -> &Value {
        self.positional.last().unwrap_or(&NULL)
    }

    pub fn hash_object(&self) -> Value {
        let object: Object = self
            .hash
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Value::from(object)
    }
}
