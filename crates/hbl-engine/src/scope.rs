//! The scope chain ("above" chain) threaded through nested blocks.
//!
//! A [`Frame`] is pushed by a block construct on its own stack and borrowed by
//! everything evaluated inside the block; nothing ever mutates a frame after
//! it is built.

use std::sync::Arc;

use hbl_core::value::Value;

use crate::engine::Engine;

/// Loop position exposed to `@index`, `@first`, `@last` and `index`/`length`.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    /// Sequence index, or the key when iterating a keyed collection.
    pub index: Value,
    /// Only sequences carry a length.
    pub length: Option<usize>,
}

impl Position {
    pub fn new(index: Value, length: Option<usize>) -> Self {
        Self { index, length }
    }

    /// True only for the numeric index `0`, so keys are never first.
    pub fn is_first(&self) -> bool {
        self.index.as_i64() == Some(0)
    }

    pub fn is_last(&self) -> bool {
        match (self.length.and_then(|length| length.checked_sub(1)), self.index.as_i64()) {
            (Some(last), Some(index)) => i64::try_from(last).is_ok_and(|last| last == index),
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct Frame<'a> {
    pub bindings: Vec<(Arc<str>, Value)>,
    pub position: Option<Position>,
    /// Context that was current when the frame was pushed.
    pub context: &'a Value,
    pub parent: Option<&'a Frame<'a>>,
}

impl<'a> Frame<'a> {
    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some((_, value)) = self.bindings.iter().find(|(key, _)| &**key == name) {
            return Some(value.clone());
        }
        let position = self.position.as_ref()?;
        match name {
            "index" => Some(position.index.clone()),
            "length" => Some(position.length.map_or(Value::Null, Value::from)),
            _ => None,
        }
    }

    /// Iterates this frame and its ancestors, innermost first.
    pub fn ancestors(&'a self) -> impl Iterator<Item = &'a Frame<'a>> {
        std::iter::successors(Some(self), |frame| frame.parent)
    }
}

/// Block parameter bindings for `as |item index|`.
pub fn block_bindings(params: &[Arc<str>], item: &Value, index: &Value) -> Vec<(Arc<str>, Value)> {
    let mut bindings = Vec::with_capacity(params.len());
    if let Some(name) = params.first() {
        bindings.push((name.clone(), item.clone()));
    }
    if let Some(name) = params.get(1) {
        bindings.push((name.clone(), index.clone()));
    }
    bindings
}

/// Everything an evaluation can see: the engine, the current context, the
/// innermost frame and the current loop position.
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub engine: &'a Engine,
    pub context: &'a Value,
    pub frame: Option<&'a Frame<'a>>,
    pub position: Option<&'a Position>,
}

impl<'a> Scope<'a> {
    pub fn root(engine: &'a Engine, context: &'a Value) -> Self {
        Self {
            engine,
            context,
            frame: None,
            position: None,
        }
    }

    /// A frame whose parent is this scope's frame and whose outer context is
    /// this scope's context.
    pub fn push(&self, bindings: Vec<(Arc<str>, Value)>, position: Option<Position>) -> Frame<'a> {
        Frame {
            bindings,
            position,
            context: self.context,
            parent: self.frame,
        }
    }

    /// Evaluates inside `frame` against `context`.
    pub fn enter<'b>(&self, context: &'b Value, frame: &'b Frame<'b>) -> Scope<'b>
    where
        'a: 'b,
    {
        Scope {
            engine: self.engine,
            context,
            frame: Some(frame),
            position: frame.position.as_ref(),
        }
    }

    /// Same frames, different context and position.
    pub fn rebase<'b>(&self, context: &'b Value, position: Option<&'b Position>) -> Scope<'b>
    where
        'a: 'b,
    {
        Scope {
            engine: self.engine,
            context,
            frame: self.frame,
            position,
        }
    }

    /// Up-scope lookup: leading `../` and `./` are dropped, then the name is
    /// searched in the context and every frame outward.
    pub fn lookup(&self, raw: &str) -> Value {
        let name = raw.replace("../", "").replace("./", "");
        let name = name.strip_prefix("this.").unwrap_or(&name);
        if name.is_empty() || name == "this" || name == "." {
            return self.context.clone();
        }
        let mut segments = name.split('.');
        let first = segments.next().unwrap_or_default();
        let rest: Vec<&str> = segments.collect();

        if let Some(found) = self.context.get(first).filter(|value| value.truthy()) {
            return found.get_path(&rest);
        }
        let Some(frame) = self.frame else {
            return Value::Null;
        };
        for frame in frame.ancestors() {
            if let Some(found) = frame.get(first) {
                return found.get_path(&rest);
            }
            if let Some(found) = frame.context.get(first) {
                return found.get_path(&rest);
            }
        }
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn lookup_walks_frames_outward() {
        let engine = Engine::isolated();
        let root = Value::from(json!({"team": "Red", "name": "root"}));
        let item = Value::from(json!({"name": "Ann", "empty": ""}));
        let scope = Scope::root(&engine, &root);
        let frame = scope.push(
            vec![(Arc::from("p"), Value::from(json!({"age": 3})))],
            Some(Position::new(Value::from(1), Some(2))),
        );
        let inner = scope.enter(&item, &frame);

        assert_eq!(inner.lookup("name"), Value::from("Ann"));
        assert_eq!(inner.lookup("../team"), Value::from("Red"));
        assert_eq!(inner.lookup("./this.name"), Value::from("Ann"));
        assert_eq!(inner.lookup("p.age"), Value::from(3));
        assert_eq!(inner.lookup("index"), Value::from(1));
        assert_eq!(inner.lookup("length"), Value::from(2));
        assert_eq!(inner.lookup("../"), item);
        assert_eq!(inner.lookup("missing"), Value::Null);
        assert!(inner.position.is_some_and(Position::is_last));
    }

    #[test]
    fn keyed_positions_are_never_first_or_last() {
        let keyed = Position::new(Value::from("a"), None);
        assert!(!keyed.is_first());
        assert!(!keyed.is_last());

        let only = Position::new(Value::from(0), Some(1));
        assert!(only.is_first() && only.is_last());
        let unsized_first = Position::new(Value::from(0), None);
        assert!(unsized_first.is_first() && !unsized_first.is_last());
    }

    #[test]
    fn falsy_context_fields_fall_through_to_ancestors() {
        let engine = Engine::isolated();
        let root = Value::from(json!({"empty": "outer"}));
        let item = Value::from(json!({"empty": ""}));
        let scope = Scope::root(&engine, &root);
        let frame = scope.push(Vec::new(), None);
        assert_eq!(scope.enter(&item, &frame).lookup("empty"), Value::from("outer"));
        assert_eq!(scope.rebase(&item, None).lookup("empty"), Value::Null);
    }
}
