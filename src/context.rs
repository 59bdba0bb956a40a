//! Render-time scope frames.
//!
//! A render walks a chain of [`Frame`]s: the root frame wraps the data the
//! caller passed in, and every `with`, `each` or custom block helper that
//! changes context pushes a child frame borrowing its parent. Frames live on
//! the stack of a single render call and are never mutated, so concurrent
//! renders of one template cannot observe each other.

use crate::adapter::ContextAdapter;
use crate::ast::{Anchor, Path};
use serde_json::Value;
use std::borrow::Cow;

/// Loop metadata exposed as `@index`, `@first`, `@last` and `@key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iteration {
    pub index: usize,
    pub first: bool,
    pub last: bool,
    pub key: Option<String>,
}

impl Iteration {
    pub fn new(index: usize, len: usize) -> Self {
        Self {
            index,
            first: index == 0,
            last: index + 1 == len,
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    fn get(&self, name: &str) -> Option<Value> {
        match name {
            "index" => Some(Value::from(self.index)),
            "first" => Some(Value::Bool(self.first)),
            "last" => Some(Value::Bool(self.last)),
            "key" => self.key.clone().map(Value::String),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Frame<'a> {
    value: Cow<'a, Value>,
    parent: Option<&'a Frame<'a>>,
    iteration: Option<Iteration>,
}

impl<'a> Frame<'a> {
    pub fn root(value: &'a Value) -> Self {
        Self {
            value: Cow::Borrowed(value),
            parent: None,
            iteration: None,
        }
    }

    pub fn child(&'a self, value: Value) -> Frame<'a> {
        Frame {
            value: Cow::Owned(value),
            parent: Some(self),
            iteration: None,
        }
    }

    pub fn iteration_child(&'a self, value: Value, iteration: Iteration) -> Frame<'a> {
        Frame {
            value: Cow::Owned(value),
            parent: Some(self),
            iteration: Some(iteration),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn parent(&self) -> Option<&Frame<'a>> {
        self.parent
    }

    pub fn iteration(&self) -> Option<&Iteration> {
        self.iteration.as_ref()
    }

    /// The outermost frame of the render.
    pub fn outermost(&self) -> &Frame<'a> {
        let mut frame = self;
        while let Some(parent) = frame.parent {
            frame = parent;
        }
        frame
    }

    /// Climb `hops` parent links, stopping at the root.
    pub fn ancestor(&self, hops: usize) -> &Frame<'a> {
        let mut frame = self;
        for _ in 0..hops {
            match frame.parent {
                Some(parent) => frame = parent,
                None => break,
            }
        }
        frame
    }

    /// Resolve a path against this frame. `None` is the undefined marker.
    pub fn lookup(&self, path: &Path) -> Option<Value> {
        match &path.anchor {
            Anchor::Root => resolve_segments(self.outermost().value(), &path.segments).cloned(),
            Anchor::Current => {
                resolve_segments(self.ancestor(path.parent_hops).value(), &path.segments).cloned()
            }
            Anchor::Data(name) => {
                let data = self.ancestor(path.parent_hops).data(name)?;
                resolve_segments(&data, &path.segments).cloned()
            }
        }
    }

    /// Iteration metadata from the nearest frame that has any.
    fn data(&self, name: &str) -> Option<Value> {
        let mut frame = Some(self);
        while let Some(current) = frame {
            if let Some(iteration) = &current.iteration {
                return iteration.get(name);
            }
            frame = current.parent;
        }
        None
    }
}

/// Walks by reference; callers clone the leaf.
fn resolve_segments<'v>(start: &'v Value, segments: &[String]) -> Option<&'v Value> {
    segments
        .iter()
        .try_fold(start, |value, segment| value.resolve_ref(segment))
}

/// Truthiness used by `if`, `unless`, `with` and sections.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(_) => true,
    }
}

pub fn is_defined_truthy(value: Option<&Value>) -> bool {
    value.is_some_and(is_truthy)
}

/// String form written for `{{path}}`.
pub fn to_output(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => Cow::Borrowed(s),
        Value::Bool(b) => Cow::Owned(b.to_string()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        Value::Array(items) => Cow::Owned(
            items
                .iter()
                .map(|item| to_output(item).into_owned())
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::Object(_) => Cow::Owned(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truthiness_table() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!(true)));
        assert!(is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("x")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!([1])));
        assert!(!is_truthy(&json!({})));
        assert!(is_truthy(&json!({"a": 1})));
        assert!(!is_defined_truthy(None));
    }

    #[test]
    fn output_coercion() {
        assert_eq!(to_output(&json!(null)), "");
        assert_eq!(to_output(&json!("a")), "a");
        assert_eq!(to_output(&json!(0)), "0");
        assert_eq!(to_output(&json!(1.5)), "1.5");
        assert_eq!(to_output(&json!(true)), "true");
        assert_eq!(to_output(&json!(["a", 1, null])), "a,1,");
        assert_eq!(to_output(&json!({"a": 1})), r#"{"a":1}"#);
    }

    #[test]
    fn lookup_climbs_parents_and_reaches_root() {
        let data = json!({"Bar": "Foo", "inner": {"x": 1}});
        let root = Frame::root(&data);
        let inner = root.child(json!({"x": 1}));
        let deeper = inner.child(json!("leaf"));

        assert_eq!(deeper.lookup(&Path::parse("this")), Some(json!("leaf")));
        assert_eq!(deeper.lookup(&Path::parse("../x")), Some(json!(1)));
        assert_eq!(deeper.lookup(&Path::parse("../../Bar")), Some(json!("Foo")));
        assert_eq!(deeper.lookup(&Path::parse("@root.Bar")), Some(json!("Foo")));
        // Climbing past the root stays at the root.
        assert_eq!(deeper.lookup(&Path::parse("../../../Bar")), Some(json!("Foo")));
    }

    #[test]
    fn missing_segment_is_undefined() {
        let data = json!({"a": {"b": 1}});
        let root = Frame::root(&data);
        assert_eq!(root.lookup(&Path::parse("a.c")), None);
        assert_eq!(root.lookup(&Path::parse("a.b.c")), None);
        assert_eq!(root.lookup(&Path::parse("@index")), None);
    }

    #[test]
    fn data_variables_come_from_nearest_iteration() {
        let data = json!({});
        let root = Frame::root(&data);
        let item = root.iteration_child(json!("a"), Iteration::new(2, 3).with_key("k"));
        let nested = item.child(json!({"y": 1}));

        assert_eq!(nested.lookup(&Path::parse("@index")), Some(json!(2)));
        assert_eq!(nested.lookup(&Path::parse("@first")), Some(json!(false)));
        assert_eq!(nested.lookup(&Path::parse("@last")), Some(json!(true)));
        assert_eq!(nested.lookup(&Path::parse("@key")), Some(json!("k")));
    }
}
