//! Member lookup over render data.
//!
//! Path resolution only ever asks two questions of a value: "what is your
//! member called `name`?" and "which member names do you have?".
//! [`ContextAdapter`] captures that, so the runtime does not care whether
//! the data came from a plain JSON document or from several objects
//! merged together.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

pub trait ContextAdapter {
    /// Borrow the member called `name`. Path lookup walks through this so
    /// only the final value is ever cloned.
    fn resolve_ref(&self, name: &str) -> Option<&Value>;

    fn resolve(&self, name: &str) -> Option<Value> {
        self.resolve_ref(name).cloned()
    }

    fn enumerate_names(&self) -> Vec<String>;
}

impl ContextAdapter for Value {
    fn resolve_ref(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(name),
            Value::Array(items) => {
                let index: usize = name.parse().ok()?;
                items.get(index)
            }
            _ => None,
        }
    }

    fn enumerate_names(&self) -> Vec<String> {
        match self {
            Value::Object(map) => map.keys().cloned().collect(),
            Value::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Several objects seen as one: a member resolves against the first object
/// that has it, with names compared case-insensitively.
///
/// ```
/// use serde_json::json;
/// use shimmybars::{ContextAdapter, MergedContext};
///
/// let merged = MergedContext::new()
///     .with(&json!({"name": "Marc"}))
///     .unwrap()
///     .with(&json!({"Name": "ignored", "city": "Wilmington"}))
///     .unwrap();
/// assert_eq!(merged.resolve("name"), Some(json!("Marc")));
/// assert_eq!(merged.resolve("CITY"), Some(json!("Wilmington")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MergedContext {
    objects: Vec<Value>,
}

impl MergedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<T: Serialize + ?Sized>(&mut self, object: &T) -> serde_json::Result<()> {
        self.objects.push(serde_json::to_value(object)?);
        Ok(())
    }

    pub fn with<T: Serialize + ?Sized>(mut self, object: &T) -> serde_json::Result<Self> {
        self.push(object)?;
        Ok(self)
    }
}

impl ContextAdapter for MergedContext {
    fn resolve_ref(&self, name: &str) -> Option<&Value> {
        self.objects.iter().find_map(|object| match object {
            Value::Object(map) => map.get(name).or_else(|| {
                map.iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            }),
            _ => None,
        })
    }

    fn enumerate_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for object in &self.objects {
            for name in object.enumerate_names() {
                if !names.iter().any(|seen| seen.eq_ignore_ascii_case(&name)) {
                    names.push(name);
                }
            }
        }
        names
    }
}

impl Serialize for MergedContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let names = self.enumerate_names();
        let mut map = serializer.serialize_map(Some(names.len()))?;
        for name in &names {
            if let Some(value) = self.resolve_ref(name) {
                map.serialize_entry(name, value)?;
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_resolves_object_members_and_array_indexes() {
        let value = json!({"items": ["a", "b"]});
        assert_eq!(value.resolve("items"), Some(json!(["a", "b"])));
        assert_eq!(value.resolve("missing"), None);

        let items = json!(["a", "b"]);
        assert_eq!(items.resolve("1"), Some(json!("b")));
        assert_eq!(items.resolve("2"), None);
        assert_eq!(items.resolve("x"), None);
        assert_eq!(json!("scalar").resolve("len"), None);
    }

    #[test]
    fn merged_first_object_wins() {
        let merged = MergedContext::new()
            .with(&json!({"a": 1}))
            .unwrap()
            .with(&json!({"a": 2, "b": 3}))
            .unwrap();
        assert_eq!(merged.resolve("a"), Some(json!(1)));
        assert_eq!(merged.resolve("b"), Some(json!(3)));
        assert_eq!(merged.resolve("c"), None);
    }

    #[test]
    fn resolve_ref_borrows_from_the_source_object() {
        let merged = MergedContext::new()
            .with(&json!({"Items": [1, 2]}))
            .unwrap();
        let items = merged.resolve_ref("items").unwrap();
        assert!(std::ptr::eq(items, &merged.objects[0]["Items"]));
        assert_eq!(items.resolve_ref("1"), Some(&json!(2)));
    }

    #[test]
    fn merged_names_are_deduplicated_case_insensitively() {
        let merged = MergedContext::new()
            .with(&json!({"Name": "x"}))
            .unwrap()
            .with(&json!({"name": "y", "city": "z"}))
            .unwrap();
        assert_eq!(merged.enumerate_names(), vec!["Name", "city"]);
    }

    #[test]
    fn merged_serializes_as_one_object() {
        let merged = MergedContext::new()
            .with(&json!({"name": "Marc"}))
            .unwrap()
            .with(&json!({"city": "Wilmington"}))
            .unwrap();
        let value = serde_json::to_value(&merged).unwrap();
        assert_eq!(value, json!({"name": "Marc", "city": "Wilmington"}));
    }
}
