//! Registry of serializer-known object types.

use std::collections::BTreeSet;

use serde_json::Value;
use tandem_core::SerializationError;
use tandem_core::constants::{ENVELOPE_TYPE, TYPE_TAG};

/// Set of object type names a serializer accepts.
///
/// Objects in an argument graph that carry a `"$type"` tag must name a
/// registered type. Untagged objects are plain data and always pass.
/// The envelope type is always registered.
#[derive(Clone, Debug)]
pub struct TypeRegistry {
    names: BTreeSet<String>,
}

impl TypeRegistry {
    /// Registry holding only the envelope type.
    pub fn new() -> Self {
        let mut names = BTreeSet::new();
        let _ = names.insert(ENVELOPE_TYPE.to_string());
        Self { names }
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with_type(mut self, name: impl Into<String>) -> Self {
        self.register(name);
        self
    }

    /// Register a type name. Re-registering is a no-op.
    pub fn register(&mut self, name: impl Into<String>) {
        let _ = self.names.insert(name.into());
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Walk `value` and reject any unregistered `"$type"` tag.
    pub fn check_value(&self, value: &Value) -> Result<(), SerializationError> {
        match value {
            Value::Array(items) => self.check_values(items),
            Value::Object(map) => {
                if let Some(tag) = map.get(TYPE_TAG) {
                    let name = tag.as_str().ok_or_else(|| SerializationError::UnexpectedToken {
                        expected: "string type tag",
                        found: tag.to_string(),
                    })?;
                    if !self.contains(name) {
                        return Err(SerializationError::UnregisteredType {
                            type_name: name.to_string(),
                        });
                    }
                }
                map.values().try_for_each(|v| self.check_value(v))
            }
            _ => Ok(()),
        }
    }

    /// [`check_value`](Self::check_value) over a slice.
    pub fn check_values(&self, values: &[Value]) -> Result<(), SerializationError> {
        values.iter().try_for_each(|v| self.check_value(v))
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn envelope_type_always_present() {
        let reg = TypeRegistry::new();
        assert!(reg.contains(ENVELOPE_TYPE));
        assert_eq!(reg.names().count(), 1);
    }

    #[test]
    fn untagged_values_pass() {
        let reg = TypeRegistry::new();
        let value = json!({"a": [1, 2, {"b": null}], "c": "text"});
        assert!(reg.check_value(&value).is_ok());
    }

    #[test]
    fn registered_tag_passes() {
        let reg = TypeRegistry::new().with_type("demo.Point");
        let value = json!({"$type": "demo.Point", "x": 1});
        assert!(reg.check_value(&value).is_ok());
    }

    #[test]
    fn unregistered_tag_rejected() {
        let reg = TypeRegistry::new();
        let value = json!({"$type": "demo.Point"});
        assert_matches!(
            reg.check_value(&value),
            Err(SerializationError::UnregisteredType { type_name }) if type_name == "demo.Point"
        );
    }

    #[test]
    fn nested_unregistered_tag_rejected() {
        let reg = TypeRegistry::new().with_type("demo.Outer");
        let value = json!([{"$type": "demo.Outer", "inner": {"$type": "demo.Inner"}}]);
        assert_matches!(
            reg.check_value(&value),
            Err(SerializationError::UnregisteredType { .. })
        );
    }

    #[test]
    fn non_string_tag_rejected() {
        let reg = TypeRegistry::new();
        assert_matches!(
            reg.check_value(&json!({"$type": 5})),
            Err(SerializationError::UnexpectedToken { .. })
        );
    }

    #[test]
    fn names_are_sorted() {
        let reg = TypeRegistry::new().with_type("z.Last").with_type("a.First");
        let names: Vec<_> = reg.names().collect();
        assert_eq!(names, vec!["a.First", ENVELOPE_TYPE, "z.Last"]);
    }
}
