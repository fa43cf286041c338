//! Chart values with deep merge support

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};

/// Values container with deep merge capability
///
/// Always holds a JSON object at the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(JsonValue);

impl Default for Values {
    fn default() -> Self {
        Self::new()
    }
}

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Parse values from YAML
    ///
    /// An empty document yields empty values. Anything other than a mapping
    /// at the root is rejected.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Wrap a JSON value, which must be an object (or null for empty)
    pub fn from_value(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Object(_) => Ok(Self(value)),
            JsonValue::Null => Ok(Self::new()),
            other => Err(CoreError::InvalidValues {
                message: format!("values must be a mapping, got {}", type_name(&other)),
            }),
        }
    }

    /// Deep merge another Values into this one
    ///
    /// Rules:
    /// - Scalars: overlay replaces base
    /// - Objects: recursive merge
    /// - Arrays: overlay replaces base (not appended)
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(&self.0, &parts)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a sequence",
        JsonValue::Object(_) => "a mapping",
    }
}

/// Deep merge two JSON values
fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Get a nested value by path
fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    if path.is_empty() {
        return Some(value);
    }

    let key = path[0];
    let remaining = &path[1..];

    match value {
        JsonValue::Object(map) => map.get(key).and_then(|v| get_nested(v, remaining)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_yaml() {
        let values = Values::from_yaml("replicaCount: 2\nimage:\n  tag: \"1.25\"\n").unwrap();
        assert_eq!(values.get("replicaCount"), Some(&json!(2)));
        assert_eq!(values.get("image.tag"), Some(&json!("1.25")));
        assert_eq!(values.get("image.missing"), None);
    }

    #[test]
    fn test_from_yaml_empty() {
        assert!(Values::from_yaml("").unwrap().is_empty());
        assert!(Values::from_yaml("  \n").unwrap().is_empty());
        assert!(Values::from_yaml("# only a comment\n").unwrap().is_empty());
    }

    #[test]
    fn test_from_yaml_rejects_non_mapping() {
        let err = Values::from_yaml("- a\n- b\n").unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"invalid values: values must be a mapping, got a sequence");
        assert!(Values::from_yaml("just a string").is_err());
    }

    #[test]
    fn test_from_yaml_malformed() {
        assert!(Values::from_yaml("key: [unclosed").is_err());
    }

    #[test]
    fn test_deep_merge() {
        let mut base = Values::from_value(json!({
            "image": {"repository": "nginx", "tag": "1.0"},
            "ports": [80, 443],
            "replicas": 1
        }))
        .unwrap();
        let overlay = Values::from_value(json!({
            "image": {"tag": "2.0"},
            "ports": [8080],
            "extra": true
        }))
        .unwrap();

        base.merge(&overlay);

        assert_eq!(
            base.inner(),
            &json!({
                "image": {"repository": "nginx", "tag": "2.0"},
                "ports": [8080],
                "replicas": 1,
                "extra": true
            })
        );
    }
}
