use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Style properties of one layer (`paint` or `layout`), keyed by the engine's
/// property names. Values are style-spec JSON, including expressions.
///
/// Backed by a sorted map so diffs and serialized output are deterministic.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyMap(BTreeMap<String, Value>);

/// A single property difference. `value == None` resets the property to the
/// engine default.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyChange {
    pub name: String,
    pub value: Option<Value>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Per-key changes turning `self` into `next`, in key order.
    ///
    /// Keys only in `self` are reported with `value: None`.
    pub fn diff(&self, next: &Self) -> Vec<PropertyChange> {
        let mut out = Vec::new();
        for (name, value) in &next.0 {
            if self.0.get(name) != Some(value) {
                out.push(PropertyChange {
                    name: name.clone(),
                    value: Some(value.clone()),
                });
            }
        }
        for name in self.0.keys() {
            if !next.0.contains_key(name) {
                out.push(PropertyChange {
                    name: name.clone(),
                    value: None,
                });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}

impl FromIterator<(String, Value)> for PropertyMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{PropertyChange, PropertyMap};
    use serde_json::json;

    #[test]
    fn diff_reports_only_changed_keys() {
        let a = PropertyMap::new()
            .with("fill-color", "#f00")
            .with("fill-opacity", 0.5);
        let b = PropertyMap::new()
            .with("fill-color", "#f00")
            .with("fill-opacity", 0.8);
        assert_eq!(
            a.diff(&b),
            vec![PropertyChange {
                name: "fill-opacity".to_string(),
                value: Some(json!(0.8)),
            }]
        );
    }

    #[test]
    fn removed_keys_reset_to_default() {
        let a = PropertyMap::new().with("line-width", 2);
        let b = PropertyMap::new().with("line-color", "blue");
        let changes = a.diff(&b);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].name, "line-color");
        assert_eq!(changes[1], PropertyChange {
            name: "line-width".to_string(),
            value: None,
        });
    }

    #[test]
    fn identical_maps_have_no_diff() {
        let a = PropertyMap::new().with("circle-radius", json!(["get", "r"]));
        assert!(a.diff(&a.clone()).is_empty());
    }
}
