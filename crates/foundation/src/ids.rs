use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// String identifiers shared with the map engine.
///
/// Engines address sources and layers by name, so ids are plain strings with a
/// type wrapper to keep source ids and layer ids from being mixed up.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a data source registered with the engine.
    SourceId
);

string_id!(
    /// Identifier of a style layer registered with the engine.
    LayerId
);

#[cfg(test)]
mod tests {
    use super::{LayerId, SourceId};
    use std::collections::BTreeMap;

    #[test]
    fn ids_serialize_as_bare_strings() {
        let id = LayerId::new("roads");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"roads\"");
        let back: LayerId = serde_json::from_str("\"roads\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn map_lookup_by_str() {
        let mut m = BTreeMap::new();
        m.insert(SourceId::from("s1"), 1);
        assert_eq!(m.get("s1"), Some(&1));
    }
}
