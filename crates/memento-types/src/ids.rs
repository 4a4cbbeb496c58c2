//! Newtype identifiers used throughout the knowledge graph.
//!
//! Every id is a thin wrapper around `String` rather than a bare `String`,
//! so that `EntityId` and `SessionId` can't be swapped at a call site by
//! mistake. They `Deref` to `str` for ergonomic comparisons and formatting.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

macro_rules! newtype_id {
    ($name:ident) => {
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

newtype_id!(EntityId);
newtype_id!(RelationshipId);
newtype_id!(SessionId);
newtype_id!(AgentId);
newtype_id!(CheckpointId);
newtype_id!(VersionId);
newtype_id!(TaskId);
newtype_id!(JobId);
newtype_id!(ChangeSetId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_as_inner_string() {
        let id = EntityId::from("f:a.ts");
        assert_eq!(id.to_string(), "f:a.ts");
        assert_eq!(id.as_str(), "f:a.ts");
    }

    #[test]
    fn distinct_newtypes_do_not_implicitly_convert() {
        let entity = EntityId::new("x");
        let session = SessionId::new("x");
        assert_eq!(entity.as_str(), session.as_str());
    }
}
