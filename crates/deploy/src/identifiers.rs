//! Newtype domain identifiers.
//!
//! Every name that flows from configuration or from a webhook payload into a
//! git invocation is a distinct newtype. This prevents accidentally passing,
//! for example, a [`RepoName`] where a [`BranchName`] is expected, even though
//! both are strings under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returned when a string identifier is constructed from an empty value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} must not be empty")]
pub struct EmptyIdentifier {
    /// Name of the identifier type that rejected the value.
    pub kind: &'static str,
}

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display,
// TryFrom<String> (used by serde so configuration cannot hold empty names).
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = EmptyIdentifier;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(EmptyIdentifier { kind: stringify!($name) })
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// The account that owns a remote repository (GitHub user or organisation,
    /// Bitbucket workspace) or, for Azure DevOps, the pusher's unique name.
    RemoteUser
}

string_id! {
    /// A remote repository name as reported by the provider (e.g. `"demo"`).
    RepoName
}

string_id! {
    /// A Git branch name without the `refs/heads/` prefix (e.g. `"master"`).
    BranchName
}

impl BranchName {
    /// Returns the fully qualified ref for this branch (`refs/heads/<name>`).
    pub fn to_ref(&self) -> String {
        format!("refs/heads/{}", self.0)
    }
}

/// Identifies a single webhook delivery.
///
/// Generated fresh for every incoming request; recorded on the request span so
/// all activity from one delivery (classification, sync, notification) can be
/// correlated in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(Uuid);

impl DeliveryId {
    /// Generates a new random delivery identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_names_are_rejected() {
        assert!(RepoName::new("").is_none());
        let err = BranchName::try_from(String::new()).unwrap_err();
        assert_eq!(err.to_string(), "BranchName must not be empty");
    }

    #[test]
    fn branch_ref_is_qualified() {
        let branch = BranchName::new("dev").unwrap();
        assert_eq!(branch.to_ref(), "refs/heads/dev");
        assert_eq!(branch.to_string(), "dev");
    }

    #[test]
    fn delivery_ids_are_unique() {
        assert_ne!(DeliveryId::new_random(), DeliveryId::new_random());
    }
}
