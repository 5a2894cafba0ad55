//! Identifiers.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::error::ConversationError;

/// Stable conversation identifier. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConversationId(String);

impl ConversationId {
    /// Validate and wrap a conversation id.
    ///
    /// # Errors
    ///
    /// - `ConversationError::InvalidArgument` if `id` is empty
    pub fn new(id: impl Into<String>) -> Result<Self, ConversationError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ConversationError::invalid_argument("conversation id must not be empty"));
        }
        Ok(Self(id))
    }

    /// Id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ConversationId {
    type Error = ConversationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> Self {
        id.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an id.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Participant (client) identifier.
    ClientId
);

string_id!(
    /// Server-issued message identifier.
    MessageId
);

/// Normalized set of participant ids for membership requests.
///
/// A single id becomes a one-element set; duplicates collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Participants(BTreeSet<ClientId>);

impl Participants {
    /// Number of distinct ids.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no ids are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate ids in order.
    pub fn iter(&self) -> impl Iterator<Item = &ClientId> {
        self.0.iter()
    }

    /// Ids as wire strings.
    pub fn to_wire(&self) -> Vec<String> {
        self.0.iter().map(|id| id.as_str().to_string()).collect()
    }
}

impl From<ClientId> for Participants {
    fn from(id: ClientId) -> Self {
        Self(BTreeSet::from([id]))
    }
}

impl From<&str> for Participants {
    fn from(id: &str) -> Self {
        Self::from(ClientId::from(id))
    }
}

impl From<String> for Participants {
    fn from(id: String) -> Self {
        Self::from(ClientId::from(id))
    }
}

impl<T: Into<ClientId>> From<Vec<T>> for Participants {
    fn from(ids: Vec<T>) -> Self {
        ids.into_iter().collect()
    }
}

impl<T: Into<ClientId>, const N: usize> From<[T; N]> for Participants {
    fn from(ids: [T; N]) -> Self {
        ids.into_iter().collect()
    }
}

impl<T: Into<ClientId>> FromIterator<T> for Participants {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl IntoIterator for Participants {
    type Item = ClientId;
    type IntoIter = std::collections::btree_set::IntoIter<ClientId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
