//! The transaction change log.

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityKind, EntityRecord};

/// What a change did to its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One committed mutation inside a transaction.
///
/// `before` is set for updates and deletes, `after` for creates and updates.
/// Both carry the decorated value as a caller would have read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub kind: EntityKind,
    pub action: Action,
    pub before: Option<EntityRecord>,
    pub after: Option<EntityRecord>,
}

impl Change {
    pub(crate) fn created<T: Entity>(after: T) -> Self {
        Self {
            kind: T::KIND,
            action: Action::Create,
            before: None,
            after: Some(after.into_record()),
        }
    }

    pub(crate) fn updated<T: Entity>(before: T, after: T) -> Self {
        Self {
            kind: T::KIND,
            action: Action::Update,
            before: Some(before.into_record()),
            after: Some(after.into_record()),
        }
    }

    pub(crate) fn deleted<T: Entity>(before: T) -> Self {
        Self {
            kind: T::KIND,
            action: Action::Delete,
            before: Some(before.into_record()),
            after: None,
        }
    }

    /// Id of the record this change touched.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        self.after
            .as_ref()
            .or(self.before.as_ref())
            .map_or("", EntityRecord::id)
    }

    /// The prior value, if it is a `T`.
    #[must_use]
    pub fn before_as<T: Entity>(&self) -> Option<&T> {
        self.before.as_ref().and_then(T::from_record)
    }

    /// The new value, if it is a `T`.
    #[must_use]
    pub fn after_as<T: Entity>(&self) -> Option<&T> {
        self.after.as_ref().and_then(T::from_record)
    }

    /// Pre-serialized form for consumers that do not link the entity types.
    #[must_use]
    pub fn payload_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind,
            "action": self.action,
            "before": self.before.as_ref().map(EntityRecord::to_json),
            "after": self.after.as_ref().map(EntityRecord::to_json),
        })
    }
}
