//! Error types for ColonyCore.
//!
//! Every failure the store reports to a caller is a variant of [`ColonyError`].
//! Validation problems are raised before any mutation, so a caller that sees
//! one can assume the transaction's working copy is exactly as it was.

use std::time::Duration;

use thiserror::Error;

use crate::entity::EntityKind;
use crate::rules::RuleResult;
use crate::storage::StorageError;

/// Validation errors raised while checking a record before it is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required relation was left empty.
    #[error("{kind} requires {relation}")]
    MissingRelation {
        /// Kind of the record being written.
        kind: EntityKind,
        /// Human-readable name of the missing relation.
        relation: &'static str,
    },

    /// An authoritative reference points at an id that does not exist.
    #[error("{target} \"{id}\" not found for {owner}")]
    UnknownReference {
        /// Kind of the record being written.
        owner: EntityKind,
        /// Kind the reference should resolve to.
        target: EntityKind,
        /// The dangling id.
        id: String,
    },

    /// A field holds a value outside its allowed range.
    #[error("{kind} {field} {reason}")]
    InvalidField {
        kind: EntityKind,
        field: &'static str,
        reason: &'static str,
    },

    /// An enumerated field holds a value outside its recognized set.
    #[error("{kind} {field} has unrecognized value \"{value}\"")]
    UnrecognizedValue {
        kind: EntityKind,
        field: &'static str,
        value: String,
    },

    /// A record references itself where that is not allowed.
    #[error("{kind} \"{id}\" cannot reference itself as {relation}")]
    SelfReference {
        kind: EntityKind,
        id: String,
        relation: &'static str,
    },
}

/// Errors raised while the rule engine evaluates a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("rule evaluation exceeded its deadline of {}ms", .budget.as_millis())]
    DeadlineExceeded { budget: Duration },

    #[error("rule evaluation was cancelled before rule '{rule}'")]
    Cancelled { rule: String },

    #[error("rule '{rule}' failed: {message}")]
    RuleFailed { rule: String, message: String },
}

/// The top-level error type for ColonyCore.
#[derive(Debug, Error)]
pub enum ColonyError {
    /// No record of this kind carries the id.
    #[error("{kind} \"{id}\" not found")]
    NotFound { kind: EntityKind, id: String },

    /// A create supplied an id that is already taken.
    #[error("{kind} \"{id}\" already exists")]
    AlreadyExists { kind: EntityKind, id: String },

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A delete was refused because a live record still references the target.
    #[error("{kind} \"{id}\" still referenced by {dependent_kind} \"{dependent_id}\"")]
    ReferentialIntegrity {
        kind: EntityKind,
        id: String,
        dependent_kind: EntityKind,
        dependent_id: String,
    },

    /// The rule engine returned at least one blocking violation.
    #[error("transaction blocked by rules: {}", .0.summary())]
    RuleViolation(RuleResult),

    #[error("evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A transaction callback chose to roll back.
    #[error("transaction aborted: {reason}")]
    Aborted { reason: String },

    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl ColonyError {
    /// Builds an [`ColonyError::Aborted`] error, for callbacks that want to roll back.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    #[must_use]
    pub const fn is_referential_integrity(&self) -> bool {
        matches!(self, Self::ReferentialIntegrity { .. })
    }

    #[must_use]
    pub const fn is_rule_violation(&self) -> bool {
        matches!(self, Self::RuleViolation(_))
    }

    /// Returns the rule result carried by a [`ColonyError::RuleViolation`].
    #[must_use]
    pub const fn rule_result(&self) -> Option<&RuleResult> {
        match self {
            Self::RuleViolation(result) => Some(result),
            _ => None,
        }
    }
}

/// Result type alias for ColonyCore operations.
pub type ColonyResult<T> = Result<T, ColonyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Severity, Violation};

    #[test]
    fn missing_relation_reads_naturally() {
        let err = ValidationError::MissingRelation {
            kind: EntityKind::Treatment,
            relation: "procedure id",
        };
        assert_eq!(format!("{err}"), "treatment requires procedure id");
    }

    #[test]
    fn unknown_reference_names_both_kinds() {
        let err = ValidationError::UnknownReference {
            owner: EntityKind::Treatment,
            target: EntityKind::Organism,
            id: "o-1".to_string(),
        };
        assert_eq!(format!("{err}"), "organism \"o-1\" not found for treatment");
    }

    #[test]
    fn referential_integrity_names_dependent_kind() {
        let err = ColonyError::ReferentialIntegrity {
            kind: EntityKind::Facility,
            id: "f".to_string(),
            dependent_kind: EntityKind::HousingUnit,
            dependent_id: "h".to_string(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("housing unit"));
        assert!(err.is_referential_integrity());
        assert!(!err.is_validation());
    }

    #[test]
    fn rule_violation_lists_blocking_messages() {
        let mut result = RuleResult::default();
        result.push(Violation::new("capacity", Severity::Block, "housing over capacity"));
        result.push(Violation::new("audit", Severity::Log, "noted"));
        let err = ColonyError::RuleViolation(result);
        let msg = format!("{err}");
        assert!(msg.contains("housing over capacity"));
        assert!(!msg.contains("noted"));
        assert_eq!(err.rule_result().map(|r| r.violations.len()), Some(2));
    }

    #[test]
    fn deadline_message_reports_budget() {
        let err = EvaluationError::DeadlineExceeded {
            budget: Duration::from_millis(250),
        };
        assert!(format!("{err}").contains("250ms"));
    }
}
