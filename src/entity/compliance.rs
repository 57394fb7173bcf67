use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{ensure_recognized, PermitStatus, ProtocolStatus};
use super::{
    dedupe, entity_identity, lenient_count, nullable, retain_all, Base, Entity, EntityKind, RefCollector,
    Reference,
};
use crate::error::ValidationError;
use crate::value::Attributes;

/// An approved animal-use protocol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Protocol {
    #[serde(flatten)]
    pub base: Base,
    pub code: String,
    pub title: String,
    pub description: String,
    #[serde(deserialize_with = "lenient_count")]
    pub max_subjects: u32,
    pub status: ProtocolStatus,
}

impl Protocol {
    #[must_use]
    pub fn new(code: impl Into<String>, title: impl Into<String>, max_subjects: u32) -> Self {
        Self {
            code: code.into(),
            title: title.into(),
            max_subjects,
            ..Self::default()
        }
    }
}

impl Entity for Protocol {
    entity_identity!(Protocol);

    fn references(&self) -> Vec<Reference<'_>> {
        Vec::new()
    }

    fn retain_references(&mut self, _exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        0
    }

    fn check_statuses(&self) -> Result<(), ValidationError> {
        ensure_recognized(Self::KIND, "status", self.status.is_recognized(), self.status.as_str())
    }

    fn normalize(&mut self) {
        if let Some(status) = self.status.normalized() {
            self.status = status;
        }
    }
}

/// A regulatory permit covering facilities and protocols.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permit {
    #[serde(flatten)]
    pub base: Base,
    pub permit_number: String,
    pub authority: String,
    pub status: PermitStatus,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(deserialize_with = "nullable")]
    pub allowed_activities: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub facility_ids: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub protocol_ids: Vec<String>,
    pub notes: String,
}

impl Entity for Permit {
    entity_identity!(Permit);

    fn references(&self) -> Vec<Reference<'_>> {
        RefCollector::default()
            .all(EntityKind::Facility, &self.facility_ids)
            .all(EntityKind::Protocol, &self.protocol_ids)
            .finish()
    }

    fn retain_references(&mut self, exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        retain_all(&mut self.facility_ids, EntityKind::Facility, exists)
            + retain_all(&mut self.protocol_ids, EntityKind::Protocol, exists)
    }

    fn check_statuses(&self) -> Result<(), ValidationError> {
        ensure_recognized(Self::KIND, "status", self.status.is_recognized(), self.status.as_str())
    }

    fn check_invariants(&self) -> Result<(), ValidationError> {
        if self.valid_until < self.valid_from {
            return Err(ValidationError::InvalidField {
                kind: Self::KIND,
                field: "validity window",
                reason: "ends before it starts",
            });
        }
        self.check_statuses()
    }

    fn normalize(&mut self) {
        if let Some(status) = self.status.normalized() {
            self.status = status;
        }
        dedupe(&mut self.allowed_activities);
        dedupe(&mut self.facility_ids);
        dedupe(&mut self.protocol_ids);
    }
}

/// A research project grouping facilities, protocols and work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    #[serde(flatten)]
    pub base: Base,
    pub code: String,
    pub title: String,
    pub description: String,
    #[serde(deserialize_with = "nullable")]
    pub facility_ids: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub protocol_ids: Vec<String>,
    /// Derived: organisms assigned to this project.
    #[serde(deserialize_with = "nullable")]
    pub organism_ids: Vec<String>,
    /// Derived: procedures run under this project.
    #[serde(deserialize_with = "nullable")]
    pub procedure_ids: Vec<String>,
    /// Derived: supply items allocated to this project.
    #[serde(deserialize_with = "nullable")]
    pub supply_item_ids: Vec<String>,
}

impl Project {
    #[must_use]
    pub fn new(code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

impl Entity for Project {
    entity_identity!(Project);

    fn references(&self) -> Vec<Reference<'_>> {
        RefCollector::default()
            .all(EntityKind::Facility, &self.facility_ids)
            .all(EntityKind::Protocol, &self.protocol_ids)
            .finish()
    }

    fn retain_references(&mut self, exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        retain_all(&mut self.facility_ids, EntityKind::Facility, exists)
            + retain_all(&mut self.protocol_ids, EntityKind::Protocol, exists)
    }

    fn normalize(&mut self) {
        dedupe(&mut self.facility_ids);
        dedupe(&mut self.protocol_ids);
        self.organism_ids.clear();
        self.procedure_ids.clear();
        self.supply_item_ids.clear();
    }
}

/// A consumable tracked per facility and project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupplyItem {
    #[serde(flatten)]
    pub base: Base,
    pub sku: String,
    pub name: String,
    pub description: String,
    #[serde(deserialize_with = "lenient_count")]
    pub quantity_on_hand: u32,
    pub unit: String,
    pub lot_number: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "nullable")]
    pub facility_ids: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub project_ids: Vec<String>,
    #[serde(deserialize_with = "lenient_count")]
    pub reorder_level: u32,
    pub attributes: Attributes,
}

impl SupplyItem {
    /// Whether stock has fallen to or below the reorder level.
    #[must_use]
    pub const fn requires_reorder(&self) -> bool {
        self.quantity_on_hand <= self.reorder_level
    }

    /// Whether the item has expired as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

impl Entity for SupplyItem {
    entity_identity!(SupplyItem);

    fn references(&self) -> Vec<Reference<'_>> {
        RefCollector::default()
            .all(EntityKind::Facility, &self.facility_ids)
            .all(EntityKind::Project, &self.project_ids)
            .finish()
    }

    fn retain_references(&mut self, exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        retain_all(&mut self.facility_ids, EntityKind::Facility, exists)
            + retain_all(&mut self.project_ids, EntityKind::Project, exists)
    }

    fn normalize(&mut self) {
        dedupe(&mut self.facility_ids);
        dedupe(&mut self.project_ids);
    }
}
