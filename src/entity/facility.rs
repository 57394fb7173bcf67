use serde::{Deserialize, Serialize};

use super::status::{ensure_recognized, HousingEnvironment, HousingState};
use super::{entity_identity, lenient_count, nullable, retain_one, Base, Entity, EntityKind, RefCollector, Reference};
use crate::error::ValidationError;
use crate::value::Attributes;

/// A physical site that hosts housing units.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Facility {
    #[serde(flatten)]
    pub base: Base,
    pub code: String,
    pub name: String,
    pub zone: String,
    pub access_policy: String,
    pub environment_baselines: Attributes,
    /// Derived: housing units whose `facility_id` is this facility.
    #[serde(deserialize_with = "nullable")]
    pub housing_unit_ids: Vec<String>,
    /// Derived: projects that list this facility.
    #[serde(deserialize_with = "nullable")]
    pub project_ids: Vec<String>,
}

impl Facility {
    #[must_use]
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Replaces the environment baselines, treating `None` as empty.
    pub fn set_environment_baselines(&mut self, baselines: Option<Attributes>) {
        self.environment_baselines = Attributes::normalized(baselines);
    }
}

impl Entity for Facility {
    entity_identity!(Facility);

    fn references(&self) -> Vec<Reference<'_>> {
        Vec::new()
    }

    fn retain_references(&mut self, _exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        0
    }

    fn normalize(&mut self) {
        self.housing_unit_ids.clear();
        self.project_ids.clear();
    }
}

/// A tank, cage or enclosure inside a facility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HousingUnit {
    #[serde(flatten)]
    pub base: Base,
    pub name: String,
    pub facility_id: String,
    #[serde(deserialize_with = "lenient_count")]
    pub capacity: u32,
    pub environment: HousingEnvironment,
    pub state: HousingState,
}

impl HousingUnit {
    #[must_use]
    pub fn new(name: impl Into<String>, facility_id: impl Into<String>, capacity: u32) -> Self {
        Self {
            name: name.into(),
            facility_id: facility_id.into(),
            capacity,
            ..Self::default()
        }
    }
}

impl Entity for HousingUnit {
    entity_identity!(HousingUnit);

    fn references(&self) -> Vec<Reference<'_>> {
        RefCollector::default()
            .one(EntityKind::Facility, &self.facility_id)
            .finish()
    }

    fn retain_references(&mut self, exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        retain_one(&mut self.facility_id, EntityKind::Facility, exists)
    }

    fn check_statuses(&self) -> Result<(), ValidationError> {
        ensure_recognized(Self::KIND, "environment", self.environment.is_recognized(), self.environment.as_str())?;
        ensure_recognized(Self::KIND, "state", self.state.is_recognized(), self.state.as_str())
    }

    fn check_invariants(&self) -> Result<(), ValidationError> {
        if self.facility_id.is_empty() {
            return Err(ValidationError::MissingRelation {
                kind: Self::KIND,
                relation: "facility id",
            });
        }
        if self.capacity == 0 {
            return Err(ValidationError::InvalidField {
                kind: Self::KIND,
                field: "capacity",
                reason: "must be positive",
            });
        }
        self.check_statuses()
    }

    fn normalize(&mut self) {
        if let Some(environment) = self.environment.normalized() {
            self.environment = environment;
        }
        if let Some(state) = self.state.normalized() {
            self.state = state;
        }
    }

    fn repair_fields(&mut self) -> usize {
        if self.capacity == 0 {
            self.capacity = 1;
            return 1;
        }
        0
    }
}
