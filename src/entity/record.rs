use serde::{Deserialize, Serialize};

use super::{
    Base, BreedingUnit, Cohort, Entity, EntityKind, Facility, GenotypeMarker, HousingUnit, Line,
    Observation, Organism, Permit, Procedure, Project, Protocol, Sample, Strain, SupplyItem,
    Treatment,
};

/// Any record, tagged by kind.
///
/// This is the payload carried by [`Change`](crate::change::Change), so rule
/// implementations can match on the kinds they care about without a generic
/// parameter per entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum EntityRecord {
    Organism(Organism),
    Cohort(Cohort),
    HousingUnit(HousingUnit),
    Facility(Facility),
    BreedingUnit(BreedingUnit),
    Line(Line),
    Strain(Strain),
    GenotypeMarker(GenotypeMarker),
    Procedure(Procedure),
    Treatment(Treatment),
    Observation(Observation),
    Sample(Sample),
    Protocol(Protocol),
    Permit(Permit),
    Project(Project),
    SupplyItem(SupplyItem),
}

macro_rules! each_record {
    ($record:expr, $inner:ident => $body:expr) => {
        match $record {
            EntityRecord::Organism($inner) => $body,
            EntityRecord::Cohort($inner) => $body,
            EntityRecord::HousingUnit($inner) => $body,
            EntityRecord::Facility($inner) => $body,
            EntityRecord::BreedingUnit($inner) => $body,
            EntityRecord::Line($inner) => $body,
            EntityRecord::Strain($inner) => $body,
            EntityRecord::GenotypeMarker($inner) => $body,
            EntityRecord::Procedure($inner) => $body,
            EntityRecord::Treatment($inner) => $body,
            EntityRecord::Observation($inner) => $body,
            EntityRecord::Sample($inner) => $body,
            EntityRecord::Protocol($inner) => $body,
            EntityRecord::Permit($inner) => $body,
            EntityRecord::Project($inner) => $body,
            EntityRecord::SupplyItem($inner) => $body,
        }
    };
}

impl EntityRecord {
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        each_record!(self, inner => entity_kind_of(inner))
    }

    #[must_use]
    pub fn base(&self) -> &Base {
        each_record!(self, inner => inner.base())
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.base().id
    }

    /// Borrows the inner record if it is a `T`.
    #[must_use]
    pub fn downcast<T: Entity>(&self) -> Option<&T> {
        T::from_record(self)
    }

    /// Serializes the record to a JSON value.
    ///
    /// # Panics
    ///
    /// Never in practice: every record type has string map keys only, so
    /// conversion to a JSON value cannot fail.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("entity records always serialize to JSON")
    }
}

fn entity_kind_of<T: Entity>(_: &T) -> EntityKind {
    T::KIND
}
