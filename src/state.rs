//! The state container.
//!
//! [`ColonyState`] holds one ordered map per entity kind. `Clone` is the
//! isolation primitive of the whole store: every transaction and every view
//! works on its own clone, and because all records are owned data the clone
//! shares nothing with its source.

use std::collections::BTreeMap;

use crate::entity::{
    BreedingUnit, Cohort, Entity, EntityKind, Facility, GenotypeMarker, HousingUnit, Line,
    Observation, Organism, Permit, Procedure, Project, Protocol, Sample, Strain, SupplyItem,
    Treatment,
};

/// All records, keyed by id within each kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColonyState {
    pub(crate) organisms: BTreeMap<String, Organism>,
    pub(crate) cohorts: BTreeMap<String, Cohort>,
    pub(crate) housing: BTreeMap<String, HousingUnit>,
    pub(crate) facilities: BTreeMap<String, Facility>,
    pub(crate) breeding: BTreeMap<String, BreedingUnit>,
    pub(crate) lines: BTreeMap<String, Line>,
    pub(crate) strains: BTreeMap<String, Strain>,
    pub(crate) markers: BTreeMap<String, GenotypeMarker>,
    pub(crate) procedures: BTreeMap<String, Procedure>,
    pub(crate) treatments: BTreeMap<String, Treatment>,
    pub(crate) observations: BTreeMap<String, Observation>,
    pub(crate) samples: BTreeMap<String, Sample>,
    pub(crate) protocols: BTreeMap<String, Protocol>,
    pub(crate) permits: BTreeMap<String, Permit>,
    pub(crate) projects: BTreeMap<String, Project>,
    pub(crate) supplies: BTreeMap<String, SupplyItem>,
}

/// A record that lives in its own table of [`ColonyState`].
///
/// Implemented for every entity type; [`Stored::decorate`] fills in derived
/// back-reference lists for the kinds that have them.
pub trait Stored: Entity {
    fn table(state: &ColonyState) -> &BTreeMap<String, Self>;

    fn table_mut(state: &mut ColonyState) -> &mut BTreeMap<String, Self>;

    /// Recomputes derived fields from `state`. No-op for undecorated kinds.
    fn decorate(&mut self, _state: &ColonyState) {}
}

macro_rules! stored {
    ($($ty:ty => $field:ident),+ $(,)?) => {
        $(
            impl Stored for $ty {
                fn table(state: &ColonyState) -> &BTreeMap<String, Self> {
                    &state.$field
                }

                fn table_mut(state: &mut ColonyState) -> &mut BTreeMap<String, Self> {
                    &mut state.$field
                }
            }
        )+
    };
}

stored! {
    Organism => organisms,
    Cohort => cohorts,
    HousingUnit => housing,
    BreedingUnit => breeding,
    Line => lines,
    Strain => strains,
    GenotypeMarker => markers,
    Treatment => treatments,
    Observation => observations,
    Sample => samples,
    Protocol => protocols,
    Permit => permits,
    SupplyItem => supplies,
}

/// The first record found still referencing a given id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Referrer {
    pub kind: EntityKind,
    pub id: String,
}

fn referrer_in<T: Entity>(
    table: &BTreeMap<String, T>,
    kind: EntityKind,
    id: &str,
) -> Option<Referrer> {
    table
        .values()
        .find(|record| {
            record
                .references()
                .iter()
                .any(|reference| reference.kind == kind && reference.id == id)
        })
        .map(|record| Referrer {
            kind: T::KIND,
            id: record.id().to_string(),
        })
}

impl ColonyState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a record of `kind` with `id` exists.
    #[must_use]
    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        match kind {
            EntityKind::Organism => self.organisms.contains_key(id),
            EntityKind::Cohort => self.cohorts.contains_key(id),
            EntityKind::HousingUnit => self.housing.contains_key(id),
            EntityKind::Facility => self.facilities.contains_key(id),
            EntityKind::BreedingUnit => self.breeding.contains_key(id),
            EntityKind::Line => self.lines.contains_key(id),
            EntityKind::Strain => self.strains.contains_key(id),
            EntityKind::GenotypeMarker => self.markers.contains_key(id),
            EntityKind::Procedure => self.procedures.contains_key(id),
            EntityKind::Treatment => self.treatments.contains_key(id),
            EntityKind::Observation => self.observations.contains_key(id),
            EntityKind::Sample => self.samples.contains_key(id),
            EntityKind::Protocol => self.protocols.contains_key(id),
            EntityKind::Permit => self.permits.contains_key(id),
            EntityKind::Project => self.projects.contains_key(id),
            EntityKind::SupplyItem => self.supplies.contains_key(id),
        }
    }

    /// Number of records of `kind`.
    #[must_use]
    pub fn count(&self, kind: EntityKind) -> usize {
        match kind {
            EntityKind::Organism => self.organisms.len(),
            EntityKind::Cohort => self.cohorts.len(),
            EntityKind::HousingUnit => self.housing.len(),
            EntityKind::Facility => self.facilities.len(),
            EntityKind::BreedingUnit => self.breeding.len(),
            EntityKind::Line => self.lines.len(),
            EntityKind::Strain => self.strains.len(),
            EntityKind::GenotypeMarker => self.markers.len(),
            EntityKind::Procedure => self.procedures.len(),
            EntityKind::Treatment => self.treatments.len(),
            EntityKind::Observation => self.observations.len(),
            EntityKind::Sample => self.samples.len(),
            EntityKind::Protocol => self.protocols.len(),
            EntityKind::Permit => self.permits.len(),
            EntityKind::Project => self.projects.len(),
            EntityKind::SupplyItem => self.supplies.len(),
        }
    }

    /// Total number of records across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        EntityKind::ALL.iter().map(|kind| self.count(*kind)).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw (undecorated) record lookup.
    #[must_use]
    pub fn get<T: Stored>(&self, id: &str) -> Option<&T> {
        T::table(self).get(id)
    }

    /// Finds a record that authoritatively references `(kind, id)`.
    ///
    /// Tables are scanned in bucket order and records in id order, so the
    /// answer is deterministic.
    #[must_use]
    pub fn find_referrer(&self, kind: EntityKind, id: &str) -> Option<Referrer> {
        referrer_in(&self.organisms, kind, id)
            .or_else(|| referrer_in(&self.cohorts, kind, id))
            .or_else(|| referrer_in(&self.housing, kind, id))
            .or_else(|| referrer_in(&self.facilities, kind, id))
            .or_else(|| referrer_in(&self.breeding, kind, id))
            .or_else(|| referrer_in(&self.lines, kind, id))
            .or_else(|| referrer_in(&self.strains, kind, id))
            .or_else(|| referrer_in(&self.markers, kind, id))
            .or_else(|| referrer_in(&self.procedures, kind, id))
            .or_else(|| referrer_in(&self.treatments, kind, id))
            .or_else(|| referrer_in(&self.observations, kind, id))
            .or_else(|| referrer_in(&self.samples, kind, id))
            .or_else(|| referrer_in(&self.protocols, kind, id))
            .or_else(|| referrer_in(&self.permits, kind, id))
            .or_else(|| referrer_in(&self.projects, kind, id))
            .or_else(|| referrer_in(&self.supplies, kind, id))
    }
}
