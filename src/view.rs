//! Read-only access to a state value.
//!
//! A [`StateView`] borrows a [`ColonyState`] that nobody else can mutate for
//! the view's lifetime: either a transaction's post-mutation working copy
//! handed to the rule engine, or a private clone taken by
//! [`ColonyStore::view`](crate::store::ColonyStore::view). Every record it
//! returns is an owned, decorated copy.

use crate::decorate::decorated;
use crate::entity::{
    BreedingUnit, Cohort, EntityKind, Facility, GenotypeMarker, HousingUnit, Line, Observation,
    Organism, Permit, Procedure, Project, Protocol, Sample, Strain, SupplyItem, Treatment,
};
use crate::snapshot::Snapshot;
use crate::state::{ColonyState, Stored};

/// Read-only view of a state value.
#[derive(Debug, Clone, Copy)]
pub struct StateView<'a> {
    state: &'a ColonyState,
}

impl<'a> StateView<'a> {
    #[must_use]
    pub const fn new(state: &'a ColonyState) -> Self {
        Self { state }
    }

    /// Decorated copy of the record with `id`, if present.
    #[must_use]
    pub fn find<T: Stored>(&self, id: &str) -> Option<T> {
        T::table(self.state)
            .get(id)
            .map(|record| decorated(self.state, record.clone()))
    }

    /// Decorated copies of every record of `T`, sorted by id.
    #[must_use]
    pub fn list<T: Stored>(&self) -> Vec<T> {
        T::table(self.state)
            .values()
            .map(|record| decorated(self.state, record.clone()))
            .collect()
    }

    #[must_use]
    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.state.contains(kind, id)
    }

    #[must_use]
    pub fn count(&self, kind: EntityKind) -> usize {
        self.state.count(kind)
    }

    /// Borrows the underlying state without decoration.
    #[must_use]
    pub const fn state(&self) -> &'a ColonyState {
        self.state
    }

    /// Serializable copy of everything visible through the view.
    #[must_use]
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot::from_state(self.state)
    }
}

macro_rules! named_reads {
    ($($ty:ty => $find:ident, $list:ident;)+) => {
        impl StateView<'_> {
            $(
                #[doc = concat!("Finds a [`", stringify!($ty), "`] by id.")]
                #[must_use]
                pub fn $find(&self, id: &str) -> Option<$ty> {
                    self.find::<$ty>(id)
                }

                #[doc = concat!("Lists every [`", stringify!($ty), "`], sorted by id.")]
                #[must_use]
                pub fn $list(&self) -> Vec<$ty> {
                    self.list::<$ty>()
                }
            )+
        }
    };
}

named_reads! {
    Organism => find_organism, list_organisms;
    Cohort => find_cohort, list_cohorts;
    HousingUnit => find_housing_unit, list_housing_units;
    Facility => find_facility, list_facilities;
    BreedingUnit => find_breeding_unit, list_breeding_units;
    Line => find_line, list_lines;
    Strain => find_strain, list_strains;
    GenotypeMarker => find_genotype_marker, list_genotype_markers;
    Procedure => find_procedure, list_procedures;
    Treatment => find_treatment, list_treatments;
    Observation => find_observation, list_observations;
    Sample => find_sample, list_samples;
    Protocol => find_protocol, list_protocols;
    Permit => find_permit, list_permits;
    Project => find_project, list_projects;
    SupplyItem => find_supply_item, list_supply_items;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;

    #[test]
    fn reads_are_decorated_and_independent() {
        let mut state = ColonyState::new();
        let mut facility = Facility::new("F", "Main");
        facility.base.id = "f".to_string();
        state.facilities.insert("f".to_string(), facility);
        let mut unit = HousingUnit::new("tank", "f", 2);
        unit.base.id = "h".to_string();
        state.housing.insert("h".to_string(), unit);

        let view = StateView::new(&state);
        let mut first = view.find_facility("f").unwrap();
        assert_eq!(first.housing_unit_ids, vec!["h"]);

        first.housing_unit_ids.clear();
        first.name = "changed".to_string();
        let second = view.find_facility("f").unwrap();
        assert_eq!(second.housing_unit_ids, vec!["h"]);
        assert_eq!(second.name, "Main");

        assert!(state.facilities["f"].housing_unit_ids.is_empty());
        assert_eq!(view.list_housing_units().len(), 1);
        assert_eq!(view.list_housing_units()[0].id(), "h");
        assert!(view.find_cohort("missing").is_none());
    }
}
