//! Derived back-reference lists.
//!
//! Facilities, procedures and projects expose id lists that are never written
//! by callers. They are recomputed here by scanning the child table for every
//! record whose authoritative reference names the parent. Tables are ordered
//! maps keyed by id, so results come out sorted.
//!
//! Each read costs a scan of the child tables. That is fine for colonies in the
//! low thousands of records; an inverted index could replace the scans
//! without changing what callers see.

use std::collections::BTreeMap;

use crate::entity::{Facility, Procedure, Project};
use crate::state::{ColonyState, Stored};

fn ids_where<T>(table: &BTreeMap<String, T>, matches: impl Fn(&T) -> bool) -> Vec<String> {
    table
        .iter()
        .filter(|(_, record)| matches(record))
        .map(|(id, _)| id.clone())
        .collect()
}

fn lists(ids: &[String], id: &str) -> bool {
    ids.iter().any(|candidate| candidate == id)
}

/// Housing units located in the facility.
#[must_use]
pub fn facility_housing_unit_ids(state: &ColonyState, facility_id: &str) -> Vec<String> {
    ids_where(&state.housing, |unit| unit.facility_id == facility_id)
}

/// Projects that list the facility.
#[must_use]
pub fn facility_project_ids(state: &ColonyState, facility_id: &str) -> Vec<String> {
    ids_where(&state.projects, |project| lists(&project.facility_ids, facility_id))
}

/// Treatments recorded against the procedure.
#[must_use]
pub fn procedure_treatment_ids(state: &ColonyState, procedure_id: &str) -> Vec<String> {
    ids_where(&state.treatments, |treatment| treatment.procedure_id == procedure_id)
}

/// Observations recorded against the procedure.
#[must_use]
pub fn procedure_observation_ids(state: &ColonyState, procedure_id: &str) -> Vec<String> {
    ids_where(&state.observations, |observation| {
        observation.procedure_id.as_deref() == Some(procedure_id)
    })
}

/// Organisms assigned to the project.
#[must_use]
pub fn project_organism_ids(state: &ColonyState, project_id: &str) -> Vec<String> {
    ids_where(&state.organisms, |organism| {
        organism.project_id.as_deref() == Some(project_id)
    })
}

/// Procedures run under the project.
#[must_use]
pub fn project_procedure_ids(state: &ColonyState, project_id: &str) -> Vec<String> {
    ids_where(&state.procedures, |procedure| {
        procedure.project_id.as_deref() == Some(project_id)
    })
}

/// Supply items allocated to the project.
#[must_use]
pub fn project_supply_item_ids(state: &ColonyState, project_id: &str) -> Vec<String> {
    ids_where(&state.supplies, |item| lists(&item.project_ids, project_id))
}

impl Stored for Facility {
    fn table(state: &ColonyState) -> &BTreeMap<String, Self> {
        &state.facilities
    }

    fn table_mut(state: &mut ColonyState) -> &mut BTreeMap<String, Self> {
        &mut state.facilities
    }

    fn decorate(&mut self, state: &ColonyState) {
        self.housing_unit_ids = facility_housing_unit_ids(state, &self.base.id);
        self.project_ids = facility_project_ids(state, &self.base.id);
    }
}

impl Stored for Procedure {
    fn table(state: &ColonyState) -> &BTreeMap<String, Self> {
        &state.procedures
    }

    fn table_mut(state: &mut ColonyState) -> &mut BTreeMap<String, Self> {
        &mut state.procedures
    }

    fn decorate(&mut self, state: &ColonyState) {
        self.treatment_ids = procedure_treatment_ids(state, &self.base.id);
        self.observation_ids = procedure_observation_ids(state, &self.base.id);
    }
}

impl Stored for Project {
    fn table(state: &ColonyState) -> &BTreeMap<String, Self> {
        &state.projects
    }

    fn table_mut(state: &mut ColonyState) -> &mut BTreeMap<String, Self> {
        &mut state.projects
    }

    fn decorate(&mut self, state: &ColonyState) {
        self.organism_ids = project_organism_ids(state, &self.base.id);
        self.procedure_ids = project_procedure_ids(state, &self.base.id);
        self.supply_item_ids = project_supply_item_ids(state, &self.base.id);
    }
}

/// A decorated copy of a stored record.
pub(crate) fn decorated<T: Stored>(state: &ColonyState, mut record: T) -> T {
    record.decorate(state);
    record
}
