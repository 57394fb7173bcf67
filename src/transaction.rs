//! Transactions: the only place records are created, updated or deleted.
//!
//! A [`Transaction`] owns a private clone of the canonical state plus an
//! ordered change log. Every write runs the same fixed pipeline:
//!
//! 1. existence (`AlreadyExists` / `NotFound`)
//! 2. reference validity
//! 3. cross-field invariants
//! 4. normalization (dedupe, derived lists cleared)
//! 5. timestamping
//! 6. write
//! 7. change record
//!
//! Steps 1-4 never touch the working copy, so a failed write leaves it exactly
//! as it was.

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::change::Change;
use crate::config::IdGenerator;
use crate::decorate::decorated;
use crate::entity::{
    BreedingUnit, Cohort, Facility, GenotypeMarker, HousingUnit, Line, Observation, Organism,
    Permit, Procedure, Project, Protocol, Sample, Strain, SupplyItem, Treatment,
};
use crate::error::{ColonyError, ColonyResult, ValidationError};
use crate::state::{ColonyState, Stored};
use crate::view::StateView;

/// An isolated working copy of the state plus its change log.
pub struct Transaction {
    state: ColonyState,
    changes: Vec<Change>,
    now: DateTime<Utc>,
    ids: IdGenerator,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("records", &self.state.len())
            .field("changes", &self.changes.len())
            .field("now", &self.now)
            .finish_non_exhaustive()
    }
}

/// Reference validity, then invariants, then normalization.
fn validate<T: Stored>(state: &ColonyState, record: &mut T) -> Result<(), ValidationError> {
    for reference in record.references() {
        if !state.contains(reference.kind, reference.id) {
            return Err(ValidationError::UnknownReference {
                owner: T::KIND,
                target: reference.kind,
                id: reference.id.to_string(),
            });
        }
    }
    record.check_invariants()?;
    record.normalize();
    Ok(())
}

fn not_found<T: Stored>(id: &str) -> ColonyError {
    ColonyError::NotFound {
        kind: T::KIND,
        id: id.to_string(),
    }
}

impl Transaction {
    pub(crate) fn new(state: ColonyState, now: DateTime<Utc>, ids: IdGenerator) -> Self {
        Self {
            state,
            changes: Vec::new(),
            now,
            ids,
        }
    }

    pub(crate) fn into_parts(self) -> (ColonyState, Vec<Change>) {
        (self.state, self.changes)
    }

    /// Timestamp stamped on every write in this transaction.
    #[must_use]
    pub const fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Changes recorded so far, in order.
    #[must_use]
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Read-only view of the working copy, including this transaction's writes.
    #[must_use]
    pub const fn view(&self) -> StateView<'_> {
        StateView::new(&self.state)
    }

    /// Decorated copy of a record, or `None`. Never fails.
    #[must_use]
    pub fn find<T: Stored>(&self, id: &str) -> Option<T> {
        self.view().find(id)
    }

    /// Creates a record.
    ///
    /// A blank id is replaced with a fresh one; `created_at` and `updated_at`
    /// are always stamped with [`Transaction::now`]. Returns the committed,
    /// decorated value.
    pub fn create<T: Stored>(&mut self, mut record: T) -> ColonyResult<T> {
        if record.id().is_empty() {
            record.base_mut().id = (self.ids)();
        }
        let id = record.id().to_string();
        if T::table(&self.state).contains_key(&id) {
            return Err(ColonyError::AlreadyExists { kind: T::KIND, id });
        }

        validate(&self.state, &mut record)?;

        let base = record.base_mut();
        base.created_at = self.now;
        base.updated_at = self.now;

        T::table_mut(&mut self.state).insert(id.clone(), record.clone());
        let committed = decorated(&self.state, record);
        self.changes.push(Change::created(committed.clone()));
        trace!(target: "colonycore::tx", kind = %T::KIND, id = %id, "created");
        Ok(committed)
    }

    /// Applies `patch` to a copy of the current record and writes it back.
    ///
    /// The patched value goes through the same validation as a create. The id
    /// and `created_at` cannot be changed by the patch. If the patch or the
    /// validation fails, nothing is written.
    pub fn update<T, F>(&mut self, id: &str, patch: F) -> ColonyResult<T>
    where
        T: Stored,
        F: FnOnce(&mut T) -> ColonyResult<()>,
    {
        let Some(current) = T::table(&self.state).get(id).cloned() else {
            return Err(not_found::<T>(id));
        };
        let before = decorated(&self.state, current.clone());

        let mut next = current;
        patch(&mut next)?;
        let base = next.base_mut();
        base.id = id.to_string();
        base.created_at = before.base().created_at;

        validate(&self.state, &mut next)?;
        next.base_mut().updated_at = self.now;

        T::table_mut(&mut self.state).insert(id.to_string(), next.clone());
        let after = decorated(&self.state, next);
        self.changes.push(Change::updated(before, after.clone()));
        trace!(target: "colonycore::tx", kind = %T::KIND, id = %id, "updated");
        Ok(after)
    }

    /// Replaces an existing record wholesale.
    ///
    /// Equivalent to an [`update`](Self::update) whose patch overwrites every
    /// field, for callers that load a record, edit it, then save it back.
    pub fn replace<T: Stored>(&mut self, record: T) -> ColonyResult<T> {
        let id = record.id().to_string();
        self.update(&id, move |current: &mut T| {
            *current = record;
            Ok(())
        })
    }

    /// Deletes a record that nothing references.
    ///
    /// Deletion is never cascaded: if any record still holds an authoritative
    /// reference to this one, the delete fails with
    /// [`ColonyError::ReferentialIntegrity`] naming that record's kind.
    /// Returns the removed, decorated value.
    pub fn delete<T: Stored>(&mut self, id: &str) -> ColonyResult<T> {
        let Some(current) = T::table(&self.state).get(id).cloned() else {
            return Err(not_found::<T>(id));
        };
        if let Some(referrer) = self.state.find_referrer(T::KIND, id) {
            return Err(ColonyError::ReferentialIntegrity {
                kind: T::KIND,
                id: id.to_string(),
                dependent_kind: referrer.kind,
                dependent_id: referrer.id,
            });
        }

        let removed = decorated(&self.state, current);
        T::table_mut(&mut self.state).remove(id);
        self.changes.push(Change::deleted(removed.clone()));
        trace!(target: "colonycore::tx", kind = %T::KIND, id = %id, "deleted");
        Ok(removed)
    }
}

macro_rules! named_writes {
    ($($ty:ty => $create:ident, $update:ident, $delete:ident, $find:ident;)+) => {
        impl Transaction {
            $(
                #[doc = concat!("Creates a [`", stringify!($ty), "`]. See [`Transaction::create`].")]
                pub fn $create(&mut self, record: $ty) -> ColonyResult<$ty> {
                    self.create(record)
                }

                #[doc = concat!("Patches a [`", stringify!($ty), "`]. See [`Transaction::update`].")]
                pub fn $update<F>(&mut self, id: &str, patch: F) -> ColonyResult<$ty>
                where
                    F: FnOnce(&mut $ty) -> ColonyResult<()>,
                {
                    self.update(id, patch)
                }

                #[doc = concat!("Deletes a [`", stringify!($ty), "`]. See [`Transaction::delete`].")]
                pub fn $delete(&mut self, id: &str) -> ColonyResult<$ty> {
                    self.delete(id)
                }

                #[doc = concat!("Finds a [`", stringify!($ty), "`] by id.")]
                #[must_use]
                pub fn $find(&self, id: &str) -> Option<$ty> {
                    self.find(id)
                }
            )+
        }
    };
}

named_writes! {
    Organism => create_organism, update_organism, delete_organism, find_organism;
    Cohort => create_cohort, update_cohort, delete_cohort, find_cohort;
    HousingUnit => create_housing_unit, update_housing_unit, delete_housing_unit, find_housing_unit;
    Facility => create_facility, update_facility, delete_facility, find_facility;
    BreedingUnit => create_breeding_unit, update_breeding_unit, delete_breeding_unit, find_breeding_unit;
    Line => create_line, update_line, delete_line, find_line;
    Strain => create_strain, update_strain, delete_strain, find_strain;
    GenotypeMarker => create_genotype_marker, update_genotype_marker, delete_genotype_marker, find_genotype_marker;
    Procedure => create_procedure, update_procedure, delete_procedure, find_procedure;
    Treatment => create_treatment, update_treatment, delete_treatment, find_treatment;
    Observation => create_observation, update_observation, delete_observation, find_observation;
    Sample => create_sample, update_sample, delete_sample, find_sample;
    Protocol => create_protocol, update_protocol, delete_protocol, find_protocol;
    Permit => create_permit, update_permit, delete_permit, find_permit;
    Project => create_project, update_project, delete_project, find_project;
    SupplyItem => create_supply_item, update_supply_item, delete_supply_item, find_supply_item;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::change::Action;
    use crate::entity::{Entity, EntityKind, HousingState};

    fn tx() -> Transaction {
        let counter = Arc::new(AtomicUsize::new(0));
        let ids: IdGenerator = Arc::new(move || format!("id-{}", counter.fetch_add(1, Ordering::SeqCst)));
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        Transaction::new(ColonyState::new(), now, ids)
    }

    #[test]
    fn create_assigns_id_and_timestamps() {
        let mut tx = tx();
        let facility = tx.create_facility(Facility::new("F1", "North")).unwrap();
        assert_eq!(facility.id(), "id-0");
        assert_eq!(facility.base.created_at, tx.now());
        assert_eq!(facility.base.updated_at, tx.now());
        assert_eq!(tx.changes().len(), 1);
        assert_eq!(tx.changes()[0].action, Action::Create);
    }

    #[test]
    fn create_rejects_taken_id() {
        let mut tx = tx();
        let mut facility = Facility::new("F1", "North");
        facility.base.id = "f".to_string();
        tx.create_facility(facility.clone()).unwrap();
        let err = tx.create_facility(facility).unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(tx.changes().len(), 1);
    }

    #[test]
    fn failed_validation_leaves_working_copy_untouched() {
        let mut tx = tx();
        let facility = tx.create_facility(Facility::new("F1", "North")).unwrap();
        let before = tx.state.clone();

        let err = tx
            .create_housing_unit(HousingUnit::new("tank", facility.id(), 0))
            .unwrap_err();
        assert!(err.is_validation());
        let err = tx
            .create_housing_unit(HousingUnit::new("tank", "nope", 1))
            .unwrap_err();
        assert!(err.to_string().contains("not found"));

        assert_eq!(tx.state, before);
        assert_eq!(tx.changes().len(), 1);
    }

    #[test]
    fn update_revalidates_and_keeps_identity() {
        let mut tx = tx();
        let facility = tx.create_facility(Facility::new("F1", "North")).unwrap();
        let unit = tx
            .create_housing_unit(HousingUnit::new("tank", facility.id(), 2))
            .unwrap();

        let err = tx
            .update_housing_unit(unit.id(), |h| {
                h.capacity = 0;
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(tx.find_housing_unit(unit.id()).unwrap().capacity, 2);

        let updated = tx
            .update_housing_unit(unit.id(), |h| {
                h.base.id = "hijack".to_string();
                h.state = HousingState::Cleaning;
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.id(), unit.id());
        assert_eq!(updated.state, HousingState::Cleaning);
        assert!(tx.find_housing_unit("hijack").is_none());

        let change = tx.changes().last().unwrap();
        assert_eq!(change.action, Action::Update);
        assert_eq!(change.before_as::<HousingUnit>().unwrap().state, HousingState::Active);
    }

    #[test]
    fn patch_error_aborts_update() {
        let mut tx = tx();
        let cohort = tx.create_cohort(Cohort::new("batch")).unwrap();
        let err = tx
            .update_cohort(cohort.id(), |c| {
                c.name = "renamed".to_string();
                Err(ColonyError::aborted("changed my mind"))
            })
            .unwrap_err();
        assert!(matches!(err, ColonyError::Aborted { .. }));
        assert_eq!(tx.find_cohort(cohort.id()).unwrap().name, "batch");
    }

    #[test]
    fn update_and_delete_unknown_ids_are_not_found() {
        let mut tx = tx();
        assert!(tx.update_cohort("missing", |_| Ok(())).unwrap_err().is_not_found());
        assert!(tx.delete_cohort("missing").unwrap_err().is_not_found());
        assert!(tx.find_cohort("missing").is_none());
    }

    #[test]
    fn delete_refuses_live_dependents() {
        let mut tx = tx();
        let protocol = tx.create_protocol(Protocol::new("P-1", "Imaging", 10)).unwrap();
        let procedure = tx
            .create_procedure(Procedure::new("scan", protocol.id(), tx.now()))
            .unwrap();

        let err = tx.delete_protocol(protocol.id()).unwrap_err();
        assert!(matches!(
            err,
            ColonyError::ReferentialIntegrity { dependent_kind: EntityKind::Procedure, .. }
        ));

        tx.delete_procedure(procedure.id()).unwrap();
        let removed = tx.delete_protocol(protocol.id()).unwrap();
        assert_eq!(removed.id(), protocol.id());
        assert_eq!(tx.changes().last().unwrap().action, Action::Delete);
    }

    #[test]
    fn replace_runs_full_validation() {
        let mut tx = tx();
        let strain_line = tx.create_line(Line::new("L1", "wild type")).unwrap();
        let mut strain = tx
            .create_strain(Strain::new("S1", "first", strain_line.id()))
            .unwrap();

        strain.line_id.clear();
        let err = tx.replace(strain.clone()).unwrap_err();
        assert_eq!(err.to_string(), "validation error: strain requires line id");

        strain.line_id = strain_line.id().to_string();
        strain.generation = "F2".to_string();
        let saved = tx.replace(strain).unwrap();
        assert_eq!(saved.generation, "F2");
    }

    #[test]
    fn decorated_parent_reflects_same_transaction_writes() {
        let mut tx = tx();
        let facility = tx.create_facility(Facility::new("F1", "North")).unwrap();
        let unit = tx
            .create_housing_unit(HousingUnit::new("tank", facility.id(), 2))
            .unwrap();
        let read = tx.find_facility(facility.id()).unwrap();
        assert_eq!(read.housing_unit_ids, vec![unit.id().to_string()]);
    }
}
