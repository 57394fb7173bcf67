//! Snapshot repair.
//!
//! [`migrate`] turns any decodable snapshot into one that satisfies every
//! write-time invariant, so it can be installed as the live state. It is pure
//! and idempotent: running it on its own output changes nothing and reports
//! [`MigrationReport::is_noop`].
//!
//! The repair runs in two passes over the tables. The first pass re-keys
//! records to their map key, canonicalizes them and removes records whose
//! enumerated fields hold unknown values. The second pass walks the tables in
//! dependency order (a table is repaired only after every table it can point
//! into), drops dangling references, repairs out-of-range scalars and removes
//! records that no longer satisfy their invariants. Because referenced tables
//! are settled first, a removal never leaves a dangling reference behind.
//! Derived lists are cleared on the way in and recomputed on the way out.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entity::{
    BreedingUnit, Cohort, Entity, EntityKind, Facility, GenotypeMarker, HousingUnit, Line,
    Observation, Organism, Permit, Procedure, Project, Protocol, Sample, Strain, SupplyItem,
    Treatment,
};
use crate::snapshot::Snapshot;
use crate::state::{ColonyState, Stored};

/// A record removed during migration, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedRecord {
    pub kind: EntityKind,
    pub id: String,
    pub reason: String,
}

impl fmt::Display for RemovedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\": {}", self.kind, self.id, self.reason)
    }
}

/// What a migration did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// References to records that do not exist, plus duplicate list entries.
    pub dropped_references: usize,
    /// Scalar fields brought back into range.
    pub repaired_fields: usize,
    /// Records whose embedded id disagreed with their key.
    pub rekeyed: usize,
    pub removed: Vec<RemovedRecord>,
    /// Whether the output differs from the input in any way.
    pub changed: bool,
}

impl MigrationReport {
    /// True when the input was already canonical.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        !self.changed
    }

    /// Removed records of one kind.
    pub fn removed_of(&self, kind: EntityKind) -> impl Iterator<Item = &RemovedRecord> {
        self.removed.iter().filter(move |record| record.kind == kind)
    }
}

/// Repairs a snapshot so every record satisfies the write-time invariants.
///
/// The returned snapshot carries freshly computed derived lists.
#[must_use]
pub fn migrate(snapshot: Snapshot) -> (Snapshot, MigrationReport) {
    let (_, migrated, report) = run(snapshot);
    (migrated, report)
}

/// Like [`migrate`], but also hands back the repaired state for installation.
pub(crate) fn migrate_into_state(snapshot: Snapshot) -> (ColonyState, MigrationReport) {
    let (state, _, report) = run(snapshot);
    (state, report)
}

fn run(snapshot: Snapshot) -> (ColonyState, Snapshot, MigrationReport) {
    let input = snapshot.clone();
    let mut state = snapshot.into_state();
    let mut report = MigrationReport::default();

    macro_rules! in_dependency_order {
        ($pass:ident) => {
            $pass::<GenotypeMarker>(&mut state, &mut report);
            $pass::<Line>(&mut state, &mut report);
            $pass::<Strain>(&mut state, &mut report);
            $pass::<Protocol>(&mut state, &mut report);
            $pass::<Facility>(&mut state, &mut report);
            $pass::<HousingUnit>(&mut state, &mut report);
            $pass::<Project>(&mut state, &mut report);
            $pass::<Cohort>(&mut state, &mut report);
            $pass::<Organism>(&mut state, &mut report);
            $pass::<BreedingUnit>(&mut state, &mut report);
            $pass::<Procedure>(&mut state, &mut report);
            $pass::<Treatment>(&mut state, &mut report);
            $pass::<Observation>(&mut state, &mut report);
            $pass::<Sample>(&mut state, &mut report);
            $pass::<Permit>(&mut state, &mut report);
            $pass::<SupplyItem>(&mut state, &mut report);
        };
    }

    in_dependency_order!(canonicalize_table);
    in_dependency_order!(repair_table);

    let migrated = Snapshot::from_state(&state);
    report.changed = migrated != input;
    info!(
        target: "colonycore::migrate",
        records = state.len(),
        dropped_references = report.dropped_references,
        repaired_fields = report.repaired_fields,
        rekeyed = report.rekeyed,
        removed = report.removed.len(),
        changed = report.changed,
        "snapshot migrated"
    );
    (state, migrated, report)
}

fn remove<T: Stored>(state: &mut ColonyState, report: &mut MigrationReport, id: &str, reason: String) {
    T::table_mut(state).remove(id);
    debug!(
        target: "colonycore::migrate",
        kind = %T::KIND,
        id,
        reason = %reason,
        "record removed"
    );
    report.removed.push(RemovedRecord {
        kind: T::KIND,
        id: id.to_string(),
        reason,
    });
}

fn canonicalize_table<T: Stored>(state: &mut ColonyState, report: &mut MigrationReport) {
    let table = T::table_mut(state);
    if table.remove("").is_some() {
        report.removed.push(RemovedRecord {
            kind: T::KIND,
            id: String::new(),
            reason: "record has an empty id".to_string(),
        });
    }

    let mut rejected = Vec::new();
    for (id, record) in table.iter_mut() {
        if record.id() != id {
            record.base_mut().id.clone_from(id);
            report.rekeyed += 1;
        }
        record.normalize();
        if let Err(err) = record.check_statuses() {
            rejected.push((id.clone(), err.to_string()));
        }
    }
    for (id, reason) in rejected {
        remove::<T>(state, report, &id, reason);
    }
}

fn repair_table<T: Stored>(state: &mut ColonyState, report: &mut MigrationReport) {
    let ids: Vec<String> = T::table(state).keys().cloned().collect();
    for id in ids {
        let Some(mut record) = T::table(state).get(&id).cloned() else {
            continue;
        };
        report.dropped_references += {
            let snapshot: &ColonyState = state;
            record.retain_references(&|kind, target| snapshot.contains(kind, target))
        };
        report.repaired_fields += record.repair_fields();
        match record.check_invariants() {
            Ok(()) => {
                T::table_mut(state).insert(id, record);
            }
            Err(err) => remove::<T>(state, report, &id, err.to_string()),
        }
    }
}
