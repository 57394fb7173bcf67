//! # ColonyCore - transactional state for lab animal colonies
//!
//! ColonyCore keeps the live state of a research colony (organisms, housing,
//! breeding, procedures, samples, permits, supplies and the rest) in memory and
//! changes it only through all-or-nothing transactions.
//!
//! ## Core Concepts
//!
//! - **State**: one ordered table per entity kind; cloning it yields a fully
//!   isolated copy
//! - **Transaction**: a private clone plus an ordered change log; every write
//!   checks references and invariants before touching the clone
//! - **Rules**: pluggable policies that see the post-mutation state and the
//!   change log, and can veto the whole transaction
//! - **Snapshot**: a serializable copy of the state, repaired by an idempotent
//!   migration before it is installed
//!
//! ## Usage
//!
//! ```rust,ignore
//! use colonycore::{ColonyStore, Facility, HousingUnit};
//!
//! let store = ColonyStore::new();
//! let commit = store.run_in_transaction(|tx| {
//!     let facility = tx.create_facility(Facility::new("AQ-1", "Aquatics"))?;
//!     tx.create_housing_unit(HousingUnit::new("Tank 1", facility.id(), 12))
//! })?;
//!
//! let facility: Facility = store.get(&commit.value.facility_id).unwrap();
//! assert_eq!(facility.housing_unit_ids, vec![commit.value.id().to_string()]);
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod change;
pub mod config;
pub mod decorate;
pub mod entity;
pub mod error;
pub mod migrate;
pub mod rules;
pub mod snapshot;
pub mod state;
pub mod storage;
pub mod store;
pub mod transaction;
pub mod value;
pub mod view;

pub use change::{Action, Change};
pub use config::{Clock, IdGenerator, StoreConfig};
pub use entity::{
    new_id, Base, BreedingUnit, Cohort, CustodyEvent, Entity, EntityKind, EntityRecord, Facility,
    GenotypeMarker, HousingEnvironment, HousingState, HousingUnit, LifecycleStage, Line,
    Observation, Organism, Permit, PermitStatus, Procedure, ProcedureStatus, Project, Protocol,
    ProtocolStatus, Reference, Sample, SampleSource, SampleStatus, Strain, SupplyItem, Treatment,
    TreatmentStatus,
};
pub use error::{ColonyError, ColonyResult, EvaluationError, ValidationError};
pub use migrate::{migrate, MigrationReport, RemovedRecord};
pub use rules::{CancelToken, EvalContext, FnRule, Rule, RuleResult, RulesEngine, Severity, Violation};
pub use snapshot::Snapshot;
pub use state::{ColonyState, Referrer, Stored};
pub use storage::{InMemoryBackend, SnapshotBackend, StorageError};
pub use store::{ColonyStore, Commit, StoreBuilder};
pub use transaction::Transaction;
pub use value::{AttrValue, Attributes};
pub use view::StateView;
