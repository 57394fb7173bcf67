//! Entity records and identity.
//!
//! Every record in the colony is plain owned data: strings, vectors, ordered
//! maps and options. Cloning a record therefore never shares backing storage
//! with the original, which is what makes a cloned [`ColonyState`] a fully
//! isolated working copy.
//!
//! Relationships are string ids. *Authoritative* references live on the child
//! and are reported by [`Entity::references`]; *derived* back-reference lists
//! live on the parent and are recomputed on every read.
//!
//! [`ColonyState`]: crate::state::ColonyState

mod colony;
mod compliance;
mod facility;
mod genetics;
mod record;
pub mod status;
mod workflow;

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

pub use colony::{BreedingUnit, Cohort, Organism};
pub use compliance::{Permit, Project, Protocol, SupplyItem};
pub use facility::{Facility, HousingUnit};
pub use genetics::{GenotypeMarker, Line, Strain};
pub use record::EntityRecord;
pub use status::{
    HousingEnvironment, HousingState, LifecycleStage, PermitStatus, ProcedureStatus,
    ProtocolStatus, SampleSource, SampleStatus, TreatmentStatus,
};
pub use workflow::{CustodyEvent, Observation, Procedure, Sample, Treatment};

/// Generates a fresh record id: a random UUIDv4 rendered as 32 lowercase hex digits.
#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// The kinds of record the store holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Organism,
    Cohort,
    HousingUnit,
    Facility,
    BreedingUnit,
    Line,
    Strain,
    GenotypeMarker,
    Procedure,
    Treatment,
    Observation,
    Sample,
    Protocol,
    Permit,
    Project,
    SupplyItem,
}

impl EntityKind {
    /// All kinds, in snapshot bucket order.
    pub const ALL: [Self; 16] = [
        Self::Organism,
        Self::Cohort,
        Self::HousingUnit,
        Self::Facility,
        Self::BreedingUnit,
        Self::Line,
        Self::Strain,
        Self::GenotypeMarker,
        Self::Procedure,
        Self::Treatment,
        Self::Observation,
        Self::Sample,
        Self::Protocol,
        Self::Permit,
        Self::Project,
        Self::SupplyItem,
    ];

    /// Human-readable label used in error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Organism => "organism",
            Self::Cohort => "cohort",
            Self::HousingUnit => "housing unit",
            Self::Facility => "facility",
            Self::BreedingUnit => "breeding unit",
            Self::Line => "line",
            Self::Strain => "strain",
            Self::GenotypeMarker => "genotype marker",
            Self::Procedure => "procedure",
            Self::Treatment => "treatment",
            Self::Observation => "observation",
            Self::Sample => "sample",
            Self::Protocol => "protocol",
            Self::Permit => "permit",
            Self::Project => "project",
            Self::SupplyItem => "supply item",
        }
    }

    /// Name of the snapshot collection (and persisted bucket) for this kind.
    #[must_use]
    pub const fn bucket(self) -> &'static str {
        match self {
            Self::Organism => "organisms",
            Self::Cohort => "cohorts",
            Self::HousingUnit => "housing",
            Self::Facility => "facilities",
            Self::BreedingUnit => "breeding",
            Self::Line => "lines",
            Self::Strain => "strains",
            Self::GenotypeMarker => "markers",
            Self::Procedure => "procedures",
            Self::Treatment => "treatments",
            Self::Observation => "observations",
            Self::Sample => "samples",
            Self::Protocol => "protocols",
            Self::Permit => "permits",
            Self::Project => "projects",
            Self::SupplyItem => "supplies",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identity and timestamps shared by every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Base {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Base {
    /// A base carrying a caller-chosen id; timestamps are stamped on write.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// One authoritative outgoing reference of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    pub kind: EntityKind,
    pub id: &'a str,
}

/// Common behaviour of every stored record.
///
/// Validation is split the way writes need it: [`Entity::references`] is
/// checked against the state first, then [`Entity::check_invariants`], then
/// [`Entity::normalize`] canonicalizes the record before it is stamped.
pub trait Entity:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The kind tag for this record type.
    const KIND: EntityKind;

    fn base(&self) -> &Base;

    fn base_mut(&mut self) -> &mut Base;

    fn id(&self) -> &str {
        &self.base().id
    }

    /// Every non-empty authoritative reference this record holds.
    fn references(&self) -> Vec<Reference<'_>>;

    /// Drops references for which `exists` is false and deduplicates
    /// reference lists. Returns the number of entries removed.
    fn retain_references(&mut self, exists: &dyn Fn(EntityKind, &str) -> bool) -> usize;

    /// Enumerated fields must hold recognized values.
    fn check_statuses(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Required relations, ranges and other cross-field rules.
    fn check_invariants(&self) -> Result<(), ValidationError> {
        self.check_statuses()
    }

    /// Deduplicates lists, canonicalizes enumerations and clears derived fields.
    fn normalize(&mut self) {}

    /// Repairs scalar fields that an older writer may have left out of range.
    /// Returns the number of fields changed.
    fn repair_fields(&mut self) -> usize {
        0
    }

    fn into_record(self) -> EntityRecord;

    fn from_record(record: &EntityRecord) -> Option<&Self>;
}

/// Implements the identity plumbing of [`Entity`] for a record type.
macro_rules! entity_identity {
    ($kind:ident) => {
        const KIND: $crate::entity::EntityKind = $crate::entity::EntityKind::$kind;

        fn base(&self) -> &$crate::entity::Base {
            &self.base
        }

        fn base_mut(&mut self) -> &mut $crate::entity::Base {
            &mut self.base
        }

        fn into_record(self) -> $crate::entity::EntityRecord {
            $crate::entity::EntityRecord::$kind(self)
        }

        fn from_record(record: &$crate::entity::EntityRecord) -> Option<&Self> {
            match record {
                $crate::entity::EntityRecord::$kind(inner) => Some(inner),
                _ => None,
            }
        }
    };
}
pub(crate) use entity_identity;

/// Collects outgoing references while skipping blanks.
#[derive(Default)]
pub(crate) struct RefCollector<'a>(Vec<Reference<'a>>);

impl<'a> RefCollector<'a> {
    pub(crate) fn one(mut self, kind: EntityKind, id: &'a str) -> Self {
        if !id.is_empty() {
            self.0.push(Reference { kind, id });
        }
        self
    }

    pub(crate) fn opt(self, kind: EntityKind, id: &'a Option<String>) -> Self {
        match id.as_deref() {
            Some(id) => self.one(kind, id),
            None => self,
        }
    }

    pub(crate) fn all(mut self, kind: EntityKind, ids: &'a [String]) -> Self {
        for id in ids {
            self = self.one(kind, id);
        }
        self
    }

    pub(crate) fn finish(self) -> Vec<Reference<'a>> {
        self.0
    }
}

pub(crate) fn retain_one(
    id: &mut String,
    kind: EntityKind,
    exists: &dyn Fn(EntityKind, &str) -> bool,
) -> usize {
    if !id.is_empty() && !exists(kind, id) {
        id.clear();
        return 1;
    }
    0
}

pub(crate) fn retain_opt(
    id: &mut Option<String>,
    kind: EntityKind,
    exists: &dyn Fn(EntityKind, &str) -> bool,
) -> usize {
    match id {
        Some(value) if !exists(kind, value) => {
            *id = None;
            1
        }
        _ => 0,
    }
}

pub(crate) fn retain_all(
    ids: &mut Vec<String>,
    kind: EntityKind,
    exists: &dyn Fn(EntityKind, &str) -> bool,
) -> usize {
    let before = ids.len();
    dedupe(ids);
    ids.retain(|id| exists(kind, id));
    before - ids.len()
}

/// Removes blanks and repeated entries, keeping first occurrences in order.
pub(crate) fn dedupe(values: &mut Vec<String>) {
    let mut seen = HashSet::with_capacity(values.len());
    values.retain(|value| !value.is_empty() && seen.insert(value.clone()));
}

/// Treats `Some("")` as an absent reference.
pub(crate) fn clear_blank(id: &mut Option<String>) {
    if id.as_deref().is_some_and(str::is_empty) {
        *id = None;
    }
}

/// Decodes a `null` collection as its empty default.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decodes any JSON number (or `null`) as a count, clamped into `u32`.
///
/// Older snapshots store counts as signed integers; negatives load as 0 so
/// migration can repair them instead of failing the whole bucket.
pub(crate) fn lenient_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Unsigned(u64),
        Signed(i64),
        Float(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        None => 0,
        Some(Raw::Unsigned(n)) => u32::try_from(n).unwrap_or(u32::MAX),
        Some(Raw::Signed(n)) => u32::try_from(n.max(0)).unwrap_or(u32::MAX),
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Some(Raw::Float(n)) => n.clamp(0.0, f64::from(u32::MAX)) as u32,
    })
}
