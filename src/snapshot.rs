//! Serializable copies of the state.
//!
//! The wire shape is one named collection per entity kind, each a map from id
//! to the full record. Missing or `null` collections decode as empty, which
//! keeps snapshots from older writers loadable; everything else they may get
//! wrong is repaired by [`migrate`](crate::migrate::migrate).

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::decorate::decorated;
use crate::entity::{
    nullable, BreedingUnit, Cohort, EntityKind, Facility, GenotypeMarker, HousingUnit, Line,
    Observation, Organism, Permit, Procedure, Project, Protocol, Sample, Strain, SupplyItem,
    Treatment,
};
use crate::state::{ColonyState, Stored};
use crate::storage::StorageError;

/// A full serializable copy of the state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    #[serde(deserialize_with = "nullable")]
    pub organisms: BTreeMap<String, Organism>,
    #[serde(deserialize_with = "nullable")]
    pub cohorts: BTreeMap<String, Cohort>,
    #[serde(deserialize_with = "nullable")]
    pub housing: BTreeMap<String, HousingUnit>,
    #[serde(deserialize_with = "nullable")]
    pub facilities: BTreeMap<String, Facility>,
    #[serde(deserialize_with = "nullable")]
    pub breeding: BTreeMap<String, BreedingUnit>,
    #[serde(deserialize_with = "nullable")]
    pub lines: BTreeMap<String, Line>,
    #[serde(deserialize_with = "nullable")]
    pub strains: BTreeMap<String, Strain>,
    #[serde(deserialize_with = "nullable")]
    pub markers: BTreeMap<String, GenotypeMarker>,
    #[serde(deserialize_with = "nullable")]
    pub procedures: BTreeMap<String, Procedure>,
    #[serde(deserialize_with = "nullable")]
    pub treatments: BTreeMap<String, Treatment>,
    #[serde(deserialize_with = "nullable")]
    pub observations: BTreeMap<String, Observation>,
    #[serde(deserialize_with = "nullable")]
    pub samples: BTreeMap<String, Sample>,
    #[serde(deserialize_with = "nullable")]
    pub protocols: BTreeMap<String, Protocol>,
    #[serde(deserialize_with = "nullable")]
    pub permits: BTreeMap<String, Permit>,
    #[serde(deserialize_with = "nullable")]
    pub projects: BTreeMap<String, Project>,
    #[serde(deserialize_with = "nullable")]
    pub supplies: BTreeMap<String, SupplyItem>,
}

fn decorated_table<T: Stored>(state: &ColonyState) -> BTreeMap<String, T> {
    T::table(state)
        .iter()
        .map(|(id, record)| (id.clone(), decorated(state, record.clone())))
        .collect()
}

fn encode_bucket<T: Serialize>(
    kind: EntityKind,
    table: &BTreeMap<String, T>,
) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(table).map_err(|e| StorageError::BucketEncode {
        bucket: kind.bucket().to_string(),
        message: e.to_string(),
    })
}

fn decode_bucket<T: DeserializeOwned>(
    kind: EntityKind,
    bytes: Option<Vec<u8>>,
) -> Result<BTreeMap<String, T>, StorageError> {
    let Some(bytes) = bytes else {
        return Ok(BTreeMap::new());
    };
    let table: Option<BTreeMap<String, T>> =
        serde_json::from_slice(&bytes).map_err(|e| StorageError::BucketDecode {
            bucket: kind.bucket().to_string(),
            message: e.to_string(),
        })?;
    Ok(table.unwrap_or_default())
}

impl Snapshot {
    /// Copies `state`, with derived lists filled in.
    #[must_use]
    pub fn from_state(state: &ColonyState) -> Self {
        Self {
            organisms: decorated_table(state),
            cohorts: decorated_table(state),
            housing: decorated_table(state),
            facilities: decorated_table(state),
            breeding: decorated_table(state),
            lines: decorated_table(state),
            strains: decorated_table(state),
            markers: decorated_table(state),
            procedures: decorated_table(state),
            treatments: decorated_table(state),
            observations: decorated_table(state),
            samples: decorated_table(state),
            protocols: decorated_table(state),
            permits: decorated_table(state),
            projects: decorated_table(state),
            supplies: decorated_table(state),
        }
    }

    /// Moves the collections into a state value as-is, without repair.
    pub(crate) fn into_state(self) -> ColonyState {
        ColonyState {
            organisms: self.organisms,
            cohorts: self.cohorts,
            housing: self.housing,
            facilities: self.facilities,
            breeding: self.breeding,
            lines: self.lines,
            strains: self.strains,
            markers: self.markers,
            procedures: self.procedures,
            treatments: self.treatments,
            observations: self.observations,
            samples: self.samples,
            protocols: self.protocols,
            permits: self.permits,
            projects: self.projects,
            supplies: self.supplies,
        }
    }

    /// Total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.organisms.len()
            + self.cohorts.len()
            + self.housing.len()
            + self.facilities.len()
            + self.breeding.len()
            + self.lines.len()
            + self.strains.len()
            + self.markers.len()
            + self.procedures.len()
            + self.treatments.len()
            + self.observations.len()
            + self.samples.len()
            + self.protocols.len()
            + self.permits.len()
            + self.projects.len()
            + self.supplies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content digest (BLAKE3 over the canonical JSON encoding), hex encoded.
    ///
    /// Two snapshots with equal contents always have equal fingerprints, since
    /// every collection is ordered by id.
    ///
    /// # Panics
    ///
    /// Never in practice: snapshot maps have string keys only.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).expect("snapshots always serialize to JSON");
        blake3::hash(&bytes).to_hex().to_string()
    }

    /// Encodes each collection as its own JSON bucket, in bucket order.
    pub fn to_buckets(&self) -> Result<Vec<(&'static str, Vec<u8>)>, StorageError> {
        EntityKind::ALL
            .iter()
            .map(|&kind| {
                let bytes = match kind {
                    EntityKind::Organism => encode_bucket(kind, &self.organisms),
                    EntityKind::Cohort => encode_bucket(kind, &self.cohorts),
                    EntityKind::HousingUnit => encode_bucket(kind, &self.housing),
                    EntityKind::Facility => encode_bucket(kind, &self.facilities),
                    EntityKind::BreedingUnit => encode_bucket(kind, &self.breeding),
                    EntityKind::Line => encode_bucket(kind, &self.lines),
                    EntityKind::Strain => encode_bucket(kind, &self.strains),
                    EntityKind::GenotypeMarker => encode_bucket(kind, &self.markers),
                    EntityKind::Procedure => encode_bucket(kind, &self.procedures),
                    EntityKind::Treatment => encode_bucket(kind, &self.treatments),
                    EntityKind::Observation => encode_bucket(kind, &self.observations),
                    EntityKind::Sample => encode_bucket(kind, &self.samples),
                    EntityKind::Protocol => encode_bucket(kind, &self.protocols),
                    EntityKind::Permit => encode_bucket(kind, &self.permits),
                    EntityKind::Project => encode_bucket(kind, &self.projects),
                    EntityKind::SupplyItem => encode_bucket(kind, &self.supplies),
                }?;
                Ok((kind.bucket(), bytes))
            })
            .collect()
    }

    /// Rebuilds a snapshot from per-kind buckets.
    ///
    /// `fetch` returns `None` for a bucket that was never written, which loads
    /// as an empty collection. A bucket that is present but does not decode
    /// fails the whole load with [`StorageError::BucketDecode`].
    pub fn from_buckets<F>(mut fetch: F) -> Result<Self, StorageError>
    where
        F: FnMut(&'static str) -> Result<Option<Vec<u8>>, StorageError>,
    {
        let mut load = |kind: EntityKind| fetch(kind.bucket());
        Ok(Self {
            organisms: decode_bucket(EntityKind::Organism, load(EntityKind::Organism)?)?,
            cohorts: decode_bucket(EntityKind::Cohort, load(EntityKind::Cohort)?)?,
            housing: decode_bucket(EntityKind::HousingUnit, load(EntityKind::HousingUnit)?)?,
            facilities: decode_bucket(EntityKind::Facility, load(EntityKind::Facility)?)?,
            breeding: decode_bucket(EntityKind::BreedingUnit, load(EntityKind::BreedingUnit)?)?,
            lines: decode_bucket(EntityKind::Line, load(EntityKind::Line)?)?,
            strains: decode_bucket(EntityKind::Strain, load(EntityKind::Strain)?)?,
            markers: decode_bucket(EntityKind::GenotypeMarker, load(EntityKind::GenotypeMarker)?)?,
            procedures: decode_bucket(EntityKind::Procedure, load(EntityKind::Procedure)?)?,
            treatments: decode_bucket(EntityKind::Treatment, load(EntityKind::Treatment)?)?,
            observations: decode_bucket(EntityKind::Observation, load(EntityKind::Observation)?)?,
            samples: decode_bucket(EntityKind::Sample, load(EntityKind::Sample)?)?,
            protocols: decode_bucket(EntityKind::Protocol, load(EntityKind::Protocol)?)?,
            permits: decode_bucket(EntityKind::Permit, load(EntityKind::Permit)?)?,
            projects: decode_bucket(EntityKind::Project, load(EntityKind::Project)?)?,
            supplies: decode_bucket(EntityKind::SupplyItem, load(EntityKind::SupplyItem)?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn null_and_missing_collections_decode_empty() {
        let snapshot: Snapshot =
            serde_json::from_str(r#"{"organisms": null, "facilities": {}}"#).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn buckets_cover_every_kind_once() {
        let buckets = Snapshot::default().to_buckets().unwrap();
        assert_eq!(buckets.len(), EntityKind::ALL.len());
        assert_eq!(buckets[2].0, "housing");
    }

    #[test]
    fn bucket_round_trip_and_decode_error() {
        let mut snapshot = Snapshot::default();
        let mut cohort = Cohort::new("batch");
        cohort.base.id = "c1".to_string();
        snapshot.cohorts.insert("c1".to_string(), cohort);

        let stored: HashMap<&str, Vec<u8>> = snapshot.to_buckets().unwrap().into_iter().collect();
        let loaded = Snapshot::from_buckets(|name| Ok(stored.get(name).cloned())).unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.fingerprint(), snapshot.fingerprint());

        let err = Snapshot::from_buckets(|name| {
            Ok((name == "cohorts").then(|| b"{not json".to_vec()))
        })
        .unwrap_err();
        assert!(matches!(err, StorageError::BucketDecode { ref bucket, .. } if bucket == "cohorts"));
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let empty = Snapshot::default();
        let mut one = Snapshot::default();
        let mut line = Line::new("L", "wt");
        line.base.id = "l".to_string();
        one.lines.insert("l".to_string(), line);
        assert_ne!(empty.fingerprint(), one.fingerprint());
    }
}
