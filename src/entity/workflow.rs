use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{ensure_recognized, ProcedureStatus, SampleSource, SampleStatus, TreatmentStatus};
use super::{
    clear_blank, dedupe, entity_identity, nullable, retain_all, retain_one, retain_opt, Base,
    Entity, EntityKind, RefCollector, Reference,
};
use crate::error::ValidationError;
use crate::value::Attributes;

/// A scheduled piece of work under a protocol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Procedure {
    #[serde(flatten)]
    pub base: Base,
    pub name: String,
    pub status: ProcedureStatus,
    pub scheduled_at: DateTime<Utc>,
    pub protocol_id: String,
    pub project_id: Option<String>,
    pub cohort_id: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub organism_ids: Vec<String>,
    /// Derived: treatments recorded against this procedure.
    #[serde(deserialize_with = "nullable")]
    pub treatment_ids: Vec<String>,
    /// Derived: observations recorded against this procedure.
    #[serde(deserialize_with = "nullable")]
    pub observation_ids: Vec<String>,
}

impl Procedure {
    #[must_use]
    pub fn new(name: impl Into<String>, protocol_id: impl Into<String>, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            protocol_id: protocol_id.into(),
            scheduled_at,
            ..Self::default()
        }
    }
}

impl Entity for Procedure {
    entity_identity!(Procedure);

    fn references(&self) -> Vec<Reference<'_>> {
        RefCollector::default()
            .one(EntityKind::Protocol, &self.protocol_id)
            .opt(EntityKind::Project, &self.project_id)
            .opt(EntityKind::Cohort, &self.cohort_id)
            .all(EntityKind::Organism, &self.organism_ids)
            .finish()
    }

    fn retain_references(&mut self, exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        retain_one(&mut self.protocol_id, EntityKind::Protocol, exists)
            + retain_opt(&mut self.project_id, EntityKind::Project, exists)
            + retain_opt(&mut self.cohort_id, EntityKind::Cohort, exists)
            + retain_all(&mut self.organism_ids, EntityKind::Organism, exists)
    }

    fn check_statuses(&self) -> Result<(), ValidationError> {
        ensure_recognized(Self::KIND, "status", self.status.is_recognized(), self.status.as_str())
    }

    fn check_invariants(&self) -> Result<(), ValidationError> {
        if self.protocol_id.is_empty() {
            return Err(ValidationError::MissingRelation {
                kind: Self::KIND,
                relation: "protocol id",
            });
        }
        self.check_statuses()
    }

    fn normalize(&mut self) {
        if let Some(status) = self.status.normalized() {
            self.status = status;
        }
        clear_blank(&mut self.project_id);
        clear_blank(&mut self.cohort_id);
        dedupe(&mut self.organism_ids);
        self.treatment_ids.clear();
        self.observation_ids.clear();
    }
}

/// A treatment administered as part of a procedure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Treatment {
    #[serde(flatten)]
    pub base: Base,
    pub name: String,
    pub status: TreatmentStatus,
    pub procedure_id: String,
    #[serde(deserialize_with = "nullable")]
    pub organism_ids: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub cohort_ids: Vec<String>,
    pub dosage_plan: String,
    #[serde(deserialize_with = "nullable")]
    pub administration_log: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub adverse_events: Vec<String>,
}

impl Treatment {
    #[must_use]
    pub fn new(name: impl Into<String>, procedure_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            procedure_id: procedure_id.into(),
            ..Self::default()
        }
    }
}

impl Entity for Treatment {
    entity_identity!(Treatment);

    fn references(&self) -> Vec<Reference<'_>> {
        RefCollector::default()
            .one(EntityKind::Procedure, &self.procedure_id)
            .all(EntityKind::Organism, &self.organism_ids)
            .all(EntityKind::Cohort, &self.cohort_ids)
            .finish()
    }

    fn retain_references(&mut self, exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        retain_one(&mut self.procedure_id, EntityKind::Procedure, exists)
            + retain_all(&mut self.organism_ids, EntityKind::Organism, exists)
            + retain_all(&mut self.cohort_ids, EntityKind::Cohort, exists)
    }

    fn check_statuses(&self) -> Result<(), ValidationError> {
        ensure_recognized(Self::KIND, "status", self.status.is_recognized(), self.status.as_str())
    }

    fn check_invariants(&self) -> Result<(), ValidationError> {
        if self.procedure_id.is_empty() {
            return Err(ValidationError::MissingRelation {
                kind: Self::KIND,
                relation: "procedure id",
            });
        }
        self.check_statuses()
    }

    fn normalize(&mut self) {
        if let Some(status) = self.status.normalized() {
            self.status = status;
        }
        dedupe(&mut self.organism_ids);
        dedupe(&mut self.cohort_ids);
    }
}

/// A recorded observation about a procedure, organism or cohort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Observation {
    #[serde(flatten)]
    pub base: Base,
    pub procedure_id: Option<String>,
    pub organism_id: Option<String>,
    pub cohort_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub observer: String,
    pub notes: String,
    pub data: Attributes,
}

impl Observation {
    /// Replaces the observation payload, treating `None` as empty.
    pub fn set_data(&mut self, data: Option<Attributes>) {
        self.data = Attributes::normalized(data);
    }

    fn has_anchor(&self) -> bool {
        [&self.procedure_id, &self.organism_id, &self.cohort_id]
            .iter()
            .any(|id| id.as_deref().is_some_and(|id| !id.is_empty()))
    }
}

impl Entity for Observation {
    entity_identity!(Observation);

    fn references(&self) -> Vec<Reference<'_>> {
        RefCollector::default()
            .opt(EntityKind::Procedure, &self.procedure_id)
            .opt(EntityKind::Organism, &self.organism_id)
            .opt(EntityKind::Cohort, &self.cohort_id)
            .finish()
    }

    fn retain_references(&mut self, exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        retain_opt(&mut self.procedure_id, EntityKind::Procedure, exists)
            + retain_opt(&mut self.organism_id, EntityKind::Organism, exists)
            + retain_opt(&mut self.cohort_id, EntityKind::Cohort, exists)
    }

    fn check_invariants(&self) -> Result<(), ValidationError> {
        if !self.has_anchor() {
            return Err(ValidationError::MissingRelation {
                kind: Self::KIND,
                relation: "procedure, organism, or cohort reference",
            });
        }
        Ok(())
    }

    fn normalize(&mut self) {
        clear_blank(&mut self.procedure_id);
        clear_blank(&mut self.organism_id);
        clear_blank(&mut self.cohort_id);
    }
}

/// One hand-off in a sample's chain of custody.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodyEvent {
    pub actor: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub notes: String,
}

/// A physical sample taken from an organism or cohort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sample {
    #[serde(flatten)]
    pub base: Base,
    pub identifier: String,
    pub source_type: SampleSource,
    pub organism_id: Option<String>,
    pub cohort_id: Option<String>,
    pub facility_id: String,
    pub collected_at: DateTime<Utc>,
    pub status: SampleStatus,
    pub storage_location: String,
    pub assay_type: String,
    #[serde(deserialize_with = "nullable")]
    pub chain_of_custody: Vec<CustodyEvent>,
    pub attributes: Attributes,
}

impl Sample {
    /// Appends a custody hand-off.
    pub fn record_custody(&mut self, event: CustodyEvent) {
        self.chain_of_custody.push(event);
    }

    /// The most recent custody event, if any.
    #[must_use]
    pub fn current_custodian(&self) -> Option<&CustodyEvent> {
        self.chain_of_custody.iter().max_by_key(|event| event.timestamp)
    }
}

impl Entity for Sample {
    entity_identity!(Sample);

    fn references(&self) -> Vec<Reference<'_>> {
        RefCollector::default()
            .one(EntityKind::Facility, &self.facility_id)
            .opt(EntityKind::Organism, &self.organism_id)
            .opt(EntityKind::Cohort, &self.cohort_id)
            .finish()
    }

    fn retain_references(&mut self, exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        retain_one(&mut self.facility_id, EntityKind::Facility, exists)
            + retain_opt(&mut self.organism_id, EntityKind::Organism, exists)
            + retain_opt(&mut self.cohort_id, EntityKind::Cohort, exists)
    }

    fn check_statuses(&self) -> Result<(), ValidationError> {
        ensure_recognized(Self::KIND, "status", self.status.is_recognized(), self.status.as_str())?;
        ensure_recognized(
            Self::KIND,
            "source type",
            self.source_type.is_recognized(),
            self.source_type.as_str(),
        )
    }

    fn check_invariants(&self) -> Result<(), ValidationError> {
        if self.facility_id.is_empty() {
            return Err(ValidationError::MissingRelation {
                kind: Self::KIND,
                relation: "facility id",
            });
        }
        let has_subject = [&self.organism_id, &self.cohort_id]
            .iter()
            .any(|id| id.as_deref().is_some_and(|id| !id.is_empty()));
        if !has_subject {
            return Err(ValidationError::MissingRelation {
                kind: Self::KIND,
                relation: "organism or cohort reference",
            });
        }
        self.check_statuses()
    }

    fn normalize(&mut self) {
        if let Some(status) = self.status.normalized() {
            self.status = status;
        }
        if let Some(source) = self.source_type.normalized() {
            self.source_type = source;
        }
        clear_blank(&mut self.organism_id);
        clear_blank(&mut self.cohort_id);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn observation_needs_an_anchor() {
        let observation = Observation::default();
        assert_eq!(
            observation.check_invariants().unwrap_err().to_string(),
            "observation requires procedure, organism, or cohort reference"
        );

        let anchored = Observation {
            cohort_id: Some("c".to_string()),
            ..Observation::default()
        };
        assert!(anchored.check_invariants().is_ok());
    }

    #[test]
    fn sample_needs_facility_then_subject() {
        let mut sample = Sample::default();
        assert_eq!(
            sample.check_invariants().unwrap_err().to_string(),
            "sample requires facility id"
        );
        sample.facility_id = "f".to_string();
        assert_eq!(
            sample.check_invariants().unwrap_err().to_string(),
            "sample requires organism or cohort reference"
        );
        sample.organism_id = Some("o".to_string());
        assert!(sample.check_invariants().is_ok());
    }

    #[test]
    fn treatment_dedupes_subjects_but_not_logs() {
        let mut treatment = Treatment::new("dose", "proc");
        treatment.organism_ids = vec!["o".to_string(), "o".to_string()];
        treatment.administration_log = vec!["10mg".to_string(), "10mg".to_string()];
        treatment.normalize();
        assert_eq!(treatment.organism_ids, vec!["o"]);
        assert_eq!(treatment.administration_log.len(), 2);
    }

    #[test]
    fn procedure_normalize_clears_derived() {
        let mut procedure = Procedure::new("Imaging", "prot", Utc::now());
        procedure.treatment_ids = vec!["t".to_string()];
        procedure.observation_ids = vec!["o".to_string()];
        procedure.normalize();
        assert!(procedure.treatment_ids.is_empty());
        assert!(procedure.observation_ids.is_empty());
    }

    #[test]
    fn current_custodian_is_latest_event() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let mut sample = Sample::default();
        sample.record_custody(CustodyEvent {
            actor: "courier".to_string(),
            timestamp: late,
            ..CustodyEvent::default()
        });
        sample.record_custody(CustodyEvent {
            actor: "tech".to_string(),
            timestamp: early,
            ..CustodyEvent::default()
        });
        assert_eq!(sample.current_custodian().map(|e| e.actor.as_str()), Some("courier"));
    }
}
