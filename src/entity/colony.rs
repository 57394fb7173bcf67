use serde::{Deserialize, Serialize};

use super::status::{ensure_recognized, LifecycleStage};
use super::{
    clear_blank, dedupe, entity_identity, nullable, retain_all, retain_opt, Base, Entity,
    EntityKind, RefCollector, Reference,
};
use crate::error::ValidationError;
use crate::value::Attributes;

/// A group of organisms managed together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cohort {
    #[serde(flatten)]
    pub base: Base,
    pub name: String,
    pub purpose: String,
    pub project_id: Option<String>,
    pub housing_id: Option<String>,
    pub protocol_id: Option<String>,
}

impl Cohort {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for Cohort {
    entity_identity!(Cohort);

    fn references(&self) -> Vec<Reference<'_>> {
        RefCollector::default()
            .opt(EntityKind::Project, &self.project_id)
            .opt(EntityKind::HousingUnit, &self.housing_id)
            .opt(EntityKind::Protocol, &self.protocol_id)
            .finish()
    }

    fn retain_references(&mut self, exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        retain_opt(&mut self.project_id, EntityKind::Project, exists)
            + retain_opt(&mut self.housing_id, EntityKind::HousingUnit, exists)
            + retain_opt(&mut self.protocol_id, EntityKind::Protocol, exists)
    }

    fn normalize(&mut self) {
        clear_blank(&mut self.project_id);
        clear_blank(&mut self.housing_id);
        clear_blank(&mut self.protocol_id);
    }
}

/// An individual animal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Organism {
    #[serde(flatten)]
    pub base: Base,
    pub name: String,
    pub species: String,
    /// Free-text line label, kept alongside the structured `line_id`.
    pub line: String,
    pub line_id: Option<String>,
    pub strain_id: Option<String>,
    pub stage: LifecycleStage,
    pub cohort_id: Option<String>,
    pub housing_id: Option<String>,
    pub protocol_id: Option<String>,
    pub project_id: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub parent_ids: Vec<String>,
    pub attributes: Attributes,
}

impl Organism {
    #[must_use]
    pub fn new(name: impl Into<String>, species: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            species: species.into(),
            ..Self::default()
        }
    }

    /// Replaces the attribute document, treating `None` as empty.
    pub fn set_attributes(&mut self, attributes: Option<Attributes>) {
        self.attributes = Attributes::normalized(attributes);
    }
}

impl Entity for Organism {
    entity_identity!(Organism);

    fn references(&self) -> Vec<Reference<'_>> {
        RefCollector::default()
            .opt(EntityKind::Line, &self.line_id)
            .opt(EntityKind::Strain, &self.strain_id)
            .opt(EntityKind::Cohort, &self.cohort_id)
            .opt(EntityKind::HousingUnit, &self.housing_id)
            .opt(EntityKind::Protocol, &self.protocol_id)
            .opt(EntityKind::Project, &self.project_id)
            .all(EntityKind::Organism, &self.parent_ids)
            .finish()
    }

    fn retain_references(&mut self, exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        let own_id = self.base.id.clone();
        let before = self.parent_ids.len();
        self.parent_ids.retain(|parent| *parent != own_id);
        let self_links = before - self.parent_ids.len();

        self_links
            + retain_opt(&mut self.line_id, EntityKind::Line, exists)
            + retain_opt(&mut self.strain_id, EntityKind::Strain, exists)
            + retain_opt(&mut self.cohort_id, EntityKind::Cohort, exists)
            + retain_opt(&mut self.housing_id, EntityKind::HousingUnit, exists)
            + retain_opt(&mut self.protocol_id, EntityKind::Protocol, exists)
            + retain_opt(&mut self.project_id, EntityKind::Project, exists)
            + retain_all(&mut self.parent_ids, EntityKind::Organism, exists)
    }

    fn check_statuses(&self) -> Result<(), ValidationError> {
        ensure_recognized(Self::KIND, "stage", self.stage.is_recognized(), self.stage.as_str())
    }

    fn check_invariants(&self) -> Result<(), ValidationError> {
        if !self.base.id.is_empty() && self.parent_ids.iter().any(|p| *p == self.base.id) {
            return Err(ValidationError::SelfReference {
                kind: Self::KIND,
                id: self.base.id.clone(),
                relation: "parent",
            });
        }
        self.check_statuses()
    }

    fn normalize(&mut self) {
        if let Some(stage) = self.stage.normalized() {
            self.stage = stage;
        }
        clear_blank(&mut self.line_id);
        clear_blank(&mut self.strain_id);
        clear_blank(&mut self.cohort_id);
        clear_blank(&mut self.housing_id);
        clear_blank(&mut self.protocol_id);
        clear_blank(&mut self.project_id);
        dedupe(&mut self.parent_ids);
    }
}

/// A breeding pair or group and its pairing intent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreedingUnit {
    #[serde(flatten)]
    pub base: Base,
    pub name: String,
    pub strategy: String,
    pub housing_id: Option<String>,
    pub protocol_id: Option<String>,
    pub line_id: Option<String>,
    pub strain_id: Option<String>,
    pub target_line_id: Option<String>,
    pub target_strain_id: Option<String>,
    pub pairing_intent: String,
    pub pairing_notes: String,
    #[serde(deserialize_with = "nullable")]
    pub female_ids: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub male_ids: Vec<String>,
    pub pairing_attributes: Attributes,
}

impl BreedingUnit {
    #[must_use]
    pub fn new(name: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategy: strategy.into(),
            ..Self::default()
        }
    }
}

impl Entity for BreedingUnit {
    entity_identity!(BreedingUnit);

    fn references(&self) -> Vec<Reference<'_>> {
        RefCollector::default()
            .opt(EntityKind::HousingUnit, &self.housing_id)
            .opt(EntityKind::Protocol, &self.protocol_id)
            .opt(EntityKind::Line, &self.line_id)
            .opt(EntityKind::Strain, &self.strain_id)
            .opt(EntityKind::Line, &self.target_line_id)
            .opt(EntityKind::Strain, &self.target_strain_id)
            .all(EntityKind::Organism, &self.female_ids)
            .all(EntityKind::Organism, &self.male_ids)
            .finish()
    }

    fn retain_references(&mut self, exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        retain_opt(&mut self.housing_id, EntityKind::HousingUnit, exists)
            + retain_opt(&mut self.protocol_id, EntityKind::Protocol, exists)
            + retain_opt(&mut self.line_id, EntityKind::Line, exists)
            + retain_opt(&mut self.strain_id, EntityKind::Strain, exists)
            + retain_opt(&mut self.target_line_id, EntityKind::Line, exists)
            + retain_opt(&mut self.target_strain_id, EntityKind::Strain, exists)
            + retain_all(&mut self.female_ids, EntityKind::Organism, exists)
            + retain_all(&mut self.male_ids, EntityKind::Organism, exists)
    }

    fn normalize(&mut self) {
        clear_blank(&mut self.housing_id);
        clear_blank(&mut self.protocol_id);
        clear_blank(&mut self.line_id);
        clear_blank(&mut self.strain_id);
        clear_blank(&mut self.target_line_id);
        clear_blank(&mut self.target_strain_id);
        dedupe(&mut self.female_ids);
        dedupe(&mut self.male_ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn organism_cannot_parent_itself() {
        let mut organism = Organism::new("Nemo", "Danio rerio");
        organism.base.id = "o1".to_string();
        organism.parent_ids = vec!["o1".to_string()];
        assert!(matches!(
            organism.check_invariants(),
            Err(ValidationError::SelfReference { .. })
        ));

        let dropped = organism.retain_references(&|_, _| true);
        assert_eq!(dropped, 1);
        assert!(organism.parent_ids.is_empty());
    }

    #[test]
    fn organism_normalize_blanks_become_none() {
        let mut organism = Organism::new("Nemo", "Danio rerio");
        organism.cohort_id = Some(String::new());
        organism.parent_ids = vec!["a".to_string(), "a".to_string()];
        organism.normalize();
        assert_eq!(organism.cohort_id, None);
        assert_eq!(organism.parent_ids, vec!["a"]);
        assert!(organism.references().iter().all(|r| r.kind == EntityKind::Organism));
    }

    #[test]
    fn breeding_unit_reports_every_parent_kind() {
        let unit = BreedingUnit {
            housing_id: Some("h".to_string()),
            target_line_id: Some("l".to_string()),
            female_ids: vec!["f1".to_string()],
            male_ids: vec!["m1".to_string()],
            ..BreedingUnit::new("pair", "pair")
        };
        let refs = unit.references();
        assert_eq!(refs.len(), 4);
        assert!(refs.contains(&Reference { kind: EntityKind::Line, id: "l" }));
    }

    #[test]
    fn cohort_retain_clears_dangling_housing() {
        let mut cohort = Cohort {
            housing_id: Some("gone".to_string()),
            project_id: Some("p".to_string()),
            ..Cohort::new("batch")
        };
        let dropped = cohort.retain_references(&|kind, _| kind == EntityKind::Project);
        assert_eq!(dropped, 1);
        assert_eq!(cohort.housing_id, None);
        assert_eq!(cohort.project_id.as_deref(), Some("p"));
    }
}
