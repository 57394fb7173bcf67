use serde::{Deserialize, Serialize};

use super::{
    dedupe, entity_identity, nullable, retain_all, retain_one, Base, Entity, EntityKind,
    RefCollector, Reference,
};
use crate::error::ValidationError;
use crate::value::Attributes;

/// A genotype marker with its assay and allele set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenotypeMarker {
    #[serde(flatten)]
    pub base: Base,
    pub name: String,
    pub locus: String,
    #[serde(deserialize_with = "nullable")]
    pub alleles: Vec<String>,
    pub assay_method: String,
    pub interpretation: String,
    pub version: String,
    pub attributes: Attributes,
}

impl Entity for GenotypeMarker {
    entity_identity!(GenotypeMarker);

    fn references(&self) -> Vec<Reference<'_>> {
        Vec::new()
    }

    fn retain_references(&mut self, _exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        0
    }

    fn check_invariants(&self) -> Result<(), ValidationError> {
        if self.alleles.iter().all(String::is_empty) {
            return Err(ValidationError::MissingRelation {
                kind: Self::KIND,
                relation: "at least one allele",
            });
        }
        Ok(())
    }

    fn normalize(&mut self) {
        dedupe(&mut self.alleles);
    }
}

/// A genetic line: the lineage organisms and strains descend from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Line {
    #[serde(flatten)]
    pub base: Base,
    pub code: String,
    pub name: String,
    pub origin: String,
    pub description: String,
    #[serde(deserialize_with = "nullable")]
    pub genotype_marker_ids: Vec<String>,
    pub default_attributes: Attributes,
    pub extension_overrides: Attributes,
}

impl Line {
    #[must_use]
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for Line {
    entity_identity!(Line);

    fn references(&self) -> Vec<Reference<'_>> {
        RefCollector::default()
            .all(EntityKind::GenotypeMarker, &self.genotype_marker_ids)
            .finish()
    }

    fn retain_references(&mut self, exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        retain_all(&mut self.genotype_marker_ids, EntityKind::GenotypeMarker, exists)
    }

    fn normalize(&mut self) {
        dedupe(&mut self.genotype_marker_ids);
    }
}

/// A strain: a named generation within a line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Strain {
    #[serde(flatten)]
    pub base: Base,
    pub code: String,
    pub name: String,
    pub line_id: String,
    pub description: String,
    pub generation: String,
    #[serde(deserialize_with = "nullable")]
    pub genotype_marker_ids: Vec<String>,
}

impl Strain {
    #[must_use]
    pub fn new(code: impl Into<String>, name: impl Into<String>, line_id: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            line_id: line_id.into(),
            ..Self::default()
        }
    }
}

impl Entity for Strain {
    entity_identity!(Strain);

    fn references(&self) -> Vec<Reference<'_>> {
        RefCollector::default()
            .one(EntityKind::Line, &self.line_id)
            .all(EntityKind::GenotypeMarker, &self.genotype_marker_ids)
            .finish()
    }

    fn retain_references(&mut self, exists: &dyn Fn(EntityKind, &str) -> bool) -> usize {
        retain_one(&mut self.line_id, EntityKind::Line, exists)
            + retain_all(&mut self.genotype_marker_ids, EntityKind::GenotypeMarker, exists)
    }

    fn check_invariants(&self) -> Result<(), ValidationError> {
        if self.line_id.is_empty() {
            return Err(ValidationError::MissingRelation {
                kind: Self::KIND,
                relation: "line id",
            });
        }
        Ok(())
    }

    fn normalize(&mut self) {
        dedupe(&mut self.genotype_marker_ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_needs_an_allele() {
        let marker = GenotypeMarker {
            name: "gfp".to_string(),
            ..GenotypeMarker::default()
        };
        assert!(marker.check_invariants().is_err());
    }

    #[test]
    fn strain_references_line_then_markers() {
        let mut strain = Strain::new("S1", "first", "line-1");
        strain.genotype_marker_ids = vec!["m1".to_string(), "m2".to_string()];
        let kinds: Vec<_> = strain.references().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![EntityKind::Line, EntityKind::GenotypeMarker, EntityKind::GenotypeMarker]
        );
    }

    #[test]
    fn strain_losing_its_line_fails_invariants() {
        let mut strain = Strain::new("S1", "first", "line-1");
        let dropped = strain.retain_references(&|_, _| false);
        assert_eq!(dropped, 1);
        assert_eq!(
            strain.check_invariants().unwrap_err().to_string(),
            "strain requires line id"
        );
    }
}
