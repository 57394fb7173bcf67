//! Snapshot import, export and repair.

use colonycore::{
    migrate, Cohort, ColonyStore, Entity, EntityKind, Facility, HousingUnit, Observation,
    Organism, Procedure, Project, Protocol, Sample, Snapshot, SupplyItem, Treatment,
};
use proptest::prelude::*;
use serde_json::json;

fn populated_store() -> ColonyStore {
    let store = ColonyStore::new();
    store
        .run_in_transaction(|tx| {
            let facility = tx.create_facility(Facility::new("AQ-1", "Aquatics"))?;
            let unit = tx.create_housing_unit(HousingUnit::new("Tank 1", facility.id(), 6))?;
            let protocol = tx.create_protocol(Protocol::new("P-1", "Husbandry", 100))?;
            let mut project = Project::new("PRJ", "Regeneration");
            project.facility_ids = vec![facility.id().to_string()];
            let project = tx.create_project(project)?;

            let mut cohort = Cohort::new("Batch A");
            cohort.housing_id = Some(unit.id().to_string());
            let cohort = tx.create_cohort(cohort)?;

            let mut organism = Organism::new("Nemo", "Danio rerio");
            organism.cohort_id = Some(cohort.id().to_string());
            organism.project_id = Some(project.id().to_string());
            let organism = tx.create_organism(organism)?;

            let mut procedure = Procedure::new("Imaging", protocol.id(), tx.now());
            procedure.project_id = Some(project.id().to_string());
            let procedure = tx.create_procedure(procedure)?;
            let mut treatment = Treatment::new("Dose", procedure.id());
            treatment.organism_ids = vec![organism.id().to_string()];
            tx.create_treatment(treatment)?;

            tx.create_sample(Sample {
                identifier: "S-1".to_string(),
                facility_id: facility.id().to_string(),
                organism_id: Some(organism.id().to_string()),
                ..Sample::default()
            })?;
            tx.create_supply_item(SupplyItem {
                name: "Feed".to_string(),
                project_ids: vec![project.id().to_string()],
                facility_ids: vec![facility.id().to_string()],
                ..SupplyItem::default()
            })?;
            Ok(())
        })
        .unwrap();
    store
}

#[test]
fn export_then_import_is_idempotent() {
    let store = populated_store();
    let exported = store.export_state();

    let project = exported.projects.values().next().unwrap();
    assert_eq!(project.organism_ids.len(), 1);
    assert_eq!(project.procedure_ids.len(), 1);
    assert_eq!(project.supply_item_ids.len(), 1);
    let facility = exported.facilities.values().next().unwrap();
    assert_eq!(facility.project_ids, vec![project.id().to_string()]);

    let fresh = ColonyStore::new();
    let report = fresh.import_state(exported.clone());
    assert!(report.is_noop(), "{report:?}");
    assert_eq!(fresh.export_state(), exported);
    assert_eq!(fresh.export_state().fingerprint(), exported.fingerprint());
}

#[test]
fn json_round_trip_preserves_everything() {
    let exported = populated_store().export_state();
    let text = serde_json::to_string(&exported).unwrap();
    let decoded: Snapshot = serde_json::from_str(&text).unwrap();
    assert_eq!(decoded, exported);
}

#[test]
fn dangling_observation_is_removed_on_import() {
    let snapshot: Snapshot = serde_json::from_value(json!({
        "observations": {
            "obs-1": {
                "id": "obs-1",
                "procedure_id": "ghost-procedure",
                "organism_id": "ghost-organism",
                "cohort_id": "ghost-cohort",
                "observer": "dana"
            }
        }
    }))
    .unwrap();

    let store = ColonyStore::new();
    let report = store.import_state(snapshot);
    assert!(store.get::<Observation>("obs-1").is_none());
    assert_eq!(report.dropped_references, 3);
    let removed: Vec<_> = report.removed_of(EntityKind::Observation).collect();
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].id, "obs-1");
}

#[test]
fn legacy_shapes_are_repaired() {
    let snapshot: Snapshot = serde_json::from_value(json!({
        "organisms": null,
        "facilities": {
            "f1": { "id": "f1", "code": "AQ", "name": "Aquatics", "environment_baselines": null }
        },
        "housing": {
            "h1": { "id": "wrong-id", "name": "Tank", "facility_id": "f1", "capacity": 0,
                    "environment": "Aquatic", "state": "ACTIVE" },
            "h2": { "id": "h2", "name": "Gone", "facility_id": "f-missing", "capacity": 3 }
        },
        "cohorts": {
            "c1": { "id": "c1", "name": "Batch", "housing_id": "h2" }
        },
        "treatments": null,
        "supplies": {
            "s1": { "id": "s1", "name": "Feed", "facility_ids": ["f1", "f1", "ghost", ""] }
        }
    }))
    .unwrap();

    let (migrated, report) = migrate(snapshot);
    assert!(report.changed);
    assert_eq!(report.rekeyed, 1);
    assert_eq!(report.repaired_fields, 1);

    let unit = &migrated.housing["h1"];
    assert_eq!(unit.base.id, "h1");
    assert_eq!(unit.capacity, 1);
    assert_eq!(unit.environment.as_str(), "aquatic");
    assert_eq!(unit.state.as_str(), "active");
    assert!(!migrated.housing.contains_key("h2"));
    assert_eq!(migrated.cohorts["c1"].housing_id, None);
    assert_eq!(migrated.supplies["s1"].facility_ids, vec!["f1"]);
    assert_eq!(migrated.facilities["f1"].housing_unit_ids, vec!["h1"]);
    assert!(migrated.facilities["f1"].environment_baselines.is_empty());

    let (again, second) = migrate(migrated.clone());
    assert!(second.is_noop(), "{second:?}");
    assert_eq!(again, migrated);
}

#[test]
fn negative_counts_are_repaired_not_rejected() {
    let snapshot: Snapshot = serde_json::from_value(json!({
        "facilities": { "f1": { "id": "f1", "code": "AQ", "name": "Aquatics" } },
        "housing": {
            "h1": { "id": "h1", "name": "Tank 1", "facility_id": "f1", "capacity": 4 },
            "h2": { "id": "h2", "name": "Tank 2", "facility_id": "f1", "capacity": -1 }
        },
        "protocols": {
            "p1": { "id": "p1", "code": "P", "title": "Husbandry", "max_subjects": -5 }
        },
        "supplies": {
            "s1": { "id": "s1", "name": "Feed", "quantity_on_hand": -2, "reorder_level": null }
        }
    }))
    .unwrap();

    let store = ColonyStore::new();
    let report = store.import_state(snapshot);
    assert_eq!(report.repaired_fields, 1);
    assert!(report.removed.is_empty(), "{report:?}");
    assert_eq!(store.get::<HousingUnit>("h1").unwrap().capacity, 4);
    assert_eq!(store.get::<HousingUnit>("h2").unwrap().capacity, 1);
    assert_eq!(store.get::<Protocol>("p1").unwrap().max_subjects, 0);
    let supply = store.get::<SupplyItem>("s1").unwrap();
    assert_eq!((supply.quantity_on_hand, supply.reorder_level), (0, 0));
}

fn id_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("a".to_string()),
        Just("b".to_string()),
        Just("c".to_string()),
        Just("ghost".to_string()),
    ]
}

fn maybe_id() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::Value::Null),
        id_strategy().prop_map(serde_json::Value::String),
    ]
}

fn id_list() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(serde_json::Value::Null),
        prop::collection::vec(id_strategy(), 0..5).prop_map(|ids| json!(ids)),
    ]
}

fn capacity() -> impl Strategy<Value = u32> {
    prop_oneof![Just(0u32), 1u32..20]
}

prop_compose! {
    fn messy_snapshot()(
        facility_keys in prop::collection::btree_set(id_strategy(), 0..3),
        housing in prop::collection::btree_map(id_strategy(), (id_strategy(), capacity()), 0..4),
        organisms in prop::collection::btree_map(
            id_strategy(),
            (maybe_id(), maybe_id(), id_list()),
            0..4,
        ),
        observations in prop::collection::btree_map(
            id_strategy(),
            (maybe_id(), maybe_id(), maybe_id()),
            0..4,
        ),
        treatments in prop::collection::btree_map(id_strategy(), (id_strategy(), id_list()), 0..3),
    ) -> serde_json::Value {
        let facilities: serde_json::Map<_, _> = facility_keys
            .into_iter()
            .map(|key| (key.clone(), json!({ "id": key, "code": "F", "name": "F" })))
            .collect();
        let housing: serde_json::Map<_, _> = housing
            .into_iter()
            .map(|(key, (facility, cap))| {
                (key, json!({ "name": "tank", "facility_id": facility, "capacity": cap }))
            })
            .collect();
        let organisms: serde_json::Map<_, _> = organisms
            .into_iter()
            .map(|(key, (housing_id, cohort_id, parents))| {
                (key.clone(), json!({
                    "id": key,
                    "name": "o",
                    "housing_id": housing_id,
                    "cohort_id": cohort_id,
                    "parent_ids": parents,
                }))
            })
            .collect();
        let observations: serde_json::Map<_, _> = observations
            .into_iter()
            .map(|(key, (procedure_id, organism_id, cohort_id))| {
                (key, json!({
                    "procedure_id": procedure_id,
                    "organism_id": organism_id,
                    "cohort_id": cohort_id,
                }))
            })
            .collect();
        let treatments: serde_json::Map<_, _> = treatments
            .into_iter()
            .map(|(key, (procedure_id, organisms))| {
                (key, json!({ "name": "t", "procedure_id": procedure_id, "organism_ids": organisms }))
            })
            .collect();
        json!({
            "facilities": facilities,
            "housing": housing,
            "organisms": organisms,
            "observations": observations,
            "treatments": treatments,
            "cohorts": null,
        })
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn migration_is_idempotent(raw in messy_snapshot()) {
        let snapshot: Snapshot = serde_json::from_value(raw).unwrap();
        let (once, _) = migrate(snapshot);
        let (twice, report) = migrate(once.clone());
        prop_assert!(report.is_noop(), "second run changed something: {:?}", report);
        prop_assert_eq!(twice, once.clone());

        for unit in once.housing.values() {
            prop_assert!(once.facilities.contains_key(&unit.facility_id));
            prop_assert!(unit.capacity > 0);
        }
        for organism in once.organisms.values() {
            prop_assert!(!organism.parent_ids.contains(&organism.base.id));
            for parent in &organism.parent_ids {
                prop_assert!(once.organisms.contains_key(parent));
            }
        }
        prop_assert!(once.observations.is_empty() || once.observations.values().all(|o| {
            o.organism_id.iter().all(|id| once.organisms.contains_key(id))
        }), "observation references a missing organism");
    }
}
