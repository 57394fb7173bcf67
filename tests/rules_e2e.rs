//! Rule engine veto and reporting through the store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use colonycore::{
    Action, Change, ColonyError, ColonyResult, ColonyStore, Entity, EntityKind, EvalContext,
    EvaluationError, Facility, FnRule, HousingUnit, Rule, RuleResult, Severity, StateView,
    StoreConfig, Violation,
};

/// Blocks any housing unit whose capacity exceeds `max`.
struct CapacityLimit {
    max: u32,
}

impl Rule for CapacityLimit {
    fn name(&self) -> &str {
        "capacity-limit"
    }

    fn evaluate(
        &self,
        _ctx: &EvalContext,
        _view: &StateView<'_>,
        changes: &[Change],
    ) -> ColonyResult<RuleResult> {
        let mut result = RuleResult::default();
        for change in changes {
            if let Some(unit) = change.after_as::<HousingUnit>() {
                if unit.capacity > self.max {
                    result.push(
                        Violation::new(
                            self.name(),
                            Severity::Block,
                            format!("capacity {} exceeds {}", unit.capacity, self.max),
                        )
                        .for_entity(EntityKind::HousingUnit, unit.base.id.clone()),
                    );
                }
            }
        }
        Ok(result)
    }
}

fn with_facility(store: &ColonyStore) -> Facility {
    store
        .run_in_transaction(|tx| tx.create_facility(Facility::new("AQ-1", "Aquatics")))
        .unwrap()
        .value
}

#[test]
fn blocking_violation_discards_every_write() {
    let store = ColonyStore::builder()
        .rule(CapacityLimit { max: 10 })
        .build()
        .unwrap();
    let facility = with_facility(&store);
    let before = store.export_state();

    let err = store
        .run_in_transaction(|tx| {
            tx.create_housing_unit(HousingUnit::new("small", facility.id(), 4))?;
            tx.create_housing_unit(HousingUnit::new("huge", facility.id(), 50))?;
            tx.create_housing_unit(HousingUnit::new("bigger", facility.id(), 80))
        })
        .unwrap_err();

    assert!(err.is_rule_violation());
    let result = err.rule_result().unwrap();
    assert_eq!(result.blocking().count(), 2, "every violation is reported");
    assert!(result
        .violations
        .iter()
        .all(|v| v.kind == Some(EntityKind::HousingUnit)));
    assert_eq!(store.export_state(), before);
}

#[test]
fn warnings_are_returned_with_the_commit() {
    let store = ColonyStore::new();
    store.register_rule(FnRule::new("audit", |_, changes| {
        let mut result = RuleResult::default();
        for change in changes.iter().filter(|c| c.action == Action::Create) {
            result.push(Violation::new("", Severity::Warn, format!("new {}", change.kind)));
        }
        Ok(result)
    }));

    let commit = store
        .run_in_transaction(|tx| tx.create_facility(Facility::new("AQ-1", "Aquatics")))
        .unwrap();
    assert!(!commit.result.has_blocking());
    let warnings: Vec<_> = commit.result.warnings().collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].rule, "audit");
    assert_eq!(warnings[0].message, "new facility");
    assert_eq!(store.list::<Facility>().len(), 1);
}

#[test]
fn rules_see_post_mutation_state() {
    let store = ColonyStore::new();
    store.register_rule(FnRule::new("one-facility", |view, _| {
        let mut result = RuleResult::default();
        if view.list_facilities().len() > 1 {
            result.push(Violation::new("", Severity::Block, "only one facility allowed"));
        }
        Ok(result)
    }));

    with_facility(&store);
    let err = store
        .run_in_transaction(|tx| tx.create_facility(Facility::new("AQ-2", "Annex")))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "transaction blocked by rules: one-facility: only one facility allowed"
    );
    assert_eq!(store.list::<Facility>().len(), 1);
}

#[test]
fn rule_error_aborts_transaction() {
    let store = ColonyStore::new();
    store.register_rule(FnRule::new("flaky", |_, _| {
        Err(EvaluationError::RuleFailed {
            rule: "flaky".to_string(),
            message: "upstream unavailable".to_string(),
        }
        .into())
    }));

    let err = store
        .run_in_transaction(|tx| tx.create_facility(Facility::new("AQ-1", "Aquatics")))
        .unwrap_err();
    assert!(matches!(err, ColonyError::Evaluation(EvaluationError::RuleFailed { .. })));
    assert!(store.list::<Facility>().is_empty());
}

#[test]
fn slow_rules_hit_the_configured_deadline() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&calls);
    let store = ColonyStore::builder()
        .config(StoreConfig {
            evaluation_timeout: Some(Duration::from_millis(5)),
        })
        .rule(FnRule::new("slow", move |_, _| {
            counted.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            Ok(RuleResult::default())
        }))
        .rule(FnRule::new("never-reached", |_, _| {
            panic!("evaluation should stop at the deadline")
        }))
        .build()
        .unwrap();

    let err = store
        .run_in_transaction(|tx| tx.create_facility(Facility::new("AQ-1", "Aquatics")))
        .unwrap_err();
    assert!(matches!(
        err,
        ColonyError::Evaluation(EvaluationError::DeadlineExceeded { .. })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(store.list::<Facility>().is_empty());
}

#[test]
fn slow_callback_does_not_spend_the_rule_budget() {
    let timed = |store: &ColonyStore| {
        store.run_in_transaction(|tx| {
            thread::sleep(Duration::from_millis(50));
            tx.create_facility(Facility::new("AQ-1", "Aquatics"))
        })
    };
    let config = StoreConfig {
        evaluation_timeout: Some(Duration::from_millis(20)),
    };

    let bare = ColonyStore::builder().config(config.clone()).build().unwrap();
    timed(&bare).unwrap();

    let ruled = ColonyStore::builder()
        .config(config)
        .rule(FnRule::new("fast", |_, _| Ok(RuleResult::default())))
        .build()
        .unwrap();
    let commit = timed(&ruled).unwrap();
    assert_eq!(commit.changes.len(), 1);
}

#[test]
fn cancelled_context_stops_evaluation() {
    let store = ColonyStore::builder()
        .rule(FnRule::new("noop", |_, _| Ok(RuleResult::default())))
        .build()
        .unwrap();
    let ctx = EvalContext::background();
    ctx.cancel_token().cancel();

    let err = store
        .run_in_transaction_with(&ctx, |tx| tx.create_facility(Facility::new("AQ-1", "Aquatics")))
        .unwrap_err();
    assert!(matches!(
        err,
        ColonyError::Evaluation(EvaluationError::Cancelled { .. })
    ));
}
