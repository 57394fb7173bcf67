//! The store: one canonical state behind a reader/writer lock.
//!
//! Writers hold the exclusive lock for the whole transaction (clone, callback,
//! rule evaluation, commit), so transactions are serialized and a callback
//! must never call back into the store. Readers hold the shared lock only
//! long enough to clone.
//!
//! The canonical state is only ever replaced wholesale, never mutated in
//! place, so a lock poisoned by a panicking callback still guards a
//! consistent value and is recovered rather than reported.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::change::Change;
use crate::config::{random_ids, system_clock, Clock, IdGenerator, StoreConfig};
use crate::error::{ColonyError, ColonyResult};
use crate::migrate::{migrate_into_state, MigrationReport};
use crate::rules::{EvalContext, Rule, RuleResult, RulesEngine};
use crate::snapshot::Snapshot;
use crate::state::{ColonyState, Stored};
use crate::storage::SnapshotBackend;
use crate::transaction::Transaction;
use crate::view::StateView;

/// Outcome of a committed transaction.
#[derive(Debug, Clone)]
pub struct Commit<R> {
    /// Whatever the callback returned.
    pub value: R,
    /// Non-blocking findings (warnings and log entries) from the rules.
    pub result: RuleResult,
    /// The committed change log, in order.
    pub changes: Vec<Change>,
}

/// In-memory transactional colony store.
pub struct ColonyStore {
    state: RwLock<ColonyState>,
    rules: RwLock<RulesEngine>,
    config: StoreConfig,
    clock: Clock,
    ids: IdGenerator,
}

impl fmt::Debug for ColonyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColonyStore")
            .field("records", &self.read_state().len())
            .field("rules", &self.read_rules().rule_names().len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ColonyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ColonyStore {
    /// An empty store with no rules, the system clock and random ids.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ColonyState::new()),
            rules: RwLock::new(RulesEngine::new()),
            config: StoreConfig::default(),
            clock: system_clock(),
            ids: random_ids(),
        }
    }

    #[must_use]
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ColonyState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ColonyState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_rules(&self) -> RwLockReadGuard<'_, RulesEngine> {
        self.rules.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a rule evaluated by every later transaction.
    pub fn register_rule(&self, rule: impl Rule + 'static) {
        let mut rules = self.rules.write().unwrap_or_else(PoisonError::into_inner);
        rules.register(rule);
        debug!(target: "colonycore::store", rules = rules.len(), "rule registered");
    }

    /// Runs `f` against a private clone and commits it if every rule allows.
    ///
    /// Nothing becomes visible unless this returns `Ok`. A callback error,
    /// a rule error or a blocking violation discards the clone. The
    /// configured evaluation timeout starts once the callback has returned.
    pub fn run_in_transaction<R, F>(&self, f: F) -> ColonyResult<Commit<R>>
    where
        F: FnOnce(&mut Transaction) -> ColonyResult<R>,
    {
        self.transact(None, f)
    }

    /// Like [`run_in_transaction`](Self::run_in_transaction), but rules are
    /// evaluated under the caller's context instead of the configured one.
    pub fn run_in_transaction_with<R, F>(&self, ctx: &EvalContext, f: F) -> ColonyResult<Commit<R>>
    where
        F: FnOnce(&mut Transaction) -> ColonyResult<R>,
    {
        self.transact(Some(ctx), f)
    }

    fn transact<R, F>(&self, ctx: Option<&EvalContext>, f: F) -> ColonyResult<Commit<R>>
    where
        F: FnOnce(&mut Transaction) -> ColonyResult<R>,
    {
        let mut canonical = self.write_state();
        let mut tx = Transaction::new(canonical.clone(), self.now(), Arc::clone(&self.ids));

        let value = match f(&mut tx) {
            Ok(value) => value,
            Err(err) => {
                debug!(target: "colonycore::store", error = %err, "transaction rolled back by callback");
                return Err(err);
            }
        };

        let (working, changes) = tx.into_parts();
        let rules = self.read_rules().clone();
        let ctx = ctx.map_or_else(|| self.config.eval_context(), EvalContext::clone);
        let result = match rules.evaluate(&ctx, &StateView::new(&working), &changes) {
            Ok(result) => result,
            Err(err) => {
                warn!(target: "colonycore::store", error = %err, "rule evaluation failed");
                return Err(err);
            }
        };
        if result.has_blocking() {
            warn!(
                target: "colonycore::store",
                blocking = result.blocking().count(),
                summary = %result.summary(),
                "transaction vetoed by rules"
            );
            return Err(ColonyError::RuleViolation(result));
        }

        *canonical = working;
        debug!(
            target: "colonycore::store",
            changes = changes.len(),
            violations = result.violations.len(),
            "transaction committed"
        );
        Ok(Commit {
            value,
            result,
            changes,
        })
    }

    /// Calls `f` with a read-only view of a consistent private clone.
    pub fn view<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&StateView<'_>) -> R,
    {
        let snapshot = self.read_state().clone();
        f(&StateView::new(&snapshot))
    }

    /// Decorated copy of one record, if present.
    #[must_use]
    pub fn get<T: Stored>(&self, id: &str) -> Option<T> {
        let state = self.read_state();
        StateView::new(&state).find(id)
    }

    /// Decorated copies of every record of `T`, sorted by id.
    #[must_use]
    pub fn list<T: Stored>(&self) -> Vec<T> {
        let state = self.read_state();
        StateView::new(&state).list()
    }

    /// A serializable copy of the committed state, derived lists filled in.
    #[must_use]
    pub fn export_state(&self) -> Snapshot {
        let state = self.read_state();
        Snapshot::from_state(&state)
    }

    /// Migrates `snapshot` and installs it as the canonical state.
    ///
    /// Rules are not consulted: an import replaces the state wholesale.
    pub fn import_state(&self, snapshot: Snapshot) -> MigrationReport {
        let (migrated, report) = migrate_into_state(snapshot);
        let mut canonical = self.write_state();
        *canonical = migrated;
        info!(
            target: "colonycore::store",
            records = canonical.len(),
            removed = report.removed.len(),
            "state imported"
        );
        report
    }

    /// Writes the committed state to `backend`.
    pub fn save_to(&self, backend: &dyn SnapshotBackend) -> ColonyResult<()> {
        let snapshot = self.export_state();
        backend.save(&snapshot)?;
        info!(target: "colonycore::store", records = snapshot.len(), "state saved");
        Ok(())
    }

    /// Loads, migrates and installs the snapshot held by `backend`.
    ///
    /// A bucket that fails to decode aborts the load and leaves the current
    /// state untouched.
    pub fn load_from(&self, backend: &dyn SnapshotBackend) -> ColonyResult<MigrationReport> {
        let snapshot = backend.load()?;
        Ok(self.import_state(snapshot))
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

/// Configures a [`ColonyStore`].
#[derive(Default)]
pub struct StoreBuilder {
    rules: RulesEngine,
    config: StoreConfig,
    clock: Option<Clock>,
    ids: Option<IdGenerator>,
}

impl fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("rules", &self.rules)
            .field("config", &self.config)
            .field("custom_clock", &self.clock.is_some())
            .field("custom_ids", &self.ids.is_some())
            .finish()
    }
}

impl StoreBuilder {
    /// Replaces the rule set.
    #[must_use]
    pub fn rules(mut self, rules: RulesEngine) -> Self {
        self.rules = rules;
        self
    }

    /// Appends one rule.
    #[must_use]
    pub fn rule(mut self, rule: impl Rule + 'static) -> Self {
        self.rules.register(rule);
        self
    }

    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Source of write timestamps, for deterministic tests.
    #[must_use]
    pub fn clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Source of ids for records created without one.
    #[must_use]
    pub fn id_generator(mut self, ids: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.ids = Some(Arc::new(ids));
        self
    }

    /// Validates the configuration and builds the store.
    pub fn build(self) -> ColonyResult<ColonyStore> {
        let config = self.config.validate()?;
        Ok(ColonyStore {
            state: RwLock::new(ColonyState::new()),
            rules: RwLock::new(self.rules),
            config,
            clock: self.clock.unwrap_or_else(system_clock),
            ids: self.ids.unwrap_or_else(random_ids),
        })
    }
}
