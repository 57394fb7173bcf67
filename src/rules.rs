//! Rule engine: policy checks that can veto a transaction.
//!
//! Rules see a read-only [`StateView`] of the post-mutation working copy and
//! the ordered change log. Any [`Severity::Block`] violation makes the store
//! discard the whole transaction; warnings and log entries are returned to the
//! caller with the commit.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::change::Change;
use crate::entity::EntityKind;
use crate::error::{ColonyResult, EvaluationError};
use crate::view::StateView;

/// How serious a violation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Log,
    Warn,
    Block,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log => write!(f, "log"),
            Self::Warn => write!(f, "warn"),
            Self::Block => write!(f, "block"),
        }
    }
}

/// A single finding reported by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub kind: Option<EntityKind>,
    pub entity_id: Option<String>,
}

impl Violation {
    pub fn new(rule: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            severity,
            message: message.into(),
            kind: None,
            entity_id: None,
        }
    }

    /// Attaches the record the finding is about.
    #[must_use]
    pub fn for_entity(mut self, kind: EntityKind, id: impl Into<String>) -> Self {
        self.kind = Some(kind);
        self.entity_id = Some(id.into());
        self
    }
}

/// Aggregated findings from every registered rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
    pub violations: Vec<Violation>,
}

impl RuleResult {
    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    /// Appends every violation from `other`.
    pub fn merge(&mut self, other: Self) {
        self.violations.extend(other.violations);
    }

    #[must_use]
    pub fn has_blocking(&self) -> bool {
        self.violations.iter().any(|v| v.severity == Severity::Block)
    }

    pub fn blocking(&self) -> impl Iterator<Item = &Violation> {
        self.with_severity(Severity::Block)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.with_severity(Severity::Warn)
    }

    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(move |v| v.severity == severity)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// `rule: message` for each blocking violation, joined with `; `.
    #[must_use]
    pub fn summary(&self) -> String {
        self.blocking()
            .map(|v| format!("{}: {}", v.rule, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Deadline and cancellation for one evaluation.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    deadline: Option<(Instant, Duration)>,
    cancelled: Arc<AtomicBool>,
}

/// Handle that cancels the evaluation it was taken from.
#[derive(Debug, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl EvalContext {
    /// A context with no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `budget` from now.
    #[must_use]
    pub fn with_timeout(budget: Duration) -> Self {
        let deadline = Instant::now().checked_add(budget).map(|at| (at, budget));
        Self {
            deadline,
            cancelled: Arc::default(),
        }
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken(Arc::clone(&self.cancelled))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|(at, _)| Instant::now() >= at)
    }

    /// Fails if the evaluation was cancelled or ran past its deadline.
    pub fn ensure_active(&self, next_rule: &str) -> Result<(), EvaluationError> {
        if self.is_cancelled() {
            return Err(EvaluationError::Cancelled {
                rule: next_rule.to_string(),
            });
        }
        match self.deadline {
            Some((at, budget)) if Instant::now() >= at => {
                Err(EvaluationError::DeadlineExceeded { budget })
            }
            _ => Ok(()),
        }
    }
}

/// A policy evaluated against every transaction before commit.
pub trait Rule: Send + Sync {
    /// Stable name used to attribute violations.
    fn name(&self) -> &str;

    /// Inspects the post-mutation state and the change log.
    ///
    /// Returning an error aborts the transaction just like a blocking result,
    /// but reports the error instead of a [`RuleResult`].
    fn evaluate(
        &self,
        ctx: &EvalContext,
        view: &StateView<'_>,
        changes: &[Change],
    ) -> ColonyResult<RuleResult>;
}

/// Adapts a closure into a [`Rule`].
pub struct FnRule<F> {
    name: String,
    check: F,
}

impl<F> FnRule<F>
where
    F: Fn(&StateView<'_>, &[Change]) -> ColonyResult<RuleResult> + Send + Sync,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> Rule for FnRule<F>
where
    F: Fn(&StateView<'_>, &[Change]) -> ColonyResult<RuleResult> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        _ctx: &EvalContext,
        view: &StateView<'_>,
        changes: &[Change],
    ) -> ColonyResult<RuleResult> {
        (self.check)(view, changes)
    }
}

impl<F> fmt::Debug for FnRule<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnRule").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Ordered set of rules.
#[derive(Clone, Default)]
pub struct RulesEngine {
    rules: Vec<Arc<dyn Rule>>,
}

impl fmt::Debug for RulesEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RulesEngine")
            .field("rules", &self.rule_names())
            .finish()
    }
}

impl RulesEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule; rules run in registration order.
    pub fn register(&mut self, rule: impl Rule + 'static) {
        self.rules.push(Arc::new(rule));
    }

    /// Adds an already shared rule.
    pub fn register_shared(&mut self, rule: Arc<dyn Rule>) {
        self.rules.push(rule);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    #[must_use]
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Runs every rule and merges their findings.
    ///
    /// The context is checked before each rule and, if any rule ran, once
    /// more at the end. The first rule error stops evaluation. An empty
    /// engine never fails.
    pub fn evaluate(
        &self,
        ctx: &EvalContext,
        view: &StateView<'_>,
        changes: &[Change],
    ) -> ColonyResult<RuleResult> {
        let mut merged = RuleResult::default();
        for rule in &self.rules {
            ctx.ensure_active(rule.name())?;
            let mut result = rule.evaluate(ctx, view, changes)?;
            for violation in &mut result.violations {
                if violation.rule.is_empty() {
                    violation.rule = rule.name().to_string();
                }
            }
            debug!(
                target: "colonycore::rules",
                rule = rule.name(),
                violations = result.violations.len(),
                "rule evaluated"
            );
            merged.merge(result);
        }
        if !self.rules.is_empty() {
            ctx.ensure_active("<end of evaluation>")?;
        }
        Ok(merged)
    }
}
