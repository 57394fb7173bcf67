//! Store configuration.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::ColonyError;
use crate::rules::EvalContext;

/// Source of write timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Source of fresh record ids.
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Tunables for a [`ColonyStore`](crate::store::ColonyStore).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Upper bound on rule evaluation per transaction. `None` means unbounded.
    pub evaluation_timeout: Option<Duration>,
}

impl StoreConfig {
    const MIN_EVALUATION_TIMEOUT: Duration = Duration::from_millis(1);

    pub fn validate(self) -> Result<Self, ColonyError> {
        if let Some(timeout) = self.evaluation_timeout {
            if timeout < Self::MIN_EVALUATION_TIMEOUT {
                return Err(ColonyError::Config {
                    message: format!(
                        "evaluation_timeout must be at least {}ms (got {}µs)",
                        Self::MIN_EVALUATION_TIMEOUT.as_millis(),
                        timeout.as_micros()
                    ),
                });
            }
        }
        Ok(self)
    }

    /// A fresh evaluation context honouring `evaluation_timeout`.
    #[must_use]
    pub fn eval_context(&self) -> EvalContext {
        self.evaluation_timeout
            .map_or_else(EvalContext::background, EvalContext::with_timeout)
    }
}

pub(crate) fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

pub(crate) fn random_ids() -> IdGenerator {
    Arc::new(crate::entity::new_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_and_unbounded() {
        let config = StoreConfig::default().validate().unwrap();
        assert!(config.evaluation_timeout.is_none());
        assert!(!config.eval_context().is_expired());
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = StoreConfig {
            evaluation_timeout: Some(Duration::ZERO),
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("evaluation_timeout"));
    }
}
