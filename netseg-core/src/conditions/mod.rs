//! Condition/status post-processing callbacks (SPEC_FULL.md §6, §4.10).
//!
//! Only [`Host`] carries a materialized `Ready` condition in the data model
//! (SPEC_FULL.md §3) — it is the only entity kind whose bind path gates on
//! "synchronized with SGROUP". `ConditionManager` is scoped to it accordingly;
//! a future entity that grows a `Ready` condition of its own gets its own
//! `process_*`/`save_*` pair rather than a generic method nobody can type-check.

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::model::Host;

/// Outcome of an external sync attempt, fed into `process_host_conditions` to
/// decide the new `Ready` value (SPEC_FULL.md §4.10: success ⇒ Ready=true,
/// failure ⇒ Ready=false with the error recorded as the reason).
pub enum SyncOutcome<'a> {
    Success,
    Failure(&'a str),
}

/// Reconciles and persists a Host's status conditions around a sync attempt.
#[async_trait]
pub trait ConditionManager: Send + Sync {
    /// Recomputes `host.conditions` in place from the sync outcome, without
    /// persisting — callers (typically a service's post-commit step) decide
    /// whether and when to call `save_host_conditions`.
    async fn process_host_conditions(&self, host: &mut Host, outcome: SyncOutcome<'_>) -> EngineResult<()>;

    /// Persists the entity's current condition set. Implementations that
    /// model conditions as part of the entity's own stored representation
    /// (as this crate's Registry does) may treat this as a no-op and rely on
    /// the next regular `Sync`/`Update` write to carry the conditions along.
    async fn save_host_conditions(&self, host: &Host) -> EngineResult<()>;
}

/// No-op `ConditionManager` (SPEC_FULL.md §4.14): mutates `host.conditions`
/// exactly as the contract requires, but never reaches out anywhere to save.
/// Used by every unit test and by the ambient binary until a real
/// status-post-processor is wired in.
pub struct NoopConditionManager;

#[async_trait]
impl ConditionManager for NoopConditionManager {
    async fn process_host_conditions(&self, host: &mut Host, outcome: SyncOutcome<'_>) -> EngineResult<()> {
        match outcome {
            SyncOutcome::Success => host.set_ready(true, "synchronized"),
            SyncOutcome::Failure(reason) => host.set_ready(false, reason),
        }
        Ok(())
    }

    async fn save_host_conditions(&self, _host: &Host) -> EngineResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceIdentifier;

    #[tokio::test]
    async fn process_sets_ready_true_on_success() {
        let manager = NoopConditionManager;
        let mut host = Host::new(ResourceIdentifier::new("ns1", "h1"));
        manager.process_host_conditions(&mut host, SyncOutcome::Success).await.unwrap();
        assert!(host.is_ready());
    }

    #[tokio::test]
    async fn process_sets_ready_false_on_failure() {
        let manager = NoopConditionManager;
        let mut host = Host::new(ResourceIdentifier::new("ns1", "h1"));
        manager
            .process_host_conditions(&mut host, SyncOutcome::Failure("timeout"))
            .await
            .unwrap();
        assert!(!host.is_ready());
    }
}
