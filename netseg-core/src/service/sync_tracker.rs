//! Debounce + bounded retry wrapper around a [`SyncManager`] (SPEC_FULL.md
//! §4.10, C10 share). Every C6–C9 service owns one of these rather than
//! talking to the raw `SyncManager` directly, so the debounce/backoff policy
//! lives in one place instead of being reimplemented per service.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::error::EngineResult;
use crate::sync::{SyncManager, SyncOp, SyncPayload};

const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

/// Wraps a [`SyncManager`] with the debounce cache and retry policy from
/// SPEC_FULL.md §4.10. Cheap to clone — the dedupe cache is shared via `Arc`.
#[derive(Clone)]
pub struct SyncTracker {
    manager: Arc<dyn SyncManager>,
    recent: Arc<Mutex<HashMap<String, Instant>>>,
    max_retries: u32,
}

impl SyncTracker {
    pub fn new(manager: Arc<dyn SyncManager>) -> Self {
        Self {
            manager,
            recent: Arc::new(Mutex::new(HashMap::new())),
            max_retries: 3,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Debounced, best-effort sync: repeated calls for the same `(op, key)`
    /// within the debounce window are skipped rather than re-sent.
    pub async fn sync_entity(&self, payload: SyncPayload, op: SyncOp) -> EngineResult<()> {
        let dedupe_key = format!("{:?}:{:?}:{}", payload.kind, op, payload.key);
        {
            let mut recent = self.recent.lock().await;
            if let Some(last) = recent.get(&dedupe_key) {
                if last.elapsed() < DEBOUNCE_WINDOW {
                    return Ok(());
                }
            }
            recent.insert(dedupe_key.clone(), Instant::now());
        }
        let manager = self.manager.clone();
        let result = execute_with_retry(self.max_retries, || {
            let manager = manager.clone();
            let payload = payload.clone();
            async move { manager.sync_entity(payload, op).await }
        })
        .await;
        if let Err(e) = &result {
            warn!(key = %dedupe_key, error = %e, "SGROUP sync failed after retries");
        }
        result
    }

    /// Forced sync: bypasses the debounce cache entirely (used for Host/NB/AG
    /// transitions that must always reach SGROUP, per SPEC_FULL.md §4.10).
    pub async fn sync_entity_forced(&self, payload: SyncPayload, op: SyncOp) -> EngineResult<()> {
        let manager = self.manager.clone();
        let result = execute_with_retry(self.max_retries, || {
            let manager = manager.clone();
            let payload = payload.clone();
            async move { manager.sync_entity_forced(payload, op).await }
        })
        .await;
        if let Err(e) = &result {
            error!(key = %payload.key, error = %e, "forced SGROUP sync failed after retries");
        }
        result
    }

    /// Batch sync never debounces — every call is an explicit bulk request.
    pub async fn sync_batch(&self, payloads: Vec<SyncPayload>, op: SyncOp) -> EngineResult<()> {
        let manager = self.manager.clone();
        let result = execute_with_retry(self.max_retries, || {
            let manager = manager.clone();
            let payloads = payloads.clone();
            async move { manager.sync_batch(payloads, op).await }
        })
        .await;
        if let Err(e) = &result {
            error!(error = %e, "SGROUP batch sync failed after retries");
        }
        result
    }
}

/// `ExecuteWithRetry` (SPEC_FULL.md §4.10): bounded exponential backoff around
/// a fallible SGROUP call. `max_retries` bounds the number of *additional*
/// attempts after the first.
async fn execute_with_retry<F, Fut>(max_retries: u32, mut call: F) -> EngineResult<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = EngineResult<()>>,
{
    let mut backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(50))
        .with_max_interval(Duration::from_secs(2))
        .with_max_elapsed_time(Some(Duration::from_secs(10)))
        .build();

    let mut attempt = 0;
    loop {
        match call().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                match backoff.next_backoff() {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind;
    use crate::sync::RecordingSyncManager;

    #[tokio::test]
    async fn repeated_sync_within_window_is_debounced() {
        let manager = Arc::new(RecordingSyncManager::new());
        let tracker = SyncTracker::new(manager.clone());
        let payload = SyncPayload {
            kind: EntityKind::AddressGroup,
            key: "ns1/ag1".to_string(),
            body: serde_json::Value::Null,
        };

        tracker.sync_entity(payload.clone(), SyncOp::Upsert).await.unwrap();
        tracker.sync_entity(payload, SyncOp::Upsert).await.unwrap();

        assert_eq!(manager.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn forced_sync_bypasses_debounce() {
        let manager = Arc::new(RecordingSyncManager::new());
        let tracker = SyncTracker::new(manager.clone());
        let payload = SyncPayload {
            kind: EntityKind::Host,
            key: "ns1/h1".to_string(),
            body: serde_json::Value::Null,
        };

        tracker.sync_entity_forced(payload.clone(), SyncOp::Upsert).await.unwrap();
        tracker.sync_entity_forced(payload, SyncOp::Upsert).await.unwrap();

        assert_eq!(manager.calls().await.len(), 2);
    }
}
