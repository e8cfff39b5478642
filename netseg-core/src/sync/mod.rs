//! The SGROUP client seam (SPEC_FULL.md §1, §6 C2): propagates entities to the
//! external segmentation service. The wire protocol is out of scope, so this
//! module defines only the trait the C6–C9 services call through, plus a
//! recording in-memory implementation for tests (§4.14).

use std::fmt::Debug;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::EngineResult;
use crate::model::EntityKind;

/// The external-side operation requested for a sync call (distinct from
/// [`crate::registry::StoreSyncOp`], which targets the local store).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOp {
    Upsert,
    Delete,
}

/// An entity queued for propagation, erased to JSON so `SyncManager` does not
/// need a generic parameter per entity type.
#[derive(Debug, Clone)]
pub struct SyncPayload {
    pub kind: EntityKind,
    pub key: String,
    pub body: serde_json::Value,
}

impl SyncPayload {
    pub fn new<T: Serialize>(kind: EntityKind, key: impl Into<String>, entity: &T) -> Self {
        Self {
            kind,
            key: key.into(),
            body: serde_json::to_value(entity).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Propagates entities to the external segmentation service
/// (SPEC_FULL.md §4.10, §6). `SyncTracker` wraps this with debounce and retry;
/// the forced variants bypass debounce for correctness-critical transitions
/// (Host binding changes, AG changes after NB/HB mutations).
#[async_trait]
pub trait SyncManager: Send + Sync {
    async fn sync_entity(&self, payload: SyncPayload, op: SyncOp) -> EngineResult<()>;
    async fn sync_entity_forced(&self, payload: SyncPayload, op: SyncOp) -> EngineResult<()>;
    async fn sync_batch(&self, payloads: Vec<SyncPayload>, op: SyncOp) -> EngineResult<()>;
}

/// A recorded call, retained by [`RecordingSyncManager`] for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedSync {
    Entity { key: String, op: SyncOp, forced: bool },
    Batch { keys: Vec<String>, op: SyncOp },
}

/// In-memory `SyncManager` that records every call instead of talking to a
/// real SGROUP sidecar (SPEC_FULL.md §4.14). Always succeeds; tests that need
/// failure injection wrap this behind their own stub.
#[derive(Default)]
pub struct RecordingSyncManager {
    calls: tokio::sync::Mutex<Vec<RecordedSync>>,
}

impl RecordingSyncManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn calls(&self) -> Vec<RecordedSync> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl SyncManager for RecordingSyncManager {
    async fn sync_entity(&self, payload: SyncPayload, op: SyncOp) -> EngineResult<()> {
        self.calls.lock().await.push(RecordedSync::Entity {
            key: payload.key,
            op,
            forced: false,
        });
        Ok(())
    }

    async fn sync_entity_forced(&self, payload: SyncPayload, op: SyncOp) -> EngineResult<()> {
        self.calls.lock().await.push(RecordedSync::Entity {
            key: payload.key,
            op,
            forced: true,
        });
        Ok(())
    }

    async fn sync_batch(&self, payloads: Vec<SyncPayload>, op: SyncOp) -> EngineResult<()> {
        let keys = payloads.into_iter().map(|p| p.key).collect();
        self.calls.lock().await.push(RecordedSync::Batch { keys, op });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AddressGroup, DefaultAction, ResourceIdentifier};

    #[tokio::test]
    async fn recording_sync_manager_captures_calls() {
        let manager = RecordingSyncManager::new();
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        let payload = SyncPayload::new(EntityKind::AddressGroup, ag.id.key(), &ag);

        manager.sync_entity(payload.clone(), SyncOp::Upsert).await.unwrap();
        manager.sync_entity_forced(payload, SyncOp::Delete).await.unwrap();

        let calls = manager.calls().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            RecordedSync::Entity {
                key: "ns1/ag1".to_string(),
                op: SyncOp::Upsert,
                forced: false,
            }
        );
        assert!(matches!(calls[1], RecordedSync::Entity { forced: true, .. }));
    }
}
