//! HostBinding service (SPEC_FULL.md §4.7, §6 C8): CRUD + Sync for
//! HostBinding, the mutual-exclusion and Ready-before-bind validators, and
//! the Host.IsBound/AG external-resync side effects of binding changes.

use std::sync::Arc;

use tracing::instrument;

use crate::conditions::{ConditionManager, SyncOutcome};
use crate::error::{EngineError, EngineResult};
use crate::model::{EntityKind, Host, HostBinding, ResourceIdentifier};
use crate::registry::{Reader, Registry, Scope, StoreSyncOp, Writer, WriterKind};
use crate::sync::{SyncOp, SyncPayload};

use super::sync_tracker::SyncTracker;
use super::validate;

pub struct HostBindingService {
    registry: Arc<dyn Registry>,
    sync: SyncTracker,
    conditions: Arc<dyn ConditionManager>,
}

impl HostBindingService {
    pub fn new(registry: Arc<dyn Registry>, sync: SyncTracker, conditions: Arc<dyn ConditionManager>) -> Self {
        Self { registry, sync, conditions }
    }

    pub async fn list(&self, scope: Scope) -> EngineResult<Vec<HostBinding>> {
        let reader = self.registry.reader().await?;
        reader.list_host_bindings(&scope).await
    }

    pub async fn get(&self, id: &ResourceIdentifier) -> EngineResult<Option<HostBinding>> {
        let reader = self.registry.reader().await?;
        reader.get_host_binding(id).await
    }

    /// HostBinding Create (SPEC_FULL.md §4.7). Idempotent when the same
    /// binding is recreated for a Host already bound to it (mutual-exclusion
    /// rule, first clause).
    #[instrument(skip(self, hb))]
    pub async fn create(&self, hb: HostBinding) -> EngineResult<HostBinding> {
        let mut writer = self.registry.writer(WriterKind::Default).await?;

        if let Some(host) = writer.get_host(&hb.host_ref).await? {
            if host.is_bound {
                if host.binding_ref.as_ref() == Some(&hb.id) {
                    writer.abort().await?;
                    return Ok(hb);
                }
                return Err(EngineError::Validation(if host.binding_ref.is_some() {
                    "host is already bound to another binding".to_string()
                } else {
                    "host is already bound to AddressGroup via spec.hosts — cannot create HostBinding".to_string()
                }));
            }
        }

        let mut host = validate::validate_host_binding_for_creation(&*writer, &hb).await?;
        writer
            .sync_host_bindings(vec![hb.clone()], StoreSyncOp::Upsert)
            .await?;

        host.bind_via_host_binding(hb.id.clone(), hb.address_group_ref.clone());
        host.meta.touch_on_write("bind");
        writer.sync_hosts(vec![host.clone()], StoreSyncOp::Upsert).await?;
        writer.commit().await?;

        self.sync_host_forced_and_record_condition(host).await;
        self.force_sync_address_group(&hb.address_group_ref).await;
        Ok(hb)
    }

    #[instrument(skip(self))]
    pub async fn delete_by_ids(&self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        for id in ids {
            self.delete_one(id).await?;
        }
        Ok(())
    }

    async fn delete_one(&self, id: &ResourceIdentifier) -> EngineResult<()> {
        let mut writer = self.registry.writer(WriterKind::ForDeletes).await?;
        let hb = match writer.get_host_binding(id).await? {
            Some(hb) => hb,
            None => {
                writer.abort().await?;
                return Ok(());
            }
        };

        let mut host = writer.get_host(&hb.host_ref).await?;
        if let Some(host) = host.as_mut() {
            host.unbind();
            host.meta.touch_on_write("unbind");
        }

        writer.delete_host_bindings_by_ids(&[id.clone()]).await?;
        if let Some(host) = &host {
            writer.sync_hosts(vec![host.clone()], StoreSyncOp::Upsert).await?;
        }
        writer.commit().await?;

        if let Some(host) = host {
            self.sync_host_forced_and_record_condition(host).await;
        }
        self.force_sync_address_group(&hb.address_group_ref).await;
        Ok(())
    }

    pub async fn sync_batch(&self, bindings: Vec<HostBinding>, op: StoreSyncOp) -> EngineResult<()> {
        if op == StoreSyncOp::Delete {
            let ids: Vec<_> = bindings.into_iter().map(|b| b.id).collect();
            return self.delete_by_ids(&ids).await;
        }
        for hb in bindings {
            self.create(hb).await?;
        }
        Ok(())
    }

    /// Forced (debounce-bypassing) Host sync for a binding transition, with
    /// the resulting Ready condition fed back and re-persisted (SPEC_FULL.md
    /// §4.10).
    async fn sync_host_forced_and_record_condition(&self, mut host: Host) {
        let payload = SyncPayload::new(EntityKind::Host, host.id.key(), &host);
        let outcome = match self.sync.sync_entity_forced(payload, SyncOp::Upsert).await {
            Ok(()) => SyncOutcome::Success,
            Err(e) => {
                tracing::warn!(host = %host.id, error = %e, "Host SGROUP sync failed");
                SyncOutcome::Failure("sgroup synchronization failed")
            }
        };
        if self.conditions.process_host_conditions(&mut host, outcome).await.is_err() {
            return;
        }
        let _ = self.conditions.save_host_conditions(&host).await;
        if let Ok(mut writer) = self.registry.writer(WriterKind::ForConditions).await {
            if writer.sync_hosts(vec![host], StoreSyncOp::Upsert).await.is_ok() {
                let _ = writer.commit().await;
            } else {
                let _ = writer.abort().await;
            }
        }
    }

    async fn force_sync_address_group(&self, ag_ref: &ResourceIdentifier) {
        let reader = match self.registry.reader().await {
            Ok(r) => r,
            Err(_) => return,
        };
        if let Ok(Some(ag)) = reader.get_address_group(ag_ref).await {
            let payload = SyncPayload::new(EntityKind::AddressGroup, ag.id.key(), &ag);
            self.sync.sync_entity_forced(payload, SyncOp::Upsert).await.ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::NoopConditionManager;
    use crate::model::{AddressGroup, DefaultAction};
    use crate::registry::memory::InMemoryRegistry;
    use crate::sync::RecordingSyncManager;

    fn make_service() -> HostBindingService {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let manager = Arc::new(RecordingSyncManager::new());
        HostBindingService::new(registry, SyncTracker::new(manager), Arc::new(NoopConditionManager))
    }

    async fn seed_ready_host(registry: &Arc<dyn Registry>, id: ResourceIdentifier) {
        let mut writer = registry.writer(WriterKind::Default).await.unwrap();
        let mut host = Host::new(id);
        host.set_ready(true, "synchronized");
        writer.sync_hosts(vec![host], StoreSyncOp::Upsert).await.unwrap();
        writer.commit().await.unwrap();
    }

    #[tokio::test]
    async fn create_binds_host() {
        let service = make_service();
        seed_ready_host(&service.registry, ResourceIdentifier::new("ns1", "h1")).await;
        let mut writer = service.registry.writer(WriterKind::Default).await.unwrap();
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        writer.sync_address_groups(vec![ag.clone()], StoreSyncOp::Upsert).await.unwrap();
        writer.commit().await.unwrap();

        let hb = HostBinding::new(ResourceIdentifier::new("ns1", "hb1"), ResourceIdentifier::new("ns1", "h1"), ag.id.clone());
        service.create(hb).await.unwrap();

        let reader = service.registry.reader().await.unwrap();
        let host = reader.get_host(&ResourceIdentifier::new("ns1", "h1")).await.unwrap().unwrap();
        assert!(host.is_bound);
    }

    #[tokio::test]
    async fn rejects_when_host_not_ready() {
        let service = make_service();
        let mut writer = service.registry.writer(WriterKind::Default).await.unwrap();
        let host = Host::new(ResourceIdentifier::new("ns1", "h1"));
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        writer.sync_hosts(vec![host], StoreSyncOp::Upsert).await.unwrap();
        writer.sync_address_groups(vec![ag.clone()], StoreSyncOp::Upsert).await.unwrap();
        writer.commit().await.unwrap();

        let hb = HostBinding::new(ResourceIdentifier::new("ns1", "hb1"), ResourceIdentifier::new("ns1", "h1"), ag.id.clone());
        let err = service.create(hb).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_unbinds_host() {
        let service = make_service();
        seed_ready_host(&service.registry, ResourceIdentifier::new("ns1", "h1")).await;
        let mut writer = service.registry.writer(WriterKind::Default).await.unwrap();
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        writer.sync_address_groups(vec![ag.clone()], StoreSyncOp::Upsert).await.unwrap();
        writer.commit().await.unwrap();

        let hb = HostBinding::new(ResourceIdentifier::new("ns1", "hb1"), ResourceIdentifier::new("ns1", "h1"), ag.id.clone());
        service.create(hb.clone()).await.unwrap();
        service.delete_by_ids(&[hb.id]).await.unwrap();

        let reader = service.registry.reader().await.unwrap();
        let host = reader.get_host(&ResourceIdentifier::new("ns1", "h1")).await.unwrap().unwrap();
        assert!(!host.is_bound);
    }
}
