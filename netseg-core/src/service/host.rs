//! Host service (SPEC_FULL.md §4.8, §6 C7): CRUD + Sync for Host, and the
//! cascade from Host delete down through its HostBinding (or `spec.hosts`
//! membership) and the owning AddressGroup's external resync.

use std::sync::Arc;

use tracing::instrument;

use crate::conditions::{ConditionManager, SyncOutcome};
use crate::error::{EngineError, EngineResult};
use crate::model::{EntityKind, Host, ResourceIdentifier};
use crate::registry::{Reader, Registry, Scope, StoreSyncOp, Writer, WriterKind};
use crate::sync::{SyncOp, SyncPayload};

use super::sync_tracker::SyncTracker;

pub struct HostService {
    registry: Arc<dyn Registry>,
    sync: SyncTracker,
    conditions: Arc<dyn ConditionManager>,
}

impl HostService {
    pub fn new(registry: Arc<dyn Registry>, sync: SyncTracker, conditions: Arc<dyn ConditionManager>) -> Self {
        Self { registry, sync, conditions }
    }

    pub async fn list(&self, scope: Scope) -> EngineResult<Vec<Host>> {
        let reader = self.registry.reader().await?;
        reader.list_hosts(&scope).await
    }

    pub async fn get(&self, id: &ResourceIdentifier) -> EngineResult<Option<Host>> {
        let reader = self.registry.reader().await?;
        reader.get_host(id).await
    }

    #[instrument(skip(self, host))]
    pub async fn create(&self, host: Host) -> EngineResult<Host> {
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        if writer.get_host(&host.id).await?.is_some() {
            return Err(EngineError::already_exists("Host", host.id.key()));
        }
        writer.sync_hosts(vec![host.clone()], StoreSyncOp::Upsert).await?;
        writer.commit().await?;

        self.sync_and_record_condition(host.clone(), SyncOp::Upsert).await;
        Ok(host)
    }

    #[instrument(skip(self, host))]
    pub async fn update(&self, host: Host) -> EngineResult<Host> {
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        let previous = writer
            .get_host(&host.id)
            .await?
            .ok_or_else(|| EngineError::not_found("Host", host.id.key()))?;
        let mut updated = host;
        updated.meta = previous.meta.clone();
        updated.meta.touch_on_write("update");
        // Binding state is owned by the AG/HostBinding services, never by a
        // plain Host update.
        updated.is_bound = previous.is_bound;
        updated.binding_ref = previous.binding_ref.clone();
        updated.address_group_ref = previous.address_group_ref.clone();
        updated.address_group_name = previous.address_group_name.clone();
        writer.sync_hosts(vec![updated.clone()], StoreSyncOp::Upsert).await?;
        writer.commit().await?;

        self.sync_and_record_condition(updated.clone(), SyncOp::Upsert).await;
        Ok(updated)
    }

    pub async fn sync_batch(&self, hosts: Vec<Host>, op: StoreSyncOp) -> EngineResult<()> {
        if op == StoreSyncOp::Delete {
            let ids: Vec<_> = hosts.into_iter().map(|h| h.id).collect();
            return self.delete_by_ids(&ids).await;
        }
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        writer.sync_hosts(hosts.clone(), op).await?;
        writer.commit().await?;
        for host in hosts {
            self.sync_and_record_condition(host, SyncOp::Upsert).await;
        }
        Ok(())
    }

    /// Host delete (SPEC_FULL.md §4.8). Idempotent on not-found. If the host
    /// is bound via `AddressGroup.spec.hosts`, removes it from the group
    /// first; if bound via a HostBinding, drops the HostBinding in the same
    /// Writer as the Host delete. Either way, the owning AddressGroup gets a
    /// forced external resync afterward.
    #[instrument(skip(self))]
    pub async fn delete_by_ids(&self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        for id in ids {
            self.delete_one(id).await?;
        }
        Ok(())
    }

    async fn delete_one(&self, id: &ResourceIdentifier) -> EngineResult<()> {
        let mut host = {
            let reader = self.registry.reader().await?;
            match reader.get_host(id).await? {
                Some(h) => h,
                None => return Ok(()),
            }
        };

        let mut affected_group = None;
        if host.bound_via_address_group_hosts() {
            if let Some(ag_ref) = host.address_group_ref.clone() {
                let mut writer = self.registry.writer(WriterKind::Default).await?;
                if let Some(mut ag) = writer.get_address_group(&ag_ref).await? {
                    ag.hosts.retain(|h| h != id);
                    ag.meta.touch_on_write("host-deleted");
                    writer
                        .sync_address_groups(vec![ag], StoreSyncOp::Upsert)
                        .await?;
                    writer.commit().await?;
                    affected_group = Some(ag_ref);
                } else {
                    writer.abort().await?;
                }
            }
            let reader = self.registry.reader().await?;
            host = reader.get_host(id).await?.unwrap_or(host);
        }

        let mut writer = self.registry.writer(WriterKind::Default).await?;
        let host_bindings = writer.list_host_bindings(&Scope::All).await?;
        let owning_binding = host_bindings.into_iter().find(|b| &b.host_ref == id);
        if let Some(hb) = &owning_binding {
            writer.delete_host_bindings_by_ids(&[hb.id.clone()]).await?;
            affected_group = Some(hb.address_group_ref.clone());
        }
        writer.delete_hosts_by_ids(&[id.clone()]).await?;
        writer.commit().await?;

        if let Some(ag_ref) = affected_group {
            self.force_sync_address_group(&ag_ref).await;
        }
        self.sync_delete_to_sgroup(id).await;
        Ok(())
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

    async fn sync_to_sgroup(&self, host: &Host, op: SyncOp) {
        let payload = SyncPayload::new(EntityKind::Host, host.id.key(), host);
        if let Err(e) = self.sync.sync_entity(payload, op).await {
            tracing::warn!(host = %host.id, error = %e, "Host SGROUP sync failed");
        }
    }

    /// Syncs the host to SGROUP, then feeds the outcome into the
    /// `ConditionManager` and re-persists the resulting `Ready` condition
    /// (SPEC_FULL.md §4.10). Best-effort: a failure to persist the condition
    /// is logged, not propagated — the caller already committed the write
    /// this outcome is reporting on.
    async fn sync_and_record_condition(&self, mut host: Host, op: SyncOp) {
        let payload = SyncPayload::new(EntityKind::Host, host.id.key(), &host);
        let outcome = match self.sync.sync_entity(payload, op).await {
            Ok(()) => SyncOutcome::Success,
            Err(e) => {
                tracing::warn!(host = %host.id, error = %e, "Host SGROUP sync failed");
                SyncOutcome::Failure("sgroup synchronization failed")
            }
        };
        if let Err(e) = self.conditions.process_host_conditions(&mut host, outcome).await {
            tracing::warn!(host = %host.id, error = %e, "failed to process host conditions");
            return;
        }
        if let Err(e) = self.conditions.save_host_conditions(&host).await {
            tracing::warn!(host = %host.id, error = %e, "failed to save host conditions");
        }
        if let Ok(mut writer) = self.registry.writer(WriterKind::ForConditions).await {
            if writer.sync_hosts(vec![host], StoreSyncOp::Upsert).await.is_ok() {
                let _ = writer.commit().await;
            } else {
                let _ = writer.abort().await;
            }
        }
    }

    async fn sync_delete_to_sgroup(&self, id: &ResourceIdentifier) {
        let payload = SyncPayload {
            kind: EntityKind::Host,
            key: id.key(),
            body: serde_json::Value::Null,
        };
        if let Err(e) = self.sync.sync_entity(payload, SyncOp::Delete).await {
            tracing::warn!(host = %id, error = %e, "Host SGROUP delete sync failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::NoopConditionManager;
    use crate::model::{AddressGroup, DefaultAction, HostBinding};
    use crate::registry::memory::InMemoryRegistry;
    use crate::sync::RecordingSyncManager;

    fn make_service() -> HostService {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let manager = Arc::new(RecordingSyncManager::new());
        HostService::new(registry, SyncTracker::new(manager), Arc::new(NoopConditionManager))
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let service = make_service();
        let host = Host::new(ResourceIdentifier::new("ns1", "h1"));
        service.create(host.clone()).await.unwrap();
        let loaded = service.get(&host.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, host.id);
    }

    #[tokio::test]
    async fn delete_is_idempotent_on_missing_host() {
        let service = make_service();
        service.delete_by_ids(&[ResourceIdentifier::new("ns1", "ghost")]).await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_owning_host_binding() {
        let service = make_service();
        let host = Host::new(ResourceIdentifier::new("ns1", "h1"));
        service.create(host.clone()).await.unwrap();

        let mut writer = service.registry.writer(WriterKind::Default).await.unwrap();
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        writer.sync_address_groups(vec![ag.clone()], StoreSyncOp::Upsert).await.unwrap();
        let hb = HostBinding::new(ResourceIdentifier::new("ns1", "hb1"), host.id.clone(), ag.id.clone());
        writer.sync_host_bindings(vec![hb], StoreSyncOp::Upsert).await.unwrap();
        writer.commit().await.unwrap();

        service.delete_by_ids(&[host.id.clone()]).await.unwrap();

        let reader = service.registry.reader().await.unwrap();
        assert!(reader.get_host(&host.id).await.unwrap().is_none());
        assert!(reader.list_host_bindings(&Scope::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_host_from_spec_hosts() {
        let service = make_service();
        let mut host = Host::new(ResourceIdentifier::new("ns1", "h1"));
        host.set_ready(true, "synchronized");
        let ag_ref = ResourceIdentifier::new("ns1", "ag1");
        host.bind_via_address_group_hosts(ag_ref.clone());

        let mut writer = service.registry.writer(WriterKind::Default).await.unwrap();
        let mut ag = AddressGroup::new(ag_ref.clone(), DefaultAction::Accept);
        ag.hosts.push(host.id.clone());
        writer.sync_address_groups(vec![ag], StoreSyncOp::Upsert).await.unwrap();
        writer.sync_hosts(vec![host.clone()], StoreSyncOp::Upsert).await.unwrap();
        writer.commit().await.unwrap();

        service.delete_by_ids(&[host.id.clone()]).await.unwrap();

        let reader = service.registry.reader().await.unwrap();
        let ag = reader.get_address_group(&ag_ref).await.unwrap().unwrap();
        assert!(!ag.hosts.contains(&host.id));
    }
}
