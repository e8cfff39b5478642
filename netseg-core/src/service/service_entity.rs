//! Service (the entity, not this module) CRUD (SPEC_FULL.md §6 universal
//! surface). Not one of the named C6–C9 components — a Service's own
//! lifecycle is simple CRUD; what makes it interesting is delegated to the
//! AddressGroup service (`RegeneratePortMappingsForService`, triggered here
//! whenever `ingress_ports` changes) and to `synchronizeServiceAddressGroups`,
//! which is driven by AGB mutations rather than by Service writes.

use std::sync::Arc;

use tracing::instrument;

use crate::error::{EngineError, EngineResult};
use crate::model::{EntityKind, ResourceIdentifier, Service};
use crate::registry::{Reader, Registry, Scope, StoreSyncOp, Writer, WriterKind};
use crate::sync::{SyncOp, SyncPayload};

use super::address_group::AddressGroupService;
use super::sync_tracker::SyncTracker;

pub struct ServiceEntityService {
    registry: Arc<dyn Registry>,
    sync: SyncTracker,
    address_groups: Arc<AddressGroupService>,
}

impl ServiceEntityService {
    pub fn new(registry: Arc<dyn Registry>, sync: SyncTracker, address_groups: Arc<AddressGroupService>) -> Self {
        Self {
            registry,
            sync,
            address_groups,
        }
    }

    pub async fn list(&self, scope: Scope) -> EngineResult<Vec<Service>> {
        let reader = self.registry.reader().await?;
        reader.list_services(&scope).await
    }

    pub async fn get(&self, id: &ResourceIdentifier) -> EngineResult<Option<Service>> {
        let reader = self.registry.reader().await?;
        reader.get_service(id).await
    }

    #[instrument(skip(self, service))]
    pub async fn create(&self, service: Service) -> EngineResult<Service> {
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        if writer.get_service(&service.id).await?.is_some() {
            return Err(EngineError::already_exists("Service", service.id.key()));
        }
        writer
            .sync_services(vec![service.clone()], StoreSyncOp::Upsert)
            .await?;
        writer.commit().await?;

        self.sync_to_sgroup(&service, SyncOp::Upsert).await;
        Ok(service)
    }

    /// Update. When `ingress_ports` changes, regenerates the AGPM of every
    /// AddressGroup this Service is currently bound to.
    #[instrument(skip(self, service))]
    pub async fn update(&self, service: Service) -> EngineResult<Service> {
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        let previous = writer
            .get_service(&service.id)
            .await?
            .ok_or_else(|| EngineError::not_found("Service", service.id.key()))?;
        let mut updated = service;
        updated.meta = previous.meta.clone();
        updated.meta.touch_on_write("update");
        // address_groups is store-derived; a Service write never sets it directly.
        updated.address_groups = previous.address_groups.clone();
        let ports_changed = updated.ingress_ports != previous.ingress_ports;
        writer
            .sync_services(vec![updated.clone()], StoreSyncOp::Upsert)
            .await?;
        writer.commit().await?;

        self.sync_to_sgroup(&updated, SyncOp::Upsert).await;
        if ports_changed {
            self.address_groups.regenerate_port_mappings_for_service(&updated.id).await;
        }
        Ok(updated)
    }

    pub async fn sync_batch(&self, services: Vec<Service>, op: StoreSyncOp) -> EngineResult<()> {
        if op == StoreSyncOp::Delete {
            let ids: Vec<_> = services.into_iter().map(|s| s.id).collect();
            return self.delete_by_ids(&ids).await;
        }
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        writer.sync_services(services.clone(), op).await?;
        writer.commit().await?;
        for service in &services {
            self.sync_to_sgroup(service, SyncOp::Upsert).await;
            self.address_groups.regenerate_port_mappings_for_service(&service.id).await;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_by_ids(&self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        let mut writer = self.registry.writer(WriterKind::ForDeletes).await?;
        let agbs = writer.list_address_group_bindings(&Scope::All).await?;
        let doomed: Vec<_> = agbs.into_iter().filter(|b| ids.contains(&b.service_ref)).collect();
        let agb_ids: Vec<_> = doomed.iter().map(|b| b.id.clone()).collect();
        if !agb_ids.is_empty() {
            writer.delete_address_group_bindings_by_ids(&agb_ids).await?;
        }
        writer.delete_services_by_ids(ids).await?;
        writer.commit().await?;

        for agb in &doomed {
            self.address_groups
                .regenerate_port_mappings_for_address_group(&agb.address_group_ref)
                .await;
        }
        for id in ids {
            self.sync_delete_to_sgroup(id).await;
        }
        Ok(())
    }

    async fn sync_to_sgroup(&self, service: &Service, op: SyncOp) {
        let payload = SyncPayload::new(EntityKind::Service, service.id.key(), service);
        if let Err(e) = self.sync.sync_entity(payload, op).await {
            tracing::warn!(service = %service.id, error = %e, "Service SGROUP sync failed");
        }
    }

    async fn sync_delete_to_sgroup(&self, id: &ResourceIdentifier) {
        let payload = SyncPayload {
            kind: EntityKind::Service,
            key: id.key(),
            body: serde_json::Value::Null,
        };
        if let Err(e) = self.sync.sync_entity(payload, SyncOp::Delete).await {
            tracing::warn!(service = %id, error = %e, "Service SGROUP delete sync failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::NoopConditionManager;
    use crate::model::{IngressPort, Protocol};
    use crate::registry::memory::InMemoryRegistry;
    use crate::rules::NoopRuleS2SRegenerator;
    use crate::sync::RecordingSyncManager;

    fn make_service() -> ServiceEntityService {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let manager = Arc::new(RecordingSyncManager::new());
        let ag_service = Arc::new(AddressGroupService::new(
            registry.clone(),
            SyncTracker::new(manager.clone()),
            Arc::new(NoopConditionManager),
            Arc::new(NoopRuleS2SRegenerator),
        ));
        ServiceEntityService::new(registry, SyncTracker::new(manager), ag_service)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let service = make_service();
        let entity = Service::new(ResourceIdentifier::new("ns1", "web"), vec![IngressPort::new(Protocol::Tcp, "80")]);
        service.create(entity.clone()).await.unwrap();
        let loaded = service.get(&entity.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, entity.id);
    }

    #[tokio::test]
    async fn delete_cascades_bindings() {
        let service = make_service();
        let entity = Service::new(ResourceIdentifier::new("ns1", "web"), vec![]);
        service.create(entity.clone()).await.unwrap();
        service.delete_by_ids(&[entity.id.clone()]).await.unwrap();
        assert!(service.get(&entity.id).await.unwrap().is_none());
    }
}
