//! Network + NetworkBinding service (SPEC_FULL.md §4.9, §6 C9). Network CRUD
//! has no dedicated component of its own in SPEC_FULL.md's component table —
//! it is simple enough (no cascade, no derived fields) that it lives here
//! alongside the binding logic that is its only real consumer.

use std::sync::Arc;

use tracing::instrument;

use crate::error::{EngineError, EngineResult};
use crate::model::{EntityKind, Network, NetworkBinding, ResourceIdentifier};
use crate::registry::{Reader, Registry, Scope, StoreSyncOp, Writer, WriterKind};
use crate::sync::{SyncOp, SyncPayload};

use super::sync_tracker::SyncTracker;
use super::validate;

pub struct NetworkBindingService {
    registry: Arc<dyn Registry>,
    sync: SyncTracker,
}

impl NetworkBindingService {
    pub fn new(registry: Arc<dyn Registry>, sync: SyncTracker) -> Self {
        Self { registry, sync }
    }

    pub async fn list_networks(&self, scope: Scope) -> EngineResult<Vec<Network>> {
        let reader = self.registry.reader().await?;
        reader.list_networks(&scope).await
    }

    pub async fn get_network(&self, id: &ResourceIdentifier) -> EngineResult<Option<Network>> {
        let reader = self.registry.reader().await?;
        reader.get_network(id).await
    }

    #[instrument(skip(self, network))]
    pub async fn create_network(&self, network: Network) -> EngineResult<Network> {
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        if writer.get_network(&network.id).await?.is_some() {
            return Err(EngineError::already_exists("Network", network.id.key()));
        }
        writer.sync_networks(vec![network.clone()], StoreSyncOp::Upsert).await?;
        writer.commit().await?;
        Ok(network)
    }

    pub async fn delete_networks_by_ids(&self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        let mut writer = self.registry.writer(WriterKind::ForDeletes).await?;
        writer.delete_networks_by_ids(ids).await?;
        writer.commit().await
    }

    pub async fn list(&self, scope: Scope) -> EngineResult<Vec<NetworkBinding>> {
        let reader = self.registry.reader().await?;
        reader.list_network_bindings(&scope).await
    }

    pub async fn get(&self, id: &ResourceIdentifier) -> EngineResult<Option<NetworkBinding>> {
        let reader = self.registry.reader().await?;
        reader.get_network_binding(id).await
    }

    /// NetworkBinding Create (SPEC_FULL.md §4.9).
    #[instrument(skip(self, nb))]
    pub async fn create(&self, nb: NetworkBinding) -> EngineResult<NetworkBinding> {
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        let mut network = validate::validate_network_binding_for_creation(&*writer, &nb).await?;
        writer
            .sync_network_bindings(vec![nb.clone()], StoreSyncOp::Upsert)
            .await?;

        network.bind(nb.id.clone(), nb.address_group_ref.clone());
        network.meta.touch_on_write("bind");
        writer.sync_networks(vec![network], StoreSyncOp::Upsert).await?;
        writer.commit().await?;

        self.force_sync_address_group(&nb.address_group_ref).await;
        Ok(nb)
    }

    /// NetworkBinding Update: if the `(networkRef, addressGroupRef)` pair
    /// changed, unbind the old Network and bind the new one, force-syncing
    /// both AGs afterward.
    #[instrument(skip(self, nb))]
    pub async fn update(&self, nb: NetworkBinding) -> EngineResult<NetworkBinding> {
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        let previous = writer
            .get_network_binding(&nb.id)
            .await?
            .ok_or_else(|| EngineError::not_found("NetworkBinding", nb.id.key()))?;

        if previous.network_ref == nb.network_ref && previous.address_group_ref == nb.address_group_ref {
            writer.abort().await?;
            return Ok(previous);
        }

        if let Some(mut old_network) = writer.get_network(&previous.network_ref).await? {
            old_network.unbind();
            old_network.meta.touch_on_write("rebind");
            writer.sync_networks(vec![old_network], StoreSyncOp::Upsert).await?;
        }

        let mut new_network = writer
            .get_network(&nb.network_ref)
            .await?
            .ok_or_else(|| EngineError::Validation(format!("network {} not found", nb.network_ref.key())))?;
        if new_network.is_bound {
            return Err(EngineError::Validation(format!(
                "network {} is already bound to an address group",
                new_network.id.key(),
            )));
        }
        writer
            .get_address_group(&nb.address_group_ref)
            .await?
            .ok_or_else(|| {
                EngineError::Validation(format!("address group {} not found", nb.address_group_ref.key()))
            })?;

        let mut updated = nb.clone();
        updated.meta = previous.meta.clone();
        updated.meta.touch_on_write("update");
        writer
            .sync_network_bindings(vec![updated.clone()], StoreSyncOp::Upsert)
            .await?;

        new_network.bind(updated.id.clone(), updated.address_group_ref.clone());
        new_network.meta.touch_on_write("bind");
        writer.sync_networks(vec![new_network], StoreSyncOp::Upsert).await?;
        writer.commit().await?;

        self.force_sync_address_group(&previous.address_group_ref).await;
        self.force_sync_address_group(&updated.address_group_ref).await;
        Ok(updated)
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
        let nb = match writer.get_network_binding(id).await? {
            Some(nb) => nb,
            None => {
                writer.abort().await?;
                return Ok(());
            }
        };

        if let Some(mut network) = writer.get_network(&nb.network_ref).await? {
            network.unbind();
            network.meta.touch_on_write("unbind");
            writer.sync_networks(vec![network], StoreSyncOp::Upsert).await?;
        }
        writer.delete_network_bindings_by_ids(&[id.clone()]).await?;
        writer.commit().await?;

        self.force_sync_address_group(&nb.address_group_ref).await;
        Ok(())
    }

    pub async fn sync_batch(&self, bindings: Vec<NetworkBinding>, op: StoreSyncOp) -> EngineResult<()> {
        match op {
            StoreSyncOp::Delete => {
                let ids: Vec<_> = bindings.into_iter().map(|b| b.id).collect();
                self.delete_by_ids(&ids).await
            }
            StoreSyncOp::Upsert | StoreSyncOp::FullSync => {
                for nb in bindings {
                    if self.get(&nb.id).await?.is_some() {
                        self.update(nb).await?;
                    } else {
                        self.create(nb).await?;
                    }
                }
                Ok(())
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
    use crate::model::DefaultAction;
    use crate::registry::memory::InMemoryRegistry;
    use crate::sync::RecordingSyncManager;
    use crate::model::AddressGroup;

    fn make_service() -> NetworkBindingService {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let manager = Arc::new(RecordingSyncManager::new());
        NetworkBindingService::new(registry, SyncTracker::new(manager))
    }

    #[tokio::test]
    async fn create_binds_network() {
        let service = make_service();
        service.create_network(Network::new(ResourceIdentifier::new("ns1", "net1"))).await.unwrap();
        let mut writer = service.registry.writer(WriterKind::Default).await.unwrap();
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        writer.sync_address_groups(vec![ag.clone()], StoreSyncOp::Upsert).await.unwrap();
        writer.commit().await.unwrap();

        let nb = NetworkBinding::new(ResourceIdentifier::new("ns1", "nb1"), ResourceIdentifier::new("ns1", "net1"), ag.id.clone());
        service.create(nb).await.unwrap();

        let network = service.get_network(&ResourceIdentifier::new("ns1", "net1")).await.unwrap().unwrap();
        assert!(network.is_bound);
    }

    #[tokio::test]
    async fn double_bind_is_rejected() {
        let service = make_service();
        service.create_network(Network::new(ResourceIdentifier::new("ns1", "net1"))).await.unwrap();
        let mut writer = service.registry.writer(WriterKind::Default).await.unwrap();
        let ag1 = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        let ag2 = AddressGroup::new(ResourceIdentifier::new("ns1", "ag2"), DefaultAction::Accept);
        writer.sync_address_groups(vec![ag1.clone(), ag2.clone()], StoreSyncOp::Upsert).await.unwrap();
        writer.commit().await.unwrap();

        let nb1 = NetworkBinding::new(ResourceIdentifier::new("ns1", "nb1"), ResourceIdentifier::new("ns1", "net1"), ag1.id.clone());
        service.create(nb1).await.unwrap();

        let nb2 = NetworkBinding::new(ResourceIdentifier::new("ns1", "nb2"), ResourceIdentifier::new("ns1", "net1"), ag2.id.clone());
        let err = service.create(nb2).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_unbinds_network() {
        let service = make_service();
        service.create_network(Network::new(ResourceIdentifier::new("ns1", "net1"))).await.unwrap();
        let mut writer = service.registry.writer(WriterKind::Default).await.unwrap();
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        writer.sync_address_groups(vec![ag.clone()], StoreSyncOp::Upsert).await.unwrap();
        writer.commit().await.unwrap();

        let nb = NetworkBinding::new(ResourceIdentifier::new("ns1", "nb1"), ResourceIdentifier::new("ns1", "net1"), ag.id.clone());
        service.create(nb.clone()).await.unwrap();
        service.delete_by_ids(&[nb.id]).await.unwrap();

        let network = service.get_network(&ResourceIdentifier::new("ns1", "net1")).await.unwrap().unwrap();
        assert!(!network.is_bound);
    }
}
