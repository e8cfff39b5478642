//! In-memory reference [`Registry`] implementation.
//!
//! This is the Registry every unit test in the crate is built against
//! (SPEC_FULL.md §4.14), and the default backend the ambient binary wires up
//! when no `DATABASE_URL` is configured. Transactions are modeled with a
//! `tokio::sync::Mutex` held for the writer's whole lifetime; every write goes
//! to a staged working copy of the tables rather than the locked tables
//! themselves, and only `commit` publishes it. A writer dropped on an error
//! path without reaching `commit` — or one that reaches an explicit `abort`
//! — simply discards the staged copy, so the shared tables are never left
//! holding a partial write (SPEC_FULL.md §4.1). Simple, but exactly as
//! serializable as the contract requires.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::EngineResult;
use crate::model::{
    AddressGroup, AddressGroupBinding, AddressGroupBindingPolicy, AddressGroupPortMapping, Host,
    HostBinding, Network, NetworkBinding, ResourceIdentifier, Service,
};

use super::derive::{derive_address_group_list, derive_aggregated_hosts, derive_service_address_groups, derive_service_list};
use super::{Reader, Registry, Scope, StoreSyncOp, Writer, WriterKind};

#[derive(Debug, Clone, Default)]
struct Tables {
    services: HashMap<String, Service>,
    address_groups: HashMap<String, AddressGroup>,
    address_group_bindings: HashMap<String, AddressGroupBinding>,
    address_group_port_mappings: HashMap<String, AddressGroupPortMapping>,
    address_group_binding_policies: HashMap<String, AddressGroupBindingPolicy>,
    networks: HashMap<String, Network>,
    network_bindings: HashMap<String, NetworkBinding>,
    hosts: HashMap<String, Host>,
    host_bindings: HashMap<String, HostBinding>,
}

fn list_matching<T: Clone>(
    map: &HashMap<String, T>,
    scope: &Scope,
    key_of: impl Fn(&T) -> ResourceIdentifier,
) -> Vec<T> {
    map.values()
        .filter(|v| scope.includes(&key_of(v)))
        .cloned()
        .collect()
}

fn apply_store_sync<T: Clone>(
    map: &mut HashMap<String, T>,
    entities: Vec<T>,
    op: StoreSyncOp,
    key_of: impl Fn(&T) -> ResourceIdentifier,
) {
    match op {
        StoreSyncOp::Upsert | StoreSyncOp::FullSync => {
            for e in entities {
                map.insert(key_of(&e).key(), e);
            }
        }
        StoreSyncOp::Delete => {
            for e in entities {
                map.remove(&key_of(&e).key());
            }
        }
    }
}

fn delete_by_ids<T>(map: &mut HashMap<String, T>, ids: &[ResourceIdentifier]) {
    for id in ids {
        map.remove(&id.key());
    }
}

/// A snapshot-reading handle: cheap clone of the tables at the moment it was opened.
pub struct MemoryReader {
    tables: Tables,
}

#[async_trait]
impl Reader for MemoryReader {
    async fn list_services(&self, scope: &Scope) -> EngineResult<Vec<Service>> {
        let mut services = list_matching(&self.tables.services, scope, |s| s.id.clone());
        derive_service_list(self, &mut services).await?;
        Ok(services)
    }
    async fn get_service(&self, id: &ResourceIdentifier) -> EngineResult<Option<Service>> {
        let Some(mut service) = self.tables.services.get(&id.key()).cloned() else {
            return Ok(None);
        };
        derive_service_address_groups(self, &mut service).await?;
        Ok(Some(service))
    }

    async fn list_address_groups(&self, scope: &Scope) -> EngineResult<Vec<AddressGroup>> {
        let mut ags = list_matching(&self.tables.address_groups, scope, |a| a.id.clone());
        derive_address_group_list(self, &mut ags).await?;
        Ok(ags)
    }
    async fn get_address_group(&self, id: &ResourceIdentifier) -> EngineResult<Option<AddressGroup>> {
        let Some(mut ag) = self.tables.address_groups.get(&id.key()).cloned() else {
            return Ok(None);
        };
        derive_aggregated_hosts(self, &mut ag).await?;
        Ok(Some(ag))
    }

    async fn list_address_group_bindings(&self, scope: &Scope) -> EngineResult<Vec<AddressGroupBinding>> {
        Ok(list_matching(
            &self.tables.address_group_bindings,
            scope,
            |b| b.id.clone(),
        ))
    }
    async fn get_address_group_binding(
        &self,
        id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupBinding>> {
        Ok(self.tables.address_group_bindings.get(&id.key()).cloned())
    }

    async fn list_address_group_port_mappings(
        &self,
        scope: &Scope,
    ) -> EngineResult<Vec<AddressGroupPortMapping>> {
        Ok(list_matching(
            &self.tables.address_group_port_mappings,
            scope,
            |m| m.address_group_id.clone(),
        ))
    }
    async fn get_address_group_port_mapping(
        &self,
        address_group_id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupPortMapping>> {
        Ok(self
            .tables
            .address_group_port_mappings
            .get(&address_group_id.key())
            .cloned())
    }

    async fn list_address_group_binding_policies(
        &self,
        scope: &Scope,
    ) -> EngineResult<Vec<AddressGroupBindingPolicy>> {
        Ok(list_matching(
            &self.tables.address_group_binding_policies,
            scope,
            |p| p.id.clone(),
        ))
    }
    async fn get_address_group_binding_policy(
        &self,
        id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupBindingPolicy>> {
        Ok(self
            .tables
            .address_group_binding_policies
            .get(&id.key())
            .cloned())
    }

    async fn list_networks(&self, scope: &Scope) -> EngineResult<Vec<Network>> {
        Ok(list_matching(&self.tables.networks, scope, |n| n.id.clone()))
    }
    async fn get_network(&self, id: &ResourceIdentifier) -> EngineResult<Option<Network>> {
        Ok(self.tables.networks.get(&id.key()).cloned())
    }

    async fn list_network_bindings(&self, scope: &Scope) -> EngineResult<Vec<NetworkBinding>> {
        Ok(list_matching(&self.tables.network_bindings, scope, |n| {
            n.id.clone()
        }))
    }
    async fn get_network_binding(&self, id: &ResourceIdentifier) -> EngineResult<Option<NetworkBinding>> {
        Ok(self.tables.network_bindings.get(&id.key()).cloned())
    }

    async fn list_hosts(&self, scope: &Scope) -> EngineResult<Vec<Host>> {
        Ok(list_matching(&self.tables.hosts, scope, |h| h.id.clone()))
    }
    async fn get_host(&self, id: &ResourceIdentifier) -> EngineResult<Option<Host>> {
        Ok(self.tables.hosts.get(&id.key()).cloned())
    }

    async fn list_host_bindings(&self, scope: &Scope) -> EngineResult<Vec<HostBinding>> {
        Ok(list_matching(&self.tables.host_bindings, scope, |h| {
            h.id.clone()
        }))
    }
    async fn get_host_binding(&self, id: &ResourceIdentifier) -> EngineResult<Option<HostBinding>> {
        Ok(self.tables.host_bindings.get(&id.key()).cloned())
    }
}

/// A live transaction: holds the registry-wide lock for its whole lifetime,
/// but mutates a `staged` working copy rather than the locked tables
/// directly. `guard` is only overwritten by `commit`, so a writer that is
/// dropped on an error path without reaching `commit` or an explicit `abort`
/// leaves the shared state untouched by construction — there is no window
/// where a partial write is visible (SPEC_FULL.md §4.1, §5).
pub struct MemoryWriter {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
}

#[async_trait]
impl Reader for MemoryWriter {
    async fn list_services(&self, scope: &Scope) -> EngineResult<Vec<Service>> {
        let mut services = list_matching(&self.staged.services, scope, |s| s.id.clone());
        derive_service_list(self, &mut services).await?;
        Ok(services)
    }
    async fn get_service(&self, id: &ResourceIdentifier) -> EngineResult<Option<Service>> {
        let Some(mut service) = self.staged.services.get(&id.key()).cloned() else {
            return Ok(None);
        };
        derive_service_address_groups(self, &mut service).await?;
        Ok(Some(service))
    }

    async fn list_address_groups(&self, scope: &Scope) -> EngineResult<Vec<AddressGroup>> {
        let mut ags = list_matching(&self.staged.address_groups, scope, |a| a.id.clone());
        derive_address_group_list(self, &mut ags).await?;
        Ok(ags)
    }
    async fn get_address_group(&self, id: &ResourceIdentifier) -> EngineResult<Option<AddressGroup>> {
        let Some(mut ag) = self.staged.address_groups.get(&id.key()).cloned() else {
            return Ok(None);
        };
        derive_aggregated_hosts(self, &mut ag).await?;
        Ok(Some(ag))
    }

    async fn list_address_group_bindings(&self, scope: &Scope) -> EngineResult<Vec<AddressGroupBinding>> {
        Ok(list_matching(&self.staged.address_group_bindings, scope, |b| {
            b.id.clone()
        }))
    }
    async fn get_address_group_binding(
        &self,
        id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupBinding>> {
        Ok(self.staged.address_group_bindings.get(&id.key()).cloned())
    }

    async fn list_address_group_port_mappings(
        &self,
        scope: &Scope,
    ) -> EngineResult<Vec<AddressGroupPortMapping>> {
        Ok(list_matching(
            &self.staged.address_group_port_mappings,
            scope,
            |m| m.address_group_id.clone(),
        ))
    }
    async fn get_address_group_port_mapping(
        &self,
        address_group_id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupPortMapping>> {
        Ok(self
            .staged
            .address_group_port_mappings
            .get(&address_group_id.key())
            .cloned())
    }

    async fn list_address_group_binding_policies(
        &self,
        scope: &Scope,
    ) -> EngineResult<Vec<AddressGroupBindingPolicy>> {
        Ok(list_matching(
            &self.staged.address_group_binding_policies,
            scope,
            |p| p.id.clone(),
        ))
    }
    async fn get_address_group_binding_policy(
        &self,
        id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupBindingPolicy>> {
        Ok(self
            .staged
            .address_group_binding_policies
            .get(&id.key())
            .cloned())
    }

    async fn list_networks(&self, scope: &Scope) -> EngineResult<Vec<Network>> {
        Ok(list_matching(&self.staged.networks, scope, |n| n.id.clone()))
    }
    async fn get_network(&self, id: &ResourceIdentifier) -> EngineResult<Option<Network>> {
        Ok(self.staged.networks.get(&id.key()).cloned())
    }

    async fn list_network_bindings(&self, scope: &Scope) -> EngineResult<Vec<NetworkBinding>> {
        Ok(list_matching(&self.staged.network_bindings, scope, |n| {
            n.id.clone()
        }))
    }
    async fn get_network_binding(&self, id: &ResourceIdentifier) -> EngineResult<Option<NetworkBinding>> {
        Ok(self.staged.network_bindings.get(&id.key()).cloned())
    }

    async fn list_hosts(&self, scope: &Scope) -> EngineResult<Vec<Host>> {
        Ok(list_matching(&self.staged.hosts, scope, |h| h.id.clone()))
    }
    async fn get_host(&self, id: &ResourceIdentifier) -> EngineResult<Option<Host>> {
        Ok(self.staged.hosts.get(&id.key()).cloned())
    }

    async fn list_host_bindings(&self, scope: &Scope) -> EngineResult<Vec<HostBinding>> {
        Ok(list_matching(&self.staged.host_bindings, scope, |h| {
            h.id.clone()
        }))
    }
    async fn get_host_binding(&self, id: &ResourceIdentifier) -> EngineResult<Option<HostBinding>> {
        Ok(self.staged.host_bindings.get(&id.key()).cloned())
    }
}

#[async_trait]
impl Writer for MemoryWriter {
    async fn sync_services(&mut self, entities: Vec<Service>, op: StoreSyncOp) -> EngineResult<()> {
        apply_store_sync(&mut self.staged.services, entities, op, |s| s.id.clone());
        Ok(())
    }
    async fn sync_address_groups(&mut self, entities: Vec<AddressGroup>, op: StoreSyncOp) -> EngineResult<()> {
        apply_store_sync(&mut self.staged.address_groups, entities, op, |a| a.id.clone());
        Ok(())
    }
    async fn sync_address_group_bindings(
        &mut self,
        entities: Vec<AddressGroupBinding>,
        op: StoreSyncOp,
    ) -> EngineResult<()> {
        apply_store_sync(&mut self.staged.address_group_bindings, entities, op, |b| {
            b.id.clone()
        });
        Ok(())
    }
    async fn sync_address_group_port_mappings(
        &mut self,
        entities: Vec<AddressGroupPortMapping>,
        op: StoreSyncOp,
    ) -> EngineResult<()> {
        apply_store_sync(&mut self.staged.address_group_port_mappings, entities, op, |m| {
            m.address_group_id.clone()
        });
        Ok(())
    }
    async fn sync_address_group_binding_policies(
        &mut self,
        entities: Vec<AddressGroupBindingPolicy>,
        op: StoreSyncOp,
    ) -> EngineResult<()> {
        apply_store_sync(&mut self.staged.address_group_binding_policies, entities, op, |p| {
            p.id.clone()
        });
        Ok(())
    }
    async fn sync_networks(&mut self, entities: Vec<Network>, op: StoreSyncOp) -> EngineResult<()> {
        apply_store_sync(&mut self.staged.networks, entities, op, |n| n.id.clone());
        Ok(())
    }
    async fn sync_network_bindings(
        &mut self,
        entities: Vec<NetworkBinding>,
        op: StoreSyncOp,
    ) -> EngineResult<()> {
        apply_store_sync(&mut self.staged.network_bindings, entities, op, |n| n.id.clone());
        Ok(())
    }
    async fn sync_hosts(&mut self, entities: Vec<Host>, op: StoreSyncOp) -> EngineResult<()> {
        apply_store_sync(&mut self.staged.hosts, entities, op, |h| h.id.clone());
        Ok(())
    }
    async fn sync_host_bindings(&mut self, entities: Vec<HostBinding>, op: StoreSyncOp) -> EngineResult<()> {
        apply_store_sync(&mut self.staged.host_bindings, entities, op, |h| h.id.clone());
        Ok(())
    }

    async fn delete_services_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        delete_by_ids(&mut self.staged.services, ids);
        Ok(())
    }
    async fn delete_address_groups_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        delete_by_ids(&mut self.staged.address_groups, ids);
        Ok(())
    }
    async fn delete_address_group_bindings_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        delete_by_ids(&mut self.staged.address_group_bindings, ids);
        Ok(())
    }
    async fn delete_address_group_binding_policies_by_ids(
        &mut self,
        ids: &[ResourceIdentifier],
    ) -> EngineResult<()> {
        delete_by_ids(&mut self.staged.address_group_binding_policies, ids);
        Ok(())
    }
    async fn delete_networks_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        delete_by_ids(&mut self.staged.networks, ids);
        Ok(())
    }
    async fn delete_network_bindings_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        delete_by_ids(&mut self.staged.network_bindings, ids);
        Ok(())
    }
    async fn delete_hosts_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        delete_by_ids(&mut self.staged.hosts, ids);
        Ok(())
    }
    async fn delete_host_bindings_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        delete_by_ids(&mut self.staged.host_bindings, ids);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> EngineResult<()> {
        // Publish the staged copy to the shared tables and release the lock.
        *self.guard = std::mem::take(&mut self.staged);
        Ok(())
    }

    async fn abort(self: Box<Self>) -> EngineResult<()> {
        // The shared tables were never touched; dropping `staged` is enough.
        Ok(())
    }
}

/// An in-memory [`Registry`]. Cheap to construct, safe to share via `Arc`,
/// and the reference backend every service-layer test in this crate runs
/// against.
#[derive(Clone)]
pub struct InMemoryRegistry {
    tables: Arc<Mutex<Tables>>,
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
        }
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn reader(&self) -> EngineResult<Box<dyn Reader>> {
        let tables = self.tables.lock().await.clone();
        Ok(Box::new(MemoryReader { tables }))
    }

    async fn writer(&self, _kind: WriterKind) -> EngineResult<Box<dyn Writer>> {
        let guard = self.tables.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryWriter { guard, staged }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DefaultAction, ResourceIdentifier};

    #[tokio::test]
    async fn writer_commit_is_visible_to_next_reader() {
        let registry = InMemoryRegistry::new();
        let mut writer = registry.writer(WriterKind::Default).await.unwrap();
        writer
            .sync_address_groups(
                vec![AddressGroup::new(
                    ResourceIdentifier::new("ns1", "ag1"),
                    DefaultAction::Accept,
                )],
                StoreSyncOp::Upsert,
            )
            .await
            .unwrap();
        writer.commit().await.unwrap();

        let reader = registry.reader().await.unwrap();
        let ags = reader.list_address_groups(&Scope::All).await.unwrap();
        assert_eq!(ags.len(), 1);
    }

    #[tokio::test]
    async fn writer_abort_discards_writes() {
        let registry = InMemoryRegistry::new();
        let mut writer = registry.writer(WriterKind::Default).await.unwrap();
        writer
            .sync_address_groups(
                vec![AddressGroup::new(
                    ResourceIdentifier::new("ns1", "ag1"),
                    DefaultAction::Accept,
                )],
                StoreSyncOp::Upsert,
            )
            .await
            .unwrap();
        writer.abort().await.unwrap();

        let reader = registry.reader().await.unwrap();
        let ags = reader.list_address_groups(&Scope::All).await.unwrap();
        assert!(ags.is_empty());
    }

    #[tokio::test]
    async fn reader_from_writer_sees_uncommitted_writes() {
        let registry = InMemoryRegistry::new();
        let mut writer = registry.writer(WriterKind::Default).await.unwrap();
        writer
            .sync_hosts(
                vec![Host::new(ResourceIdentifier::new("ns1", "h1"))],
                StoreSyncOp::Upsert,
            )
            .await
            .unwrap();

        // Reading through the writer itself is the "ReaderFromWriter" path.
        let hosts = writer.list_hosts(&Scope::All).await.unwrap();
        assert_eq!(hosts.len(), 1);
        writer.commit().await.unwrap();
    }
}
