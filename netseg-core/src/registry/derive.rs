//! Computation of the two store-derived fields every `Reader` must populate
//! on the way out (SPEC_FULL.md §3, §9): `Service.address_groups` and
//! `AddressGroup.aggregated_hosts`. Both backends (`memory`, `pg`) call these
//! at the end of their `get_*`/`list_*` methods instead of returning the raw
//! stored document — the core never computes them itself.

use super::{Reader, Scope};
use crate::error::EngineResult;
use crate::model::{AddressGroup, Service};

/// `Service.address_groups`: the AddressGroups currently bound to `service`,
/// i.e. the `address_group_ref` of every live AddressGroupBinding whose
/// `service_ref` matches it. Order follows the bindings' own list order.
pub async fn derive_service_address_groups(reader: &dyn Reader, service: &mut Service) -> EngineResult<()> {
    let bindings = reader.list_address_group_bindings(&Scope::All).await?;
    service.address_groups = bindings
        .into_iter()
        .filter(|b| b.service_ref == service.id)
        .map(|b| b.address_group_ref)
        .collect();
    Ok(())
}

/// `AddressGroup.aggregated_hosts`: `spec.hosts` unioned with every host
/// reachable through a live HostBinding targeting this group.
pub async fn derive_aggregated_hosts(reader: &dyn Reader, ag: &mut AddressGroup) -> EngineResult<()> {
    let host_bindings = reader.list_host_bindings(&Scope::All).await?;
    let mut set: std::collections::BTreeSet<_> = ag.hosts.iter().cloned().collect();
    for hb in host_bindings {
        if hb.address_group_ref == ag.id {
            set.insert(hb.host_ref);
        }
    }
    ag.aggregated_hosts = set;
    Ok(())
}

/// Runs [`derive_service_address_groups`] over a whole page of Services.
pub async fn derive_service_list(reader: &dyn Reader, services: &mut [Service]) -> EngineResult<()> {
    for s in services {
        derive_service_address_groups(reader, s).await?;
    }
    Ok(())
}

/// Runs [`derive_aggregated_hosts`] over a whole page of AddressGroups.
pub async fn derive_address_group_list(reader: &dyn Reader, ags: &mut [AddressGroup]) -> EngineResult<()> {
    for ag in ags {
        derive_aggregated_hosts(reader, ag).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AddressGroupBinding, DefaultAction, HostBinding, ResourceIdentifier};
    use crate::registry::memory::InMemoryRegistry;
    use crate::registry::{Registry, StoreSyncOp, WriterKind};

    #[tokio::test]
    async fn service_address_groups_follow_live_bindings() {
        let registry = InMemoryRegistry::new();
        let mut writer = registry.writer(WriterKind::Default).await.unwrap();
        let service = Service::new(ResourceIdentifier::new("ns1", "web"), vec![]);
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        let binding = AddressGroupBinding::new(
            ResourceIdentifier::new("ns1", "b1"),
            service.id.clone(),
            ag.id.clone(),
        );
        writer.sync_services(vec![service.clone()], StoreSyncOp::Upsert).await.unwrap();
        writer.sync_address_groups(vec![ag.clone()], StoreSyncOp::Upsert).await.unwrap();
        writer
            .sync_address_group_bindings(vec![binding], StoreSyncOp::Upsert)
            .await
            .unwrap();
        writer.commit().await.unwrap();

        let reader = registry.reader().await.unwrap();
        let loaded = reader.get_service(&service.id).await.unwrap().unwrap();
        assert_eq!(loaded.address_groups, vec![ag.id.clone()]);
    }

    #[tokio::test]
    async fn aggregated_hosts_union_spec_and_host_bindings() {
        let registry = InMemoryRegistry::new();
        let mut writer = registry.writer(WriterKind::Default).await.unwrap();
        let mut ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        ag.hosts.push(ResourceIdentifier::new("ns1", "h1"));
        let hb = HostBinding::new(
            ResourceIdentifier::new("ns1", "hb1"),
            ResourceIdentifier::new("ns1", "h2"),
            ag.id.clone(),
        );
        writer.sync_address_groups(vec![ag.clone()], StoreSyncOp::Upsert).await.unwrap();
        writer.sync_host_bindings(vec![hb], StoreSyncOp::Upsert).await.unwrap();
        writer.commit().await.unwrap();

        let reader = registry.reader().await.unwrap();
        let loaded = reader.get_address_group(&ag.id).await.unwrap().unwrap();
        assert_eq!(loaded.aggregated_hosts.len(), 2);
        assert!(loaded.aggregated_hosts.contains(&ResourceIdentifier::new("ns1", "h1")));
        assert!(loaded.aggregated_hosts.contains(&ResourceIdentifier::new("ns1", "h2")));
    }
}
