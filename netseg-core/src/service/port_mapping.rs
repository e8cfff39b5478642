//! AddressGroupPortMapping generation (SPEC_FULL.md §4.4 C5). Given an
//! AddressGroup, rebuilds its AGPM from scratch by walking every Service
//! bound to it and re-parsing each Service's ingress ports; detects overlaps
//! across Services sharing the group before the new mapping is accepted.

use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::model::{AddressGroupPortMapping, Meta, ResourceIdentifier, Service, ServicePorts};
use crate::port::{find_conflict, parse_ingress_ports};
use crate::registry::{Reader, Scope};

/// Every Service currently reachable through `address_group_id`, via a live
/// AddressGroupBinding targeting it directly or via the derived
/// `Service.address_groups` projection — in this model the two queries name
/// the same set, but both are walked so the mapping stays correct if that
/// ever stops being true. Order follows first discovery.
async fn services_bound_to(
    reader: &dyn Reader,
    address_group_id: &ResourceIdentifier,
) -> EngineResult<Vec<Service>> {
    let bindings = reader.list_address_group_bindings(&Scope::All).await?;
    let mut ids: Vec<ResourceIdentifier> = bindings
        .iter()
        .filter(|b| &b.address_group_ref == address_group_id)
        .map(|b| b.service_ref.clone())
        .collect();

    let all_services = reader.list_services(&Scope::All).await?;
    for service in &all_services {
        if service.address_groups.contains(address_group_id) && !ids.contains(&service.id) {
            ids.push(service.id.clone());
        }
    }

    let mut services = Vec::with_capacity(ids.len());
    for id in &ids {
        if let Some(service) = reader.get_service(id).await? {
            services.push(service);
        }
    }
    Ok(services)
}

/// Rebuilds the AGPM for `address_group_id` from the Services currently bound
/// to it. Returns `EngineError::PortConflict` the first time two bound
/// Services claim an overlapping range under the same protocol
/// (SPEC_FULL.md §4.4, §4.5 wording).
pub async fn generate_port_mapping(
    reader: &dyn Reader,
    address_group_id: &ResourceIdentifier,
) -> EngineResult<AddressGroupPortMapping> {
    let services = services_bound_to(reader, address_group_id).await?;

    for i in 0..services.len() {
        for j in 0..i {
            if let Some((protocol, new_range, existing_range)) =
                find_conflict(&services[i].ingress_ports, &services[j].ingress_ports)
            {
                return Err(EngineError::PortConflict(format!(
                    "{protocol} port range {new_range} for service {new_service} overlaps with existing port range {existing_range} for service {existing_service}",
                    new_service = services[i].id.key(),
                    existing_service = services[j].id.key(),
                )));
            }
        }
    }

    let mut access_ports = HashMap::with_capacity(services.len());
    for service in &services {
        let mut ports = ServicePorts::default();
        for (protocol, ranges) in parse_ingress_ports(&service.ingress_ports) {
            for range in ranges {
                ports.add(protocol, range);
            }
        }
        access_ports.insert(service.id.key(), ports);
    }

    let meta = match reader.get_address_group_port_mapping(address_group_id).await? {
        Some(existing) => {
            let mut meta = existing.meta;
            meta.touch_on_write("regenerate");
            meta
        }
        None => Meta::touch_on_create(),
    };

    Ok(AddressGroupPortMapping {
        address_group_id: address_group_id.clone(),
        meta,
        access_ports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AddressGroup, AddressGroupBinding, DefaultAction, IngressPort, Protocol,
    };
    use crate::registry::memory::InMemoryRegistry;
    use crate::registry::{Registry, StoreSyncOp, WriterKind};

    async fn seed(
        registry: &InMemoryRegistry,
        ag_id: ResourceIdentifier,
        services: Vec<(ResourceIdentifier, Vec<IngressPort>)>,
    ) {
        let mut writer = registry.writer(WriterKind::Default).await.unwrap();
        let ag = AddressGroup::new(ag_id.clone(), DefaultAction::Accept);
        writer.sync_address_groups(vec![ag], StoreSyncOp::Upsert).await.unwrap();
        for (id, ports) in services {
            let service = Service::new(id.clone(), ports);
            writer.sync_services(vec![service], StoreSyncOp::Upsert).await.unwrap();
            let binding = AddressGroupBinding::new(
                ResourceIdentifier::new(id.namespace.clone(), format!("{}-binding", id.name)),
                id,
                ag_id.clone(),
            );
            writer
                .sync_address_group_bindings(vec![binding], StoreSyncOp::Upsert)
                .await
                .unwrap();
        }
        writer.commit().await.unwrap();
    }

    #[tokio::test]
    async fn generates_mapping_for_disjoint_services() {
        let registry = InMemoryRegistry::new();
        let ag_id = ResourceIdentifier::new("ns1", "ag1");
        seed(
            &registry,
            ag_id.clone(),
            vec![
                (ResourceIdentifier::new("ns1", "a"), vec![IngressPort::new(Protocol::Tcp, "80")]),
                (ResourceIdentifier::new("ns1", "b"), vec![IngressPort::new(Protocol::Tcp, "443")]),
            ],
        )
        .await;

        let reader = registry.reader().await.unwrap();
        let mapping = generate_port_mapping(&*reader, &ag_id).await.unwrap();
        assert_eq!(mapping.access_ports.len(), 2);
    }

    #[tokio::test]
    async fn overlapping_services_produce_port_conflict() {
        let registry = InMemoryRegistry::new();
        let ag_id = ResourceIdentifier::new("ns1", "ag1");
        seed(
            &registry,
            ag_id.clone(),
            vec![
                (ResourceIdentifier::new("ns1", "a"), vec![IngressPort::new(Protocol::Tcp, "80-100")]),
                (ResourceIdentifier::new("ns1", "b"), vec![IngressPort::new(Protocol::Tcp, "90-110")]),
            ],
        )
        .await;

        let reader = registry.reader().await.unwrap();
        let err = generate_port_mapping(&*reader, &ag_id).await.unwrap_err();
        match err {
            EngineError::PortConflict(message) => {
                assert!(message.contains("overlaps with existing port range"));
            }
            other => panic!("expected PortConflict, got {other:?}"),
        }
    }
}
