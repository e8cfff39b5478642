//! Per-entity validation (SPEC_FULL.md §4.3 C3): `ValidateForCreation`,
//! `ValidateForUpdate` and `CheckDependencies`. Every function here reads
//! through a `&dyn Reader` — during a write path that's always the writer
//! itself (`ReaderFromWriter`, SPEC_FULL.md §4.1), so validation observes the
//! transaction's own uncommitted writes.

use crate::error::{EngineError, EngineResult};
use crate::model::{
    AddressGroup, AddressGroupBinding, Host, HostBinding, Network, NetworkBinding, ResourceIdentifier,
    Service,
};
use crate::registry::{Reader, Scope};

pub async fn validate_service_for_creation(reader: &dyn Reader, service: &Service) -> EngineResult<()> {
    if reader.get_service(&service.id).await?.is_some() {
        return Err(EngineError::already_exists("Service", service.id.key()));
    }
    Ok(())
}

pub async fn validate_service_for_update(reader: &dyn Reader, service: &Service) -> EngineResult<Service> {
    reader
        .get_service(&service.id)
        .await?
        .ok_or_else(|| EngineError::not_found("Service", service.id.key()))
}

pub async fn validate_address_group_for_creation(reader: &dyn Reader, ag: &AddressGroup) -> EngineResult<()> {
    if reader.get_address_group(&ag.id).await?.is_some() {
        return Err(EngineError::already_exists("AddressGroup", ag.id.key()));
    }
    Ok(())
}

pub async fn validate_address_group_for_update(
    reader: &dyn Reader,
    ag: &AddressGroup,
) -> EngineResult<AddressGroup> {
    reader
        .get_address_group(&ag.id)
        .await?
        .ok_or_else(|| EngineError::not_found("AddressGroup", ag.id.key()))
}

/// Every entity that can reference an AddressGroup — AddressGroupBinding,
/// HostBinding, NetworkBinding — is itself cascade-deleted alongside it
/// (SPEC_FULL.md §4.3), so `CheckDependencies` never blocks an AddressGroup
/// delete; the cascade, not a pre-check, is what keeps the model consistent.
pub async fn check_address_group_dependencies(
    _reader: &dyn Reader,
    _id: &ResourceIdentifier,
) -> EngineResult<()> {
    Ok(())
}

async fn require_cross_namespace_policy(
    reader: &dyn Reader,
    service_ref: &ResourceIdentifier,
    address_group_ref: &ResourceIdentifier,
) -> EngineResult<()> {
    if service_ref.namespace == address_group_ref.namespace {
        return Ok(());
    }
    let policies = reader.list_address_group_binding_policies(&Scope::All).await?;
    if policies.iter().any(|p| p.permits(service_ref, address_group_ref)) {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "cross-namespace binding from service {} to address group {} requires an AddressGroupBindingPolicy",
            service_ref.key(),
            address_group_ref.key(),
        )))
    }
}

pub async fn validate_agb_for_creation(reader: &dyn Reader, agb: &AddressGroupBinding) -> EngineResult<()> {
    if reader.get_address_group_binding(&agb.id).await?.is_some() {
        return Err(EngineError::already_exists("AddressGroupBinding", agb.id.key()));
    }
    reader
        .get_service(&agb.service_ref)
        .await?
        .ok_or_else(|| EngineError::Validation(format!("service {} not found", agb.service_ref.key())))?;
    reader
        .get_address_group(&agb.address_group_ref)
        .await?
        .ok_or_else(|| {
            EngineError::Validation(format!("address group {} not found", agb.address_group_ref.key()))
        })?;

    let existing = reader.list_address_group_bindings(&Scope::All).await?;
    if existing
        .iter()
        .any(|b| b.service_ref == agb.service_ref && b.address_group_ref == agb.address_group_ref)
    {
        return Err(EngineError::Validation(format!(
            "binding already exists between service {} and address group {}",
            agb.service_ref.key(),
            agb.address_group_ref.key(),
        )));
    }

    require_cross_namespace_policy(reader, &agb.service_ref, &agb.address_group_ref).await
}

pub async fn validate_agb_for_update(
    reader: &dyn Reader,
    agb: &AddressGroupBinding,
) -> EngineResult<AddressGroupBinding> {
    let existing = reader
        .get_address_group_binding(&agb.id)
        .await?
        .ok_or_else(|| EngineError::not_found("AddressGroupBinding", agb.id.key()))?;
    reader
        .get_service(&agb.service_ref)
        .await?
        .ok_or_else(|| EngineError::Validation(format!("service {} not found", agb.service_ref.key())))?;
    reader
        .get_address_group(&agb.address_group_ref)
        .await?
        .ok_or_else(|| {
            EngineError::Validation(format!("address group {} not found", agb.address_group_ref.key()))
        })?;
    require_cross_namespace_policy(reader, &agb.service_ref, &agb.address_group_ref).await?;
    Ok(existing)
}

/// Mutual exclusion from SPEC_FULL.md §4.7: a Host is bound through exactly
/// one of HostBinding XOR `AddressGroup.spec.hosts` at a time, and must be
/// Ready before either path may bind it ("Ready-before-bind", §9).
pub async fn validate_host_binding_for_creation(reader: &dyn Reader, hb: &HostBinding) -> EngineResult<Host> {
    if reader.get_host_binding(&hb.id).await?.is_some() {
        return Err(EngineError::already_exists("HostBinding", hb.id.key()));
    }
    let host = reader
        .get_host(&hb.host_ref)
        .await?
        .ok_or_else(|| EngineError::Validation(format!("host {} not found", hb.host_ref.key())))?;
    reader
        .get_address_group(&hb.address_group_ref)
        .await?
        .ok_or_else(|| {
            EngineError::Validation(format!("address group {} not found", hb.address_group_ref.key()))
        })?;

    if host.is_bound {
        return Err(EngineError::Validation(format!(
            "host {} is already bound; a host may be bound via HostBinding or AddressGroup.spec.hosts but not both",
            host.id.key(),
        )));
    }
    if !host.is_ready() {
        return Err(EngineError::Validation(format!(
            "host {} is not Ready; it must synchronize before it can be bound",
            host.id.key(),
        )));
    }

    let existing = reader.list_host_bindings(&Scope::All).await?;
    if existing.iter().any(|b| b.host_ref == hb.host_ref) {
        return Err(EngineError::Validation(format!(
            "host {} already has a HostBinding",
            hb.host_ref.key(),
        )));
    }

    Ok(host)
}

pub async fn validate_network_binding_for_creation(
    reader: &dyn Reader,
    nb: &NetworkBinding,
) -> EngineResult<Network> {
    if reader.get_network_binding(&nb.id).await?.is_some() {
        return Err(EngineError::already_exists("NetworkBinding", nb.id.key()));
    }
    let network = reader
        .get_network(&nb.network_ref)
        .await?
        .ok_or_else(|| EngineError::Validation(format!("network {} not found", nb.network_ref.key())))?;
    if network.is_bound {
        return Err(EngineError::Validation(format!(
            "network {} is already bound to an address group",
            network.id.key(),
        )));
    }
    reader
        .get_address_group(&nb.address_group_ref)
        .await?
        .ok_or_else(|| {
            EngineError::Validation(format!("address group {} not found", nb.address_group_ref.key()))
        })?;

    let existing = reader.list_network_bindings(&Scope::All).await?;
    if existing.iter().any(|b| b.network_ref == nb.network_ref) {
        return Err(EngineError::Validation(format!(
            "network {} already has a NetworkBinding",
            nb.network_ref.key(),
        )));
    }

    Ok(network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DefaultAction, IngressPort, Protocol};
    use crate::registry::memory::InMemoryRegistry;
    use crate::registry::{Registry, StoreSyncOp, WriterKind};

    #[tokio::test]
    async fn duplicate_service_creation_is_rejected() {
        let registry = InMemoryRegistry::new();
        let mut writer = registry.writer(WriterKind::Default).await.unwrap();
        let service = Service::new(ResourceIdentifier::new("ns1", "web"), vec![IngressPort::new(Protocol::Tcp, "80")]);
        writer.sync_services(vec![service.clone()], StoreSyncOp::Upsert).await.unwrap();

        let err = validate_service_for_creation(&*writer, &service).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn agb_creation_requires_existing_service_and_group() {
        let registry = InMemoryRegistry::new();
        let writer = registry.writer(WriterKind::Default).await.unwrap();
        let agb = AddressGroupBinding::new(
            ResourceIdentifier::new("ns1", "b1"),
            ResourceIdentifier::new("ns1", "web"),
            ResourceIdentifier::new("ns1", "ag1"),
        );
        let err = validate_agb_for_creation(&*writer, &agb).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn cross_namespace_binding_requires_policy() {
        let registry = InMemoryRegistry::new();
        let mut writer = registry.writer(WriterKind::Default).await.unwrap();
        let service = Service::new(ResourceIdentifier::new("ns1", "web"), vec![]);
        let ag = AddressGroup::new(ResourceIdentifier::new("ns2", "ag1"), DefaultAction::Accept);
        writer.sync_services(vec![service.clone()], StoreSyncOp::Upsert).await.unwrap();
        writer.sync_address_groups(vec![ag.clone()], StoreSyncOp::Upsert).await.unwrap();

        let agb = AddressGroupBinding::new(ResourceIdentifier::new("ns1", "b1"), service.id.clone(), ag.id.clone());
        let err = validate_agb_for_creation(&*writer, &agb).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn host_binding_rejected_when_host_not_ready() {
        let registry = InMemoryRegistry::new();
        let mut writer = registry.writer(WriterKind::Default).await.unwrap();
        let host = Host::new(ResourceIdentifier::new("ns1", "h1"));
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        writer.sync_hosts(vec![host.clone()], StoreSyncOp::Upsert).await.unwrap();
        writer.sync_address_groups(vec![ag.clone()], StoreSyncOp::Upsert).await.unwrap();

        let hb = HostBinding::new(ResourceIdentifier::new("ns1", "hb1"), host.id.clone(), ag.id.clone());
        let err = validate_host_binding_for_creation(&*writer, &hb).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
