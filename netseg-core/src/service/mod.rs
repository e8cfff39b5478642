//! The C3, C5–C9 service layer (SPEC_FULL.md §4.2–§4.10): everything that
//! turns validated writes into committed state plus best-effort external
//! fan-out. `Services` wires the five entity-facing services against one
//! shared `Registry`, `SyncManager`, `ConditionManager` and
//! `RuleS2SRegenerator`.

pub mod address_group;
pub mod host;
pub mod host_binding;
pub mod network_binding;
pub mod port_mapping;
pub mod service_entity;
pub mod sync_tracker;
pub mod validate;

use std::sync::Arc;

use crate::conditions::ConditionManager;
use crate::registry::Registry;
use crate::rules::RuleS2SRegenerator;
use crate::sync::SyncManager;

pub use address_group::AddressGroupService;
pub use host::HostService;
pub use host_binding::HostBindingService;
pub use network_binding::NetworkBindingService;
pub use service_entity::ServiceEntityService;
pub use sync_tracker::SyncTracker;

/// Every service the ambient binary needs, built from one set of
/// collaborators (SPEC_FULL.md §6: "builds the C6–C9 services from them").
pub struct Services {
    pub services: Arc<ServiceEntityService>,
    pub address_groups: Arc<AddressGroupService>,
    pub hosts: Arc<HostService>,
    pub host_bindings: Arc<HostBindingService>,
    pub network_bindings: Arc<NetworkBindingService>,
}

impl Services {
    pub fn new(
        registry: Arc<dyn Registry>,
        sync_manager: Arc<dyn SyncManager>,
        conditions: Arc<dyn ConditionManager>,
        regenerator: Arc<dyn RuleS2SRegenerator>,
    ) -> Self {
        let sync = SyncTracker::new(sync_manager);

        let address_groups = Arc::new(AddressGroupService::new(
            registry.clone(),
            sync.clone(),
            conditions.clone(),
            regenerator,
        ));
        let services = Arc::new(ServiceEntityService::new(
            registry.clone(),
            sync.clone(),
            address_groups.clone(),
        ));
        let hosts = Arc::new(HostService::new(registry.clone(), sync.clone(), conditions.clone()));
        let host_bindings = Arc::new(HostBindingService::new(registry.clone(), sync.clone(), conditions));
        let network_bindings = Arc::new(NetworkBindingService::new(registry, sync));

        Self {
            services,
            address_groups,
            hosts,
            host_bindings,
            network_bindings,
        }
    }
}
