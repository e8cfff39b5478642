//! The entity types the reconciliation engine reads, validates, derives and writes.
//! See SPEC_FULL.md §3 for the invariants each type is responsible for upholding.

pub mod address_group;
pub mod address_group_binding;
pub mod address_group_binding_policy;
pub mod address_group_port_mapping;
pub mod host;
pub mod host_binding;
pub mod ids;
pub mod network;
pub mod network_binding;
pub mod port;
pub mod service;

pub use address_group::{AddressGroup, DefaultAction, NetworkItem};
pub use address_group_binding::AddressGroupBinding;
pub use address_group_binding_policy::AddressGroupBindingPolicy;
pub use address_group_port_mapping::{AddressGroupPortMapping, ServicePorts};
pub use host::Host;
pub use host_binding::HostBinding;
pub use ids::{Condition, ConditionKind, Meta, ObjectRef, ResourceIdentifier};
pub use network::Network;
pub use network_binding::NetworkBinding;
pub use port::{IngressPort, PortRange, Protocol};
pub use service::Service;

/// Every entity kind the Registry knows how to store, used to key scopes,
/// SyncManager calls and condition callbacks generically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Service,
    AddressGroup,
    AddressGroupBinding,
    AddressGroupPortMapping,
    AddressGroupBindingPolicy,
    Network,
    NetworkBinding,
    Host,
    HostBinding,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::Service => "Service",
            EntityKind::AddressGroup => "AddressGroup",
            EntityKind::AddressGroupBinding => "AddressGroupBinding",
            EntityKind::AddressGroupPortMapping => "AddressGroupPortMapping",
            EntityKind::AddressGroupBindingPolicy => "AddressGroupBindingPolicy",
            EntityKind::Network => "Network",
            EntityKind::NetworkBinding => "NetworkBinding",
            EntityKind::Host => "Host",
            EntityKind::HostBinding => "HostBinding",
        };
        write!(f, "{s}")
    }
}
