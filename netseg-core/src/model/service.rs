use serde::{Deserialize, Serialize};

use super::ids::{Meta, ObjectRef, ResourceIdentifier};
use super::port::IngressPort;

/// A Service: an ordered list of ingress ports, plus the set of AddressGroups it is
/// currently bound to. `address_groups` is a derived field — it must only ever be
/// populated by the store's reader (from live AddressGroupBindings); the service
/// layer re-reads it, it never computes it by hand (see SPEC_FULL.md §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: ResourceIdentifier,
    pub meta: Meta,
    pub ingress_ports: Vec<IngressPort>,
    pub address_groups: Vec<ObjectRef>,
}

impl Service {
    pub fn new(id: ResourceIdentifier, ingress_ports: Vec<IngressPort>) -> Self {
        Self {
            id,
            meta: Meta::touch_on_create(),
            ingress_ports,
            address_groups: Vec::new(),
        }
    }
}
