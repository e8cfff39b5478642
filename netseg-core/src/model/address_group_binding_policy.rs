use serde::{Deserialize, Serialize};

use super::ids::{Meta, ObjectRef, ResourceIdentifier};

/// Permits a cross-namespace AddressGroupBinding between `service_ref` and
/// `address_group_ref`'s namespaces. Consulted by the AGB validator only; it has
/// no other side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressGroupBindingPolicy {
    pub id: ResourceIdentifier,
    pub meta: Meta,
    pub service_ref: ObjectRef,
    pub address_group_ref: ObjectRef,
}

impl AddressGroupBindingPolicy {
    pub fn new(id: ResourceIdentifier, service_ref: ObjectRef, address_group_ref: ObjectRef) -> Self {
        Self {
            id,
            meta: Meta::touch_on_create(),
            service_ref,
            address_group_ref,
        }
    }

    /// Whether this policy permits binding `service_ref` to `address_group_ref`.
    pub fn permits(&self, service_ref: &ObjectRef, address_group_ref: &ObjectRef) -> bool {
        &self.service_ref == service_ref && &self.address_group_ref == address_group_ref
    }
}
