use serde::{Deserialize, Serialize};

use super::ids::{Meta, ObjectRef, ResourceIdentifier};

/// Links a Service to an AddressGroup so the Service's ingress ports are exposed
/// through that group. At most one binding may exist per `(service_ref, address_group_ref)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressGroupBinding {
    pub id: ResourceIdentifier,
    pub meta: Meta,
    pub service_ref: ObjectRef,
    pub address_group_ref: ObjectRef,
}

impl AddressGroupBinding {
    pub fn new(id: ResourceIdentifier, service_ref: ObjectRef, address_group_ref: ObjectRef) -> Self {
        Self {
            id,
            meta: Meta::touch_on_create(),
            service_ref,
            address_group_ref,
        }
    }
}
