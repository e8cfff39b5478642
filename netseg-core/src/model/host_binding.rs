use serde::{Deserialize, Serialize};

use super::ids::{Meta, ObjectRef, ResourceIdentifier};

/// Links a Host to an AddressGroup. At most one HostBinding may exist per Host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostBinding {
    pub id: ResourceIdentifier,
    pub meta: Meta,
    pub host_ref: ObjectRef,
    pub address_group_ref: ObjectRef,
}

impl HostBinding {
    pub fn new(id: ResourceIdentifier, host_ref: ObjectRef, address_group_ref: ObjectRef) -> Self {
        Self {
            id,
            meta: Meta::touch_on_create(),
            host_ref,
            address_group_ref,
        }
    }
}
