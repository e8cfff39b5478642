use serde::{Deserialize, Serialize};

use super::ids::{Meta, ObjectRef, ResourceIdentifier};

/// Links a Network to an AddressGroup. At most one NetworkBinding may exist per Network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkBinding {
    pub id: ResourceIdentifier,
    pub meta: Meta,
    pub network_ref: ObjectRef,
    pub address_group_ref: ObjectRef,
}

impl NetworkBinding {
    pub fn new(id: ResourceIdentifier, network_ref: ObjectRef, address_group_ref: ObjectRef) -> Self {
        Self {
            id,
            meta: Meta::touch_on_create(),
            network_ref,
            address_group_ref,
        }
    }
}
