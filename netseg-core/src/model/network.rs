use serde::{Deserialize, Serialize};

use super::ids::{Meta, ObjectRef, ResourceIdentifier};

/// A Network. `is_bound <=> binding_ref.is_some() <=> address_group_ref.is_some()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub id: ResourceIdentifier,
    pub meta: Meta,
    pub is_bound: bool,
    pub binding_ref: Option<ObjectRef>,
    pub address_group_ref: Option<ObjectRef>,
}

impl Network {
    pub fn new(id: ResourceIdentifier) -> Self {
        Self {
            id,
            meta: Meta::touch_on_create(),
            is_bound: false,
            binding_ref: None,
            address_group_ref: None,
        }
    }

    pub fn bind(&mut self, binding_ref: ObjectRef, address_group_ref: ObjectRef) {
        self.is_bound = true;
        self.binding_ref = Some(binding_ref);
        self.address_group_ref = Some(address_group_ref);
    }

    pub fn unbind(&mut self) {
        self.is_bound = false;
        self.binding_ref = None;
        self.address_group_ref = None;
    }

    /// Invariant 6 (SPEC_FULL.md §8): bound iff all three fields agree.
    pub fn invariant_holds(&self) -> bool {
        self.is_bound == self.binding_ref.is_some() && self.is_bound == self.address_group_ref.is_some()
    }
}
