use serde::{Deserialize, Serialize};

use super::ids::{Condition, Meta, ObjectRef, ResourceIdentifier};

/// A Host. Bound through exactly one mechanism at a time:
/// - via a HostBinding: `binding_ref.is_some()`
/// - via `AddressGroup.spec.hosts`: `binding_ref.is_none() && address_group_ref.is_some()`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub id: ResourceIdentifier,
    pub meta: Meta,
    pub is_bound: bool,
    pub binding_ref: Option<ObjectRef>,
    pub address_group_ref: Option<ObjectRef>,
    pub address_group_name: String,
    pub conditions: Vec<Condition>,
}

impl Host {
    pub fn new(id: ResourceIdentifier) -> Self {
        Self {
            id,
            meta: Meta::touch_on_create(),
            is_bound: false,
            binding_ref: None,
            address_group_ref: None,
            address_group_name: String::new(),
            conditions: Vec::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.conditions.iter().any(Condition::is_ready)
    }

    pub fn set_ready(&mut self, status: bool, reason: impl Into<String>) {
        let generation = self.meta.generation;
        self.conditions.retain(|c| !matches!(c.kind, super::ids::ConditionKind::Ready));
        self.conditions
            .push(Condition::ready(status, reason, generation));
    }

    /// Bound via a HostBinding.
    pub fn bind_via_host_binding(&mut self, binding_ref: ObjectRef, address_group_ref: ObjectRef) {
        self.address_group_name = address_group_ref.qualified_name();
        self.is_bound = true;
        self.binding_ref = Some(binding_ref);
        self.address_group_ref = Some(address_group_ref);
    }

    /// Bound via the owning AddressGroup's `spec.hosts` — no BindingRef.
    pub fn bind_via_address_group_hosts(&mut self, address_group_ref: ObjectRef) {
        self.address_group_name = address_group_ref.qualified_name();
        self.is_bound = true;
        self.binding_ref = None;
        self.address_group_ref = Some(address_group_ref);
    }

    pub fn unbind(&mut self) {
        self.is_bound = false;
        self.binding_ref = None;
        self.address_group_ref = None;
        self.address_group_name = String::new();
    }

    /// Invariant 3 (SPEC_FULL.md §8).
    pub fn unbound_invariant_holds(&self) -> bool {
        if self.is_bound {
            return true;
        }
        self.binding_ref.is_none() && self.address_group_ref.is_none() && self.address_group_name.is_empty()
    }

    /// Bound via `AddressGroup.spec.hosts` specifically (no HostBinding).
    pub fn bound_via_address_group_hosts(&self) -> bool {
        self.is_bound && self.address_group_ref.is_some() && self.binding_ref.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_invariant() {
        let host = Host::new(ResourceIdentifier::new("ns1", "h1"));
        assert!(host.unbound_invariant_holds());
    }

    #[test]
    fn bind_via_host_binding_sets_binding_ref() {
        let mut host = Host::new(ResourceIdentifier::new("ns1", "h1"));
        host.bind_via_host_binding(
            ResourceIdentifier::new("ns1", "hb1"),
            ResourceIdentifier::new("ns1", "ag1"),
        );
        assert!(host.binding_ref.is_some());
        assert!(!host.bound_via_address_group_hosts());
    }

    #[test]
    fn bind_via_spec_hosts_leaves_binding_ref_empty() {
        let mut host = Host::new(ResourceIdentifier::new("ns1", "h1"));
        host.bind_via_address_group_hosts(ResourceIdentifier::new("ns1", "ag1"));
        assert!(host.binding_ref.is_none());
        assert!(host.bound_via_address_group_hosts());
    }
}
