use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::ids::{Meta, ObjectRef, ResourceIdentifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultAction {
    Accept,
    Drop,
}

/// A network item embedded in `AddressGroup.spec.networks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkItem {
    pub name: String,
    pub cidr: String,
    pub namespace: String,
}

/// AddressGroup: a named set of hosts/networks with a default action.
///
/// `aggregated_hosts` is derived (union of `hosts` and live HostBindings targeting
/// this group) and must only be populated by the store's reader, mirroring
/// `Service.address_groups`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressGroup {
    pub id: ResourceIdentifier,
    pub meta: Meta,
    pub default_action: DefaultAction,
    pub hosts: Vec<ObjectRef>,
    pub aggregated_hosts: BTreeSet<ObjectRef>,
    pub networks: Vec<NetworkItem>,
}

impl AddressGroup {
    pub fn new(id: ResourceIdentifier, default_action: DefaultAction) -> Self {
        Self {
            id,
            meta: Meta::touch_on_create(),
            default_action,
            hosts: Vec::new(),
            aggregated_hosts: BTreeSet::new(),
            networks: Vec::new(),
        }
    }

    /// `AddressGroupName`: derived `"namespace/name"`, or bare `"name"` when the
    /// group is not namespaced.
    pub fn address_group_name(&self) -> String {
        self.id.qualified_name()
    }

    /// Target host set per SPEC_FULL.md §4.7 step 3: `aggregated_hosts` if
    /// non-empty, else fall back to `spec.hosts`.
    pub fn reconciliation_targets(&self) -> BTreeSet<ObjectRef> {
        if self.aggregated_hosts.is_empty() {
            self.hosts.iter().cloned().collect()
        } else {
            self.aggregated_hosts.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_name_follows_namespace() {
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        assert_eq!(ag.address_group_name(), "ns1/ag1");
    }

    #[test]
    fn reconciliation_targets_falls_back_to_spec_hosts() {
        let mut ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Drop);
        ag.hosts.push(ResourceIdentifier::new("ns1", "h1"));
        assert_eq!(ag.reconciliation_targets().len(), 1);

        ag.aggregated_hosts
            .insert(ResourceIdentifier::new("ns1", "h1"));
        ag.aggregated_hosts
            .insert(ResourceIdentifier::new("ns1", "h2"));
        assert_eq!(ag.reconciliation_targets().len(), 2);
    }
}
