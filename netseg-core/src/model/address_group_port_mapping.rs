use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ids::{Meta, ResourceIdentifier};
use super::port::{PortRange, Protocol};

/// Per-transport ordered port ranges reachable through one Service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePorts {
    pub by_protocol: HashMap<Protocol, Vec<PortRange>>,
}

impl ServicePorts {
    pub fn add(&mut self, protocol: Protocol, range: PortRange) {
        self.by_protocol.entry(protocol).or_default().push(range);
    }
}

/// AddressGroupPortMapping (AGPM): derived, keyed by AddressGroup id. Fully
/// regenerated on every write (SPEC_FULL.md §4.5) rather than patched incrementally.
///
/// `access_ports` is keyed by `ResourceIdentifier::key()` rather than the
/// identifier itself — `serde_json::to_value` only accepts string (or
/// string-coercible) map keys, and `PgWriter::upsert_kind` round-trips this
/// struct through a JSONB column, so a struct-typed key would fail to
/// serialize for any non-empty mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressGroupPortMapping {
    pub address_group_id: ResourceIdentifier,
    pub meta: Meta,
    pub access_ports: HashMap<String, ServicePorts>,
}

impl AddressGroupPortMapping {
    pub fn empty(address_group_id: ResourceIdentifier) -> Self {
        Self {
            address_group_id,
            meta: Meta::touch_on_create(),
            access_ports: HashMap::new(),
        }
    }
}
