use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Namespaced identifier shared by every entity in the reconciliation domain.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentifier {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// `"namespace/name"`, the canonical store key.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// The AddressGroup naming rule: namespace-qualified unless the namespace is empty.
    pub fn qualified_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            self.key()
        }
    }
}

impl std::fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A reference to another entity, as embedded in specs (e.g. `AddressGroupBinding.address_group_ref`).
pub type ObjectRef = ResourceIdentifier;

/// Monotone bookkeeping every entity carries; `generation` is bumped on every write
/// so staleness (e.g. a cached `Ready` condition from a prior generation) can be detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub generation: u64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Meta {
    /// Called when an entity is written for the first time.
    pub fn touch_on_create() -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            generation: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Called on every subsequent write; `token` is accepted for parity with the
    /// source API (callers may pass a causality token) but generation is the
    /// authoritative staleness signal.
    pub fn touch_on_write(&mut self, _token: impl Into<String>) {
        self.generation += 1;
        self.updated_at = OffsetDateTime::now_utc();
    }
}

/// A boolean status condition, most notably `Ready` (synchronized with SGROUP).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub status: bool,
    pub reason: String,
    pub observed_generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionKind {
    Ready,
}

impl Condition {
    pub fn ready(status: bool, reason: impl Into<String>, observed_generation: u64) -> Self {
        Self {
            kind: ConditionKind::Ready,
            status,
            reason: reason.into(),
            observed_generation,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.kind == ConditionKind::Ready && self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_namespace_slash_name() {
        let id = ResourceIdentifier::new("ns1", "ag1");
        assert_eq!(id.key(), "ns1/ag1");
        assert_eq!(id.qualified_name(), "ns1/ag1");
    }

    #[test]
    fn qualified_name_drops_empty_namespace() {
        let id = ResourceIdentifier::new("", "global-ag");
        assert_eq!(id.qualified_name(), "global-ag");
    }

    #[test]
    fn touch_on_write_bumps_generation() {
        let mut meta = Meta::touch_on_create();
        assert_eq!(meta.generation, 1);
        meta.touch_on_write("token");
        assert_eq!(meta.generation, 2);
    }
}
