//! The Registry abstraction (SPEC_FULL.md §1, §4.1, §6 C1).
//!
//! This is the one store-shaped seam the core is built against. Concrete
//! persistence is explicitly out of scope (SPEC_FULL.md §1 non-goals); this
//! module defines the trait surface the reconciliation engine calls, plus two
//! adapters: [`memory`] (an in-memory reference implementation used by every
//! unit test and, by default, by the ambient binary) and [`pg`] (a generic
//! Postgres-backed adapter that exercises the teacher's `sqlx` stack without
//! inventing a production entity-relational schema).

pub mod derive;
pub mod memory;
pub mod pg;

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::model::{
    AddressGroup, AddressGroupBinding, AddressGroupBindingPolicy, AddressGroupPortMapping, Host,
    HostBinding, Network, NetworkBinding, ResourceIdentifier, Service,
};

/// A selection of entities for a bulk store operation. `All` is the empty
/// scope from SPEC_FULL.md §6 ("empty scope means all"); `Ids` restricts to a
/// specific resource-id set.
#[derive(Debug, Clone, Default)]
pub enum Scope {
    #[default]
    All,
    Ids(Vec<ResourceIdentifier>),
}

impl Scope {
    pub fn includes(&self, id: &ResourceIdentifier) -> bool {
        match self {
            Scope::All => true,
            Scope::Ids(ids) => ids.contains(id),
        }
    }
}

/// The store-level bulk write operation requested of `Writer::sync_*`
/// (distinct from [`crate::sync::SyncOp`], which is the *external* SGROUP op).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreSyncOp {
    Upsert,
    FullSync,
    Delete,
}

/// Read-only access to the store. A [`Writer`] also implements this trait, so
/// reading through `ReaderFromWriter` (SPEC_FULL.md §4.1) is simply reading
/// through the writer itself — the same transaction, no separate handle.
#[async_trait]
pub trait Reader: Send + Sync {
    async fn list_services(&self, scope: &Scope) -> EngineResult<Vec<Service>>;
    async fn get_service(&self, id: &ResourceIdentifier) -> EngineResult<Option<Service>>;

    async fn list_address_groups(&self, scope: &Scope) -> EngineResult<Vec<AddressGroup>>;
    async fn get_address_group(&self, id: &ResourceIdentifier) -> EngineResult<Option<AddressGroup>>;

    async fn list_address_group_bindings(&self, scope: &Scope) -> EngineResult<Vec<AddressGroupBinding>>;
    async fn get_address_group_binding(
        &self,
        id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupBinding>>;

    async fn list_address_group_port_mappings(
        &self,
        scope: &Scope,
    ) -> EngineResult<Vec<AddressGroupPortMapping>>;
    async fn get_address_group_port_mapping(
        &self,
        address_group_id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupPortMapping>>;

    async fn list_address_group_binding_policies(
        &self,
        scope: &Scope,
    ) -> EngineResult<Vec<AddressGroupBindingPolicy>>;
    async fn get_address_group_binding_policy(
        &self,
        id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupBindingPolicy>>;

    async fn list_networks(&self, scope: &Scope) -> EngineResult<Vec<Network>>;
    async fn get_network(&self, id: &ResourceIdentifier) -> EngineResult<Option<Network>>;

    async fn list_network_bindings(&self, scope: &Scope) -> EngineResult<Vec<NetworkBinding>>;
    async fn get_network_binding(&self, id: &ResourceIdentifier) -> EngineResult<Option<NetworkBinding>>;

    async fn list_hosts(&self, scope: &Scope) -> EngineResult<Vec<Host>>;
    async fn get_host(&self, id: &ResourceIdentifier) -> EngineResult<Option<Host>>;

    async fn list_host_bindings(&self, scope: &Scope) -> EngineResult<Vec<HostBinding>>;
    async fn get_host_binding(&self, id: &ResourceIdentifier) -> EngineResult<Option<HostBinding>>;
}

/// A live write transaction. Every write-path operation opens one of these
/// (SPEC_FULL.md §4.1); callers must end it with exactly one of
/// [`Writer::commit`] or [`Writer::abort`].
#[async_trait]
pub trait Writer: Reader {
    async fn sync_services(&mut self, entities: Vec<Service>, op: StoreSyncOp) -> EngineResult<()>;
    async fn sync_address_groups(&mut self, entities: Vec<AddressGroup>, op: StoreSyncOp) -> EngineResult<()>;
    async fn sync_address_group_bindings(
        &mut self,
        entities: Vec<AddressGroupBinding>,
        op: StoreSyncOp,
    ) -> EngineResult<()>;
    async fn sync_address_group_port_mappings(
        &mut self,
        entities: Vec<AddressGroupPortMapping>,
        op: StoreSyncOp,
    ) -> EngineResult<()>;
    async fn sync_address_group_binding_policies(
        &mut self,
        entities: Vec<AddressGroupBindingPolicy>,
        op: StoreSyncOp,
    ) -> EngineResult<()>;
    async fn sync_networks(&mut self, entities: Vec<Network>, op: StoreSyncOp) -> EngineResult<()>;
    async fn sync_network_bindings(&mut self, entities: Vec<NetworkBinding>, op: StoreSyncOp) -> EngineResult<()>;
    async fn sync_hosts(&mut self, entities: Vec<Host>, op: StoreSyncOp) -> EngineResult<()>;
    async fn sync_host_bindings(&mut self, entities: Vec<HostBinding>, op: StoreSyncOp) -> EngineResult<()>;

    async fn delete_services_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()>;
    async fn delete_address_groups_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()>;
    async fn delete_address_group_bindings_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()>;
    async fn delete_address_group_binding_policies_by_ids(
        &mut self,
        ids: &[ResourceIdentifier],
    ) -> EngineResult<()>;
    async fn delete_networks_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()>;
    async fn delete_network_bindings_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()>;
    async fn delete_hosts_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()>;
    async fn delete_host_bindings_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()>;

    /// Commits the transaction. Consumes the writer so it cannot be used again.
    async fn commit(self: Box<Self>) -> EngineResult<()>;

    /// Rolls the transaction back. Idempotent: aborting an already-committed
    /// or already-aborted writer is a no-op (SPEC_FULL.md §9 — normalizes the
    /// source's harmless double-`Abort` pattern).
    async fn abort(self: Box<Self>) -> EngineResult<()>;
}

/// The isolation variant requested when opening a [`Writer`] (SPEC_FULL.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterKind {
    /// Default, strongest isolation the backend offers.
    Default,
    /// Weaker isolation for cascade-delete paths.
    ForDeletes,
    /// Weaker isolation for Service-projection rewrites after binding changes.
    ForConditions,
}

/// Opens Reader and Writer sessions against the store (SPEC_FULL.md §6 C1).
#[async_trait]
pub trait Registry: Send + Sync {
    async fn reader(&self) -> EngineResult<Box<dyn Reader>>;

    async fn writer(&self, kind: WriterKind) -> EngineResult<Box<dyn Writer>>;
}
