//! Postgres-backed [`Registry`] adapter.
//!
//! Persistence schema is out of scope (SPEC_FULL.md §1 non-goals), so this
//! adapter does not invent a relational table per entity kind. Instead every
//! entity is stored as a JSONB document in one generic `entities` table
//! (see `migrations/0001_entities.sql`), keyed by `(kind, namespace, name)`.
//! Queries are runtime-checked `sqlx::query` calls rather than the
//! compile-time `query!`/`query_as!` macros the rest of the teacher's crates
//! use for their hand-shaped tables — those macros need a live database or an
//! offline query cache to expand, which this adapter intentionally avoids.
//!
//! [`Reader`] takes `&self` everywhere, but running a query against an open
//! transaction needs `&mut Transaction`. [`PgWriter`] resolves that with a
//! `tokio::sync::Mutex` around its transaction: the mutex gives interior
//! mutability so `&self` methods can still drive the `&mut` executor.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgPool;
use sqlx::{Executor, Postgres, Row, Transaction};
use tokio::sync::Mutex;

use crate::config::DatabaseConfig;
use crate::db;
use crate::error::{EngineError, EngineResult};
use crate::model::{
    AddressGroup, AddressGroupBinding, AddressGroupBindingPolicy, AddressGroupPortMapping, Host,
    HostBinding, Network, NetworkBinding, ResourceIdentifier, Service,
};

use super::derive::{derive_address_group_list, derive_aggregated_hosts, derive_service_address_groups, derive_service_list};
use super::{Reader, Registry, Scope, StoreSyncOp, Writer, WriterKind};

const KIND_SERVICE: &str = "service";
const KIND_ADDRESS_GROUP: &str = "address_group";
const KIND_ADDRESS_GROUP_BINDING: &str = "address_group_binding";
const KIND_ADDRESS_GROUP_PORT_MAPPING: &str = "address_group_port_mapping";
const KIND_ADDRESS_GROUP_BINDING_POLICY: &str = "address_group_binding_policy";
const KIND_NETWORK: &str = "network";
const KIND_NETWORK_BINDING: &str = "network_binding";
const KIND_HOST: &str = "host";
const KIND_HOST_BINDING: &str = "host_binding";

async fn fetch_all_kind<'e, E, T>(executor: E, kind: &str) -> EngineResult<Vec<T>>
where
    E: Executor<'e, Database = Postgres>,
    T: DeserializeOwned,
{
    let rows = sqlx::query("SELECT data FROM entities WHERE kind = $1")
        .bind(kind)
        .fetch_all(executor)
        .await
        .map_err(EngineError::from)?;
    rows.into_iter()
        .map(|row| {
            let data: serde_json::Value = row.try_get("data").map_err(EngineError::from)?;
            serde_json::from_value(data).map_err(|e| EngineError::Store(e.to_string()))
        })
        .collect()
}

async fn fetch_one_kind<'e, E, T>(
    executor: E,
    kind: &str,
    id: &ResourceIdentifier,
) -> EngineResult<Option<T>>
where
    E: Executor<'e, Database = Postgres>,
    T: DeserializeOwned,
{
    let row = sqlx::query("SELECT data FROM entities WHERE kind = $1 AND namespace = $2 AND name = $3")
        .bind(kind)
        .bind(&id.namespace)
        .bind(&id.name)
        .fetch_optional(executor)
        .await
        .map_err(EngineError::from)?;
    row.map(|row| {
        let data: serde_json::Value = row.try_get("data").map_err(EngineError::from)?;
        serde_json::from_value(data).map_err(|e| EngineError::Store(e.to_string()))
    })
    .transpose()
}

async fn upsert_kind<'e, E, T>(
    executor: E,
    kind: &str,
    id: &ResourceIdentifier,
    generation: i64,
    entity: &T,
) -> EngineResult<()>
where
    E: Executor<'e, Database = Postgres>,
    T: Serialize,
{
    let data = serde_json::to_value(entity).map_err(|e| EngineError::Store(e.to_string()))?;
    sqlx::query(
        r#"INSERT INTO entities (kind, namespace, name, generation, data, updated_at)
           VALUES ($1, $2, $3, $4, $5, now())
           ON CONFLICT (kind, namespace, name)
           DO UPDATE SET generation = EXCLUDED.generation, data = EXCLUDED.data, updated_at = now()"#,
    )
    .bind(kind)
    .bind(&id.namespace)
    .bind(&id.name)
    .bind(generation)
    .bind(data)
    .execute(executor)
    .await
    .map_err(EngineError::from)?;
    Ok(())
}

async fn delete_kind_by_id<'e, E>(executor: E, kind: &str, id: &ResourceIdentifier) -> EngineResult<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("DELETE FROM entities WHERE kind = $1 AND namespace = $2 AND name = $3")
        .bind(kind)
        .bind(&id.namespace)
        .bind(&id.name)
        .execute(executor)
        .await
        .map_err(EngineError::from)?;
    Ok(())
}

fn apply_scope<T>(all: Vec<T>, scope: &Scope, key_of: impl Fn(&T) -> ResourceIdentifier) -> Vec<T> {
    match scope {
        Scope::All => all,
        Scope::Ids(_) => all.into_iter().filter(|e| scope.includes(&key_of(e))).collect(),
    }
}

/// Opens pooled connections and transactions against Postgres.
#[derive(Clone)]
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    pub async fn connect(config: &DatabaseConfig) -> EngineResult<Self> {
        let pool = db::create_pool(config).await.map_err(EngineError::from)?;
        Ok(Self { pool })
    }

    /// Runs the embedded migrations. Safe to call on every startup.
    pub async fn migrate(&self) -> EngineResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))
    }
}

#[async_trait]
impl Registry for PgRegistry {
    async fn reader(&self) -> EngineResult<Box<dyn Reader>> {
        Ok(Box::new(PgReader {
            pool: self.pool.clone(),
        }))
    }

    async fn writer(&self, kind: WriterKind) -> EngineResult<Box<dyn Writer>> {
        let mut tx = self.pool.begin().await.map_err(EngineError::from)?;
        let isolation = match kind {
            WriterKind::Default => "SERIALIZABLE",
            WriterKind::ForDeletes => "REPEATABLE READ",
            WriterKind::ForConditions => "READ COMMITTED",
        };
        sqlx::query(&format!("SET TRANSACTION ISOLATION LEVEL {isolation}"))
            .execute(&mut *tx)
            .await
            .map_err(EngineError::from)?;
        Ok(Box::new(PgWriter {
            tx: Mutex::new(Some(tx)),
        }))
    }
}

/// Read-only adapter: every call borrows a pooled connection directly, no
/// transaction involved.
struct PgReader {
    pool: PgPool,
}

#[async_trait]
impl Reader for PgReader {
    async fn list_services(&self, scope: &Scope) -> EngineResult<Vec<Service>> {
        let all: Vec<Service> = fetch_all_kind(&self.pool, KIND_SERVICE).await?;
        let mut services = apply_scope(all, scope, |s| s.id.clone());
        derive_service_list(self, &mut services).await?;
        Ok(services)
    }
    async fn get_service(&self, id: &ResourceIdentifier) -> EngineResult<Option<Service>> {
        let Some(mut service) = fetch_one_kind::<_, Service>(&self.pool, KIND_SERVICE, id).await? else {
            return Ok(None);
        };
        derive_service_address_groups(self, &mut service).await?;
        Ok(Some(service))
    }

    async fn list_address_groups(&self, scope: &Scope) -> EngineResult<Vec<AddressGroup>> {
        let all: Vec<AddressGroup> = fetch_all_kind(&self.pool, KIND_ADDRESS_GROUP).await?;
        let mut ags = apply_scope(all, scope, |a| a.id.clone());
        derive_address_group_list(self, &mut ags).await?;
        Ok(ags)
    }
    async fn get_address_group(&self, id: &ResourceIdentifier) -> EngineResult<Option<AddressGroup>> {
        let Some(mut ag) = fetch_one_kind::<_, AddressGroup>(&self.pool, KIND_ADDRESS_GROUP, id).await? else {
            return Ok(None);
        };
        derive_aggregated_hosts(self, &mut ag).await?;
        Ok(Some(ag))
    }

    async fn list_address_group_bindings(&self, scope: &Scope) -> EngineResult<Vec<AddressGroupBinding>> {
        let all: Vec<AddressGroupBinding> = fetch_all_kind(&self.pool, KIND_ADDRESS_GROUP_BINDING).await?;
        Ok(apply_scope(all, scope, |b| b.id.clone()))
    }
    async fn get_address_group_binding(
        &self,
        id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupBinding>> {
        fetch_one_kind(&self.pool, KIND_ADDRESS_GROUP_BINDING, id).await
    }

    async fn list_address_group_port_mappings(
        &self,
        scope: &Scope,
    ) -> EngineResult<Vec<AddressGroupPortMapping>> {
        let all: Vec<AddressGroupPortMapping> =
            fetch_all_kind(&self.pool, KIND_ADDRESS_GROUP_PORT_MAPPING).await?;
        Ok(apply_scope(all, scope, |m| m.address_group_id.clone()))
    }
    async fn get_address_group_port_mapping(
        &self,
        address_group_id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupPortMapping>> {
        fetch_one_kind(&self.pool, KIND_ADDRESS_GROUP_PORT_MAPPING, address_group_id).await
    }

    async fn list_address_group_binding_policies(
        &self,
        scope: &Scope,
    ) -> EngineResult<Vec<AddressGroupBindingPolicy>> {
        let all: Vec<AddressGroupBindingPolicy> =
            fetch_all_kind(&self.pool, KIND_ADDRESS_GROUP_BINDING_POLICY).await?;
        Ok(apply_scope(all, scope, |p| p.id.clone()))
    }
    async fn get_address_group_binding_policy(
        &self,
        id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupBindingPolicy>> {
        fetch_one_kind(&self.pool, KIND_ADDRESS_GROUP_BINDING_POLICY, id).await
    }

    async fn list_networks(&self, scope: &Scope) -> EngineResult<Vec<Network>> {
        let all: Vec<Network> = fetch_all_kind(&self.pool, KIND_NETWORK).await?;
        Ok(apply_scope(all, scope, |n| n.id.clone()))
    }
    async fn get_network(&self, id: &ResourceIdentifier) -> EngineResult<Option<Network>> {
        fetch_one_kind(&self.pool, KIND_NETWORK, id).await
    }

    async fn list_network_bindings(&self, scope: &Scope) -> EngineResult<Vec<NetworkBinding>> {
        let all: Vec<NetworkBinding> = fetch_all_kind(&self.pool, KIND_NETWORK_BINDING).await?;
        Ok(apply_scope(all, scope, |n| n.id.clone()))
    }
    async fn get_network_binding(&self, id: &ResourceIdentifier) -> EngineResult<Option<NetworkBinding>> {
        fetch_one_kind(&self.pool, KIND_NETWORK_BINDING, id).await
    }

    async fn list_hosts(&self, scope: &Scope) -> EngineResult<Vec<Host>> {
        let all: Vec<Host> = fetch_all_kind(&self.pool, KIND_HOST).await?;
        Ok(apply_scope(all, scope, |h| h.id.clone()))
    }
    async fn get_host(&self, id: &ResourceIdentifier) -> EngineResult<Option<Host>> {
        fetch_one_kind(&self.pool, KIND_HOST, id).await
    }

    async fn list_host_bindings(&self, scope: &Scope) -> EngineResult<Vec<HostBinding>> {
        let all: Vec<HostBinding> = fetch_all_kind(&self.pool, KIND_HOST_BINDING).await?;
        Ok(apply_scope(all, scope, |h| h.id.clone()))
    }
    async fn get_host_binding(&self, id: &ResourceIdentifier) -> EngineResult<Option<HostBinding>> {
        fetch_one_kind(&self.pool, KIND_HOST_BINDING, id).await
    }
}

/// A live transaction. `tx` is behind a mutex purely so [`Reader`]'s `&self`
/// methods can reach a `&mut Transaction` executor; there is never real
/// contention since nothing shares a `PgWriter` across tasks.
struct PgWriter {
    tx: Mutex<Option<Transaction<'static, Postgres>>>,
}

#[async_trait]
impl Reader for PgWriter {
    async fn list_services(&self, scope: &Scope) -> EngineResult<Vec<Service>> {
        let all: Vec<Service> = {
            let mut guard = self.tx.lock().await;
            let tx = guard.as_mut().expect("writer used after commit/abort");
            fetch_all_kind(&mut **tx, KIND_SERVICE).await?
        };
        let mut services = apply_scope(all, scope, |s| s.id.clone());
        derive_service_list(self, &mut services).await?;
        Ok(services)
    }
    async fn get_service(&self, id: &ResourceIdentifier) -> EngineResult<Option<Service>> {
        let found: Option<Service> = {
            let mut guard = self.tx.lock().await;
            let tx = guard.as_mut().expect("writer used after commit/abort");
            fetch_one_kind(&mut **tx, KIND_SERVICE, id).await?
        };
        let Some(mut service) = found else {
            return Ok(None);
        };
        derive_service_address_groups(self, &mut service).await?;
        Ok(Some(service))
    }

    async fn list_address_groups(&self, scope: &Scope) -> EngineResult<Vec<AddressGroup>> {
        let all: Vec<AddressGroup> = {
            let mut guard = self.tx.lock().await;
            let tx = guard.as_mut().expect("writer used after commit/abort");
            fetch_all_kind(&mut **tx, KIND_ADDRESS_GROUP).await?
        };
        let mut ags = apply_scope(all, scope, |a| a.id.clone());
        derive_address_group_list(self, &mut ags).await?;
        Ok(ags)
    }
    async fn get_address_group(&self, id: &ResourceIdentifier) -> EngineResult<Option<AddressGroup>> {
        let found: Option<AddressGroup> = {
            let mut guard = self.tx.lock().await;
            let tx = guard.as_mut().expect("writer used after commit/abort");
            fetch_one_kind(&mut **tx, KIND_ADDRESS_GROUP, id).await?
        };
        let Some(mut ag) = found else {
            return Ok(None);
        };
        derive_aggregated_hosts(self, &mut ag).await?;
        Ok(Some(ag))
    }

    async fn list_address_group_bindings(&self, scope: &Scope) -> EngineResult<Vec<AddressGroupBinding>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        let all: Vec<AddressGroupBinding> = fetch_all_kind(&mut **tx, KIND_ADDRESS_GROUP_BINDING).await?;
        Ok(apply_scope(all, scope, |b| b.id.clone()))
    }
    async fn get_address_group_binding(
        &self,
        id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupBinding>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        fetch_one_kind(&mut **tx, KIND_ADDRESS_GROUP_BINDING, id).await
    }

    async fn list_address_group_port_mappings(
        &self,
        scope: &Scope,
    ) -> EngineResult<Vec<AddressGroupPortMapping>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        let all: Vec<AddressGroupPortMapping> =
            fetch_all_kind(&mut **tx, KIND_ADDRESS_GROUP_PORT_MAPPING).await?;
        Ok(apply_scope(all, scope, |m| m.address_group_id.clone()))
    }
    async fn get_address_group_port_mapping(
        &self,
        address_group_id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupPortMapping>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        fetch_one_kind(&mut **tx, KIND_ADDRESS_GROUP_PORT_MAPPING, address_group_id).await
    }

    async fn list_address_group_binding_policies(
        &self,
        scope: &Scope,
    ) -> EngineResult<Vec<AddressGroupBindingPolicy>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        let all: Vec<AddressGroupBindingPolicy> =
            fetch_all_kind(&mut **tx, KIND_ADDRESS_GROUP_BINDING_POLICY).await?;
        Ok(apply_scope(all, scope, |p| p.id.clone()))
    }
    async fn get_address_group_binding_policy(
        &self,
        id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupBindingPolicy>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        fetch_one_kind(&mut **tx, KIND_ADDRESS_GROUP_BINDING_POLICY, id).await
    }

    async fn list_networks(&self, scope: &Scope) -> EngineResult<Vec<Network>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        let all: Vec<Network> = fetch_all_kind(&mut **tx, KIND_NETWORK).await?;
        Ok(apply_scope(all, scope, |n| n.id.clone()))
    }
    async fn get_network(&self, id: &ResourceIdentifier) -> EngineResult<Option<Network>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        fetch_one_kind(&mut **tx, KIND_NETWORK, id).await
    }

    async fn list_network_bindings(&self, scope: &Scope) -> EngineResult<Vec<NetworkBinding>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        let all: Vec<NetworkBinding> = fetch_all_kind(&mut **tx, KIND_NETWORK_BINDING).await?;
        Ok(apply_scope(all, scope, |n| n.id.clone()))
    }
    async fn get_network_binding(&self, id: &ResourceIdentifier) -> EngineResult<Option<NetworkBinding>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        fetch_one_kind(&mut **tx, KIND_NETWORK_BINDING, id).await
    }

    async fn list_hosts(&self, scope: &Scope) -> EngineResult<Vec<Host>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        let all: Vec<Host> = fetch_all_kind(&mut **tx, KIND_HOST).await?;
        Ok(apply_scope(all, scope, |h| h.id.clone()))
    }
    async fn get_host(&self, id: &ResourceIdentifier) -> EngineResult<Option<Host>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        fetch_one_kind(&mut **tx, KIND_HOST, id).await
    }

    async fn list_host_bindings(&self, scope: &Scope) -> EngineResult<Vec<HostBinding>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        let all: Vec<HostBinding> = fetch_all_kind(&mut **tx, KIND_HOST_BINDING).await?;
        Ok(apply_scope(all, scope, |h| h.id.clone()))
    }
    async fn get_host_binding(&self, id: &ResourceIdentifier) -> EngineResult<Option<HostBinding>> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        fetch_one_kind(&mut **tx, KIND_HOST_BINDING, id).await
    }
}

#[async_trait]
impl Writer for PgWriter {
    async fn sync_services(&mut self, entities: Vec<Service>, op: StoreSyncOp) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for e in entities {
            match op {
                StoreSyncOp::Upsert | StoreSyncOp::FullSync => {
                    upsert_kind(&mut **tx, KIND_SERVICE, &e.id, e.meta.generation as i64, &e).await?
                }
                StoreSyncOp::Delete => delete_kind_by_id(&mut **tx, KIND_SERVICE, &e.id).await?,
            }
        }
        Ok(())
    }

    async fn sync_address_groups(&mut self, entities: Vec<AddressGroup>, op: StoreSyncOp) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for e in entities {
            match op {
                StoreSyncOp::Upsert | StoreSyncOp::FullSync => {
                    upsert_kind(&mut **tx, KIND_ADDRESS_GROUP, &e.id, e.meta.generation as i64, &e).await?
                }
                StoreSyncOp::Delete => delete_kind_by_id(&mut **tx, KIND_ADDRESS_GROUP, &e.id).await?,
            }
        }
        Ok(())
    }

    async fn sync_address_group_bindings(
        &mut self,
        entities: Vec<AddressGroupBinding>,
        op: StoreSyncOp,
    ) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for e in entities {
            match op {
                StoreSyncOp::Upsert | StoreSyncOp::FullSync => {
                    upsert_kind(&mut **tx, KIND_ADDRESS_GROUP_BINDING, &e.id, e.meta.generation as i64, &e)
                        .await?
                }
                StoreSyncOp::Delete => delete_kind_by_id(&mut **tx, KIND_ADDRESS_GROUP_BINDING, &e.id).await?,
            }
        }
        Ok(())
    }

    async fn sync_address_group_port_mappings(
        &mut self,
        entities: Vec<AddressGroupPortMapping>,
        op: StoreSyncOp,
    ) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for e in entities {
            match op {
                StoreSyncOp::Upsert | StoreSyncOp::FullSync => {
                    upsert_kind(
                        &mut **tx,
                        KIND_ADDRESS_GROUP_PORT_MAPPING,
                        &e.address_group_id,
                        e.meta.generation as i64,
                        &e,
                    )
                    .await?
                }
                StoreSyncOp::Delete => {
                    delete_kind_by_id(&mut **tx, KIND_ADDRESS_GROUP_PORT_MAPPING, &e.address_group_id).await?
                }
            }
        }
        Ok(())
    }

    async fn sync_address_group_binding_policies(
        &mut self,
        entities: Vec<AddressGroupBindingPolicy>,
        op: StoreSyncOp,
    ) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for e in entities {
            match op {
                StoreSyncOp::Upsert | StoreSyncOp::FullSync => {
                    upsert_kind(
                        &mut **tx,
                        KIND_ADDRESS_GROUP_BINDING_POLICY,
                        &e.id,
                        e.meta.generation as i64,
                        &e,
                    )
                    .await?
                }
                StoreSyncOp::Delete => {
                    delete_kind_by_id(&mut **tx, KIND_ADDRESS_GROUP_BINDING_POLICY, &e.id).await?
                }
            }
        }
        Ok(())
    }

    async fn sync_networks(&mut self, entities: Vec<Network>, op: StoreSyncOp) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for e in entities {
            match op {
                StoreSyncOp::Upsert | StoreSyncOp::FullSync => {
                    upsert_kind(&mut **tx, KIND_NETWORK, &e.id, e.meta.generation as i64, &e).await?
                }
                StoreSyncOp::Delete => delete_kind_by_id(&mut **tx, KIND_NETWORK, &e.id).await?,
            }
        }
        Ok(())
    }

    async fn sync_network_bindings(
        &mut self,
        entities: Vec<NetworkBinding>,
        op: StoreSyncOp,
    ) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for e in entities {
            match op {
                StoreSyncOp::Upsert | StoreSyncOp::FullSync => {
                    upsert_kind(&mut **tx, KIND_NETWORK_BINDING, &e.id, e.meta.generation as i64, &e).await?
                }
                StoreSyncOp::Delete => delete_kind_by_id(&mut **tx, KIND_NETWORK_BINDING, &e.id).await?,
            }
        }
        Ok(())
    }

    async fn sync_hosts(&mut self, entities: Vec<Host>, op: StoreSyncOp) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for e in entities {
            match op {
                StoreSyncOp::Upsert | StoreSyncOp::FullSync => {
                    upsert_kind(&mut **tx, KIND_HOST, &e.id, e.meta.generation as i64, &e).await?
                }
                StoreSyncOp::Delete => delete_kind_by_id(&mut **tx, KIND_HOST, &e.id).await?,
            }
        }
        Ok(())
    }

    async fn sync_host_bindings(&mut self, entities: Vec<HostBinding>, op: StoreSyncOp) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for e in entities {
            match op {
                StoreSyncOp::Upsert | StoreSyncOp::FullSync => {
                    upsert_kind(&mut **tx, KIND_HOST_BINDING, &e.id, e.meta.generation as i64, &e).await?
                }
                StoreSyncOp::Delete => delete_kind_by_id(&mut **tx, KIND_HOST_BINDING, &e.id).await?,
            }
        }
        Ok(())
    }

    async fn delete_services_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for id in ids {
            delete_kind_by_id(&mut **tx, KIND_SERVICE, id).await?;
        }
        Ok(())
    }
    async fn delete_address_groups_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for id in ids {
            delete_kind_by_id(&mut **tx, KIND_ADDRESS_GROUP, id).await?;
        }
        Ok(())
    }
    async fn delete_address_group_bindings_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for id in ids {
            delete_kind_by_id(&mut **tx, KIND_ADDRESS_GROUP_BINDING, id).await?;
        }
        Ok(())
    }
    async fn delete_address_group_binding_policies_by_ids(
        &mut self,
        ids: &[ResourceIdentifier],
    ) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for id in ids {
            delete_kind_by_id(&mut **tx, KIND_ADDRESS_GROUP_BINDING_POLICY, id).await?;
        }
        Ok(())
    }
    async fn delete_networks_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for id in ids {
            delete_kind_by_id(&mut **tx, KIND_NETWORK, id).await?;
        }
        Ok(())
    }
    async fn delete_network_bindings_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for id in ids {
            delete_kind_by_id(&mut **tx, KIND_NETWORK_BINDING, id).await?;
        }
        Ok(())
    }
    async fn delete_hosts_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for id in ids {
            delete_kind_by_id(&mut **tx, KIND_HOST, id).await?;
        }
        Ok(())
    }
    async fn delete_host_bindings_by_ids(&mut self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        let mut guard = self.tx.lock().await;
        let tx = guard.as_mut().expect("writer used after commit/abort");
        for id in ids {
            delete_kind_by_id(&mut **tx, KIND_HOST_BINDING, id).await?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> EngineResult<()> {
        let tx = self.tx.into_inner();
        if let Some(tx) = tx {
            tx.commit().await.map_err(EngineError::from)?;
        }
        Ok(())
    }

    async fn abort(self: Box<Self>) -> EngineResult<()> {
        let tx = self.tx.into_inner();
        if let Some(tx) = tx {
            // Idempotent by construction: a `None` here (already consumed)
            // just skips the rollback instead of erroring.
            tx.rollback().await.map_err(EngineError::from)?;
        }
        Ok(())
    }
}
