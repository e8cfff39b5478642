//! AddressGroup service (SPEC_FULL.md §4.2–§4.4, §4.7, §6 C6): AddressGroup
//! CRUD and cascade delete, AddressGroupBinding CRUD/sync/delete,
//! `synchronizeServiceAddressGroups`, AGPM regeneration, and the
//! Host.IsBound-via-spec.hosts reconciliation driven by AG writes.

use std::sync::Arc;

use tracing::instrument;

use crate::conditions::ConditionManager;
use crate::error::{EngineError, EngineResult};
use crate::model::{
    AddressGroup, AddressGroupBinding, AddressGroupBindingPolicy, AddressGroupPortMapping, EntityKind,
    ResourceIdentifier,
};
use crate::registry::{Reader, Registry, Scope, StoreSyncOp, Writer, WriterKind};
use crate::rules::RuleS2SRegenerator;
use crate::sync::{SyncOp, SyncPayload};

use super::port_mapping::generate_port_mapping;
use super::sync_tracker::SyncTracker;
use super::validate;

pub struct AddressGroupService {
    registry: Arc<dyn Registry>,
    sync: SyncTracker,
    conditions: Arc<dyn ConditionManager>,
    regenerator: Arc<dyn RuleS2SRegenerator>,
}

impl AddressGroupService {
    pub fn new(
        registry: Arc<dyn Registry>,
        sync: SyncTracker,
        conditions: Arc<dyn ConditionManager>,
        regenerator: Arc<dyn RuleS2SRegenerator>,
    ) -> Self {
        Self {
            registry,
            sync,
            conditions,
            regenerator,
        }
    }

    pub async fn list(&self, scope: Scope) -> EngineResult<Vec<AddressGroup>> {
        let reader = self.registry.reader().await?;
        reader.list_address_groups(&scope).await
    }

    pub async fn get(&self, id: &ResourceIdentifier) -> EngineResult<Option<AddressGroup>> {
        let reader = self.registry.reader().await?;
        reader.get_address_group(id).await
    }

    /// AddressGroup Create (SPEC_FULL.md §4.2). Gates on SGROUP reachability
    /// of any `spec.hosts` *before* commit — a failure there aborts the
    /// transaction ("SGROUP synchronization validation failed"), unlike every
    /// other sync in this service, which is best-effort post-commit.
    #[instrument(skip(self, ag))]
    pub async fn create(&self, ag: AddressGroup) -> EngineResult<AddressGroup> {
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        validate::validate_address_group_for_creation(&*writer, &ag).await?;

        for host_ref in &ag.hosts {
            if let Some(host) = writer.get_host(host_ref).await? {
                let payload = SyncPayload::new(EntityKind::Host, host.id.key(), &host);
                self.sync
                    .sync_entity(payload, SyncOp::Upsert)
                    .await
                    .map_err(|e| EngineError::PreCommitSync(format!("SGROUP synchronization validation failed: {e}")))?;
            }
        }

        writer
            .sync_address_groups(vec![ag.clone()], StoreSyncOp::Upsert)
            .await?;
        writer.commit().await?;

        self.sync_to_sgroup(&ag, SyncOp::Upsert).await;
        self.reconcile_spec_hosts(&AddressGroup::new(ag.id.clone(), ag.default_action), &ag)
            .await;
        Ok(ag)
    }

    /// AddressGroup Update. `hosts` may have changed, so reconciliation of
    /// Host.IsBound against the old and new membership runs post-commit, and
    /// added hosts are synced to SGROUP with forced semantics so the removed
    /// ones are guaranteed to reach the external side.
    #[instrument(skip(self, ag))]
    pub async fn update(&self, ag: AddressGroup) -> EngineResult<AddressGroup> {
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        let previous = validate::validate_address_group_for_update(&*writer, &ag).await?;
        let mut updated = ag.clone();
        updated.meta = previous.meta.clone();
        updated.meta.touch_on_write("update");
        writer
            .sync_address_groups(vec![updated.clone()], StoreSyncOp::Upsert)
            .await?;
        writer.commit().await?;

        self.reconcile_spec_hosts(&previous, &updated).await;
        self.regenerate_port_mappings_for_address_group(&updated.id).await;
        self.sync_to_sgroup(&updated, SyncOp::Upsert).await;
        Ok(updated)
    }

    /// Bulk `Sync` surface (SPEC_FULL.md §6): `Upsert`/`FullSync` behave like
    /// repeated Create/Update; `Delete` cascades like [`Self::delete_by_ids`].
    pub async fn sync_batch(&self, entities: Vec<AddressGroup>, op: StoreSyncOp) -> EngineResult<()> {
        if op == StoreSyncOp::Delete {
            let ids: Vec<_> = entities.into_iter().map(|e| e.id).collect();
            return self.delete_by_ids(&ids).await;
        }
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        writer.sync_address_groups(entities.clone(), op).await?;
        writer.commit().await?;
        for ag in &entities {
            self.regenerate_port_mappings_for_address_group(&ag.id).await;
            self.sync_to_sgroup(ag, SyncOp::Upsert).await;
        }
        Ok(())
    }

    /// Cascade delete (SPEC_FULL.md §4.3): within a single `ForDeletes` writer,
    /// delete every AddressGroupBinding, HostBinding and NetworkBinding that
    /// targets the group, then the group itself. Unbinds the Hosts/Networks
    /// those bindings held before dropping the bindings. Post-commit, reprojects
    /// `Service.address_groups` for every unique service the doomed AGBs
    /// referenced — the same `synchronizeServiceAddressGroups` step the plain
    /// AGB deletion path runs (§4.4, referenced from §4.3 step 5).
    #[instrument(skip(self))]
    pub async fn delete_by_ids(&self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        let mut writer = self.registry.writer(WriterKind::ForDeletes).await?;

        for id in ids {
            validate::check_address_group_dependencies(&*writer, id).await?;
        }

        let agbs = writer.list_address_group_bindings(&Scope::All).await?;
        let doomed_agbs: Vec<_> = agbs.into_iter().filter(|b| ids.contains(&b.address_group_ref)).collect();
        let agb_ids: Vec<_> = doomed_agbs.iter().map(|b| b.id.clone()).collect();

        let host_bindings = writer.list_host_bindings(&Scope::All).await?;
        let doomed_hbs: Vec<_> = host_bindings
            .into_iter()
            .filter(|b| ids.contains(&b.address_group_ref))
            .collect();
        let mut hosts_to_unbind = Vec::new();
        for hb in &doomed_hbs {
            if let Some(mut host) = writer.get_host(&hb.host_ref).await? {
                host.unbind();
                host.meta.touch_on_write("unbind");
                hosts_to_unbind.push(host);
            }
        }
        let hb_ids: Vec<_> = doomed_hbs.iter().map(|b| b.id.clone()).collect();

        let network_bindings = writer.list_network_bindings(&Scope::All).await?;
        let doomed_nbs: Vec<_> = network_bindings
            .into_iter()
            .filter(|b| ids.contains(&b.address_group_ref))
            .collect();
        let mut networks_to_unbind = Vec::new();
        for nb in &doomed_nbs {
            if let Some(mut network) = writer.get_network(&nb.network_ref).await? {
                network.unbind();
                network.meta.touch_on_write("unbind");
                networks_to_unbind.push(network);
            }
        }
        let nb_ids: Vec<_> = doomed_nbs.iter().map(|b| b.id.clone()).collect();

        if !hosts_to_unbind.is_empty() {
            writer.sync_hosts(hosts_to_unbind, StoreSyncOp::Upsert).await?;
        }
        if !networks_to_unbind.is_empty() {
            writer.sync_networks(networks_to_unbind, StoreSyncOp::Upsert).await?;
        }
        if !agb_ids.is_empty() {
            writer.delete_address_group_bindings_by_ids(&agb_ids).await?;
        }
        if !hb_ids.is_empty() {
            writer.delete_host_bindings_by_ids(&hb_ids).await?;
        }
        if !nb_ids.is_empty() {
            writer.delete_network_bindings_by_ids(&nb_ids).await?;
        }
        writer.delete_address_groups_by_ids(ids).await?;

        writer.commit().await?;

        for id in ids {
            self.sync_delete_to_sgroup(id).await;
        }
        let mut affected_services = Vec::new();
        for agb in &doomed_agbs {
            if !affected_services.contains(&agb.service_ref) {
                affected_services.push(agb.service_ref.clone());
            }
            self.regenerator
                .regenerate_for_address_group_binding(&agb.id)
                .await
                .ok();
        }
        for service_id in &affected_services {
            self.synchronize_service_address_groups(service_id).await.ok();
        }
        Ok(())
    }

    /// AddressGroupBinding Create (SPEC_FULL.md §4.4). Commits, then
    /// best-effort regenerates the target group's AGPM and reprojects the
    /// bound Service's `address_groups` via `synchronizeServiceAddressGroups`.
    #[instrument(skip(self, agb))]
    pub async fn create_binding(&self, agb: AddressGroupBinding) -> EngineResult<AddressGroupBinding> {
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        validate::validate_agb_for_creation(&*writer, &agb).await?;
        writer
            .sync_address_group_bindings(vec![agb.clone()], StoreSyncOp::Upsert)
            .await?;
        writer.commit().await?;

        self.regenerate_port_mappings_for_address_group(&agb.address_group_ref).await;
        self.synchronize_service_address_groups(&agb.service_ref).await.ok();
        self.regenerator.regenerate_for_address_group_binding(&agb.id).await.ok();
        Ok(agb)
    }

    #[instrument(skip(self, agb))]
    pub async fn update_binding(&self, agb: AddressGroupBinding) -> EngineResult<AddressGroupBinding> {
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        let previous = validate::validate_agb_for_update(&*writer, &agb).await?;
        let mut updated = agb.clone();
        updated.meta = previous.meta.clone();
        updated.meta.touch_on_write("update");
        writer
            .sync_address_group_bindings(vec![updated.clone()], StoreSyncOp::Upsert)
            .await?;
        writer.commit().await?;

        // A rebind may move a Service between groups; per SPEC_FULL.md §9,
        // always project both the old and new AddressGroup/Service pair.
        self.regenerate_port_mappings_for_address_group(&previous.address_group_ref).await;
        self.regenerate_port_mappings_for_address_group(&updated.address_group_ref).await;
        self.synchronize_service_address_groups(&previous.service_ref).await.ok();
        self.synchronize_service_address_groups(&updated.service_ref).await.ok();
        self.regenerator.regenerate_for_address_group_binding(&updated.id).await.ok();
        Ok(updated)
    }

    /// AddressGroupBinding `SyncBatch` (SPEC_FULL.md §4.4). For bulk
    /// Upsert/FullSync (two or more bindings) runs the pre-commit pairwise
    /// port-overlap check against every AGB already targeting the same group
    /// — a single-binding `create_binding` skips this same check since AGPM
    /// regeneration covers it without the circular-dependency risk noted in
    /// §4.4. `Delete` routes to [`Self::delete_bindings_by_ids`].
    #[instrument(skip(self, agbs))]
    pub async fn sync_bindings(&self, agbs: Vec<AddressGroupBinding>, op: StoreSyncOp) -> EngineResult<()> {
        if op == StoreSyncOp::Delete {
            let ids: Vec<_> = agbs.into_iter().map(|b| b.id).collect();
            return self.delete_bindings_by_ids(&ids).await;
        }

        let mut writer = self.registry.writer(WriterKind::Default).await?;

        if agbs.len() >= 2 {
            self.check_bulk_port_conflicts(&*writer, &agbs).await?;
        }

        writer.sync_address_group_bindings(agbs.clone(), op).await?;
        writer.commit().await?;

        let mut affected_groups = Vec::new();
        let mut affected_services = Vec::new();
        for agb in &agbs {
            if !affected_groups.contains(&agb.address_group_ref) {
                affected_groups.push(agb.address_group_ref.clone());
            }
            if !affected_services.contains(&agb.service_ref) {
                affected_services.push(agb.service_ref.clone());
            }
        }
        for group_id in &affected_groups {
            self.regenerate_port_mappings_for_address_group(group_id).await;
        }
        for service_id in &affected_services {
            self.synchronize_service_address_groups(service_id).await.ok();
        }
        for agb in &agbs {
            self.regenerator.regenerate_for_address_group_binding(&agb.id).await.ok();
        }
        Ok(())
    }

    /// For each incoming binding, loads every other AGB already targeting the
    /// same AddressGroup, resolves it to its Service, and pairwise-checks
    /// ingress ports against the new binding's Service. Any overlap aborts
    /// the whole batch before anything is written.
    async fn check_bulk_port_conflicts(
        &self,
        reader: &dyn Reader,
        agbs: &[AddressGroupBinding],
    ) -> EngineResult<()> {
        let existing_agbs = reader.list_address_group_bindings(&Scope::All).await?;

        for agb in agbs {
            let new_service = reader
                .get_service(&agb.service_ref)
                .await?
                .ok_or_else(|| EngineError::Validation(format!("service {} not found", agb.service_ref.key())))?;

            let mut already_bound = std::collections::HashSet::new();
            for other in existing_agbs
                .iter()
                .filter(|b| b.address_group_ref == agb.address_group_ref && b.id != agb.id)
            {
                already_bound.insert(other.service_ref.clone());
            }
            for other in agbs
                .iter()
                .filter(|b| b.address_group_ref == agb.address_group_ref && b.id != agb.id)
            {
                already_bound.insert(other.service_ref.clone());
            }

            for other_service_ref in &already_bound {
                if other_service_ref == &agb.service_ref {
                    continue;
                }
                let Some(other_service) = reader.get_service(other_service_ref).await? else {
                    continue;
                };
                if let Some((protocol, new_range, existing_range)) =
                    crate::port::find_conflict(&new_service.ingress_ports, &other_service.ingress_ports)
                {
                    return Err(EngineError::PortConflict(format!(
                        "{protocol} port range {new_range} for service {new_service} overlaps with existing port range {existing_range} for service {existing_service}",
                        new_service = new_service.id.key(),
                        existing_service = other_service.id.key(),
                    )));
                }
            }
        }
        Ok(())
    }

    pub async fn list_bindings(&self, scope: Scope) -> EngineResult<Vec<AddressGroupBinding>> {
        let reader = self.registry.reader().await?;
        reader.list_address_group_bindings(&scope).await
    }

    pub async fn get_binding(&self, id: &ResourceIdentifier) -> EngineResult<Option<AddressGroupBinding>> {
        let reader = self.registry.reader().await?;
        reader.get_address_group_binding(id).await
    }

    #[instrument(skip(self))]
    pub async fn delete_bindings_by_ids(&self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        let mut writer = self.registry.writer(WriterKind::ForDeletes).await?;
        let mut doomed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(agb) = writer.get_address_group_binding(id).await? {
                doomed.push(agb);
            }
        }
        writer.delete_address_group_bindings_by_ids(ids).await?;
        writer.commit().await?;

        for agb in &doomed {
            self.regenerate_port_mappings_for_address_group(&agb.address_group_ref).await;
            self.synchronize_service_address_groups(&agb.service_ref).await.ok();
            self.regenerator.regenerate_for_address_group_binding(&agb.id).await.ok();
        }
        Ok(())
    }

    pub async fn list_port_mappings(&self, scope: Scope) -> EngineResult<Vec<AddressGroupPortMapping>> {
        let reader = self.registry.reader().await?;
        reader.list_address_group_port_mappings(&scope).await
    }

    pub async fn get_port_mapping(
        &self,
        address_group_id: &ResourceIdentifier,
    ) -> EngineResult<Option<AddressGroupPortMapping>> {
        let reader = self.registry.reader().await?;
        reader.get_address_group_port_mapping(address_group_id).await
    }

    pub async fn create_binding_policy(
        &self,
        policy: AddressGroupBindingPolicy,
    ) -> EngineResult<AddressGroupBindingPolicy> {
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        if writer.get_address_group_binding_policy(&policy.id).await?.is_some() {
            return Err(EngineError::already_exists("AddressGroupBindingPolicy", policy.id.key()));
        }
        writer
            .sync_address_group_binding_policies(vec![policy.clone()], StoreSyncOp::Upsert)
            .await?;
        writer.commit().await?;
        Ok(policy)
    }

    pub async fn list_binding_policies(&self, scope: Scope) -> EngineResult<Vec<AddressGroupBindingPolicy>> {
        let reader = self.registry.reader().await?;
        reader.list_address_group_binding_policies(&scope).await
    }

    pub async fn delete_binding_policies_by_ids(&self, ids: &[ResourceIdentifier]) -> EngineResult<()> {
        let mut writer = self.registry.writer(WriterKind::ForDeletes).await?;
        writer.delete_address_group_binding_policies_by_ids(ids).await?;
        writer.commit().await
    }

    /// `RegeneratePortMappingsForAddressGroup` (SPEC_FULL.md §4.5): recompute
    /// and persist the AGPM for one group. Best-effort — a regeneration
    /// failure (e.g. a port conflict introduced elsewhere) is logged, not
    /// propagated, since the mapping write here is always post-commit.
    pub async fn regenerate_port_mappings_for_address_group(&self, address_group_id: &ResourceIdentifier) {
        if let Err(e) = self.try_regenerate_port_mappings(address_group_id).await {
            tracing::warn!(address_group = %address_group_id, error = %e, "AGPM regeneration failed");
        }
    }

    async fn try_regenerate_port_mappings(&self, address_group_id: &ResourceIdentifier) -> EngineResult<()> {
        let mut writer = self.registry.writer(WriterKind::Default).await?;
        let mapping = generate_port_mapping(&*writer, address_group_id).await?;
        writer
            .sync_address_group_port_mappings(vec![mapping], StoreSyncOp::Upsert)
            .await?;
        writer.commit().await
    }

    /// `RegeneratePortMappingsForService` (SPEC_FULL.md §4.5): regenerate the
    /// AGPM of every AddressGroup the Service is currently bound to.
    pub async fn regenerate_port_mappings_for_service(&self, service_id: &ResourceIdentifier) {
        let reader = match self.registry.reader().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "could not open reader for service port-mapping regeneration");
                return;
            }
        };
        let service = match reader.get_service(service_id).await {
            Ok(Some(s)) => s,
            _ => return,
        };
        for ag_id in &service.address_groups {
            self.regenerate_port_mappings_for_address_group(ag_id).await;
        }
    }

    /// `synchronizeServiceAddressGroups` (SPEC_FULL.md §4.7). Re-reads the
    /// Service's derived `address_groups` and pushes the refreshed projection
    /// to SGROUP *before* returning — this is one of the two write paths
    /// (alongside AddressGroup Create's host-validation gate) where the
    /// pre-commit SGROUP call's failure rolls the caller's operation back
    /// rather than being swallowed as best-effort.
    #[instrument(skip(self))]
    pub async fn synchronize_service_address_groups(
        &self,
        service_id: &ResourceIdentifier,
    ) -> EngineResult<()> {
        let reader = self.registry.reader().await?;
        let service = reader
            .get_service(service_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Service", service_id.key()))?;

        let payload = SyncPayload::new(EntityKind::Service, service.id.key(), &service);
        self.sync
            .sync_entity_forced(payload, SyncOp::Upsert)
            .await
            .map_err(|e| EngineError::PreCommitSync(e.to_string()))?;

        self.regenerator
            .notify_service_address_groups_changed(service_id)
            .await
            .ok();
        Ok(())
    }

    /// Reconciles Host.IsBound against an AddressGroup's `spec.hosts` delta
    /// after an AddressGroup Update (SPEC_FULL.md §4.7 step 3): hosts added to
    /// `spec.hosts` are bound (gated on Ready, same as HostBinding); hosts
    /// removed are unbound, provided they aren't *also* reachable through a
    /// live HostBinding (mutual exclusion, §8 invariant 3).
    async fn reconcile_spec_hosts(&self, previous: &AddressGroup, updated: &AddressGroup) {
        let reader = match self.registry.reader().await {
            Ok(r) => r,
            Err(_) => return,
        };
        let host_bindings = reader.list_host_bindings(&Scope::All).await.unwrap_or_default();

        let added: Vec<_> = updated.hosts.iter().filter(|h| !previous.hosts.contains(h)).cloned().collect();
        let removed: Vec<_> = previous.hosts.iter().filter(|h| !updated.hosts.contains(h)).cloned().collect();
        if added.is_empty() && removed.is_empty() {
            return;
        }

        let mut writer = match self.registry.writer(WriterKind::ForConditions).await {
            Ok(w) => w,
            Err(_) => return,
        };
        let mut changed = Vec::new();

        for host_ref in &added {
            if let Ok(Some(mut host)) = writer.get_host(host_ref).await {
                if !host.is_bound && host.is_ready() {
                    host.bind_via_address_group_hosts(updated.id.clone());
                    host.meta.touch_on_write("bind-spec-hosts");
                    changed.push(host);
                } else {
                    tracing::warn!(host = %host_ref, "skipping spec.hosts bind: host is bound or not Ready");
                }
            }
        }
        for host_ref in &removed {
            let still_bound_elsewhere = host_bindings.iter().any(|hb| &hb.host_ref == host_ref);
            if still_bound_elsewhere {
                continue;
            }
            if let Ok(Some(mut host)) = writer.get_host(host_ref).await {
                if host.bound_via_address_group_hosts() {
                    host.unbind();
                    host.meta.touch_on_write("unbind-spec-hosts");
                    changed.push(host);
                }
            }
        }

        if changed.is_empty() {
            return;
        }
        if writer.sync_hosts(changed.clone(), StoreSyncOp::Upsert).await.is_err() {
            return;
        }
        if writer.commit().await.is_err() {
            return;
        }
        for host in changed {
            self.sync_host_forced_and_record_condition(host).await;
        }
    }

    /// Forced Host sync with the resulting Ready condition fed back and
    /// re-persisted (SPEC_FULL.md §4.10), mirroring the binding-transition
    /// bookkeeping the HostBinding service performs for its own bind/unbind.
    async fn sync_host_forced_and_record_condition(&self, mut host: crate::model::Host) {
        use crate::conditions::SyncOutcome;

        let payload = SyncPayload::new(EntityKind::Host, host.id.key(), &host);
        let outcome = match self.sync.sync_entity_forced(payload, SyncOp::Upsert).await {
            Ok(()) => SyncOutcome::Success,
            Err(e) => {
                tracing::warn!(host = %host.id, error = %e, "Host SGROUP sync failed");
                SyncOutcome::Failure("sgroup synchronization failed")
            }
        };
        if self.conditions.process_host_conditions(&mut host, outcome).await.is_err() {
            return;
        }
        let _ = self.conditions.save_host_conditions(&host).await;
        if let Ok(mut writer) = self.registry.writer(WriterKind::ForConditions).await {
            if writer.sync_hosts(vec![host], StoreSyncOp::Upsert).await.is_ok() {
                let _ = writer.commit().await;
            } else {
                let _ = writer.abort().await;
            }
        }
    }

    async fn sync_to_sgroup(&self, ag: &AddressGroup, op: SyncOp) {
        let payload = SyncPayload::new(EntityKind::AddressGroup, ag.id.key(), ag);
        if let Err(e) = self.sync.sync_entity(payload, op).await {
            tracing::warn!(address_group = %ag.id, error = %e, "AddressGroup SGROUP sync failed");
        }
    }

    async fn sync_delete_to_sgroup(&self, id: &ResourceIdentifier) {
        let payload = SyncPayload {
            kind: EntityKind::AddressGroup,
            key: id.key(),
            body: serde_json::Value::Null,
        };
        if let Err(e) = self.sync.sync_entity(payload, SyncOp::Delete).await {
            tracing::warn!(address_group = %id, error = %e, "AddressGroup SGROUP delete sync failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::NoopConditionManager;
    use crate::model::{DefaultAction, Host, Service};
    use crate::registry::memory::InMemoryRegistry;
    use crate::rules::NoopRuleS2SRegenerator;
    use crate::sync::RecordingSyncManager;

    fn make_service() -> AddressGroupService {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let manager = Arc::new(RecordingSyncManager::new());
        AddressGroupService::new(
            registry,
            SyncTracker::new(manager),
            Arc::new(NoopConditionManager),
            Arc::new(NoopRuleS2SRegenerator),
        )
    }

    fn make_service_with_manager() -> (AddressGroupService, Arc<RecordingSyncManager>) {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let manager = Arc::new(RecordingSyncManager::new());
        let service = AddressGroupService::new(
            registry,
            SyncTracker::new(manager.clone()),
            Arc::new(NoopConditionManager),
            Arc::new(NoopRuleS2SRegenerator),
        );
        (service, manager)
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let service = make_service();
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        service.create(ag.clone()).await.unwrap();
        let loaded = service.get(&ag.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, ag.id);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let service = make_service();
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        service.create(ag.clone()).await.unwrap();
        let err = service.create(ag).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn cascade_delete_removes_bindings_and_unbinds_host() {
        let service = make_service();
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        service.create(ag.clone()).await.unwrap();

        let mut writer = service.registry.writer(WriterKind::Default).await.unwrap();
        let mut host = Host::new(ResourceIdentifier::new("ns1", "h1"));
        host.set_ready(true, "synchronized");
        host.bind_via_host_binding(ResourceIdentifier::new("ns1", "hb1"), ag.id.clone());
        writer.sync_hosts(vec![host], StoreSyncOp::Upsert).await.unwrap();
        let hb = crate::model::HostBinding::new(
            ResourceIdentifier::new("ns1", "hb1"),
            ResourceIdentifier::new("ns1", "h1"),
            ag.id.clone(),
        );
        writer.sync_host_bindings(vec![hb], StoreSyncOp::Upsert).await.unwrap();
        writer.commit().await.unwrap();

        service.delete_by_ids(&[ag.id.clone()]).await.unwrap();

        assert!(service.get(&ag.id).await.unwrap().is_none());
        let reader = service.registry.reader().await.unwrap();
        let host = reader.get_host(&ResourceIdentifier::new("ns1", "h1")).await.unwrap().unwrap();
        assert!(!host.is_bound);
        assert!(reader.list_host_bindings(&Scope::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cascade_delete_reprojects_services_of_doomed_bindings() {
        let (service, manager) = make_service_with_manager();
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        service.create(ag.clone()).await.unwrap();

        let svc = Service::new(
            ResourceIdentifier::new("ns1", "web"),
            vec![crate::model::IngressPort::new(crate::model::Protocol::Tcp, "80")],
        );
        let mut writer = service.registry.writer(WriterKind::Default).await.unwrap();
        writer.sync_services(vec![svc.clone()], StoreSyncOp::Upsert).await.unwrap();
        writer.commit().await.unwrap();
        let agb = AddressGroupBinding::new(ResourceIdentifier::new("ns1", "b1"), svc.id.clone(), ag.id.clone());
        service.create_binding(agb).await.unwrap();

        service.delete_by_ids(&[ag.id.clone()]).await.unwrap();

        let reader = service.registry.reader().await.unwrap();
        let reloaded = reader.get_service(&svc.id).await.unwrap().unwrap();
        assert!(reloaded.address_groups.is_empty());

        let calls = manager.calls().await;
        assert!(calls.iter().any(|c| matches!(
            c,
            crate::sync::RecordedSync::Entity { key, forced: true, .. } if key == &svc.id.key()
        )));
    }

    #[tokio::test]
    async fn binding_regenerates_port_mapping() {
        let service = make_service();
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        service.create(ag.clone()).await.unwrap();

        let mut writer = service.registry.writer(WriterKind::Default).await.unwrap();
        let svc = Service::new(
            ResourceIdentifier::new("ns1", "web"),
            vec![crate::model::IngressPort::new(crate::model::Protocol::Tcp, "80")],
        );
        writer.sync_services(vec![svc.clone()], StoreSyncOp::Upsert).await.unwrap();
        writer.commit().await.unwrap();

        let agb = AddressGroupBinding::new(ResourceIdentifier::new("ns1", "b1"), svc.id.clone(), ag.id.clone());
        service.create_binding(agb).await.unwrap();

        let mapping = service.get_port_mapping(&ag.id).await.unwrap().unwrap();
        assert_eq!(mapping.access_ports.len(), 1);
    }

    #[tokio::test]
    async fn bulk_sync_bindings_rejects_overlapping_batch() {
        let service = make_service();
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        service.create(ag.clone()).await.unwrap();

        let svc_a = Service::new(
            ResourceIdentifier::new("ns1", "a"),
            vec![crate::model::IngressPort::new(crate::model::Protocol::Tcp, "80-100")],
        );
        let svc_b = Service::new(
            ResourceIdentifier::new("ns1", "b"),
            vec![crate::model::IngressPort::new(crate::model::Protocol::Tcp, "90-110")],
        );
        let mut writer = service.registry.writer(WriterKind::Default).await.unwrap();
        writer
            .sync_services(vec![svc_a.clone(), svc_b.clone()], StoreSyncOp::Upsert)
            .await
            .unwrap();
        writer.commit().await.unwrap();

        let agbs = vec![
            AddressGroupBinding::new(ResourceIdentifier::new("ns1", "ba"), svc_a.id.clone(), ag.id.clone()),
            AddressGroupBinding::new(ResourceIdentifier::new("ns1", "bb"), svc_b.id.clone(), ag.id.clone()),
        ];
        let err = service
            .sync_bindings(agbs, StoreSyncOp::Upsert)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PortConflict(_)));
        assert!(service.list_bindings(Scope::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bulk_sync_bindings_accepts_disjoint_batch() {
        let service = make_service();
        let ag = AddressGroup::new(ResourceIdentifier::new("ns1", "ag1"), DefaultAction::Accept);
        service.create(ag.clone()).await.unwrap();

        let svc_a = Service::new(
            ResourceIdentifier::new("ns1", "a"),
            vec![crate::model::IngressPort::new(crate::model::Protocol::Tcp, "80")],
        );
        let svc_b = Service::new(
            ResourceIdentifier::new("ns1", "b"),
            vec![crate::model::IngressPort::new(crate::model::Protocol::Tcp, "443")],
        );
        let mut writer = service.registry.writer(WriterKind::Default).await.unwrap();
        writer
            .sync_services(vec![svc_a.clone(), svc_b.clone()], StoreSyncOp::Upsert)
            .await
            .unwrap();
        writer.commit().await.unwrap();

        let agbs = vec![
            AddressGroupBinding::new(ResourceIdentifier::new("ns1", "ba"), svc_a.id.clone(), ag.id.clone()),
            AddressGroupBinding::new(ResourceIdentifier::new("ns1", "bb"), svc_b.id.clone(), ag.id.clone()),
        ];
        service.sync_bindings(agbs, StoreSyncOp::Upsert).await.unwrap();
        assert_eq!(service.list_bindings(Scope::All).await.unwrap().len(), 2);
        let mapping = service.get_port_mapping(&ag.id).await.unwrap().unwrap();
        assert_eq!(mapping.access_ports.len(), 2);
    }
}
