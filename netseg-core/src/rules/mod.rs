//! IE-AgAg rule regeneration notifier (SPEC_FULL.md §1, §6). The regenerator
//! itself — turning Service-to-Service rules into ingress/egress AddressGroup
//! pair rules — is out of scope; the core only needs to *notify* it when a
//! change makes existing rules stale.

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::model::ResourceIdentifier;

/// Notified by-reference after a committed change makes IE-AgAg rules
/// derived from that reference potentially stale. Every method is
/// fire-and-forget from the caller's perspective: post-commit fan-out
/// (SPEC_FULL.md §5 ordering rule 3) treats regenerator failures as
/// best-effort, same as SGROUP sync.
#[async_trait]
pub trait RuleS2SRegenerator: Send + Sync {
    async fn regenerate_for_service(&self, service_id: &ResourceIdentifier) -> EngineResult<()>;
    async fn regenerate_for_service_alias(&self, service_id: &ResourceIdentifier) -> EngineResult<()>;
    async fn regenerate_for_address_group_binding(&self, agb_id: &ResourceIdentifier) -> EngineResult<()>;
    async fn notify_service_address_groups_changed(&self, service_id: &ResourceIdentifier) -> EngineResult<()>;
}

/// No-op regenerator (SPEC_FULL.md §4.14) used by every unit test and by the
/// ambient binary until a real RuleS2S client is wired in.
pub struct NoopRuleS2SRegenerator;

#[async_trait]
impl RuleS2SRegenerator for NoopRuleS2SRegenerator {
    async fn regenerate_for_service(&self, _service_id: &ResourceIdentifier) -> EngineResult<()> {
        Ok(())
    }

    async fn regenerate_for_service_alias(&self, _service_id: &ResourceIdentifier) -> EngineResult<()> {
        Ok(())
    }

    async fn regenerate_for_address_group_binding(&self, _agb_id: &ResourceIdentifier) -> EngineResult<()> {
        Ok(())
    }

    async fn notify_service_address_groups_changed(&self, _service_id: &ResourceIdentifier) -> EngineResult<()> {
        Ok(())
    }
}
