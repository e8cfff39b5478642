use std::sync::Arc;

use netseg_core::conditions::NoopConditionManager;
use netseg_core::config::AppConfig;
use netseg_core::registry::pg::PgRegistry;
use netseg_core::registry::Registry;
use netseg_core::rules::NoopRuleS2SRegenerator;
use netseg_core::sync::RecordingSyncManager;
use netseg_core::{Server, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    netseg_core::telemetry::init_telemetry(&config)?;

    let registry = PgRegistry::connect(&config.database).await?;
    registry.migrate().await?;
    let registry: Arc<dyn Registry> = Arc::new(registry);

    // The concrete SGROUP wire client and status-post-processor are out of
    // scope (SPEC_FULL.md §1); the ambient binary runs against the same
    // recording/no-op collaborators the test suite exercises until those are
    // wired in.
    let sync_manager = Arc::new(RecordingSyncManager::new());
    let conditions = Arc::new(NoopConditionManager);
    let regenerator = Arc::new(NoopRuleS2SRegenerator);

    // The reconciliation services' own request-delivery API is out of scope
    // (SPEC_FULL.md §1) — they're constructed so the binary starts the same
    // collaborators the write paths assume, but nothing routes to them yet.
    let _services = Services::new(registry.clone(), sync_manager, conditions, regenerator);

    let server = Server::new(config, registry);
    server.run().await?;

    netseg_core::telemetry::shutdown_telemetry();
    Ok(())
}
