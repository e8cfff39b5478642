//! Process boundary (SPEC_FULL.md §6): wires `AppConfig`, the Registry and
//! its collaborators, and starts the ambient HTTP listener. The actual
//! reconciliation services are constructed and held by the caller
//! (`main.rs`) — this type owns only the liveness/readiness surface.

use std::sync::Arc;

use tracing::info;

use crate::api::{self, AppState};
use crate::config::AppConfig;
use crate::registry::Registry;

pub struct Server {
    config: AppConfig,
    registry: Arc<dyn Registry>,
}

impl Server {
    pub fn new(config: AppConfig, registry: Arc<dyn Registry>) -> Self {
        Self { config, registry }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let state = AppState {
            registry: self.registry.clone(),
        };
        let app = api::create_router(state);

        let listener = tokio::net::TcpListener::bind(self.config.server.http_addr).await?;
        info!(addr = %self.config.server.http_addr, "HTTP liveness/readiness server listening");

        axum::serve(listener, app.into_make_service()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::registry::memory::InMemoryRegistry;

    #[tokio::test]
    async fn router_serves_liveness() {
        let registry: Arc<dyn Registry> = Arc::new(InMemoryRegistry::new());
        let state = AppState { registry };
        let app = api::create_router(state);

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
