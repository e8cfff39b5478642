//! The ambient HTTP surface (SPEC_FULL.md §1, §6): liveness/readiness only.
//! The actual request-delivery API for the reconciliation services is
//! explicitly out of scope — nothing here routes to `Services`.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Router};

use crate::registry::Registry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn Registry>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .with_state(state)
}

async fn liveness() -> &'static str {
    "OK"
}

/// Ready iff the Registry can hand out a Reader right now.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.registry.reader().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::registry::memory::InMemoryRegistry;

    fn test_state() -> AppState {
        AppState {
            registry: Arc::new(InMemoryRegistry::new()),
        }
    }

    #[tokio::test]
    async fn liveness_always_ok() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_ok_against_in_memory_registry() {
        let app = create_router(test_state());
        let response = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
