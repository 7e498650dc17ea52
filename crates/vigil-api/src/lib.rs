//! vigil-api: REST API for Vigil.
//!
//! CRUD over monitored endpoints plus read access to their check logs and
//! uptime stats. Every write that changes whether or how an endpoint is
//! checked is mirrored into the `MonitorScheduler` before responding.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Liveness |
//! | GET | `/api/v1/endpoints` | List endpoints |
//! | POST | `/api/v1/endpoints` | Create an endpoint |
//! | GET | `/api/v1/endpoints/{id}` | Get one endpoint |
//! | PUT | `/api/v1/endpoints/{id}` | Update an endpoint |
//! | DELETE | `/api/v1/endpoints/{id}` | Delete an endpoint |
//! | GET | `/api/v1/endpoints/{id}/logs` | Recent check results |
//! | GET | `/api/v1/endpoints/{id}/stats` | Uptime and latency |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use vigil_scheduler::MonitorScheduler;
use vigil_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub scheduler: Arc<MonitorScheduler>,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route(
            "/endpoints",
            get(handlers::list_endpoints).post(handlers::create_endpoint),
        )
        .route(
            "/endpoints/{id}",
            get(handlers::get_endpoint)
                .put(handlers::update_endpoint)
                .delete(handlers::delete_endpoint),
        )
        .route("/endpoints/{id}/logs", get(handlers::list_logs))
        .route("/endpoints/{id}/stats", get(handlers::get_stats))
        .with_state(state);

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api_routes)
}
