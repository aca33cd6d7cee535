use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use super::features::{self, FEATURE_ROUTES};
use super::health;
use super::keys;
use super::middleware::{
    access_gate_middleware, logging_middleware, metrics_middleware, GateLayerState,
};
use super::state::AppState;

/// Create the full router with application state
pub fn create_router_with_state(state: AppState) -> Router {
    let mut router = Router::new()
        // Probes
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        .route("/live", get(health::live_check))
        // Key management
        .route("/api/keys", post(keys::create_key).get(keys::list_keys))
        .route("/api/keys/god", post(keys::create_god_key))
        .route("/api/keys/validate", post(keys::validate_key))
        .route("/api/keys/stats/{key}", get(keys::key_stats))
        .route("/api/keys/{key}/deactivate", post(keys::deactivate_key))
        .route("/api/keys/{key}/upgrade", post(keys::upgrade_key));

    // Metered features, each behind the access gate for its own feature
    for (path, feature) in FEATURE_ROUTES {
        let gate = GateLayerState::new(state.gate.clone(), feature);
        router = router.route(
            path,
            post(features::forward_feature)
                .route_layer(middleware::from_fn_with_state(gate, access_gate_middleware)),
        );
    }

    router
        .with_state(state)
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
