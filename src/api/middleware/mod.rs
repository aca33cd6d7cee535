//! API middleware components

pub mod access_gate;
pub mod admin_auth;
pub mod logging;
pub mod metrics;

pub use access_gate::{access_gate_middleware, GateLayerState};
pub use admin_auth::RequireAdminKey;
pub use logging::logging_middleware;
pub use metrics::metrics_middleware;
