//! Observability infrastructure - Prometheus metrics

mod config;
mod metrics;

pub use config::MetricsConfig;
pub use metrics::{
    create_metrics_router, init_metrics, record_gate_decision, record_http_request,
    record_settle_failure, record_upstream_request, PrometheusMetrics,
};
