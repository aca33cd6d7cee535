//! Upstream feature services
//!
//! Metered endpoints hand their request body to an external service; this
//! module is the thin forwarding seam.

mod http_client;

pub use http_client::{HttpUpstreamClient, UpstreamClient, UpstreamConfig};

#[cfg(test)]
pub use http_client::MockUpstreamClient;
