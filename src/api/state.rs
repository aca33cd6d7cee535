//! Application state for HTTP handlers

use std::sync::Arc;

use crate::infrastructure::api_key::{AccessGate, KeyManager};
use crate::infrastructure::upstream::UpstreamClient;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub key_manager: Arc<KeyManager>,
    pub gate: AccessGate,
    pub upstream: Arc<dyn UpstreamClient>,
    /// Secret expected in `X-Admin-Key`; `None` closes the admin routes
    pub admin_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(key_manager: Arc<KeyManager>, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            gate: AccessGate::new(key_manager.clone()),
            key_manager,
            upstream,
            admin_key: None,
        }
    }

    pub fn with_admin_key(mut self, admin_key: impl Into<Arc<str>>) -> Self {
        self.admin_key = Some(admin_key.into());
        self
    }
}
