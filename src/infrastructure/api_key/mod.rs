//! API key infrastructure
//!
//! Key generation, the key manager that applies plan quotas, and the
//! access gate that enforces them at the request boundary.

mod gate;
mod generator;
mod service;

pub use gate::{AccessGate, Admission, GateRejection};
pub use generator::{constant_time_compare, KeyGenerator};
pub use service::KeyManager;
