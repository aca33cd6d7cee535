//! Usage metering domain
//!
//! Per-key counters with a reset window, the decision produced when a
//! metered call is checked against its plan, and the per-key usage report.

mod decision;
mod record;
mod stats;

pub use decision::UsageDecision;
pub use record::UsageRecord;
pub use stats::{FeatureUsage, KeyStats};
