//! Plan domain
//!
//! Metered features, per-plan quotas and reset cadence, and the catalogue
//! that resolves a plan name to its definition.

mod catalog;
mod entity;
mod feature;

pub use catalog::{PlanCatalog, ResolvedPlan, UnknownPlanPolicy};
pub use entity::{PlanDefinition, PlanId, Quota, ResetPeriod, UNLIMITED_SENTINEL};
pub use feature::Feature;
