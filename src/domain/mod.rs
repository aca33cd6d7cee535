//! Domain layer - Core business logic and entities

pub mod api_key;
pub mod error;
pub mod plan;
pub mod usage;

pub use api_key::{ApiKey, ApiKeyValidationError, ApiKeyValue, KeyStore};
pub use error::DomainError;
pub use plan::{
    Feature, PlanCatalog, PlanDefinition, PlanId, Quota, ResetPeriod, ResolvedPlan,
    UnknownPlanPolicy,
};
pub use usage::{FeatureUsage, KeyStats, UsageDecision, UsageRecord};
